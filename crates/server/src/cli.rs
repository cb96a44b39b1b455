//! Command-line overrides on top of the environment configuration.

use clap::Parser;

use collector_core::Config;

/// Collector ingestion and coordination server.
#[derive(Parser, Debug)]
#[command(name = "collector", version, about)]
pub struct Cli {
    /// Config profile; keys are looked up as `{PROFILE}_{KEY}` first.
    #[arg(long, env = "COLLECTOR_PROFILE")]
    pub profile: Option<String>,

    /// Bind address (overrides API_HOST).
    #[arg(long)]
    pub host: Option<String>,

    /// Listen port (overrides API_PORT).
    #[arg(long)]
    pub port: Option<u16>,

    /// Keep jobs, workers and items in memory instead of PostgreSQL.
    #[arg(long, env = "COLLECTOR_IN_MEMORY", default_value_t = false)]
    pub in_memory: bool,
}

impl Cli {
    /// Load the environment configuration and apply the flags over it.
    pub fn load_config(&self) -> Config {
        let mut config = match self.profile.as_deref() {
            Some(profile) => Config::for_profile(profile),
            None => Config::from_env(),
        };
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_environment() {
        let cli = Cli::parse_from(["collector", "--host", "127.0.0.1", "--port", "9100", "--in-memory"]);
        assert!(cli.in_memory);
        let config = cli.load_config();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9100);
    }
}
