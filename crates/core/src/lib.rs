pub mod config;
pub mod envelope;
pub mod error;
pub mod item;
pub mod job;
pub mod partition;
pub mod worker;

pub use config::Config;
pub use envelope::*;
pub use error::*;
pub use item::*;
pub use job::*;
pub use partition::*;
pub use worker::*;
