use std::sync::Arc;

use crate::service::Collector;

pub struct AppState {
    pub collector: Arc<Collector>,
    /// Shared secret agents present as a bearer token. `None` refuses every
    /// authenticated request.
    pub auth_token: Option<String>,
}

impl AppState {
    pub fn new(collector: Arc<Collector>, auth_token: Option<String>) -> Self {
        Self {
            collector,
            auth_token,
        }
    }
}
