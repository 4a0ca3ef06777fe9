use std::sync::Arc;
use std::time::Instant;

use crate::config::Settings;
use crate::connection_manager::SessionRegistry;
use crate::relay::MessageRouter;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub registry: Arc<SessionRegistry>,
    pub router: Arc<MessageRouter>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let router = Arc::new(MessageRouter::new(registry.clone()));

        Self {
            settings: Arc::new(settings),
            registry,
            router,
            start_time: Instant::now(),
        }
    }
}
