use std::sync::Arc;

use crate::auth::TokenVerifier;
use crate::services::{NotificationGenerator, RegistrationEngine};
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub registrations: RegistrationEngine,
    pub notifications: NotificationGenerator,
    pub tokens: TokenVerifier,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, jwt_secret: &str) -> Self {
        let notifications = NotificationGenerator::new(Arc::clone(&store));
        let registrations = RegistrationEngine::new(Arc::clone(&store), notifications.clone());
        Self {
            store,
            registrations,
            notifications,
            tokens: TokenVerifier::new(jwt_secret),
        }
    }
}
