//! Application state shared across all request handlers.

use std::sync::Arc;

use crate::core::config::Config;
use crate::email::Mailer;
use crate::store::Store;

/// Shared application state. Built once at startup and cloned into both
/// frontends; there is no other cross-request shared mutable state.
pub struct AppState {
    /// Repository handle.
    pub store: Store,
    /// Immutable service configuration.
    pub config: Config,
    /// Outbound mail sender.
    pub mailer: Mailer,
}

impl AppState {
    /// Assemble the shared state.
    #[must_use]
    pub fn new(config: Config, store: Store) -> Arc<Self> {
        let mailer = Mailer::new(config.email.clone());
        Arc::new(Self {
            store,
            config,
            mailer,
        })
    }
}
