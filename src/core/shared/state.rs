use std::sync::Arc;

use crate::auth::AuthService;
use crate::core::config::AppConfig;
use crate::crm::recommend::RecommendationEngine;
use crate::drive::ObjectStore;
use crate::storage::CrmStore;

/// Shared state handed to every handler as `State<Arc<AppState>>`.
pub struct AppState {
    pub config: AppConfig,
    pub crm: Arc<dyn CrmStore>,
    pub auth: Arc<AuthService>,
    pub drive: Arc<dyn ObjectStore>,
    pub recommender: RecommendationEngine,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("bind", &self.config.bind_address())
            .field("llm_enabled", &self.recommender.uses_llm())
            .finish_non_exhaustive()
    }
}
