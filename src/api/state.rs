use std::sync::Arc;

use crate::application::{DocumentService, HistoryService, QueryService};
use crate::infrastructure::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub query_service: Arc<QueryService>,
    pub history_service: Arc<HistoryService>,
    pub document_service: Arc<DocumentService>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        query_service: QueryService,
        history_service: HistoryService,
        document_service: DocumentService,
    ) -> Self {
        Self {
            query_service: Arc::new(query_service),
            history_service: Arc::new(history_service),
            document_service: Arc::new(document_service),
            config: Arc::new(config),
        }
    }
}
