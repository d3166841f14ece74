//! Shared application state for all routes.

use crate::config::{JsonApiOptions, ResourceGraph};
use crate::hooks::HookRegistry;
use crate::service::ResourceService;
use crate::store::ResourceRepository;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub service: ResourceService,
    pub options: Arc<JsonApiOptions>,
}

impl AppState {
    pub fn new(
        graph: Arc<ResourceGraph>,
        hooks: Arc<HookRegistry>,
        repository: Arc<dyn ResourceRepository>,
        options: JsonApiOptions,
    ) -> Self {
        AppState {
            service: ResourceService::new(graph, hooks, repository),
            options: Arc::new(options),
        }
    }

    pub fn graph(&self) -> &Arc<ResourceGraph> {
        self.service.graph()
    }
}
