use std::sync::Arc;

use crate::{services::ModelRegistry, store::SharedStore};

/// Shared application state: the store chosen at composition time and
/// the model registry. Cheap to clone per request.
#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub registry: Arc<ModelRegistry>,
}

impl AppState {
    pub fn new(store: SharedStore, registry: Arc<ModelRegistry>) -> Self {
        Self { store, registry }
    }
}
