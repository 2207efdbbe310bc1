//! Application state shared by handlers

use std::sync::Arc;

use crate::infrastructure::access_key::AccessKeyService;

#[derive(Clone, Debug)]
pub struct AppState {
    pub access_key_service: Arc<AccessKeyService>,
}

impl AppState {
    pub fn new(access_key_service: Arc<AccessKeyService>) -> Self {
        Self { access_key_service }
    }
}
