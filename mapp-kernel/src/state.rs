use crate::config::KernelConfig;
use crate::directory::Directory;
use crate::lab::Lab;
use parking_lot::Mutex;
use std::sync::Arc;

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// État unique partagé par les handlers Axum
#[derive(Clone)]
pub struct AppState {
    pub lab: Lab,
    pub directory: Arc<dyn Directory>,
    pub cfg: Arc<KernelConfig>,
}
