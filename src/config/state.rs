// Application state module
// Everything a request handler needs, built once at startup

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use super::types::{Config, ForwardConfig};
use crate::upstream::UpstreamConnection;

/// Application state
pub struct AppState {
    pub config: Config,
    pub forward: Arc<ForwardConfig>,
    /// The single upstream connection shared by every forwarded request
    pub upstream: UpstreamConnection,
    pub build_dir: PathBuf,

    // Cached config values for fast access without locks
    pub cached_access_log: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(config: &Config, forward: Arc<ForwardConfig>, upstream: UpstreamConnection) -> Self {
        Self {
            config: config.clone(),
            forward,
            upstream,
            build_dir: PathBuf::from(&config.files.build_dir),
            cached_access_log: Arc::new(AtomicBool::new(config.logging.access_log)),
        }
    }
}
