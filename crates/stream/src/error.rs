/// Errors from setting up the streaming layer.
///
/// Runtime conditions (duplicate loads, purge misses, failed generation) are
/// absorbed by the registry and never reported here.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("failed to spawn generation worker: {0}")]
    WorkerSpawn(std::io::Error),
}
