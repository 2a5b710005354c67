use std::path::PathBuf;

use aap_core::Endpoint;

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("a task is already {0}")]
    Busy(&'static str),
    #[error("AutoPlayer binary not found, searched: {}", display_paths(.0))]
    BinaryNotFound(Vec<PathBuf>),
    #[error(
        "address {0} is used by another app, try changing the 'AutoPlayer Port' in General Settings - Advanced to any other number between 49152-65535"
    )]
    PortUsedByForeign(Endpoint),
    #[error("failed to start AutoPlayer Server on {endpoint}: {source}")]
    SpawnFailed {
        endpoint: Endpoint,
        #[source]
        source: std::io::Error,
    },
    #[error("AutoPlayer Server on {0} did not pass its health check in time")]
    HealthTimeout(Endpoint),
    #[error("websocket to {endpoint} failed: {reason}")]
    SocketFailed { endpoint: Endpoint, reason: String },
    #[error("AutoPlayer Server unreachable at {endpoint}: {source}")]
    ServerUnreachable {
        endpoint: Endpoint,
        #[source]
        source: reqwest::Error,
    },
    #[error("server returned non-OK status: {status}, response: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("failed to decode server response: {0}")]
    DecodeFailed(String),
    #[error("health check failed: {0}")]
    Unhealthy(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("failed to write debug archive: {0}")]
    Archive(#[from] zip::result::ZipError),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
