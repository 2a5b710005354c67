use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ReleaseError {
    #[error("release feed request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("release feed returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("no releases found")]
    NoReleases,
}

#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("failed to parse {what} version '{raw}': {source}")]
    SemverParse {
        what: &'static str,
        raw: String,
        #[source]
        source: semver::Error,
    },
    #[error(transparent)]
    Release(#[from] ReleaseError),
    #[error("bad status: {0}")]
    BadStatus(u16),
    #[error("invalid file path: {0}")]
    ExtractionInvalidPath(String),
    #[error("no executable file found in update")]
    NoExecutable,
    #[error("failed to swap executable {path}: {reason}")]
    SwapFailed { path: PathBuf, reason: String },
    #[error("self-update is not supported on this platform")]
    Unsupported,
    #[error("download failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to read update archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
