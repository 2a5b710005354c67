//! Self-update for the ADB Auto Player launcher: release discovery,
//! changelogs and on-disk replacement of the running binary set.

pub mod apply;
pub mod engine;
pub mod error;
pub mod release;

pub use engine::{Changelog, DownloadProgress, ProgressCallback, UpdateEngine, UpdateInfo};
pub use error::{ReleaseError, UpdateError};
pub use release::{Asset, Release, ReleaseClient, TargetOs};
