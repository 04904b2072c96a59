use std::path::PathBuf;

use thiserror::Error;

/// Transport-level failures of the remote gallery. None of these are fatal;
/// discovery and fetch degrade per-attempt and per-candidate.
#[derive(Debug, Error)]
pub enum GalleryError {
    #[error("transport error for {url}: {reason}")]
    Transport { url: String, reason: String },

    #[error("unexpected status {status} for {url}")]
    Status { status: u16, url: String },

    #[error("empty body for {url}")]
    EmptyBody { url: String },
}

/// Pipeline error taxonomy. Every variant is recovered locally: the cycle
/// drops the affected candidate/asset and continues with the reduced set.
#[derive(Debug, Error)]
pub enum RotateError {
    #[error("gallery unavailable: {0}")]
    SourceUnavailable(GalleryError),

    #[error("fetch failed for {source_id}: {reason}")]
    FetchFailed { source_id: String, reason: String },

    #[error("transform rejected {source_id}: {reason}")]
    TransformRejected { source_id: String, reason: String },

    #[error("reconcile failed for {}: {reason}", path.display())]
    ReconcileFailed { path: PathBuf, reason: String },

    #[error("apply failed: {0}")]
    ApplyFailed(String),
}
