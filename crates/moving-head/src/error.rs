use moving_head_core::{CaptureError, HomographyError, Zone};

/// Errors returned by [`crate::TransformEngine`] and [`crate::ZoneRouter`].
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Homography(#[from] HomographyError),
    #[error("{zone} ring has {len} captures, need 4")]
    RingIncomplete { zone: Zone, len: usize },
}

#[derive(thiserror::Error, Debug)]
pub enum IoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Errors from loading a [`crate::RigSnapshot`].
#[derive(thiserror::Error, Debug)]
pub enum SnapshotError {
    #[error("snapshot is missing required field `{0}`")]
    MissingField(&'static str),
    #[error("snapshot lists zone `{0}` more than once")]
    DuplicateZone(Zone),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
