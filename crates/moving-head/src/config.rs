//! Engine and router configuration.

use crate::error::IoError;
use moving_head_core::PanTilt;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/// Where the fixture hangs in the scene. Carried for the host; the aiming
/// math does not read it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixturePose {
    pub position: [f64; 3],
    /// Euler angles in degrees.
    pub rotation: [f64; 3],
}

/// Configuration for [`crate::TransformEngine`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub fixture: FixturePose,
    /// Mounting orientation of the fixture in degrees. Added to every solved
    /// aim and subtracted from captured angles before fitting.
    pub pan_tilt_direction: PanTilt,
}

impl EngineConfig {
    pub fn with_direction(direction: PanTilt) -> Self {
        Self {
            pan_tilt_direction: direction,
            ..Self::default()
        }
    }

    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), IoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

fn default_plane_tolerance() -> f64 {
    0.05
}

/// Parameters for [`crate::ZoneRouter`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouterParams {
    /// Max height difference (world units) for a point to count as lying on
    /// the top or bottom ring plane.
    #[serde(default = "default_plane_tolerance")]
    pub plane_tolerance: f64,
}

impl Default for RouterParams {
    fn default() -> Self {
        Self {
            plane_tolerance: default_plane_tolerance(),
        }
    }
}
