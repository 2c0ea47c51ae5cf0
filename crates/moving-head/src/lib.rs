//! Calibration and aiming engine for moving-head fixtures.
//!
//! This crate provides:
//! - [`TransformEngine`]: per-zone captures and homographies behind per-zone
//!   locks, with forward (point → pan/tilt) and inverse (pan/tilt → point)
//!   queries,
//! - [`ZoneRouter`] and [`derive_sides`]: side-face homographies for box rigs
//!   and zone selection for 3D targets,
//! - [`RigSnapshot`]: a flat, tolerant-to-load record for persistence,
//! - (feature `cli`) the `moving-head` binary.
//!
//! ## Quickstart
//!
//! ```
//! use moving_head::{CalibrationSample, EngineConfig, PanTilt, TransformEngine, Zone};
//! use nalgebra::{Point2, Point3};
//!
//! # fn main() -> Result<(), moving_head::EngineError> {
//! let engine = TransformEngine::new(EngineConfig::default());
//! for (x, z, pan, tilt) in [
//!     (0.0, 0.0, 3.97973514, 45.3091774),
//!     (1.0, 0.0, 31.8413868, 46.40531921),
//!     (1.0, 1.0, 47.31228638, 31.03630066),
//!     (0.0, 1.0, -4.61433363, 27.64239883),
//! ] {
//!     engine.add_capture(
//!         Zone::Top,
//!         CalibrationSample::new(Point3::new(x, 0.0, z), PanTilt::new(pan, tilt)),
//!     );
//! }
//! engine.calibrate(Zone::Top)?;
//! let aim = engine.solve_aim(Point2::new(0.5, 0.5), Zone::Top)?;
//! println!("pan {:.3} tilt {:.3}", aim.pan, aim.tilt);
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `moving_head::core`: projection, homography fitting, capture lists.
//! - [`engine`]: [`TransformEngine`], [`ZoneState`], [`TempInput`].
//! - [`router`]: [`SideAxis`], [`SideFit`], [`ZoneRouter`].
//! - [`snapshot`]: [`RigSnapshot`], [`ZoneSnapshot`], [`DataPoint`].

mod config;
pub mod engine;
mod error;
pub mod router;
pub mod snapshot;

pub use moving_head_core as core;

pub use config::{EngineConfig, FixturePose, RouterParams};
pub use engine::{TempInput, TransformEngine, ZoneState};
pub use error::{EngineError, IoError, SnapshotError};
pub use router::{derive_sides, SideAxis, SideFit, ZoneRouter};
pub use snapshot::{DataPoint, RigSnapshot, ZoneSnapshot};

pub use moving_head_core::{
    CalibrationSample, CalibrationSet, CaptureError, CaptureList, GnomonicProjector, Homography,
    HomographyError, PanTilt, Zone,
};
