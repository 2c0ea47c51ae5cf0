//! Geometry and capture storage for aiming moving-head fixtures.
//!
//! This crate is purely computational: it converts pan/tilt angles to a
//! gnomonic tangent plane, fits homographies between a real-world plane and
//! that angle plane, and stores per-zone calibration captures. It holds no
//! locks and does no I/O; `moving-head` builds the zone-aware engine on top.
//!
//! ```
//! use moving_head_core::{fit_from_pan_tilt, unproject, PanTilt};
//! use nalgebra::{Point2, Point3};
//!
//! let real = [
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 1.0),
//!     Point3::new(0.0, 0.0, 1.0),
//! ];
//! let angles = [
//!     PanTilt::new(3.97973514, 45.3091774),
//!     PanTilt::new(31.8413868, 46.40531921),
//!     PanTilt::new(47.31228638, 31.03630066),
//!     PanTilt::new(-4.61433363, 27.64239883),
//! ];
//! let h = fit_from_pan_tilt(&real, &angles).unwrap();
//! let aim = unproject(h.apply(Point2::new(0.5, 0.5)).unwrap());
//! assert!((aim.pan - 20.038).abs() < 1e-3);
//! ```

mod capture;
mod homography;
mod logger;
mod projection;
mod zone;

pub use capture::{CalibrationSample, CalibrationSet, CaptureError, CaptureList};
pub use homography::{
    dehomogenize, estimate_homography_dlt, fit, fit_from_pan_tilt, fit_reverse, ground_point,
    homography_from_4pt, Degeneracy, Homography, HomographyError,
};
pub use projection::{project, unproject, GnomonicProjector, PanTilt, SINGULARITY_MARGIN_DEG};
pub use zone::{Zone, ZoneParseError};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init, init_with_level, level_override, verbosity_level, LOG_ENV};
