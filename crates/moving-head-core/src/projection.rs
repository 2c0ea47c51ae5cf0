//! Gnomonic (tangent-plane) projection of pan/tilt angles.
//!
//! A pan/tilt pair names a direction on the unit sphere around the fixture.
//! Projecting that direction onto the plane at unit distance turns the aiming
//! surface into a plane, so a flat real-world target plane and the projected
//! angle plane are related by a single homography.
//!
//! ```text
//! x = tan(pan)
//! y = tan(tilt) / cos(pan)
//! ```
//!
//! The mapping is singular at `pan = ±90°`. Values near the singularity are
//! returned as computed (possibly huge or non-finite); use
//! [`GnomonicProjector::is_reliable`] to screen them.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::ops::{Add, Neg, Sub};

/// Distance (in degrees) from `pan = ±90°` below which a projection is
/// considered unreliable.
pub const SINGULARITY_MARGIN_DEG: f64 = 1e-6;

/// A pan/tilt angle pair in degrees.
///
/// Serialized as a two-element array `[pan, tilt]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct PanTilt {
    pub pan: f64,
    pub tilt: f64,
}

impl PanTilt {
    pub const ZERO: PanTilt = PanTilt {
        pan: 0.0,
        tilt: 0.0,
    };

    #[inline]
    pub const fn new(pan: f64, tilt: f64) -> Self {
        Self { pan, tilt }
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.pan.is_finite() && self.tilt.is_finite()
    }
}

impl From<[f64; 2]> for PanTilt {
    fn from(v: [f64; 2]) -> Self {
        Self::new(v[0], v[1])
    }
}

impl From<PanTilt> for [f64; 2] {
    fn from(p: PanTilt) -> Self {
        [p.pan, p.tilt]
    }
}

impl Add for PanTilt {
    type Output = PanTilt;

    fn add(self, rhs: PanTilt) -> PanTilt {
        PanTilt::new(self.pan + rhs.pan, self.tilt + rhs.tilt)
    }
}

impl Sub for PanTilt {
    type Output = PanTilt;

    fn sub(self, rhs: PanTilt) -> PanTilt {
        PanTilt::new(self.pan - rhs.pan, self.tilt - rhs.tilt)
    }
}

impl Neg for PanTilt {
    type Output = PanTilt;

    fn neg(self) -> PanTilt {
        PanTilt::new(-self.pan, -self.tilt)
    }
}

/// Stateless gnomonic projector.
#[derive(Debug, Clone, Copy, Default)]
pub struct GnomonicProjector;

impl GnomonicProjector {
    /// Map angles (degrees) to the tangent plane.
    #[inline]
    pub fn project(angles: PanTilt) -> Point2<f64> {
        let pan = angles.pan.to_radians();
        let tilt = angles.tilt.to_radians();
        Point2::new(pan.tan(), tilt.tan() / pan.cos())
    }

    /// Map a tangent-plane point back to angles (degrees).
    #[inline]
    pub fn unproject(p: Point2<f64>) -> PanTilt {
        let pan = p.x.atan();
        let tilt = (p.y * pan.cos()).atan();
        PanTilt::new(pan.to_degrees(), tilt.to_degrees())
    }

    /// `false` when `pan` is within [`SINGULARITY_MARGIN_DEG`] of `±90°` or not finite.
    #[inline]
    pub fn is_reliable(pan: f64) -> bool {
        pan.is_finite() && 90.0 - pan.abs() > SINGULARITY_MARGIN_DEG
    }
}

/// Shorthand for [`GnomonicProjector::project`].
#[inline]
pub fn project(angles: PanTilt) -> Point2<f64> {
    GnomonicProjector::project(angles)
}

/// Shorthand for [`GnomonicProjector::unproject`].
#[inline]
pub fn unproject(p: Point2<f64>) -> PanTilt {
    GnomonicProjector::unproject(p)
}
