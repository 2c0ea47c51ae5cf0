//! Multi-surface rigs: side-face homographies and zone selection.
//!
//! A rig is described by a `top` and a `bottom` ring of four captures each,
//! index-aligned so that corner `i` of both rings lies on the same vertical
//! edge. Corners 0–1 span the first side face and corners 2–3 the second.
//!
//! ```text
//!   top:    t0 ---- t1        t3 ---- t2
//!           |  side_1 |        | side_2 |
//!   bottom: b0 ---- b1        b3 ---- b2
//! ```

use crate::config::RouterParams;
use crate::error::EngineError;
use moving_head_core::{
    fit, ground_point, CaptureList, GnomonicProjector, Homography, PanTilt, Zone,
};
use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

/// Horizontal world axis kept in a side face's 2D coordinates. The other
/// horizontal axis is constant along the face and dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideAxis {
    X,
    Z,
}

impl SideAxis {
    /// Pick the axis along which the first two bottom corners differ most.
    pub fn from_edge(a: &Point3<f64>, b: &Point3<f64>) -> Self {
        if (b.x - a.x).abs() >= (b.z - a.z).abs() {
            SideAxis::X
        } else {
            SideAxis::Z
        }
    }

    /// Face-local coordinate `(horizontal, y)`.
    #[inline]
    pub fn side_point(self, p: &Point3<f64>) -> Point2<f64> {
        match self {
            SideAxis::X => Point2::new(p.x, p.y),
            SideAxis::Z => Point2::new(p.z, p.y),
        }
    }

    /// Coordinate along the dropped horizontal axis.
    #[inline]
    pub fn depth(self, p: &Point3<f64>) -> f64 {
        match self {
            SideAxis::X => p.z,
            SideAxis::Z => p.x,
        }
    }
}

/// A fitted side face.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SideFit {
    pub zone: Zone,
    pub axis: SideAxis,
    pub homography: Homography,
    /// Face-local corners in fit order: `b_i, b_j, t_j, t_i`.
    pub real: [Point2<f64>; 4],
    pub projected: [Point2<f64>; 4],
}

fn require_ring(zone: Zone, ring: &CaptureList) -> Result<(), EngineError> {
    if ring.len() < 4 {
        return Err(EngineError::RingIncomplete {
            zone,
            len: ring.len(),
        });
    }
    Ok(())
}

fn fit_side(
    zone: Zone,
    corners: (usize, usize),
    axis: SideAxis,
    top: &CaptureList,
    bottom: &CaptureList,
    direction: PanTilt,
) -> Result<SideFit, EngineError> {
    let (i, j) = corners;
    // bottom edge forward, top edge reversed to close the quad
    let picks = [(bottom, i), (bottom, j), (top, j), (top, i)];

    let real = picks.map(|(ring, k)| axis.side_point(&ring.targets()[k]));
    let projected =
        picks.map(|(ring, k)| GnomonicProjector::project(ring.pan_tilts()[k] - direction));

    let homography = fit(&real, &projected)?;
    log::debug!("{zone} fitted on {axis:?} axis: {:?}", homography.to_array());

    Ok(SideFit {
        zone,
        axis,
        homography,
        real,
        projected,
    })
}

/// Fit both side faces from the top and bottom rings.
///
/// `direction` is the fixture's pan/tilt direction, removed from the raw
/// captured angles before projection.
pub fn derive_sides(
    top: &CaptureList,
    bottom: &CaptureList,
    direction: PanTilt,
) -> Result<[SideFit; 2], EngineError> {
    require_ring(Zone::Top, top)?;
    require_ring(Zone::Bottom, bottom)?;

    let axis = SideAxis::from_edge(&bottom.targets()[0], &bottom.targets()[1]);
    Ok([
        fit_side(Zone::Side1, (0, 1), axis, top, bottom, direction)?,
        fit_side(Zone::Side2, (2, 3), axis, top, bottom, direction)?,
    ])
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    sum / n.max(1) as f64
}

/// Chooses the zone for a 3D query point on a box-shaped rig.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ZoneRouter {
    params: RouterParams,
    axis: SideAxis,
    top_height: f64,
    bottom_height: f64,
    /// Dropped-axis coordinate of the side_1 and side_2 faces.
    side_depth: [f64; 2],
}

impl ZoneRouter {
    pub fn from_rings(
        top: &CaptureList,
        bottom: &CaptureList,
        params: RouterParams,
    ) -> Result<Self, EngineError> {
        require_ring(Zone::Top, top)?;
        require_ring(Zone::Bottom, bottom)?;

        let t = &top.targets()[..4];
        let b = &bottom.targets()[..4];
        let axis = SideAxis::from_edge(&b[0], &b[1]);
        let face =
            |i: usize, j: usize| mean([b[i], b[j], t[i], t[j]].iter().map(|p| axis.depth(p)));

        Ok(Self {
            params,
            axis,
            top_height: mean(t.iter().map(|p| p.y)),
            bottom_height: mean(b.iter().map(|p| p.y)),
            side_depth: [face(0, 1), face(2, 3)],
        })
    }

    #[inline]
    pub fn axis(&self) -> SideAxis {
        self.axis
    }

    /// Zone for `target` and the zone-local 2D point to feed into
    /// [`crate::TransformEngine::forward`].
    pub fn route(&self, target: &Point3<f64>) -> (Zone, Point2<f64>) {
        let tol = self.params.plane_tolerance;
        let dt = (target.y - self.top_height).abs();
        let db = (target.y - self.bottom_height).abs();
        if dt <= tol && dt <= db {
            return (Zone::Top, ground_point(target));
        }
        if db <= tol {
            return (Zone::Bottom, ground_point(target));
        }

        let depth = self.axis.depth(target);
        let zone = if (depth - self.side_depth[0]).abs() <= (depth - self.side_depth[1]).abs() {
            Zone::Side1
        } else {
            Zone::Side2
        };
        (zone, self.axis.side_point(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moving_head_core::CalibrationSample;

    fn ring(points: [[f64; 3]; 4], tilt0: f64) -> CaptureList {
        points
            .iter()
            .enumerate()
            .map(|(i, p)| {
                CalibrationSample::new(
                    Point3::new(p[0], p[1], p[2]),
                    PanTilt::new(10.0 * i as f64 - 15.0, tilt0 + 3.0 * i as f64),
                )
            })
            .collect()
    }

    fn box_rings() -> (CaptureList, CaptureList) {
        let top = ring(
            [
                [-1.0, 2.0, 2.0],
                [1.0, 2.0, 2.0],
                [1.0, 2.0, 4.0],
                [-1.0, 2.0, 4.0],
            ],
            40.0,
        );
        let bottom = ring(
            [
                [-1.0, 0.0, 2.0],
                [1.0, 0.0, 2.0],
                [1.0, 0.0, 4.0],
                [-1.0, 0.0, 4.0],
            ],
            20.0,
        );
        (top, bottom)
    }

    #[test]
    fn axis_follows_the_longer_horizontal_edge() {
        let a = Point3::new(0.0, 0.0, 0.0);
        assert_eq!(SideAxis::from_edge(&a, &Point3::new(2.0, 0.0, 0.5)), SideAxis::X);
        assert_eq!(SideAxis::from_edge(&a, &Point3::new(0.5, 0.0, -2.0)), SideAxis::Z);
        assert_eq!(
            SideAxis::Z.side_point(&Point3::new(1.0, 2.0, 3.0)),
            Point2::new(3.0, 2.0)
        );
    }

    #[test]
    fn side_quads_close_in_winding_order() {
        let (top, bottom) = box_rings();
        let [s1, s2] = derive_sides(&top, &bottom, PanTilt::ZERO).expect("sides");
        assert_eq!(s1.zone, Zone::Side1);
        assert_eq!(s1.axis, SideAxis::X);
        assert_eq!(
            s1.real,
            [
                Point2::new(-1.0, 0.0),
                Point2::new(1.0, 0.0),
                Point2::new(1.0, 2.0),
                Point2::new(-1.0, 2.0),
            ]
        );
        assert_eq!(
            s2.real,
            [
                Point2::new(1.0, 0.0),
                Point2::new(-1.0, 0.0),
                Point2::new(-1.0, 2.0),
                Point2::new(1.0, 2.0),
            ]
        );
        assert_eq!(
            s1.projected[2],
            GnomonicProjector::project(top.pan_tilts()[1])
        );
    }

    #[test]
    fn short_ring_is_rejected() {
        let (top, mut bottom) = box_rings();
        bottom.pop().expect("non-empty");
        assert_eq!(
            derive_sides(&top, &bottom, PanTilt::ZERO),
            Err(EngineError::RingIncomplete {
                zone: Zone::Bottom,
                len: 3
            })
        );
    }

    #[test]
    fn routes_points_to_faces() {
        let (top, bottom) = box_rings();
        let router =
            ZoneRouter::from_rings(&top, &bottom, RouterParams::default()).expect("router");

        assert_eq!(
            router.route(&Point3::new(0.2, 2.01, 3.0)),
            (Zone::Top, Point2::new(0.2, 3.0))
        );
        assert_eq!(
            router.route(&Point3::new(0.2, 0.0, 3.0)),
            (Zone::Bottom, Point2::new(0.2, 3.0))
        );
        assert_eq!(
            router.route(&Point3::new(0.5, 1.0, 2.0)),
            (Zone::Side1, Point2::new(0.5, 1.0))
        );
        assert_eq!(
            router.route(&Point3::new(-0.5, 1.5, 3.9)),
            (Zone::Side2, Point2::new(-0.5, 1.5))
        );
    }
}
