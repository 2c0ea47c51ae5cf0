//! Planar homography between the real-world ground plane and gnomonic angle space.
//!
//! `H` maps real points `[x, z, 1]` to projected points `[u, v, w]`:
//! `p_proj ~ H * p_real`. Fits are full refits; a fitted matrix may be
//! singular for pathological inputs and callers check
//! [`Homography::is_invertible`] before inverting.

use crate::projection::{GnomonicProjector, PanTilt};
use log::debug;
use nalgebra::{DMatrix, Matrix3, Point2, Point3, SMatrix, SVector, Vector3};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Why a set of correspondences was rejected.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Degeneracy {
    #[error("need at least 4 correspondences, got {got}")]
    TooFew { got: usize },
    #[error("{real} real points vs {projected} projected points")]
    LengthMismatch { real: usize, projected: usize },
    #[error("non-finite coordinate")]
    NonFinite,
    #[error("points are collinear")]
    Collinear,
    #[error("linear solve failed")]
    SolveFailed,
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HomographyError {
    #[error("insufficient or degenerate correspondences: {reason}")]
    InsufficientOrDegenerateCorrespondences { reason: Degeneracy },
    #[error("homogeneous coordinate is zero")]
    DivisionByZero,
    #[error("homography is not invertible")]
    NotInvertible,
}

impl From<Degeneracy> for HomographyError {
    fn from(reason: Degeneracy) -> Self {
        HomographyError::InsufficientOrDegenerateCorrespondences { reason }
    }
}

/// A 3×3 projective transform. Defaults to identity ("uncalibrated").
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[[f64; 3]; 3]", into = "[[f64; 3]; 3]")]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Default for Homography {
    fn default() -> Self {
        Self::identity()
    }
}

impl From<[[f64; 3]; 3]> for Homography {
    fn from(rows: [[f64; 3]; 3]) -> Self {
        Self::from_array(rows)
    }
}

impl From<Homography> for [[f64; 3]; 3] {
    fn from(h: Homography) -> Self {
        h.to_array()
    }
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    pub fn identity() -> Self {
        Self::new(Matrix3::identity())
    }

    pub fn zero() -> Self {
        Self::new(Matrix3::zeros())
    }

    pub fn from_array(rows: [[f64; 3]; 3]) -> Self {
        Self::new(Matrix3::from_row_slice(&[
            rows[0][0], rows[0][1], rows[0][2], rows[1][0], rows[1][1], rows[1][2], rows[2][0],
            rows[2][1], rows[2][2],
        ]))
    }

    pub fn to_array(&self) -> [[f64; 3]; 3] {
        [
            [self.h[(0, 0)], self.h[(0, 1)], self.h[(0, 2)]],
            [self.h[(1, 0)], self.h[(1, 1)], self.h[(1, 2)]],
            [self.h[(2, 0)], self.h[(2, 1)], self.h[(2, 2)]],
        ]
    }

    /// Every entry is within `tol` of zero.
    #[inline]
    pub fn is_negligible(&self, tol: f64) -> bool {
        self.h.amax() <= tol
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.h.iter().all(|v| v.is_finite())
    }

    pub fn is_identity(&self, tol: f64) -> bool {
        (self.h - Matrix3::identity()).amax() <= tol
    }

    /// Determinant test relative to the matrix scale.
    pub fn is_invertible(&self) -> bool {
        if !self.is_finite() {
            return false;
        }
        let scale = self.h.norm().powi(3).max(1.0);
        self.h.determinant().abs() > 1e-12 * scale
    }

    pub fn inverse(&self) -> Option<Self> {
        if !self.is_invertible() {
            return None;
        }
        self.h.try_inverse().map(Self::new)
    }

    /// Map a point and return to Euclidean coordinates.
    #[inline]
    pub fn apply(&self, p: Point2<f64>) -> Result<Point2<f64>, HomographyError> {
        dehomogenize(self.h * Vector3::new(p.x, p.y, 1.0))
    }
}

/// Divide by the homogeneous coordinate.
pub fn dehomogenize(v: Vector3<f64>) -> Result<Point2<f64>, HomographyError> {
    let w = v[2];
    if w == 0.0 {
        return Err(HomographyError::DivisionByZero);
    }
    let p = Point2::new(v[0] / w, v[1] / w);
    if !(p.x.is_finite() && p.y.is_finite()) {
        return Err(HomographyError::DivisionByZero);
    }
    Ok(p)
}

/// Ground-plane coordinate of a real-world point: the up axis (`y`) is dropped.
#[inline]
pub fn ground_point(p: &Point3<f64>) -> Point2<f64> {
    Point2::new(p.x, p.z)
}

fn hartley_normalization(cx: f64, cy: f64, mean_dist: f64) -> Matrix3<f64> {
    let s = if mean_dist > 1e-12 {
        (2.0_f64).sqrt() / mean_dist
    } else {
        1.0
    };

    Matrix3::<f64>::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0)
}

fn normalize_points(pts: &[Point2<f64>]) -> (Vec<Point2<f64>>, Matrix3<f64>) {
    // translate to centroid, scale so mean distance = sqrt(2)
    let n = pts.len() as f64;
    let (cx, cy) = pts
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    let (cx, cy) = (cx / n, cy / n);

    let mean_dist = pts
        .iter()
        .map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;

    let t = hartley_normalization(cx, cy, mean_dist);
    let out = pts
        .iter()
        .map(|p| {
            let v = t * Vector3::new(p.x, p.y, 1.0);
            Point2::new(v[0], v[1])
        })
        .collect();
    (out, t)
}

/// Scale so that `H[2,2] = 1`, unless that element vanishes.
fn normalize_scale(h: Matrix3<f64>) -> Matrix3<f64> {
    let s = h[(2, 2)];
    if s.abs() < 1e-12 {
        return h;
    }
    h / s
}

fn denormalize_homography(
    hn: Matrix3<f64>,
    t_src: Matrix3<f64>,
    t_dst: Matrix3<f64>,
) -> Option<Matrix3<f64>> {
    let t_dst_inv = t_dst.try_inverse()?;
    Some(t_dst_inv * hn * t_src)
}

/// `true` when the points span less than a 2D region (all coincident or on one line).
fn is_collinear(pts: &[Point2<f64>]) -> bool {
    let n = pts.len() as f64;
    let (cx, cy) = pts
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    let (cx, cy) = (cx / n, cy / n);

    let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
    for p in pts {
        let dx = p.x - cx;
        let dy = p.y - cy;
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }
    let trace = sxx + syy;
    if trace <= 1e-24 {
        return true;
    }
    sxx * syy - sxy * sxy <= 1e-10 * trace * trace
}

fn validate_correspondences(
    real: &[Point2<f64>],
    projected: &[Point2<f64>],
) -> Result<(), Degeneracy> {
    if real.len() != projected.len() {
        return Err(Degeneracy::LengthMismatch {
            real: real.len(),
            projected: projected.len(),
        });
    }
    if real.len() < 4 {
        return Err(Degeneracy::TooFew { got: real.len() });
    }
    let finite = |p: &Point2<f64>| p.x.is_finite() && p.y.is_finite();
    if !real.iter().all(finite) || !projected.iter().all(finite) {
        return Err(Degeneracy::NonFinite);
    }
    if is_collinear(real) || is_collinear(projected) {
        return Err(Degeneracy::Collinear);
    }
    Ok(())
}

/// Fit `H` such that `projected ~ H * real`.
///
/// Exactly four correspondences are solved exactly; more are solved in the
/// least-squares sense with the normalized DLT.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip_all, fields(points = real.len()))
)]
pub fn fit(real: &[Point2<f64>], projected: &[Point2<f64>]) -> Result<Homography, HomographyError> {
    validate_correspondences(real, projected)?;

    if real.len() == 4 {
        let src: &[Point2<f64>; 4] = real.try_into().map_err(|_| Degeneracy::TooFew {
            got: real.len(),
        })?;
        let dst: &[Point2<f64>; 4] = projected.try_into().map_err(|_| Degeneracy::TooFew {
            got: projected.len(),
        })?;
        if let Some(h) = homography_from_4pt(src, dst) {
            debug!("exact 4-point homography: {:?}", h.to_array());
            return Ok(h);
        }
        debug!("4-point solve singular, falling back to DLT");
    }

    let h = estimate_homography_dlt(real, projected).ok_or(Degeneracy::SolveFailed)?;
    if !h.is_finite() {
        return Err(Degeneracy::NonFinite.into());
    }
    debug!(
        "DLT homography from {} points: {:?}",
        real.len(),
        h.to_array()
    );
    Ok(h)
}

/// Same as [`fit`] with the roles swapped: `real ~ H * projected`.
pub fn fit_reverse(
    projected: &[Point2<f64>],
    real: &[Point2<f64>],
) -> Result<Homography, HomographyError> {
    fit(projected, real)
}

/// Drop the up axis of each real point, project each pan/tilt pair, then [`fit`].
pub fn fit_from_pan_tilt(
    real: &[Point3<f64>],
    pan_tilt: &[PanTilt],
) -> Result<Homography, HomographyError> {
    let ground: Vec<Point2<f64>> = real.iter().map(ground_point).collect();
    let projected: Vec<Point2<f64>> = pan_tilt
        .iter()
        .map(|a| GnomonicProjector::project(*a))
        .collect();
    fit(&ground, &projected)
}

/// Normalized DLT: null space of the `2N x 9` constraint matrix via SVD.
pub fn estimate_homography_dlt(
    real: &[Point2<f64>],
    projected: &[Point2<f64>],
) -> Option<Homography> {
    if real.len() != projected.len() || real.len() < 4 {
        return None;
    }

    let (r, tr) = normalize_points(real);
    let (p, tp) = normalize_points(projected);

    let n = real.len();
    let mut a = DMatrix::<f64>::zeros((2 * n).max(9), 9);

    for k in 0..n {
        let x = r[k].x;
        let y = r[k].y;
        let u = p[k].x;
        let v = p[k].y;

        // [ -x -y -1   0  0  0   u*x u*y u ]
        a[(2 * k, 0)] = -x;
        a[(2 * k, 1)] = -y;
        a[(2 * k, 2)] = -1.0;
        a[(2 * k, 6)] = u * x;
        a[(2 * k, 7)] = u * y;
        a[(2 * k, 8)] = u;

        // [ 0  0  0  -x -y -1   v*x v*y v ]
        a[(2 * k + 1, 3)] = -x;
        a[(2 * k + 1, 4)] = -y;
        a[(2 * k + 1, 5)] = -1.0;
        a[(2 * k + 1, 6)] = v * x;
        a[(2 * k + 1, 7)] = v * y;
        a[(2 * k + 1, 8)] = v;
    }

    // rows past 2N stay zero so V^T is square and its last row is the null vector
    let svd = a.svd(false, true);
    let last = svd.singular_values.iamin();
    let vt = svd.v_t?;
    let h = vt.row(last);

    let hn =
        Matrix3::<f64>::from_row_slice(&[h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]]);

    // H = Tp^{-1} * Hn * Tr
    let h_den = denormalize_homography(hn, tr, tp)?;
    Some(Homography::new(normalize_scale(h_den)))
}

/// Exact homography from 4 correspondences with `h33 = 1` in normalized space.
///
/// Corner order must be consistent between `src` and `dst`.
pub fn homography_from_4pt(
    src: &[Point2<f64>; 4],
    dst: &[Point2<f64>; 4],
) -> Option<Homography> {
    // Unknowns: [h11 h12 h13 h21 h22 h23 h31 h32], with h33 = 1
    // h11 x + h12 y + h13 - u h31 x - u h32 y = u
    // h21 x + h22 y + h23 - v h31 x - v h32 y = v
    let (src_n, t_src) = normalize_points(src);
    let (dst_n, t_dst) = normalize_points(dst);

    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();

    for k in 0..4 {
        let x = src_n[k].x;
        let y = src_n[k].y;
        let u = dst_n[k].x;
        let v = dst_n[k].y;

        let r0 = 2 * k;
        a[(r0, 0)] = x;
        a[(r0, 1)] = y;
        a[(r0, 2)] = 1.0;
        a[(r0, 6)] = -u * x;
        a[(r0, 7)] = -u * y;
        b[r0] = u;

        let r1 = 2 * k + 1;
        a[(r1, 3)] = x;
        a[(r1, 4)] = y;
        a[(r1, 5)] = 1.0;
        a[(r1, 6)] = -v * x;
        a[(r1, 7)] = -v * y;
        b[r1] = v;
    }

    let x = a.lu().solve(&b)?;
    if !x.iter().all(|v| v.is_finite()) {
        return None;
    }

    let hn = Matrix3::<f64>::new(
        x[0], x[1], x[2], //
        x[3], x[4], x[5], //
        x[6], x[7], 1.0,
    );

    let h_den = denormalize_homography(hn, t_src, t_dst)?;
    Some(Homography::new(normalize_scale(h_den)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn assert_close(a: Point2<f64>, b: Point2<f64>, tol: f64) {
        let dx = (a.x - b.x).abs();
        let dy = (a.y - b.y).abs();
        assert!(
            dx < tol && dy < tol,
            "expected ({:.9},{:.9}) ~ ({:.9},{:.9}) within {}",
            a.x,
            a.y,
            b.x,
            b.y,
            tol
        );
    }

    fn unit_square() -> Vec<Point2<f64>> {
        vec![
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(0.0, 1.0),
        ]
    }

    #[test]
    fn unit_square_to_itself_is_identity() {
        let sq = unit_square();
        let h = fit(&sq, &sq).expect("fit");
        assert!(h.is_identity(1e-9), "got {:?}", h.to_array());
    }

    #[test]
    fn inverse_round_trips_points() {
        let h = Homography::new(Matrix3::new(
            1.2, 0.1, 5.0, //
            -0.05, 0.9, 3.0, //
            0.001, 0.0005, 1.0,
        ));
        let inv = h.inverse().expect("invertible");

        for p in [
            Point2::new(0.0, 0.0),
            Point2::new(50.0, -20.0),
            Point2::new(320.0, 200.0),
        ] {
            let q = h.apply(p).expect("forward");
            let back = inv.apply(q).expect("inverse");
            assert_close(back, p, 1e-9);
        }
    }

    #[test]
    fn four_point_fit_recovers_ground_truth() {
        let ground_truth = Homography::new(Matrix3::new(
            0.8, 0.05, 0.3, //
            -0.02, 1.1, 0.2, //
            0.09, -0.04, 1.0,
        ));

        let real = [
            Point2::new(0.0, 0.0),
            Point2::new(1.8, 0.0),
            Point2::new(1.8, 1.3),
            Point2::new(0.0, 1.3),
        ];
        let dst = real.map(|p| ground_truth.apply(p).expect("apply"));

        let recovered = homography_from_4pt(&real, &dst).expect("recoverable");
        for p in [
            Point2::new(0.0, 0.0),
            Point2::new(0.6, 0.4),
            Point2::new(1.5, 1.2),
        ] {
            assert_close(
                recovered.apply(p).expect("apply"),
                ground_truth.apply(p).expect("apply"),
                1e-9,
            );
        }
    }

    #[test]
    fn dlt_handles_overdetermined_case() {
        let ground_truth = Homography::new(Matrix3::new(
            1.0, 0.2, 0.12, //
            -0.1, 0.9, 0.06, //
            0.06, 0.04, 1.0,
        ));

        let real: Vec<Point2<f64>> = (0..3)
            .flat_map(|y| (0..3).map(move |x| Point2::new(x as f64 * 0.4, y as f64 * 0.5)))
            .collect();
        let projected: Vec<Point2<f64>> = real
            .iter()
            .map(|&p| ground_truth.apply(p).expect("apply"))
            .collect();

        let estimated = fit(&real, &projected).expect("estimate");
        assert_abs_diff_eq!(estimated.h[(2, 2)], 1.0, epsilon = 1e-12);
        for p in [
            Point2::new(0.0, 0.0),
            Point2::new(0.6, 0.4),
            Point2::new(0.8, 0.9),
        ] {
            assert_close(
                estimated.apply(p).expect("apply"),
                ground_truth.apply(p).expect("apply"),
                1e-9,
            );
        }
    }

    #[test]
    fn vanishing_bottom_right_is_left_unnormalized() {
        // u = 1 / y, v = x / y
        let ground_truth =
            Homography::from_array([[0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
        let real = vec![
            Point2::new(0.0, 1.0),
            Point2::new(1.0, 1.0),
            Point2::new(1.0, 2.0),
            Point2::new(2.0, 1.0),
            Point2::new(3.0, 2.0),
        ];
        let projected: Vec<Point2<f64>> = real
            .iter()
            .map(|&p| ground_truth.apply(p).expect("apply"))
            .collect();

        let h = fit(&real, &projected).expect("fit");
        assert!(h.h[(2, 2)].abs() < 1e-9);
        assert!(h.is_finite());
        assert_close(
            h.apply(Point2::new(4.0, 3.0)).expect("apply"),
            Point2::new(1.0 / 3.0, 4.0 / 3.0),
            1e-9,
        );
    }

    #[test]
    fn negligible_matrix_is_detected_by_largest_entry() {
        assert!(Homography::zero().is_negligible(0.0));
        assert!(Homography::new(Matrix3::from_element(1e-16)).is_negligible(1e-12));
        assert!(!Homography::identity().is_negligible(1e-12));
    }

    #[test]
    fn mismatched_input_lengths_fail() {
        let real = [Point2::new(0.0, 0.0); 4];
        let projected = [Point2::new(1.0, 1.0); 3];
        assert_eq!(
            fit(&real, &projected),
            Err(HomographyError::InsufficientOrDegenerateCorrespondences {
                reason: Degeneracy::LengthMismatch {
                    real: 4,
                    projected: 3
                }
            })
        );
    }

    #[test]
    fn fewer_than_four_points_fail() {
        let sq = unit_square();
        assert_eq!(
            fit(&sq[..3], &sq[..3]),
            Err(HomographyError::InsufficientOrDegenerateCorrespondences {
                reason: Degeneracy::TooFew { got: 3 }
            })
        );
    }

    #[test]
    fn collinear_points_fail() {
        let line: Vec<Point2<f64>> = (0..4)
            .map(|i| Point2::new(i as f64, 2.0 * i as f64))
            .collect();
        let sq = unit_square();
        assert_eq!(
            fit(&line, &sq),
            Err(HomographyError::InsufficientOrDegenerateCorrespondences {
                reason: Degeneracy::Collinear
            })
        );
        assert_eq!(
            fit(&sq, &line),
            Err(HomographyError::InsufficientOrDegenerateCorrespondences {
                reason: Degeneracy::Collinear
            })
        );
    }

    #[test]
    fn non_finite_points_fail() {
        let sq = unit_square();
        let mut bad = sq.clone();
        bad[2] = Point2::new(f64::NAN, 0.5);
        assert_eq!(
            fit(&sq, &bad),
            Err(HomographyError::InsufficientOrDegenerateCorrespondences {
                reason: Degeneracy::NonFinite
            })
        );
    }

    #[test]
    fn reverse_fit_inverts_forward_fit() {
        let real = unit_square();
        let projected = vec![
            Point2::new(0.1, 0.2),
            Point2::new(1.3, 0.1),
            Point2::new(1.1, 1.4),
            Point2::new(-0.2, 0.9),
        ];
        let fwd = fit(&real, &projected).expect("forward");
        let rev = fit_reverse(&projected, &real).expect("reverse");
        let p = Point2::new(0.3, 0.7);
        let q = fwd.apply(p).expect("apply");
        assert_close(rev.apply(q).expect("apply"), p, 1e-9);
    }

    #[test]
    fn zero_homogeneous_coordinate_is_an_error() {
        let h = Homography::from_array([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 0.0, 0.0]]);
        assert_eq!(
            h.apply(Point2::new(0.0, 3.0)),
            Err(HomographyError::DivisionByZero)
        );
    }

    #[test]
    fn singular_matrix_is_not_invertible() {
        let h = Homography::from_array([[1.0, 2.0, 3.0], [2.0, 4.0, 6.0], [0.0, 0.0, 1.0]]);
        assert!(!h.is_invertible());
        assert!(h.inverse().is_none());
        assert!(!Homography::zero().is_invertible());
        assert!(Homography::default().is_invertible());
    }

    #[test]
    fn fit_from_pan_tilt_drops_the_up_axis() {
        let real = vec![
            Point3::new(0.0, 5.0, 0.0),
            Point3::new(1.0, -2.0, 0.0),
            Point3::new(1.0, 0.0, 1.0),
            Point3::new(0.0, 9.0, 1.0),
        ];
        let angles = vec![
            PanTilt::new(0.0, 0.0),
            PanTilt::new(45.0, 0.0),
            PanTilt::new(45.0, 30.0),
            PanTilt::new(0.0, 45.0),
        ];
        let h = fit_from_pan_tilt(&real, &angles).expect("fit");
        let projected = GnomonicProjector::project(angles[2]);
        assert_close(
            h.apply(Point2::new(1.0, 1.0)).expect("apply"),
            projected,
            1e-9,
        );
    }
}
