//! Zone-aware transform engine.
//!
//! Every [`Zone`] owns a slot holding its captures, its current homography
//! and the projected points of the last fit. Each slot sits behind its own
//! mutex: mutations and recalibration hold it for the whole call, queries
//! copy the matrix out and compute without it. No call ever holds two slot
//! locks at once.
//!
//! The configuration lock is always taken before a slot lock. Fits hold it
//! for reading while they run and queries hold it while copying their matrix,
//! so a query pairs each matrix with the direction it was last read against
//! and a direction change waits for in-flight fits. Changing the direction
//! does not refit: recalibrate afterwards.

use crate::config::{EngineConfig, FixturePose, RouterParams};
use crate::error::EngineError;
use crate::router::{self, SideFit, ZoneRouter};
use log::{debug, warn};
use moving_head_core::{
    fit, ground_point, unproject, CalibrationSample, CalibrationSet, CaptureList,
    GnomonicProjector, Homography, HomographyError, PanTilt, Zone,
};
use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Calibration state of a zone.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneState {
    /// Identity homography, nothing fitted yet.
    #[default]
    Uncalibrated,
    /// Holds a fitted matrix. It may still be singular.
    Calibrated,
}

/// Input points for [`TransformEngine::calibrate_temp`].
#[derive(Clone, Copy, Debug)]
pub enum TempInput<'a> {
    /// Already in gnomonic space.
    Projected(&'a [Point2<f64>]),
    /// Raw fixture angles; the pan/tilt direction is removed before projecting.
    PanTilt(&'a [PanTilt]),
}

#[derive(Debug, Default)]
pub(crate) struct ZoneSlot {
    pub(crate) captures: CaptureList,
    pub(crate) homography: Homography,
    pub(crate) state: ZoneState,
    pub(crate) projected: Vec<Point2<f64>>,
}

impl ZoneSlot {
    fn install(&mut self, homography: Homography, projected: Vec<Point2<f64>>) {
        self.homography = homography;
        self.state = ZoneState::Calibrated;
        self.projected = projected;
    }

    fn reset(&mut self) {
        self.homography = Homography::identity();
        self.state = ZoneState::Uncalibrated;
        self.projected.clear();
    }

    /// Cached projections are per capture index; any edit drops them.
    fn captures_changed(&mut self) {
        self.projected.clear();
    }
}

/// Largest entry below which a fitted matrix counts as zero.
const NEGLIGIBLE_ENTRY: f64 = 1e-12;

/// Identity in place of a matrix with no usable content.
fn usable_or_identity(homography: Homography) -> Homography {
    if !homography.is_finite() || homography.is_negligible(NEGLIGIBLE_ENTRY) {
        warn!("temp homography is degenerate, using identity");
        return Homography::identity();
    }
    homography
}

fn project_corrected(angles: &[PanTilt], direction: PanTilt) -> Vec<Point2<f64>> {
    angles
        .iter()
        .map(|a| {
            let corrected = *a - direction;
            if !GnomonicProjector::is_reliable(corrected.pan) {
                warn!(
                    "pan {:.3} is at the projection singularity; fit will be unreliable",
                    corrected.pan
                );
            }
            GnomonicProjector::project(corrected)
        })
        .collect()
}

/// Owns per-zone calibrations and answers aim queries.
#[derive(Debug)]
pub struct TransformEngine {
    config: RwLock<EngineConfig>,
    slots: [Mutex<ZoneSlot>; Zone::COUNT],
}

impl Default for TransformEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl TransformEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config: RwLock::new(config),
            slots: std::array::from_fn(|_| Mutex::new(ZoneSlot::default())),
        }
    }

    pub(crate) fn slot(&self, zone: Zone) -> MutexGuard<'_, ZoneSlot> {
        self.slots[zone.index()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn read_config(&self) -> RwLockReadGuard<'_, EngineConfig> {
        self.config.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> EngineConfig {
        *self.read_config()
    }

    pub fn set_config(&self, config: EngineConfig) {
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
    }

    #[inline]
    pub fn pan_tilt_direction(&self) -> PanTilt {
        self.config().pan_tilt_direction
    }

    /// Existing fits are kept; recalibrate to refit with the new direction.
    pub fn set_pan_tilt_direction(&self, direction: PanTilt) {
        self.config
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .pan_tilt_direction = direction;
    }

    pub fn set_fixture_pose(&self, pose: FixturePose) {
        self.config
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .fixture = pose;
    }

    // --- captures ---

    pub fn add_capture(&self, zone: Zone, sample: CalibrationSample) {
        let mut slot = self.slot(zone);
        slot.captures.push(sample);
        slot.captures_changed();
    }

    pub fn recapture_at(
        &self,
        zone: Zone,
        index: usize,
        sample: CalibrationSample,
    ) -> Result<(), EngineError> {
        let mut slot = self.slot(zone);
        slot.captures.replace(index, sample)?;
        slot.captures_changed();
        Ok(())
    }

    pub fn delete_at(&self, zone: Zone, index: usize) -> Result<CalibrationSample, EngineError> {
        let mut slot = self.slot(zone);
        let removed = slot.captures.remove(index)?;
        slot.captures_changed();
        Ok(removed)
    }

    pub fn delete_last(&self, zone: Zone) -> Result<CalibrationSample, EngineError> {
        let mut slot = self.slot(zone);
        let removed = slot.captures.pop()?;
        slot.captures_changed();
        Ok(removed)
    }

    pub fn sample(&self, zone: Zone, index: usize) -> Result<CalibrationSample, EngineError> {
        Ok(self.slot(zone).captures.get(index)?)
    }

    /// Copy of the zone's captures.
    pub fn captures(&self, zone: Zone) -> CaptureList {
        self.slot(zone).captures.clone()
    }

    /// Replace every capture of `zone`. The zone's matrix is left as is.
    pub fn replace_captures(&self, zone: Zone, captures: CaptureList) {
        let mut slot = self.slot(zone);
        slot.captures = captures;
        slot.captures_changed();
    }

    /// Copy of all zones' captures.
    pub fn calibration_set(&self) -> CalibrationSet {
        let mut set = CalibrationSet::new();
        for zone in Zone::ALL {
            *set.zone_mut(zone) = self.captures(zone);
        }
        set
    }

    // --- calibration ---

    /// Refit `zone` from its captures.
    ///
    /// On error the previous homography stays in place.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip(self)))]
    pub fn calibrate(&self, zone: Zone) -> Result<Homography, EngineError> {
        let config = self.read_config();
        let direction = config.pan_tilt_direction;
        let mut slot = self.slot(zone);

        let real: Vec<Point2<f64>> = slot.captures.targets().iter().map(ground_point).collect();
        let projected = project_corrected(slot.captures.pan_tilts(), direction);
        let homography = fit(&real, &projected)?;

        debug!(
            "{zone} calibrated from {} captures: {:?}",
            real.len(),
            homography.to_array()
        );
        if !homography.is_invertible() {
            warn!("{zone} homography is singular; aim queries will be wrong");
        }
        slot.install(homography, projected);
        Ok(homography)
    }

    /// Fit the `Temp` slot from ad-hoc correspondences. Standing zones are untouched.
    ///
    /// A numerically zero or non-finite fit is replaced by identity.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip_all))]
    pub fn calibrate_temp(
        &self,
        real: &[Point2<f64>],
        input: TempInput<'_>,
    ) -> Result<Homography, EngineError> {
        let config = self.read_config();
        let projected = match input {
            TempInput::Projected(points) => points.to_vec(),
            TempInput::PanTilt(angles) => project_corrected(angles, config.pan_tilt_direction),
        };

        let homography = usable_or_identity(fit(real, &projected)?);
        self.slot(Zone::Temp).install(homography, projected);
        Ok(homography)
    }

    /// Fit `Side1` and `Side2` from the current top and bottom rings.
    pub fn derive_sides(&self) -> Result<[SideFit; 2], EngineError> {
        let config = self.read_config();
        let direction = config.pan_tilt_direction;
        let top = self.captures(Zone::Top);
        let bottom = self.captures(Zone::Bottom);

        let sides = router::derive_sides(&top, &bottom, direction)?;
        for side in &sides {
            self.slot(side.zone)
                .install(side.homography, side.projected.to_vec());
        }
        Ok(sides)
    }

    /// Router over the current top and bottom rings.
    pub fn router(&self, params: RouterParams) -> Result<ZoneRouter, EngineError> {
        ZoneRouter::from_rings(
            &self.captures(Zone::Top),
            &self.captures(Zone::Bottom),
            params,
        )
    }

    /// Install a homography directly, e.g. from a saved snapshot.
    pub fn set_homography(&self, zone: Zone, homography: Homography) {
        self.slot(zone).install(homography, Vec::new());
    }

    pub(crate) fn restore_slot(
        &self,
        zone: Zone,
        captures: CaptureList,
        homography: Option<Homography>,
        projected: Vec<Point2<f64>>,
    ) {
        let mut slot = self.slot(zone);
        slot.captures = captures;
        match homography {
            Some(h) => slot.install(h, projected),
            None => slot.reset(),
        }
    }

    /// Back to identity / `Uncalibrated`. Captures are kept.
    pub fn reset(&self, zone: Zone) {
        self.slot(zone).reset();
    }

    pub fn state(&self, zone: Zone) -> ZoneState {
        self.slot(zone).state
    }

    /// Point-in-time copy of the zone's matrix.
    pub fn homography(&self, zone: Zone) -> Homography {
        self.slot(zone).homography
    }

    /// Gnomonic points used by the zone's last fit.
    pub fn projected(&self, zone: Zone) -> Vec<Point2<f64>> {
        self.slot(zone).projected.clone()
    }

    // --- queries ---

    /// Zone matrix and configured direction, read as one pair.
    fn fit_and_direction(&self, zone: Zone) -> (Homography, PanTilt) {
        let config = self.read_config();
        let homography = self.slot(zone).homography;
        (homography, config.pan_tilt_direction)
    }

    /// Zone-plane point to gnomonic angle space.
    pub fn forward(&self, target: Point2<f64>, zone: Zone) -> Result<Point2<f64>, EngineError> {
        Ok(self.homography(zone).apply(target)?)
    }

    /// Pan/tilt (degrees) that aims the fixture at `target`.
    pub fn solve_aim(&self, target: Point2<f64>, zone: Zone) -> Result<PanTilt, EngineError> {
        let (homography, direction) = self.fit_and_direction(zone);
        Ok(unproject(homography.apply(target)?) + direction)
    }

    /// [`Self::solve_aim`], reflected when the pan passes 90°.
    ///
    /// When the direction offset pushes `|pan|` over 90°, the fixture reaches
    /// the same optical direction through the flipped pose
    /// `-(pan - dir.pan), -(tilt - dir.tilt)`.
    pub fn solve_aim_with_wrap(
        &self,
        target: Point2<f64>,
        zone: Zone,
    ) -> Result<PanTilt, EngineError> {
        let (homography, direction) = self.fit_and_direction(zone);
        let aim = unproject(homography.apply(target)?) + direction;
        if aim.pan.abs() > 90.0 {
            debug!("pan {:.3} past 90 degrees, using flipped pose", aim.pan);
            return Ok(-(aim - direction));
        }
        Ok(aim)
    }

    /// Inverse transform: where on the zone plane do these angles point.
    pub fn locate(&self, pan_tilt: PanTilt, zone: Zone) -> Result<Point2<f64>, EngineError> {
        let (homography, direction) = self.fit_and_direction(zone);
        let inverse = homography
            .inverse()
            .ok_or(HomographyError::NotInvertible)?;
        let p = GnomonicProjector::project(pan_tilt - direction);
        Ok(inverse.apply(p)?)
    }

    /// Route a 3D point to its zone and solve the aim there.
    pub fn aim_at(
        &self,
        target: &Point3<f64>,
        router: &ZoneRouter,
    ) -> Result<(Zone, PanTilt), EngineError> {
        let (zone, local) = router.route(target);
        Ok((zone, self.solve_aim(local, zone)?))
    }
}
