//! Flat snapshot record for persisting a rig, plus JSON helpers.
//!
//! Loading is tolerant: optional fields missing from older saves get
//! defaults (logged at warn), while a missing required field fails the whole
//! load with [`SnapshotError::MissingField`], and so does a zone listed twice
//! ([`SnapshotError::DuplicateZone`]). The single-zone layout with
//! top-level `DataPoints`/`Homography` keys is read into the `top` zone.

use crate::config::{EngineConfig, FixturePose};
use crate::engine::{TransformEngine, ZoneState};
use crate::error::SnapshotError;
use log::warn;
use moving_head_core::{CalibrationSample, CaptureList, Homography, PanTilt, Zone};
use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/// One capture as stored on disk.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub target: [f64; 3],
    pub pan_tilt: PanTilt,
    pub pan_tilt_offset: PanTilt,
    pub distance: f64,
    /// Gnomonic point from the last fit, if one was made.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homog_target: Option<[f64; 2]>,
}

impl DataPoint {
    pub fn sample(&self) -> CalibrationSample {
        let [x, y, z] = self.target;
        CalibrationSample::new(Point3::new(x, y, z), self.pan_tilt)
            .with_offset(self.pan_tilt_offset)
            .with_distance(self.distance)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZoneSnapshot {
    pub zone: Zone,
    pub data_points: Vec<DataPoint>,
    /// `None` while the zone is uncalibrated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homography: Option<Homography>,
}

/// Everything needed to rebuild a [`TransformEngine`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRigSnapshot")]
pub struct RigSnapshot {
    pub position: [f64; 3],
    pub rotation: [f64; 3],
    pub pan_tilt_direction: PanTilt,
    pub zones: Vec<ZoneSnapshot>,
}

#[derive(Debug, Default, Deserialize)]
struct RawDataPoint {
    #[serde(default, alias = "Target")]
    target: Option<[f64; 3]>,
    #[serde(default, alias = "PanTilt")]
    pan_tilt: Option<PanTilt>,
    #[serde(default, alias = "PanTiltOffset")]
    pan_tilt_offset: Option<PanTilt>,
    #[serde(default, alias = "Distance", alias = "Distane")]
    distance: Option<f64>,
    #[serde(default, alias = "HomogTarget")]
    homog_target: Option<[f64; 2]>,
}

#[derive(Debug, Default, Deserialize)]
struct RawZoneSnapshot {
    #[serde(default)]
    zone: Option<Zone>,
    #[serde(default, alias = "DataPoints")]
    data_points: Option<Vec<RawDataPoint>>,
    #[serde(default, alias = "Homography")]
    homography: Option<Homography>,
}

#[derive(Debug, Default, Deserialize)]
struct RawRigSnapshot {
    #[serde(default, alias = "Position")]
    position: Option<[f64; 3]>,
    #[serde(default, alias = "Rotation")]
    rotation: Option<[f64; 3]>,
    #[serde(default, alias = "PanTiltDirection")]
    pan_tilt_direction: Option<PanTilt>,
    #[serde(default, alias = "Zones")]
    zones: Option<Vec<RawZoneSnapshot>>,
    // single-zone layout
    #[serde(default, alias = "DataPoints")]
    data_points: Option<Vec<RawDataPoint>>,
    #[serde(default, alias = "Homography")]
    homography: Option<Homography>,
}

impl RawDataPoint {
    fn resolve(self, defaulted: &mut usize) -> Result<DataPoint, SnapshotError> {
        let target = self.target.ok_or(SnapshotError::MissingField("target"))?;
        let pan_tilt = self.pan_tilt.ok_or(SnapshotError::MissingField("pan_tilt"))?;
        if self.pan_tilt_offset.is_none() || self.distance.is_none() {
            *defaulted += 1;
        }
        Ok(DataPoint {
            target,
            pan_tilt,
            pan_tilt_offset: self.pan_tilt_offset.unwrap_or_default(),
            distance: self.distance.unwrap_or_default(),
            homog_target: self.homog_target,
        })
    }
}

fn resolve_zone(
    zone: Zone,
    data_points: Vec<RawDataPoint>,
    homography: Option<Homography>,
) -> Result<ZoneSnapshot, SnapshotError> {
    let mut defaulted = 0;
    let data_points = data_points
        .into_iter()
        .map(|p| p.resolve(&mut defaulted))
        .collect::<Result<Vec<_>, _>>()?;
    if defaulted > 0 {
        warn!("{zone}: {defaulted} data points without offset/distance, using 0");
    }
    Ok(ZoneSnapshot {
        zone,
        data_points,
        homography,
    })
}

impl TryFrom<RawRigSnapshot> for RigSnapshot {
    type Error = SnapshotError;

    fn try_from(raw: RawRigSnapshot) -> Result<Self, Self::Error> {
        let position = raw.position.ok_or(SnapshotError::MissingField("position"))?;
        let rotation = raw.rotation.unwrap_or_else(|| {
            warn!("snapshot has no rotation, using [0, 0, 0]");
            [0.0; 3]
        });
        let pan_tilt_direction = raw.pan_tilt_direction.unwrap_or_else(|| {
            warn!("snapshot has no pan_tilt_direction, using [0, 0]");
            PanTilt::ZERO
        });

        let zones = match (raw.zones, raw.data_points) {
            (Some(zones), _) => zones
                .into_iter()
                .map(|z| {
                    let zone = z.zone.ok_or(SnapshotError::MissingField("zone"))?;
                    let points = z
                        .data_points
                        .ok_or(SnapshotError::MissingField("data_points"))?;
                    resolve_zone(zone, points, z.homography)
                })
                .collect::<Result<Vec<ZoneSnapshot>, _>>()?,
            (None, Some(points)) => vec![resolve_zone(Zone::Top, points, raw.homography)?],
            (None, None) => return Err(SnapshotError::MissingField("zones")),
        };

        let mut seen = [false; Zone::COUNT];
        for z in &zones {
            if std::mem::replace(&mut seen[z.zone.index()], true) {
                return Err(SnapshotError::DuplicateZone(z.zone));
            }
        }

        Ok(Self {
            position,
            rotation,
            pan_tilt_direction,
            zones,
        })
    }
}

impl RigSnapshot {
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let raw: RawRigSnapshot = serde_json::from_str(json)?;
        Self::try_from(raw)
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a snapshot from JSON on disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Write this snapshot to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn zone(&self, zone: Zone) -> Option<&ZoneSnapshot> {
        self.zones.iter().find(|z| z.zone == zone)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            fixture: FixturePose {
                position: self.position,
                rotation: self.rotation,
            },
            pan_tilt_direction: self.pan_tilt_direction,
        }
    }
}

impl TransformEngine {
    /// Export config, captures and fits of every non-empty zone.
    pub fn snapshot(&self) -> RigSnapshot {
        let config = self.config();
        let zones = Zone::ALL
            .into_iter()
            .filter_map(|zone| {
                let slot = self.slot(zone);
                if slot.captures.is_empty() && slot.state == ZoneState::Uncalibrated {
                    return None;
                }
                let projected_matches = slot.projected.len() == slot.captures.len();
                let data_points = slot
                    .captures
                    .iter()
                    .enumerate()
                    .map(|(i, s)| DataPoint {
                        target: [s.target.x, s.target.y, s.target.z],
                        pan_tilt: s.pan_tilt,
                        pan_tilt_offset: s.pan_tilt_offset,
                        distance: s.distance,
                        homog_target: projected_matches
                            .then(|| [slot.projected[i].x, slot.projected[i].y]),
                    })
                    .collect();
                Some(ZoneSnapshot {
                    zone,
                    data_points,
                    homography: (slot.state == ZoneState::Calibrated).then_some(slot.homography),
                })
            })
            .collect();

        RigSnapshot {
            position: config.fixture.position,
            rotation: config.fixture.rotation,
            pan_tilt_direction: config.pan_tilt_direction,
            zones,
        }
    }

    /// Replace config and every zone with the snapshot's contents.
    ///
    /// Zones absent from the snapshot are cleared.
    pub fn restore(&self, snapshot: &RigSnapshot) {
        self.set_config(snapshot.engine_config());
        for zone in Zone::ALL {
            let Some(z) = snapshot.zone(zone) else {
                self.restore_slot(zone, CaptureList::new(), None, Vec::new());
                continue;
            };
            let captures: CaptureList = z.data_points.iter().map(DataPoint::sample).collect();
            let projected: Vec<Point2<f64>> = z
                .data_points
                .iter()
                .map(|p| p.homog_target.map(|[u, v]| Point2::new(u, v)))
                .collect::<Option<Vec<_>>>()
                .unwrap_or_default();
            self.restore_slot(zone, captures, z.homography, projected);
        }
    }

    pub fn from_snapshot(snapshot: &RigSnapshot) -> Self {
        let engine = Self::new(snapshot.engine_config());
        engine.restore(snapshot);
        engine
    }
}
