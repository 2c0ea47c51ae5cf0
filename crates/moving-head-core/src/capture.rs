//! Ordered calibration captures, one list per zone.
//!
//! Each zone keeps four parallel sequences (target, pan/tilt, pan/tilt
//! offset, distance). They always have the same length, and a failed call
//! leaves them untouched.

use crate::projection::PanTilt;
use crate::zone::Zone;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureError {
    #[error("capture index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("capture list is empty")]
    Empty,
}

/// One calibration capture.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSample {
    /// Real-world position; `y` is up.
    pub target: Point3<f64>,
    /// Angles that aimed the fixture at `target`, in degrees.
    pub pan_tilt: PanTilt,
    /// Operator fine-adjustment at capture time. Kept, not used numerically.
    #[serde(default)]
    pub pan_tilt_offset: PanTilt,
    /// Measured fixture-to-target distance.
    #[serde(default)]
    pub distance: f64,
}

impl CalibrationSample {
    pub fn new(target: Point3<f64>, pan_tilt: PanTilt) -> Self {
        Self {
            target,
            pan_tilt,
            pan_tilt_offset: PanTilt::ZERO,
            distance: 0.0,
        }
    }

    pub fn with_offset(mut self, offset: PanTilt) -> Self {
        self.pan_tilt_offset = offset;
        self
    }

    pub fn with_distance(mut self, distance: f64) -> Self {
        self.distance = distance;
        self
    }
}

/// Captures of a single zone stored as parallel sequences.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CaptureList {
    targets: Vec<Point3<f64>>,
    pan_tilts: Vec<PanTilt>,
    pan_tilt_offsets: Vec<PanTilt>,
    distances: Vec<f64>,
}

impl CaptureList {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Append a capture to all four sequences.
    pub fn push(&mut self, sample: CalibrationSample) {
        // reserve first so no push can reallocate after another has landed
        self.targets.reserve(1);
        self.pan_tilts.reserve(1);
        self.pan_tilt_offsets.reserve(1);
        self.distances.reserve(1);

        self.targets.push(sample.target);
        self.pan_tilts.push(sample.pan_tilt);
        self.pan_tilt_offsets.push(sample.pan_tilt_offset);
        self.distances.push(sample.distance);
        self.check_invariant();
    }

    /// Overwrite the capture at `index`.
    pub fn replace(&mut self, index: usize, sample: CalibrationSample) -> Result<(), CaptureError> {
        self.check_index(index)?;
        self.targets[index] = sample.target;
        self.pan_tilts[index] = sample.pan_tilt;
        self.pan_tilt_offsets[index] = sample.pan_tilt_offset;
        self.distances[index] = sample.distance;
        Ok(())
    }

    /// Remove the capture at `index`, shifting later captures down.
    pub fn remove(&mut self, index: usize) -> Result<CalibrationSample, CaptureError> {
        self.check_index(index)?;
        let sample = CalibrationSample {
            target: self.targets.remove(index),
            pan_tilt: self.pan_tilts.remove(index),
            pan_tilt_offset: self.pan_tilt_offsets.remove(index),
            distance: self.distances.remove(index),
        };
        self.check_invariant();
        Ok(sample)
    }

    /// Remove the most recent capture.
    pub fn pop(&mut self) -> Result<CalibrationSample, CaptureError> {
        match self.len() {
            0 => Err(CaptureError::Empty),
            n => self.remove(n - 1),
        }
    }

    pub fn get(&self, index: usize) -> Result<CalibrationSample, CaptureError> {
        self.check_index(index)?;
        Ok(CalibrationSample {
            target: self.targets[index],
            pan_tilt: self.pan_tilts[index],
            pan_tilt_offset: self.pan_tilt_offsets[index],
            distance: self.distances[index],
        })
    }

    pub fn clear(&mut self) {
        self.targets.clear();
        self.pan_tilts.clear();
        self.pan_tilt_offsets.clear();
        self.distances.clear();
    }

    pub fn targets(&self) -> &[Point3<f64>] {
        &self.targets
    }

    pub fn pan_tilts(&self) -> &[PanTilt] {
        &self.pan_tilts
    }

    pub fn pan_tilt_offsets(&self) -> &[PanTilt] {
        &self.pan_tilt_offsets
    }

    pub fn distances(&self) -> &[f64] {
        &self.distances
    }

    pub fn iter(&self) -> impl Iterator<Item = CalibrationSample> + '_ {
        (0..self.len()).map(move |i| CalibrationSample {
            target: self.targets[i],
            pan_tilt: self.pan_tilts[i],
            pan_tilt_offset: self.pan_tilt_offsets[i],
            distance: self.distances[i],
        })
    }

    fn check_index(&self, index: usize) -> Result<(), CaptureError> {
        let len = self.len();
        if index >= len {
            return Err(CaptureError::IndexOutOfRange { index, len });
        }
        Ok(())
    }

    #[inline]
    fn check_invariant(&self) {
        debug_assert!(
            self.pan_tilts.len() == self.targets.len()
                && self.pan_tilt_offsets.len() == self.targets.len()
                && self.distances.len() == self.targets.len(),
            "parallel capture sequences diverged"
        );
    }
}

impl FromIterator<CalibrationSample> for CaptureList {
    fn from_iter<I: IntoIterator<Item = CalibrationSample>>(iter: I) -> Self {
        let mut list = CaptureList::new();
        for sample in iter {
            list.push(sample);
        }
        list
    }
}

/// Capture lists for every [`Zone`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CalibrationSet {
    zones: [CaptureList; Zone::COUNT],
}

impl CalibrationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_capture(&mut self, zone: Zone, sample: CalibrationSample) {
        self.zones[zone.index()].push(sample);
    }

    pub fn recapture_at(
        &mut self,
        zone: Zone,
        index: usize,
        sample: CalibrationSample,
    ) -> Result<(), CaptureError> {
        self.zones[zone.index()].replace(index, sample)
    }

    pub fn delete_at(
        &mut self,
        zone: Zone,
        index: usize,
    ) -> Result<CalibrationSample, CaptureError> {
        self.zones[zone.index()].remove(index)
    }

    pub fn delete_last(&mut self, zone: Zone) -> Result<CalibrationSample, CaptureError> {
        self.zones[zone.index()].pop()
    }

    pub fn get(&self, zone: Zone, index: usize) -> Result<CalibrationSample, CaptureError> {
        self.zones[zone.index()].get(index)
    }

    #[inline]
    pub fn zone(&self, zone: Zone) -> &CaptureList {
        &self.zones[zone.index()]
    }

    #[inline]
    pub fn zone_mut(&mut self, zone: Zone) -> &mut CaptureList {
        &mut self.zones[zone.index()]
    }

    pub fn total_len(&self) -> usize {
        self.zones.iter().map(CaptureList::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(i: usize) -> CalibrationSample {
        let f = i as f64;
        CalibrationSample::new(Point3::new(f, 0.0, -f), PanTilt::new(f, 2.0 * f))
            .with_offset(PanTilt::new(0.1 * f, 0.0))
            .with_distance(10.0 + f)
    }

    fn assert_parallel(list: &CaptureList) {
        let n = list.targets().len();
        assert_eq!(list.pan_tilts().len(), n);
        assert_eq!(list.pan_tilt_offsets().len(), n);
        assert_eq!(list.distances().len(), n);
    }

    #[test]
    fn captures_keep_insertion_order() {
        let list: CaptureList = (0..4).map(sample).collect();
        assert_eq!(list.len(), 4);
        for i in 0..4 {
            assert_eq!(list.get(i).expect("in range"), sample(i));
        }
        let collected: Vec<_> = list.iter().collect();
        assert_eq!(collected, (0..4).map(sample).collect::<Vec<_>>());
    }

    #[test]
    fn delete_preserves_relative_order() {
        let mut list: CaptureList = (0..5).map(sample).collect();
        let removed = list.remove(1).expect("in range");
        assert_eq!(removed, sample(1));
        let left: Vec<_> = list.iter().collect();
        assert_eq!(left, vec![sample(0), sample(2), sample(3), sample(4)]);
        assert_eq!(list.pop().expect("non-empty"), sample(4));
        assert_parallel(&list);
    }

    #[test]
    fn out_of_range_leaves_list_untouched() {
        let mut list: CaptureList = (0..3).map(sample).collect();
        let before = list.clone();

        assert_eq!(
            list.remove(3),
            Err(CaptureError::IndexOutOfRange { index: 3, len: 3 })
        );
        assert_eq!(
            list.replace(7, sample(9)),
            Err(CaptureError::IndexOutOfRange { index: 7, len: 3 })
        );
        assert_eq!(
            list.get(3),
            Err(CaptureError::IndexOutOfRange { index: 3, len: 3 })
        );
        assert_eq!(list, before);
    }

    #[test]
    fn delete_last_on_empty_fails() {
        let mut list = CaptureList::new();
        assert_eq!(list.pop(), Err(CaptureError::Empty));
        assert!(list.is_empty());
    }

    #[test]
    fn recapture_overwrites_every_field() {
        let mut list: CaptureList = (0..3).map(sample).collect();
        list.replace(1, sample(8)).expect("in range");
        assert_eq!(list.get(1).expect("in range"), sample(8));
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn mixed_mutations_keep_sequences_parallel() {
        let mut set = CalibrationSet::new();
        // deterministic pseudo-random op sequence
        let mut state = 0x2545_f491_u32;
        for step in 0..400 {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let zone = Zone::ALL[(state % 5) as usize];
            let len = set.zone(zone).len();
            match (state >> 8) % 4 {
                0 | 1 => set.add_capture(zone, sample(step)),
                2 => {
                    let idx = (state >> 12) as usize % (len + 1);
                    let res = set.delete_at(zone, idx);
                    assert_eq!(res.is_err(), idx >= len);
                }
                _ => {
                    let idx = (state >> 12) as usize % (len + 1);
                    let res = set.recapture_at(zone, idx, sample(step));
                    assert_eq!(res.is_err(), idx >= len);
                }
            }
            for z in Zone::ALL {
                assert_parallel(set.zone(z));
            }
        }
    }

    #[test]
    fn zones_are_independent() {
        let mut set = CalibrationSet::new();
        set.add_capture(Zone::Top, sample(1));
        set.add_capture(Zone::Bottom, sample(2));
        set.add_capture(Zone::Bottom, sample(3));
        assert_eq!(set.zone(Zone::Top).len(), 1);
        assert_eq!(set.zone(Zone::Bottom).len(), 2);
        assert_eq!(set.total_len(), 3);
        assert_eq!(set.delete_last(Zone::Side1), Err(CaptureError::Empty));
        assert_eq!(set.get(Zone::Bottom, 1).expect("in range"), sample(3));
    }
}
