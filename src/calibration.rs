use std::path::Path;

use serde::Deserialize;

use crate::packet::LASER_COUNT;

/// Calibration file as stored on disk, keyed by physical laser id.
/// Angles are radians, offsets and distance corrections are meters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawCalibration {
    pub num_lasers: usize,
    pub lasers: Vec<RawLaserEntry>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawLaserEntry {
    pub laser_id: usize,
    pub rot_correction: f32,
    pub vert_correction: f32,
    pub dist_correction: f32,
    #[serde(default)]
    pub dist_correction_x: Option<f32>,
    #[serde(default)]
    pub dist_correction_y: Option<f32>,
    pub vert_offset_correction: f32,
    pub horiz_offset_correction: f32,
    #[serde(default)]
    pub min_intensity: f32,
    #[serde(default = "default_max_intensity")]
    pub max_intensity: f32,
    pub focal_distance: f32,
    pub focal_slope: f32,
}

fn default_max_intensity() -> f32 {
    255.
}

/// Validated per-laser corrections with the trig terms the unpacker
/// needs on every sample precomputed once.
#[derive(Debug, Clone)]
pub struct LaserCorrection {
    pub rot_correction: f32,
    pub vert_correction: f32,
    pub dist_correction: f32,
    pub two_pt_correction_available: bool,
    pub dist_correction_x: f32,
    pub dist_correction_y: f32,
    pub vert_offset_correction: f32,
    pub horiz_offset_correction: f32,
    pub min_intensity: f32,
    pub max_intensity: f32,
    pub focal_distance: f32,
    pub focal_slope: f32,
    pub cos_rot_correction: f32,
    pub sin_rot_correction: f32,
    pub cos_vert_correction: f32,
    pub sin_vert_correction: f32,
    /// Output layer index, assigned by ascending vertical angle.
    pub laser_ring: u16,
}

impl From<&RawLaserEntry> for LaserCorrection {
    fn from(entry: &RawLaserEntry) -> Self {
        LaserCorrection {
            rot_correction: entry.rot_correction,
            vert_correction: entry.vert_correction,
            dist_correction: entry.dist_correction,
            two_pt_correction_available: entry.dist_correction_x.is_some()
                && entry.dist_correction_y.is_some(),
            dist_correction_x: entry.dist_correction_x.unwrap_or(0.),
            dist_correction_y: entry.dist_correction_y.unwrap_or(0.),
            vert_offset_correction: entry.vert_offset_correction,
            horiz_offset_correction: entry.horiz_offset_correction,
            min_intensity: entry.min_intensity,
            max_intensity: entry.max_intensity,
            focal_distance: entry.focal_distance,
            focal_slope: entry.focal_slope,
            cos_rot_correction: entry.rot_correction.cos(),
            sin_rot_correction: entry.rot_correction.sin(),
            cos_vert_correction: entry.vert_correction.cos(),
            sin_vert_correction: entry.vert_correction.sin(),
            laser_ring: 0,
        }
    }
}

/// Immutable table of all 64 laser corrections, indexed by laser number.
#[derive(Debug, Clone)]
pub struct Calibration {
    lasers: Box<[LaserCorrection]>,
}

impl Calibration {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CalibrationError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| CalibrationError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let raw: RawCalibration = serde_yaml::from_str(&contents)?;
        let calibration: Calibration = raw.try_into()?;
        log::info!(
            "loaded calibration for {} lasers from {}",
            calibration.lasers.len(),
            path.display()
        );
        Ok(calibration)
    }

    pub fn correction(&self, laser_number: usize) -> &LaserCorrection {
        &self.lasers[laser_number]
    }

    pub fn iter(&self) -> impl Iterator<Item = &LaserCorrection> {
        self.lasers.iter()
    }
}

impl TryFrom<RawCalibration> for Calibration {
    type Error = InvalidCalibration;

    fn try_from(value: RawCalibration) -> Result<Self, Self::Error> {
        if value.num_lasers != LASER_COUNT {
            return Err(InvalidCalibration::new(format!(
                "expected num_lasers to be {LASER_COUNT}, got {}",
                value.num_lasers
            )));
        }
        let mut slots: Vec<Option<LaserCorrection>> = vec![None; LASER_COUNT];
        for entry in &value.lasers {
            let slot = slots.get_mut(entry.laser_id).ok_or_else(|| {
                InvalidCalibration::new(format!("laser_id {} out of range", entry.laser_id))
            })?;
            if slot.is_some() {
                return Err(InvalidCalibration::new(format!(
                    "duplicate entry for laser_id {}",
                    entry.laser_id
                )));
            }
            *slot = Some(entry.into());
        }
        let mut lasers = slots
            .into_iter()
            .enumerate()
            .map(|(laser_id, slot)| {
                slot.ok_or_else(|| {
                    InvalidCalibration::new(format!("missing entry for laser_id {laser_id}"))
                })
            })
            .collect::<Result<Box<[_]>, _>>()?;
        assign_rings(&mut lasers);
        Ok(Calibration { lasers })
    }
}

/// The calibration file does not carry ring numbers; lasers get them
/// by rank of their vertical angle, lowest beam first.
fn assign_rings(lasers: &mut [LaserCorrection]) {
    let mut order: Vec<usize> = (0..lasers.len()).collect();
    order.sort_by(|&a, &b| {
        lasers[a]
            .vert_correction
            .total_cmp(&lasers[b].vert_correction)
    });
    for (ring, laser_number) in order.into_iter().enumerate() {
        lasers[laser_number].laser_ring = ring as u16;
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{reason}")]
pub struct InvalidCalibration {
    reason: String,
}

impl InvalidCalibration {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CalibrationError {
    #[error("unable to read calibration file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed calibration file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("incomplete calibration: {0}")]
    Invalid(#[from] InvalidCalibration),
}

#[cfg(test)]
pub(crate) fn zeroed_entry(laser_id: usize) -> RawLaserEntry {
    RawLaserEntry {
        laser_id,
        rot_correction: 0.,
        vert_correction: 0.,
        dist_correction: 0.,
        dist_correction_x: None,
        dist_correction_y: None,
        vert_offset_correction: 0.,
        horiz_offset_correction: 0.,
        min_intensity: 0.,
        max_intensity: 255.,
        focal_distance: 0.,
        focal_slope: 0.,
    }
}

#[cfg(test)]
pub(crate) fn zeroed_calibration() -> Calibration {
    RawCalibration {
        num_lasers: LASER_COUNT,
        lasers: (0..LASER_COUNT).map(zeroed_entry).collect(),
    }
    .try_into()
    .unwrap()
}
