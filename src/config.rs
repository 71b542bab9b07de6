use std::f64::consts::PI;
use std::path::PathBuf;

use serde::Deserialize;

use crate::packet::ROTATION_MAX_UNITS;

/// Decoder setup surface: where the calibration lives, which ranges to
/// keep and the field of view to publish, given as a view center with
/// left/right extents (radians, mathematical convention).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    pub calibration: PathBuf,
    pub min_range: f32,
    pub max_range: f32,
    pub view_center: f64,
    pub left_most_angle: f64,
    pub right_most_angle: f64,
}

impl Config {
    pub fn filter(&self) -> FilterConfig {
        FilterConfig::new(
            self.min_range,
            self.max_range,
            self.view_center,
            self.left_most_angle,
            self.right_most_angle,
        )
    }
}

/// Range window plus angular window in the hardware convention:
/// integer hundredths of a degree, increasing opposite to the
/// mathematical direction. `min_angle > max_angle` means the window
/// wraps through zero.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterConfig {
    pub min_range: f32,
    pub max_range: f32,
    pub min_angle: u16,
    pub max_angle: u16,
}

impl FilterConfig {
    pub fn new(
        min_range: f32,
        max_range: f32,
        view_center: f64,
        left_most_angle: f64,
        right_most_angle: f64,
    ) -> Self {
        let tmp_min_angle = positive_mod_two_pi(view_center + left_most_angle);
        let tmp_max_angle = positive_mod_two_pi(view_center - right_most_angle);

        // Hardware angles run clockwise, so flip; adding 0.5 performs a
        // centered float to int conversion.
        let mut min_angle = (100. * (2. * PI - tmp_min_angle).to_degrees() + 0.5) as u16;
        let mut max_angle = (100. * (2. * PI - tmp_max_angle).to_degrees() + 0.5) as u16;
        if min_angle == max_angle {
            // Zero-width view means the whole circle.
            min_angle = 0;
            max_angle = ROTATION_MAX_UNITS;
        }
        log::info!("angular window: [{min_angle}, {max_angle}] (hundredths of a degree)");
        Self {
            min_range,
            max_range,
            min_angle,
            max_angle,
        }
    }

    #[inline]
    pub fn accepts_rotation(&self, rotation: u16) -> bool {
        if self.min_angle <= self.max_angle {
            rotation >= self.min_angle && rotation <= self.max_angle
        } else {
            rotation <= self.max_angle || rotation >= self.min_angle
        }
    }

    #[inline]
    pub fn accepts_range(&self, distance: f32) -> bool {
        distance >= self.min_range && distance <= self.max_range
    }
}

fn positive_mod_two_pi(angle: f64) -> f64 {
    ((angle % (2. * PI)) + 2. * PI) % (2. * PI)
}
