use crate::{
    calibration::{Calibration, CalibrationError},
    cloud::{LaserPoint, PointSink},
    config::{Config, FilterConfig},
    packet::{BlockHeader, RawPacket, DISTANCE_RESOLUTION, ROTATION_MAX_UNITS, ROTATION_RESOLUTION},
};

/// Reference distances (meters) of the two-point distance calibration.
const TWO_PT_X_NEAR: f32 = 2.4;
const TWO_PT_Y_NEAR: f32 = 1.93;
const TWO_PT_FAR: f32 = 25.04;

/// Precomputed sine/cosine for every representable rotation reading,
/// so unpacking never calls into libm per sample.
pub struct RotationTable {
    sin_cos: Box<[(f32, f32)]>,
}

impl Default for RotationTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RotationTable {
    pub fn new() -> Self {
        let sin_cos = (0..ROTATION_MAX_UNITS)
            .map(|unit| {
                let rotation = (unit as f32 * ROTATION_RESOLUTION).to_radians();
                (rotation.sin(), rotation.cos())
            })
            .collect();
        Self { sin_cos }
    }

    #[inline]
    pub fn sin_cos(&self, rotation: u16) -> (f32, f32) {
        self.sin_cos[rotation as usize]
    }
}

/// Turns raw sensor packets into calibrated points.
///
/// Holds the calibration table, the rotation trig table and the filter
/// window, all immutable after construction, so one converter can be
/// shared read-only between threads.
pub struct PointCloudConverter {
    calibration: Calibration,
    rotation_table: RotationTable,
    filter: FilterConfig,
}

impl PointCloudConverter {
    pub fn new(calibration: Calibration, filter: FilterConfig) -> Self {
        Self {
            calibration,
            rotation_table: RotationTable::new(),
            filter,
        }
    }

    /// Loads the calibration named by `config` and derives the filter
    /// window from its view parameters.
    pub fn from_config(config: &Config) -> Result<Self, CalibrationError> {
        let calibration = Calibration::from_file(&config.calibration)?;
        Ok(Self::new(calibration, config.filter()))
    }

    pub fn filter(&self) -> &FilterConfig {
        &self.filter
    }

    /// Appends every accepted sample of `packet` to `cloud`.
    ///
    /// Samples outside the angular or range window are dropped
    /// silently; a continuously spinning sensor produces far more raw
    /// samples than any consumer wants, so this is normal operation,
    /// not an error.
    pub fn unpack(&self, packet: &RawPacket, cloud: &mut impl PointSink) {
        for block in packet.blocks() {
            let header = block.header();
            if let BlockHeader::Unknown(tag) = header {
                log::debug!("unrecognized block header tag {tag:#06x}, assuming upper bank");
            }
            let bank_origin = header.bank_origin();
            let rotation = block.rotation();

            // Reject before any correction math.
            if !self.filter.accepts_rotation(rotation) {
                continue;
            }
            let (sin_rot_table, cos_rot_table) = self.rotation_table.sin_cos(rotation);

            for (position, record) in block.scans().enumerate() {
                let corrections = self.calibration.correction(position + bank_origin);

                let distance =
                    record.raw_distance as f32 * DISTANCE_RESOLUTION + corrections.dist_correction;

                let cos_vert_angle = corrections.cos_vert_correction;
                let sin_vert_angle = corrections.sin_vert_correction;

                // cos(a-b) = cos(a)*cos(b) + sin(a)*sin(b)
                // sin(a-b) = sin(a)*cos(b) - cos(a)*sin(b)
                let cos_rot_angle = cos_rot_table * corrections.cos_rot_correction
                    + sin_rot_table * corrections.sin_rot_correction;
                let sin_rot_angle = sin_rot_table * corrections.cos_rot_correction
                    - cos_rot_table * corrections.sin_rot_correction;

                let horiz_offset = corrections.horiz_offset_correction;
                let vert_offset = corrections.vert_offset_correction;

                // Horizontal projection, before the per-axis refinement.
                let xy_distance = distance * cos_vert_angle;
                let xx = (xy_distance * sin_rot_angle - horiz_offset * cos_rot_angle).abs();
                let yy = (xy_distance * cos_rot_angle + horiz_offset * sin_rot_angle).abs();

                // The two-point calibration interpolates a separate
                // distance correction per axis between the near and far
                // reference targets.
                let (distance_corr_x, distance_corr_y) = if corrections.two_pt_correction_available
                {
                    (
                        (corrections.dist_correction - corrections.dist_correction_x)
                            * (xx - TWO_PT_X_NEAR)
                            / (TWO_PT_FAR - TWO_PT_X_NEAR)
                            + corrections.dist_correction_x,
                        (corrections.dist_correction - corrections.dist_correction_y)
                            * (yy - TWO_PT_Y_NEAR)
                            / (TWO_PT_FAR - TWO_PT_Y_NEAR)
                            + corrections.dist_correction_y,
                    )
                } else {
                    (0., 0.)
                };

                let distance_x = distance + distance_corr_x;
                let x = distance_x * cos_vert_angle * sin_rot_angle + horiz_offset * cos_rot_angle;

                let distance_y = distance + distance_corr_y;
                let y = distance_y * cos_vert_angle * cos_rot_angle + horiz_offset * sin_rot_angle;

                let z = distance * sin_vert_angle + vert_offset;

                let focal_offset = 256. * (1. - corrections.focal_distance / 13100.)
                    * (1. - corrections.focal_distance / 13100.);
                let raw_norm = 1. - record.raw_distance as f32 / 65535.;
                let intensity = record.raw_intensity as f32
                    + corrections.focal_slope * (focal_offset - 256. * raw_norm * raw_norm).abs();
                let intensity = intensity
                    .max(corrections.min_intensity)
                    .min(corrections.max_intensity);

                if self.filter.accepts_range(distance) {
                    cloud.append(LaserPoint {
                        // Right-hand rule output frame: x forward, y left.
                        x: y,
                        y: -x,
                        z,
                        intensity: intensity as u8,
                        ring: corrections.laser_ring,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        calibration::{zeroed_calibration, zeroed_entry, RawCalibration},
        cloud::PointCloud,
        packet::{BLOCK_SIZE, LASER_COUNT, PACKET_SIZE, RAW_SCAN_SIZE},
    };

    const UPPER: u16 = 0xeeff;
    const LOWER: u16 = 0xddff;

    struct Sample {
        block: usize,
        tag: u16,
        rotation: u16,
        position: usize,
        raw_distance: u16,
        raw_intensity: u8,
    }

    fn build_packet(samples: &[Sample]) -> Vec<u8> {
        let mut buf = vec![0u8; PACKET_SIZE];
        for sample in samples {
            let at = sample.block * BLOCK_SIZE;
            buf[at..at + 2].copy_from_slice(&sample.tag.to_le_bytes());
            buf[at + 2..at + 4].copy_from_slice(&sample.rotation.to_le_bytes());
            let at = at + 4 + sample.position * RAW_SCAN_SIZE;
            buf[at..at + 2].copy_from_slice(&sample.raw_distance.to_le_bytes());
            buf[at + 2] = sample.raw_intensity;
        }
        buf
    }

    fn narrow_filter() -> FilterConfig {
        // min_range keeps the all-zero filler records out
        FilterConfig {
            min_range: 1.,
            max_range: 130.,
            min_angle: 0,
            max_angle: ROTATION_MAX_UNITS,
        }
    }

    fn unpack_one(converter: &PointCloudConverter, buf: &[u8]) -> PointCloud {
        let mut cloud = PointCloud::default();
        converter.unpack(&RawPacket::new(buf).unwrap(), &mut cloud);
        cloud
    }

    #[test]
    fn rotation_table_matches_direct_evaluation() {
        let table = RotationTable::new();
        for unit in 0..ROTATION_MAX_UNITS {
            let rotation = (unit as f32 * ROTATION_RESOLUTION).to_radians();
            let (sin, cos) = table.sin_cos(unit);
            assert!((sin - rotation.sin()).abs() < 1e-5, "sin at {unit}");
            assert!((cos - rotation.cos()).abs() < 1e-5, "cos at {unit}");
        }
    }

    #[test]
    fn zero_corrections_give_polar_conversion() {
        let converter = PointCloudConverter::new(zeroed_calibration(), narrow_filter());
        let rotation = 4500; // 45 degrees
        let buf = build_packet(&[Sample {
            block: 0,
            tag: UPPER,
            rotation,
            position: 0,
            raw_distance: 5000, // 10m
            raw_intensity: 100,
        }]);
        let cloud = unpack_one(&converter, &buf);
        assert_eq!(1, cloud.width);

        let point = cloud.points[0];
        let angle = (rotation as f32 * ROTATION_RESOLUTION).to_radians();
        let distance = 10.;
        // sensor frame: x = d*sin(rot), y = d*cos(rot); output swaps to
        // the right-handed convention
        assert!((point.x - distance * angle.cos()).abs() < 1e-4);
        assert!((point.y - -(distance * angle.sin())).abs() < 1e-4);
        assert!(point.z.abs() < 1e-6);
        assert_eq!(100, point.intensity);
        assert_eq!(0, point.ring);
    }

    #[test]
    fn angular_window_drops_whole_block() {
        let filter = FilterConfig {
            min_range: 1.,
            max_range: 130.,
            min_angle: 35000,
            max_angle: 1000,
        };
        let converter = PointCloudConverter::new(zeroed_calibration(), filter);
        let samples = |rotation| Sample {
            block: 0,
            tag: UPPER,
            rotation,
            position: 0,
            raw_distance: 5000,
            raw_intensity: 10,
        };
        assert_eq!(0, unpack_one(&converter, &build_packet(&[samples(20000)])).width);
        assert_eq!(1, unpack_one(&converter, &build_packet(&[samples(35500)])).width);
        assert_eq!(1, unpack_one(&converter, &build_packet(&[samples(500)])).width);
    }

    #[test]
    fn range_window_is_inclusive_at_min() {
        let filter = FilterConfig {
            min_range: 10.,
            max_range: 20.,
            min_angle: 0,
            max_angle: ROTATION_MAX_UNITS,
        };
        let converter = PointCloudConverter::new(zeroed_calibration(), filter);
        let sample = |raw_distance| Sample {
            block: 0,
            tag: UPPER,
            rotation: 0,
            position: 0,
            raw_distance,
            raw_intensity: 10,
        };
        // 5000 * 0.002 == min_range exactly
        assert_eq!(1, unpack_one(&converter, &build_packet(&[sample(5000)])).width);
        assert_eq!(0, unpack_one(&converter, &build_packet(&[sample(4999)])).width);
        // beyond max_range
        assert_eq!(0, unpack_one(&converter, &build_packet(&[sample(10001)])).width);
    }

    #[test]
    fn lower_bank_maps_to_high_lasers() {
        let converter = PointCloudConverter::new(zeroed_calibration(), narrow_filter());
        let buf = build_packet(&[Sample {
            block: 2,
            tag: LOWER,
            rotation: 0,
            position: 3,
            raw_distance: 5000,
            raw_intensity: 1,
        }]);
        let cloud = unpack_one(&converter, &buf);
        assert_eq!(1, cloud.width);
        // equal vertical angles keep ring == laser number
        assert_eq!(35, cloud.points[0].ring);
    }

    #[test]
    fn unknown_header_falls_back_to_upper_bank() {
        let converter = PointCloudConverter::new(zeroed_calibration(), narrow_filter());
        let buf = build_packet(&[Sample {
            block: 0,
            tag: 0xbeef,
            rotation: 0,
            position: 7,
            raw_distance: 5000,
            raw_intensity: 1,
        }]);
        let cloud = unpack_one(&converter, &buf);
        assert_eq!(1, cloud.width);
        assert_eq!(7, cloud.points[0].ring);
    }

    #[test]
    fn intensity_stays_within_calibrated_bounds() {
        let mut lasers: Vec<_> = (0..LASER_COUNT).map(zeroed_entry).collect();
        lasers[0].min_intensity = 40.;
        lasers[0].max_intensity = 200.;
        lasers[0].focal_slope = 2.;
        let calibration = RawCalibration {
            num_lasers: LASER_COUNT,
            lasers,
        }
        .try_into()
        .unwrap();
        let converter = PointCloudConverter::new(calibration, narrow_filter());

        // raw intensity 0 with no slope contribution at this distance
        // still comes out at the calibrated floor
        let low = build_packet(&[Sample {
            block: 0,
            tag: UPPER,
            rotation: 0,
            position: 0,
            raw_distance: 700, // slope term stays small near full raw range
            raw_intensity: 0,
        }]);
        let cloud = unpack_one(&converter, &low);
        assert_eq!(40, cloud.points[0].intensity);

        // saturated raw distance maximizes the focal term: clamped at
        // the calibrated ceiling despite raw intensity 255
        let high = build_packet(&[Sample {
            block: 0,
            tag: UPPER,
            rotation: 0,
            position: 0,
            raw_distance: 60000,
            raw_intensity: 255,
        }]);
        let cloud = unpack_one(&converter, &high);
        assert_eq!(200, cloud.points[0].intensity);
    }

    #[test]
    fn two_point_correction_interpolates_per_axis() {
        let mut lasers: Vec<_> = (0..LASER_COUNT).map(zeroed_entry).collect();
        lasers[0].dist_correction_x = Some(0.5);
        lasers[0].dist_correction_y = Some(0.25);
        let calibration: Calibration = RawCalibration {
            num_lasers: LASER_COUNT,
            lasers,
        }
        .try_into()
        .unwrap();
        let converter = PointCloudConverter::new(calibration, narrow_filter());

        let rotation = 4500;
        let buf = build_packet(&[Sample {
            block: 0,
            tag: UPPER,
            rotation,
            position: 0,
            raw_distance: 5000,
            raw_intensity: 1,
        }]);
        let cloud = unpack_one(&converter, &buf);
        let point = cloud.points[0];

        let angle = (rotation as f32 * ROTATION_RESOLUTION).to_radians();
        let distance = 10.0f32;
        let xx = (distance * angle.sin()).abs();
        let yy = (distance * angle.cos()).abs();
        let corr_x = (0. - 0.5) * (xx - TWO_PT_X_NEAR) / (TWO_PT_FAR - TWO_PT_X_NEAR) + 0.5;
        let corr_y = (0. - 0.25) * (yy - TWO_PT_Y_NEAR) / (TWO_PT_FAR - TWO_PT_Y_NEAR) + 0.25;
        let expected_x = (distance + corr_y) * angle.cos();
        let expected_y = -((distance + corr_x) * angle.sin());
        assert!((point.x - expected_x).abs() < 1e-4, "{point:?}");
        assert!((point.y - expected_y).abs() < 1e-4, "{point:?}");

        // differs from the uncorrected baseline by the interpolated term
        let baseline = PointCloudConverter::new(zeroed_calibration(), narrow_filter());
        let base_point = unpack_one(&baseline, &buf).points[0];
        assert!((point.x - base_point.x - corr_y * angle.cos()).abs() < 1e-4);
    }

    #[test]
    fn unpack_only_appends() {
        let converter = PointCloudConverter::new(zeroed_calibration(), narrow_filter());
        let mut cloud = PointCloud::default();
        let existing = LaserPoint {
            x: 1.,
            y: 1.,
            z: 1.,
            intensity: 9,
            ring: 1,
        };
        cloud.append(existing);
        let buf = build_packet(&[Sample {
            block: 0,
            tag: UPPER,
            rotation: 0,
            position: 0,
            raw_distance: 5000,
            raw_intensity: 1,
        }]);
        converter.unpack(&RawPacket::new(&buf).unwrap(), &mut cloud);
        assert_eq!(2, cloud.width);
        assert_eq!(existing, cloud.points[0]);
    }
}
