/// One calibrated output point. Coordinates follow the standard
/// right-handed convention (x forward, y left, z up), meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaserPoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub intensity: u8,
    pub ring: u16,
}

/// Append-only sink the converter emits into. Implementations must
/// never drop or reorder points already appended.
pub trait PointSink {
    fn append(&mut self, point: LaserPoint);
}

/// Plain growable cloud with the running point count.
#[derive(Debug, Default, Clone)]
pub struct PointCloud {
    pub points: Vec<LaserPoint>,
    pub width: u32,
}

impl PointSink for PointCloud {
    fn append(&mut self, point: LaserPoint) {
        self.points.push(point);
        self.width += 1;
    }
}
