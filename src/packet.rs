/// Number of data blocks in one packet.
pub const BLOCKS_PER_PACKET: usize = 12;
/// Lasers sampled per block (one bank).
pub const SCANS_PER_BLOCK: usize = 32;
/// Bytes per scan record: 2-byte distance + 1-byte intensity.
pub const RAW_SCAN_SIZE: usize = 3;
/// Bytes per block: 2-byte header tag + 2-byte rotation + scan records.
pub const BLOCK_SIZE: usize = 4 + SCANS_PER_BLOCK * RAW_SCAN_SIZE;
/// Total packet size: 12 blocks + 4-byte timestamp + 2 factory bytes.
pub const PACKET_SIZE: usize = BLOCKS_PER_PACKET * BLOCK_SIZE + 6;

/// Physical lasers across both banks.
pub const LASER_COUNT: usize = 64;

/// Rotation readings are hundredths of a degree, [0, 36000).
pub const ROTATION_MAX_UNITS: u16 = 36000;
pub const ROTATION_RESOLUTION: f32 = 0.01;
/// Meters per raw distance unit.
pub const DISTANCE_RESOLUTION: f32 = 0.002;

const UPPER_BANK: u16 = 0xeeff;
const LOWER_BANK: u16 = 0xddff;

#[derive(thiserror::Error, Debug)]
#[error("Expected {expected} packet bytes, got {actual}")]
pub struct SizeMismatchError {
    expected: usize,
    actual: usize,
}

/// Which bank of 32 lasers a block covers.
///
/// Anything other than the two known sentinels is kept around as
/// `Unknown`; the converter treats it like the upper bank, matching
/// the sensor's observed framing, but callers can still tell the
/// difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockHeader {
    Upper,
    Lower,
    Unknown(u16),
}

impl BlockHeader {
    pub fn from_tag(tag: u16) -> Self {
        match tag {
            UPPER_BANK => BlockHeader::Upper,
            LOWER_BANK => BlockHeader::Lower,
            other => BlockHeader::Unknown(other),
        }
    }

    /// First laser number of the bank. Upper bank lasers are [0..31],
    /// lower bank lasers are [32..63].
    pub fn bank_origin(&self) -> usize {
        match self {
            BlockHeader::Lower => SCANS_PER_BLOCK,
            BlockHeader::Upper | BlockHeader::Unknown(_) => 0,
        }
    }
}

/// One raw distance/intensity sample for a single laser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanRecord {
    pub raw_distance: u16,
    pub raw_intensity: u8,
}

/// Borrowed view over one 1206-byte sensor packet.
///
/// All field access goes through explicit offset/width extraction so a
/// misaligned or short buffer can never be reinterpreted in place.
#[derive(Debug, Clone, Copy)]
pub struct RawPacket<'a> {
    data: &'a [u8],
}

impl<'a> RawPacket<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self, SizeMismatchError> {
        if data.len() != PACKET_SIZE {
            return Err(SizeMismatchError {
                expected: PACKET_SIZE,
                actual: data.len(),
            });
        }
        Ok(Self { data })
    }

    pub fn blocks(&self) -> impl Iterator<Item = RawBlock<'a>> + '_ {
        let data = self.data;
        (0..BLOCKS_PER_PACKET).map(move |i| RawBlock {
            data: &data[i * BLOCK_SIZE..(i + 1) * BLOCK_SIZE],
        })
    }

    /// GPS timestamp, microseconds past the hour.
    pub fn timestamp_us(&self) -> u32 {
        let at = BLOCKS_PER_PACKET * BLOCK_SIZE;
        u32::from_le_bytes([
            self.data[at],
            self.data[at + 1],
            self.data[at + 2],
            self.data[at + 3],
        ])
    }

    /// Trailing factory bytes (return mode, sensor model).
    pub fn factory_bytes(&self) -> [u8; 2] {
        [self.data[PACKET_SIZE - 2], self.data[PACKET_SIZE - 1]]
    }
}

/// One bank of 32 scan records at a single rotation reading.
#[derive(Debug, Clone, Copy)]
pub struct RawBlock<'a> {
    data: &'a [u8],
}

impl<'a> RawBlock<'a> {
    pub fn header(&self) -> BlockHeader {
        BlockHeader::from_tag(u16::from_le_bytes([self.data[0], self.data[1]]))
    }

    /// Rotation reading in hundredths of a degree, reduced mod 36000.
    pub fn rotation(&self) -> u16 {
        u16::from_le_bytes([self.data[2], self.data[3]]) % ROTATION_MAX_UNITS
    }

    pub fn scan(&self, position: usize) -> ScanRecord {
        let at = 4 + position * RAW_SCAN_SIZE;
        ScanRecord {
            raw_distance: u16::from_le_bytes([self.data[at], self.data[at + 1]]),
            raw_intensity: self.data[at + 2],
        }
    }

    pub fn scans(&self) -> impl Iterator<Item = ScanRecord> + '_ {
        (0..SCANS_PER_BLOCK).map(move |j| self.scan(j))
    }
}
