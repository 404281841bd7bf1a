//! Persisted layout on the non-volatile store.
//!
//! | Field                    | Address     | Size                |
//! |--------------------------|-------------|---------------------|
//! | total volume (ml)        | 0x00..=0x03 | u32 little-endian   |
//! | schedule enabled         | 0x10        | 1 byte              |
//! | schedule start hour      | 0x11        | 1 byte              |
//! | schedule start minute    | 0x12        | 1 byte              |
//! | schedule start second    | 0x13        | 1 byte              |
//! | schedule target volume   | 0x14..=0x15 | u16 little-endian   |
//! | schedule triggered today | 0x16        | 1 byte              |
//!
//! There is no checksum. The only corruption defense is the range check
//! each reader applies to what it loads.

use embedded_storage::Storage;

use crate::clock::TimeOfDay;
use crate::schedule::ScheduleConfig;

pub const TOTAL_VOLUME_ADDR: u32 = 0x00;
pub const SCHEDULE_ADDR: u32 = 0x10;

const SCHEDULE_LEN: usize = 7;

/// Typed access to the persisted fields of a byte-addressable store.
pub struct NvStore<S> {
    storage: S,
}

impl<S: Storage> NvStore<S> {
    pub const fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Releases the underlying store.
    pub fn free(self) -> S {
        self.storage
    }

    pub fn load_total(&mut self) -> Result<u32, S::Error> {
        let mut buf = [0u8; 4];
        self.storage.read(TOTAL_VOLUME_ADDR, &mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    pub fn save_total(&mut self, total: u32) -> Result<(), S::Error> {
        self.storage.write(TOTAL_VOLUME_ADDR, &total.to_le_bytes())
    }

    /// Loads the schedule block.
    ///
    /// An unwritten or damaged block (flag byte other than 0/1, impossible
    /// time of day) yields the default schedule. The volume is clamped into
    /// its valid range.
    pub fn load_schedule(&mut self) -> Result<ScheduleConfig, S::Error> {
        let mut buf = [0u8; SCHEDULE_LEN];
        self.storage.read(SCHEDULE_ADDR, &mut buf)?;
        Ok(decode_schedule(&buf).unwrap_or_default())
    }

    pub fn save_schedule(&mut self, config: &ScheduleConfig) -> Result<(), S::Error> {
        self.storage.write(SCHEDULE_ADDR, &encode_schedule(config))
    }
}

fn decode_flag(byte: u8) -> Option<bool> {
    match byte {
        0 => Some(false),
        1 => Some(true),
        _ => None,
    }
}

fn decode_schedule(buf: &[u8; SCHEDULE_LEN]) -> Option<ScheduleConfig> {
    let enabled = decode_flag(buf[0])?;
    let start_time = TimeOfDay::new(buf[1], buf[2], buf[3])?;
    let target_volume = u16::from_le_bytes([buf[4], buf[5]]) as u32;
    let triggered_today = decode_flag(buf[6])?;
    Some(ScheduleConfig::from_parts(
        enabled,
        start_time,
        target_volume,
        triggered_today,
    ))
}

fn encode_schedule(config: &ScheduleConfig) -> [u8; SCHEDULE_LEN] {
    let start = config.start_time();
    // Always within u16: the config clamps the volume to four digits.
    let volume = (config.target_volume() as u16).to_le_bytes();
    [
        config.enabled() as u8,
        start.hour(),
        start.minute(),
        start.second(),
        volume[0],
        volume[1],
        config.triggered_today() as u8,
    ]
}
