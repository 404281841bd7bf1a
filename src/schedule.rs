//! Daily watering schedule.
//!
//! A schedule is a start time and a target volume. Once enabled it fires at
//! most once per day, when the wall clock matches the start time to the
//! second. The bounds on every field are enforced here, whichever front-end
//! (keys or serial) edits them.

use crate::clock::TimeOfDay;

/// Smallest volume a schedule can deliver, in ml.
pub const MIN_TARGET_VOLUME: u32 = 50;
/// Largest volume a schedule can deliver, in ml (four serial digits).
pub const MAX_TARGET_VOLUME: u32 = 9999;
/// Volume change per Up/Down key press, in ml.
pub const TARGET_VOLUME_STEP: u32 = 50;

pub const DEFAULT_START_TIME: TimeOfDay = match TimeOfDay::new(6, 0, 1) {
    Some(t) => t,
    None => unreachable!(),
};
pub const DEFAULT_TARGET_VOLUME: u32 = 100;

/// Schedule field currently selected for editing with the keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ScheduleParam {
    #[default]
    Hour,
    Minute,
    Second,
    Volume,
}

impl ScheduleParam {
    /// Next field in Mode-key order, wrapping back to the hour.
    pub fn next(self) -> Self {
        match self {
            Self::Hour => Self::Minute,
            Self::Minute => Self::Second,
            Self::Second => Self::Volume,
            Self::Volume => Self::Hour,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ScheduleError {
    /// Target volume outside [`MIN_TARGET_VOLUME`]..=[`MAX_TARGET_VOLUME`].
    VolumeOutOfRange(u32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScheduleConfig {
    enabled: bool,
    start_time: TimeOfDay,
    target_volume: u32,
    /// Set when today's slot has been used; cleared at midnight.
    triggered_today: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            start_time: DEFAULT_START_TIME,
            target_volume: DEFAULT_TARGET_VOLUME,
            triggered_today: false,
        }
    }
}

impl ScheduleConfig {
    /// Builds a config from stored fields, clamping the volume into range.
    pub fn from_parts(
        enabled: bool,
        start_time: TimeOfDay,
        target_volume: u32,
        triggered_today: bool,
    ) -> Self {
        Self {
            enabled,
            start_time,
            target_volume: target_volume.clamp(MIN_TARGET_VOLUME, MAX_TARGET_VOLUME),
            triggered_today,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn start_time(&self) -> TimeOfDay {
        self.start_time
    }

    pub fn target_volume(&self) -> u32 {
        self.target_volume
    }

    pub fn triggered_today(&self) -> bool {
        self.triggered_today
    }

    /// Replaces start time and volume. The volume is validated, not clamped:
    /// externally supplied values are rejected whole.
    pub fn set(&mut self, start_time: TimeOfDay, target_volume: u32) -> Result<(), ScheduleError> {
        if !(MIN_TARGET_VOLUME..=MAX_TARGET_VOLUME).contains(&target_volume) {
            return Err(ScheduleError::VolumeOutOfRange(target_volume));
        }
        self.start_time = start_time;
        self.target_volume = target_volume;
        Ok(())
    }

    /// Arms the schedule with a fresh day slot.
    pub(crate) fn arm(&mut self) {
        self.enabled = true;
        self.triggered_today = false;
    }

    pub(crate) fn disarm(&mut self) {
        self.enabled = false;
        self.triggered_today = false;
    }

    pub(crate) fn set_triggered_today(&mut self, triggered: bool) {
        self.triggered_today = triggered;
    }

    /// True when `now` is exactly the start time and the slot is unused.
    pub fn is_due(&self, now: TimeOfDay) -> bool {
        self.enabled && !self.triggered_today && now == self.start_time
    }

    /// Steps the selected field up. Time fields wrap, the volume saturates.
    pub fn increment(&mut self, param: ScheduleParam) {
        let t = self.start_time;
        match param {
            ScheduleParam::Hour => self.start_time = t.with_hour(t.hour() + 1),
            ScheduleParam::Minute => self.start_time = t.with_minute(t.minute() + 1),
            ScheduleParam::Second => self.start_time = t.with_second(t.second() + 1),
            ScheduleParam::Volume => {
                self.target_volume = (self.target_volume + TARGET_VOLUME_STEP).min(MAX_TARGET_VOLUME)
            }
        }
    }

    /// Steps the selected field down. Time fields wrap, the volume saturates.
    pub fn decrement(&mut self, param: ScheduleParam) {
        let t = self.start_time;
        match param {
            ScheduleParam::Hour => self.start_time = t.with_hour(t.hour() + 23),
            ScheduleParam::Minute => self.start_time = t.with_minute(t.minute() + 59),
            ScheduleParam::Second => self.start_time = t.with_second(t.second() + 59),
            ScheduleParam::Volume => {
                self.target_volume = self
                    .target_volume
                    .saturating_sub(TARGET_VOLUME_STEP)
                    .max(MIN_TARGET_VOLUME)
            }
        }
    }
}
