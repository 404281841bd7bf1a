//! Wall clock and calendar.
//!
//! The controller has no battery-backed RTC: the clock starts from
//! [`DateTime::BOOT`] and is set over the serial link. Scheduling only looks
//! at the time of day; the date is used for display and record timestamps.

use core::fmt;

/// Earliest year the calendar accepts.
pub const MIN_YEAR: u16 = 2000;
/// Latest year the calendar accepts.
pub const MAX_YEAR: u16 = 2099;

const SECS_PER_DAY: u32 = 24 * 60 * 60;

/// Returns true for Gregorian leap years.
pub const fn is_leap_year(year: u16) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Number of days in `month` (1-12) of `year`. Returns 0 for an invalid month.
pub const fn days_in_month(year: u16, month: u8) -> u8 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 0,
    }
}

/// Time of day with second resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
    second: u8,
}

impl TimeOfDay {
    pub const MIDNIGHT: Self = Self {
        hour: 0,
        minute: 0,
        second: 0,
    };

    /// Creates a time of day, or `None` if any field is out of range.
    pub const fn new(hour: u8, minute: u8, second: u8) -> Option<Self> {
        if hour < 24 && minute < 60 && second < 60 {
            Some(Self {
                hour,
                minute,
                second,
            })
        } else {
            None
        }
    }

    pub const fn hour(&self) -> u8 {
        self.hour
    }

    pub const fn minute(&self) -> u8 {
        self.minute
    }

    pub const fn second(&self) -> u8 {
        self.second
    }

    pub const fn seconds_from_midnight(&self) -> u32 {
        self.hour as u32 * 3600 + self.minute as u32 * 60 + self.second as u32
    }

    pub(crate) fn with_hour(self, hour: u8) -> Self {
        Self {
            hour: hour % 24,
            ..self
        }
    }

    pub(crate) fn with_minute(self, minute: u8) -> Self {
        Self {
            minute: minute % 60,
            ..self
        }
    }

    pub(crate) fn with_second(self, second: u8) -> Self {
        Self {
            second: second % 60,
            ..self
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }
}

/// Calendar date between [`MIN_YEAR`] and [`MAX_YEAR`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Date {
    year: u16,
    month: u8,
    day: u8,
}

impl Date {
    /// Creates a date, or `None` if it does not exist in the supported range.
    pub const fn new(year: u16, month: u8, day: u8) -> Option<Self> {
        if year < MIN_YEAR || year > MAX_YEAR || month == 0 || month > 12 {
            return None;
        }
        if day == 0 || day > days_in_month(year, month) {
            return None;
        }
        Some(Self { year, month, day })
    }

    pub const fn year(&self) -> u16 {
        self.year
    }

    pub const fn month(&self) -> u8 {
        self.month
    }

    pub const fn day(&self) -> u8 {
        self.day
    }

    /// Days elapsed since 2000-01-01.
    fn days_since_epoch(&self) -> u32 {
        let mut days = 0u32;
        for year in MIN_YEAR..self.year {
            days += if is_leap_year(year) { 366 } else { 365 };
        }
        for month in 1..self.month {
            days += days_in_month(self.year, month) as u32;
        }
        days + self.day as u32 - 1
    }

    fn next_day(self) -> Self {
        if self.day < days_in_month(self.year, self.month) {
            Self {
                day: self.day + 1,
                ..self
            }
        } else if self.month < 12 {
            Self {
                month: self.month + 1,
                day: 1,
                ..self
            }
        } else if self.year < MAX_YEAR {
            Self {
                year: self.year + 1,
                month: 1,
                day: 1,
            }
        } else {
            // Wrap around instead of leaving the supported range.
            Self {
                year: MIN_YEAR,
                month: 1,
                day: 1,
            }
        }
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DateTime {
    pub date: Date,
    pub time: TimeOfDay,
}

impl DateTime {
    /// Clock value after power-up, before anyone sets the time.
    pub const BOOT: Self = Self {
        date: Date {
            year: 2025,
            month: 1,
            day: 1,
        },
        time: TimeOfDay::MIDNIGHT,
    };

    pub const fn new(date: Date, time: TimeOfDay) -> Self {
        Self { date, time }
    }

    /// Seconds from `earlier` to `self`, saturating at zero if `earlier` is
    /// actually later.
    pub fn seconds_since(&self, earlier: &DateTime) -> u32 {
        let to_secs = |dt: &DateTime| {
            dt.date.days_since_epoch() * SECS_PER_DAY + dt.time.seconds_from_midnight()
        };
        to_secs(self).saturating_sub(to_secs(earlier))
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.date, self.time)
    }
}

/// Second-resolution wall clock advanced by the 1 Hz tick.
pub struct WallClock {
    now: DateTime,
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new(DateTime::BOOT)
    }
}

impl WallClock {
    pub const fn new(now: DateTime) -> Self {
        Self { now }
    }

    pub const fn now(&self) -> DateTime {
        self.now
    }

    /// Advances the clock by one second, rolling over into the next day,
    /// month and year as needed.
    pub fn tick(&mut self) {
        let t = self.now.time;
        if t.second < 59 {
            self.now.time.second += 1;
            return;
        }
        self.now.time.second = 0;
        if t.minute < 59 {
            self.now.time.minute += 1;
            return;
        }
        self.now.time.minute = 0;
        if t.hour < 23 {
            self.now.time.hour += 1;
            return;
        }
        self.now.time.hour = 0;
        self.now.date = self.now.date.next_day();
    }

    pub fn set_time(&mut self, time: TimeOfDay) {
        self.now.time = time;
    }

    pub fn set_date(&mut self, date: Date) {
        self.now.date = date;
    }

    pub fn set(&mut self, now: DateTime) {
        self.now = now;
    }
}
