//! Serial command protocol.
//!
//! Commands are ASCII lines terminated by CR and/or LF:
//!
//! | Command                        | Effect                              |
//! |--------------------------------|-------------------------------------|
//! | `TIME:HH:MM:SS`                | set the wall-clock time             |
//! | `DATE:YYYY:MM:DD`              | set the wall-clock date             |
//! | `DATETIME:YYYY:MM:DD:HH:MM:SS` | set both                            |
//! | `A:HH:MM:SS:MMMM`              | set and enable the schedule (ml)    |
//! | `STOP`                         | disable the schedule                |
//! | `DISPTIME` / `DISPDATE`        | choose the idle display view        |
//! | `RESET`                        | zero the lifetime total             |
//!
//! Every line gets exactly one [`Reply`]. A rejected line changes nothing.

use core::fmt::{self, Write};

use heapless::{String, Vec};

use crate::clock::{Date, DateTime, TimeOfDay};

/// Longest accepted command line, terminator excluded.
pub const LINE_CAPACITY: usize = 32;

/// Room for the longest reply or record line.
pub const REPLY_CAPACITY: usize = 128;

pub type Line = String<LINE_CAPACITY>;
pub type ReplyLine = String<REPLY_CAPACITY>;

/// Sent once after boot.
pub const BANNER: &str = "\r\nWatering System Ready\r\n\
    Commands: TIME:HH:MM:SS DATE:YYYY:MM:DD DATETIME:YYYY:MM:DD:HH:MM:SS\r\n\
    A:HH:MM:SS:MMMM STOP DISPTIME DISPDATE RESET\r\n";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LineError {
    /// More than [`LINE_CAPACITY`] bytes before the terminator
    TooLong,
    /// Not valid UTF-8
    Encoding,
}

/// Assembles received bytes into command lines.
#[derive(Default)]
pub struct LineBuffer {
    buf: Vec<u8, LINE_CAPACITY>,
    overflow: bool,
}

impl LineBuffer {
    pub const fn new() -> Self {
        Self {
            buf: Vec::new(),
            overflow: false,
        }
    }

    /// Feeds one byte. Returns a line when a terminator completes one.
    ///
    /// Empty lines (such as the LF of a CRLF pair) are skipped. Bytes past
    /// the capacity are dropped and the whole line is reported as too long.
    pub fn push(&mut self, byte: u8) -> Option<Result<Line, LineError>> {
        if byte == b'\r' || byte == b'\n' {
            if core::mem::take(&mut self.overflow) {
                self.buf.clear();
                return Some(Err(LineError::TooLong));
            }
            if self.buf.is_empty() {
                return None;
            }
            let bytes = core::mem::take(&mut self.buf);
            return Some(String::from_utf8(bytes).map_err(|_| LineError::Encoding));
        }

        if !self.overflow && self.buf.push(byte).is_err() {
            self.overflow = true;
        }
        None
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    SetTime(TimeOfDay),
    SetDate(Date),
    SetDateTime(DateTime),
    /// Start time and target volume in ml. The volume is range-checked by
    /// the schedule itself.
    Schedule { start: TimeOfDay, volume: u32 },
    Stop,
    ShowTime,
    ShowDate,
    ResetTotal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandError {
    /// Known command, but fields missing or not the expected digit counts
    WrongFormat,
    InvalidTime,
    InvalidDate,
    InvalidDateTime,
    InvalidParams,
    Unknown,
    /// The command would disturb a watering session in progress
    Busy,
    Line(LineError),
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let line = line.trim();

        if let Some(rest) = line.strip_prefix("DATETIME:") {
            let [y, mo, d, h, mi, s] = fields(rest, [4, 2, 2, 2, 2, 2])?;
            let date = Date::new(y, mo as u8, d as u8);
            let time = TimeOfDay::new(h as u8, mi as u8, s as u8);
            return match (date, time) {
                (Some(date), Some(time)) => Ok(Self::SetDateTime(DateTime::new(date, time))),
                _ => Err(CommandError::InvalidDateTime),
            };
        }
        if let Some(rest) = line.strip_prefix("DATE:") {
            let [y, mo, d] = fields(rest, [4, 2, 2])?;
            return Date::new(y, mo as u8, d as u8)
                .map(Self::SetDate)
                .ok_or(CommandError::InvalidDate);
        }
        if let Some(rest) = line.strip_prefix("TIME:") {
            let [h, m, s] = fields(rest, [2, 2, 2])?;
            return TimeOfDay::new(h as u8, m as u8, s as u8)
                .map(Self::SetTime)
                .ok_or(CommandError::InvalidTime);
        }
        if let Some(rest) = line.strip_prefix("A:") {
            let [h, m, s, volume] = fields(rest, [2, 2, 2, 4])?;
            let start = TimeOfDay::new(h as u8, m as u8, s as u8).ok_or(CommandError::InvalidParams)?;
            return Ok(Self::Schedule {
                start,
                volume: volume as u32,
            });
        }

        match line {
            "STOP" => Ok(Self::Stop),
            "DISPTIME" => Ok(Self::ShowTime),
            "DISPDATE" => Ok(Self::ShowDate),
            "RESET" => Ok(Self::ResetTotal),
            _ => Err(CommandError::Unknown),
        }
    }
}

/// Splits `s` on ':' into exactly `N` decimal fields of the given widths.
fn fields<const N: usize>(s: &str, widths: [usize; N]) -> Result<[u16; N], CommandError> {
    let mut out = [0u16; N];
    let mut parts = s.split(':');
    for (slot, width) in out.iter_mut().zip(widths) {
        let part = parts.next().ok_or(CommandError::WrongFormat)?;
        if part.len() != width || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CommandError::WrongFormat);
        }
        *slot = part.parse().map_err(|_| CommandError::WrongFormat)?;
    }
    if parts.next().is_some() {
        return Err(CommandError::WrongFormat);
    }
    Ok(out)
}

/// Response to one command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reply {
    TimeSet(TimeOfDay),
    DateSet(Date),
    DateTimeSet(DateTime),
    AutoSet { start: TimeOfDay, volume: u32 },
    AutoStopped,
    DisplayTime,
    DisplayDate,
    TotalReset,
    Error(CommandError),
}

impl From<CommandError> for Reply {
    fn from(e: CommandError) -> Self {
        Self::Error(e)
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimeSet(t) => write!(f, "Time Set: {}", t),
            Self::DateSet(d) => write!(f, "Date Set: {}", d),
            Self::DateTimeSet(dt) => write!(f, "DateTime Set: {}", dt),
            Self::AutoSet { start, volume } => {
                write!(f, "Auto Set OK Time: {} Volume: {}ml", start, volume)
            }
            Self::AutoStopped => f.write_str("Auto Stopped"),
            Self::DisplayTime => f.write_str("Display Mode: Time"),
            Self::DisplayDate => f.write_str("Display Mode: Date"),
            Self::TotalReset => f.write_str("Total Reset"),
            Self::Error(e) => f.write_str(match e {
                CommandError::WrongFormat => "Error: Wrong format",
                CommandError::InvalidTime => "Error: Invalid time",
                CommandError::InvalidDate => "Error: Invalid date",
                CommandError::InvalidDateTime => "Error: Invalid datetime",
                CommandError::InvalidParams => "Error: Invalid params (volume 50-9999ml)",
                CommandError::Unknown => "Error: Unknown cmd",
                CommandError::Busy => "Error: Busy watering",
                CommandError::Line(LineError::TooLong) => "Error: Line too long",
                CommandError::Line(LineError::Encoding) => "Error: Bad encoding",
            }),
        }
    }
}

/// Formats `item` as one CRLF-terminated serial line. Output that does not
/// fit is replaced by an error line.
pub fn render_line(item: &impl fmt::Display) -> ReplyLine {
    let mut line = ReplyLine::new();
    if write!(line, "{}\r\n", item).is_err() {
        line.clear();
        let _ = line.push_str("Error: Reply too long\r\n");
    }
    line
}
