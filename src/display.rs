//! What the eight-digit display shows.
//!
//! One [`Display`] owns the current view and decides when it changes. It
//! renders into a [`Frame`] of abstract glyphs, left to right; the firmware
//! driver maps glyphs to segments and multiplexes them.
//!
//! | View              | Layout       | Example    |
//! |-------------------|--------------|------------|
//! | clock             | `HH-MM-SS`   | `06-00-01` |
//! | date              | `YY-MM-DD`   | `25-05-27` |
//! | current flow      | `C` ml/min   | `C  36000` |
//! | total flow        | `F` litres   | `F    125` |
//! | remaining volume  | `r` ml       | `r     70` |
//! | schedule field    | letter value | `h     06` |

use crate::clock::DateTime;
use crate::controller::{Status, WateringState};
use crate::record::SessionKind;
use crate::schedule::ScheduleParam;

pub const FRAME_LEN: usize = 8;

/// Ticks each view is held while a session rotates through them.
pub const ROTATE_TICKS: u8 = 3;

/// Ticks without a key press before a schedule field view goes back home.
pub const EDIT_TIMEOUT_TICKS: u8 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Glyph {
    Blank,
    Dash,
    /// 0-9
    Digit(u8),
    /// ASCII letter, drawn as well as seven segments allow
    Letter(u8),
}

pub type Frame = [Glyph; FRAME_LEN];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DisplayState {
    Clock,
    Date,
    CurrentFlow,
    TotalFlow,
    Remaining,
    ScheduleParam(ScheduleParam),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DisplayConfig {
    /// Smallest rate shown while the valve is open, ml/min. `None` shows
    /// the measured rate, including zero.
    pub rate_floor: Option<u32>,
    pub rotate_ticks: u8,
    pub edit_timeout_ticks: u8,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            rate_floor: None,
            rotate_ticks: ROTATE_TICKS,
            edit_timeout_ticks: EDIT_TIMEOUT_TICKS,
        }
    }
}

/// Display view state machine.
///
/// Decides which view the eight digits show and renders it into a
/// [`Frame`]. While water flows the flow views rotate; a parameter view
/// opened from the keys falls back to the home view after a timeout.
pub struct Display {
    /// Rotation and timeout settings
    config: DisplayConfig,
    /// View currently shown
    state: DisplayState,
    /// View to fall back to when nothing else is going on
    home: DisplayState,
    /// Ticks spent in the current view
    ticks_in_state: u8,
}

impl Default for Display {
    fn default() -> Self {
        Self::new(DisplayConfig::default())
    }
}

impl Display {
    /// Creates a display showing the clock.
    ///
    /// # Arguments
    ///
    /// * `config` - Rotation and edit timeout settings
    pub fn new(config: DisplayConfig) -> Self {
        Self {
            config,
            state: DisplayState::Clock,
            home: DisplayState::Clock,
            ticks_in_state: 0,
        }
    }

    pub fn state(&self) -> DisplayState {
        self.state
    }

    pub fn home(&self) -> DisplayState {
        self.home
    }

    /// Makes `view` (clock or date) the idle view and shows it.
    pub fn set_home(&mut self, view: DisplayState) {
        self.home = view;
        self.set(view);
    }

    pub fn show_param(&mut self, param: ScheduleParam) {
        self.set(DisplayState::ScheduleParam(param));
    }

    pub fn on_session_start(&mut self) {
        self.set(DisplayState::CurrentFlow);
    }

    /// Advances the view once per tick.
    ///
    /// # Arguments
    ///
    /// * `state` - Controller state after the tick
    /// * `refresh` - The flow meter asked for its post-start refresh
    pub fn on_tick(&mut self, state: WateringState, refresh: bool) {
        self.ticks_in_state = self.ticks_in_state.saturating_add(1);

        match state {
            WateringState::Watering(kind) => {
                if refresh {
                    self.set(DisplayState::CurrentFlow);
                } else if self.ticks_in_state >= self.config.rotate_ticks {
                    self.set(self.next_flow_view(kind));
                }
            }
            WateringState::Idle | WateringState::Waiting => match self.state {
                DisplayState::CurrentFlow | DisplayState::TotalFlow | DisplayState::Remaining => {
                    self.set(self.home)
                }
                DisplayState::ScheduleParam(_)
                    if self.ticks_in_state >= self.config.edit_timeout_ticks =>
                {
                    self.set(self.home)
                }
                _ => {}
            },
        }
    }

    pub fn render(&self, now: &DateTime, status: &Status) -> Frame {
        let mut frame = [Glyph::Blank; FRAME_LEN];
        match self.state {
            DisplayState::Clock => {
                let t = now.time;
                put_triplet(&mut frame, t.hour(), t.minute(), t.second());
            }
            DisplayState::Date => {
                let d = now.date;
                put_triplet(&mut frame, (d.year() % 100) as u8, d.month(), d.day());
            }
            DisplayState::CurrentFlow => {
                let rate = match self.config.rate_floor {
                    Some(floor) if status.valve_open => status.current_rate.max(floor),
                    _ => status.current_rate,
                };
                frame[0] = Glyph::Letter(b'C');
                put_number(&mut frame, rate as u64, 6, false);
            }
            DisplayState::TotalFlow => {
                frame[0] = Glyph::Letter(b'F');
                put_number(&mut frame, status.total_volume / 1000, 6, false);
            }
            DisplayState::Remaining => {
                frame[0] = Glyph::Letter(b'r');
                put_number(&mut frame, status.remaining.unwrap_or(0) as u64, 6, false);
            }
            DisplayState::ScheduleParam(param) => {
                let schedule = &status.schedule;
                let start = schedule.start_time();
                let (letter, value, width) = match param {
                    ScheduleParam::Hour => (b'h', start.hour() as u64, 2),
                    ScheduleParam::Minute => (b'n', start.minute() as u64, 2),
                    ScheduleParam::Second => (b'S', start.second() as u64, 2),
                    ScheduleParam::Volume => (b'd', schedule.target_volume() as u64, 4),
                };
                frame[0] = Glyph::Letter(letter);
                put_number(&mut frame, value, width, true);
            }
        }
        frame
    }

    fn set(&mut self, state: DisplayState) {
        self.state = state;
        self.ticks_in_state = 0;
    }

    fn next_flow_view(&self, kind: SessionKind) -> DisplayState {
        match (self.state, kind) {
            (DisplayState::CurrentFlow, _) => DisplayState::TotalFlow,
            (DisplayState::TotalFlow, SessionKind::Scheduled) => DisplayState::Remaining,
            _ => DisplayState::CurrentFlow,
        }
    }
}

/// Writes `aa-bb-cc`.
fn put_triplet(frame: &mut Frame, a: u8, b: u8, c: u8) {
    for (i, v) in [a, b, c].into_iter().enumerate() {
        frame[i * 3] = Glyph::Digit(v / 10 % 10);
        frame[i * 3 + 1] = Glyph::Digit(v % 10);
    }
    frame[2] = Glyph::Dash;
    frame[5] = Glyph::Dash;
}

/// Writes `value` right-aligned in the last `width` positions, saturating at
/// the largest value that fits.
fn put_number(frame: &mut Frame, value: u64, width: usize, zero_pad: bool) {
    let max = 10u64.pow(width as u32) - 1;
    let mut v = value.min(max);
    for pos in (FRAME_LEN - width..FRAME_LEN).rev() {
        frame[pos] = if v == 0 && !zero_pad && pos != FRAME_LEN - 1 {
            Glyph::Blank
        } else {
            Glyph::Digit((v % 10) as u8)
        };
        v /= 10;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Date, TimeOfDay};
    use crate::schedule::ScheduleConfig;
    use Glyph::{Blank, Dash, Digit, Letter};

    fn now() -> DateTime {
        DateTime::new(Date::new(2025, 5, 27).unwrap(), TimeOfDay::new(6, 0, 1).unwrap())
    }

    fn status(state: WateringState) -> Status {
        Status {
            state,
            schedule: ScheduleConfig::default(),
            current_rate: 0,
            total_volume: 0,
            delivered: 0,
            remaining: None,
            valve_open: matches!(state, WateringState::Watering(_)),
        }
    }

    const SCHEDULED: WateringState = WateringState::Watering(SessionKind::Scheduled);

    #[test]
    fn renders_clock_and_date() {
        let mut display = Display::default();
        let frame = display.render(&now(), &status(WateringState::Idle));
        assert_eq!(
            frame,
            [Digit(0), Digit(6), Dash, Digit(0), Digit(0), Dash, Digit(0), Digit(1)]
        );

        display.set_home(DisplayState::Date);
        let frame = display.render(&now(), &status(WateringState::Idle));
        assert_eq!(
            frame,
            [Digit(2), Digit(5), Dash, Digit(0), Digit(5), Dash, Digit(2), Digit(7)]
        );
    }

    #[test]
    fn renders_flow_views() {
        let mut display = Display::default();
        let mut s = status(SCHEDULED);
        s.current_rate = 36_000;
        s.total_volume = 125_400;
        s.remaining = Some(70);

        display.on_session_start();
        assert_eq!(
            display.render(&now(), &s),
            [Letter(b'C'), Blank, Blank, Digit(3), Digit(6), Digit(0), Digit(0), Digit(0)]
        );

        display.set(DisplayState::TotalFlow);
        assert_eq!(
            display.render(&now(), &s),
            [Letter(b'F'), Blank, Blank, Blank, Blank, Digit(1), Digit(2), Digit(5)]
        );

        display.set(DisplayState::Remaining);
        assert_eq!(
            display.render(&now(), &s),
            [Letter(b'r'), Blank, Blank, Blank, Blank, Blank, Digit(7), Digit(0)]
        );
    }

    #[test]
    fn zero_rate_is_shown_unless_floored() {
        let s = status(SCHEDULED);
        let mut display = Display::default();
        display.on_session_start();
        assert_eq!(display.render(&now(), &s)[7], Digit(0));

        let mut display = Display::new(DisplayConfig {
            rate_floor: Some(100),
            ..DisplayConfig::default()
        });
        display.on_session_start();
        let frame = display.render(&now(), &s);
        assert_eq!(&frame[5..], &[Digit(1), Digit(0), Digit(0)]);
    }

    #[test]
    fn rotates_while_watering() {
        let mut display = Display::default();
        display.on_session_start();

        let mut seen = Vec::new();
        for _ in 0..9 {
            display.on_tick(SCHEDULED, false);
            seen.push(display.state());
        }
        assert_eq!(seen[2], DisplayState::TotalFlow);
        assert_eq!(seen[5], DisplayState::Remaining);
        assert_eq!(seen[8], DisplayState::CurrentFlow);
    }

    #[test]
    fn manual_session_skips_remaining() {
        let mut display = Display::default();
        display.on_session_start();
        let manual = WateringState::Watering(SessionKind::Manual);
        for _ in 0..6 {
            display.on_tick(manual, false);
        }
        assert_eq!(display.state(), DisplayState::CurrentFlow);
    }

    #[test]
    fn refresh_forces_current_flow() {
        let mut display = Display::default();
        display.on_session_start();
        for _ in 0..3 {
            display.on_tick(SCHEDULED, false);
        }
        assert_eq!(display.state(), DisplayState::TotalFlow);
        display.on_tick(SCHEDULED, true);
        assert_eq!(display.state(), DisplayState::CurrentFlow);
    }

    #[test]
    fn returns_home_after_session_and_edit_timeout() {
        let mut display = Display::default();
        display.set_home(DisplayState::Date);
        display.on_session_start();
        display.on_tick(WateringState::Waiting, false);
        assert_eq!(display.state(), DisplayState::Date);

        display.show_param(ScheduleParam::Volume);
        for _ in 0..EDIT_TIMEOUT_TICKS - 1 {
            display.on_tick(WateringState::Waiting, false);
        }
        assert_eq!(display.state(), DisplayState::ScheduleParam(ScheduleParam::Volume));
        display.on_tick(WateringState::Waiting, false);
        assert_eq!(display.state(), DisplayState::Date);
    }

    #[test]
    fn renders_schedule_fields() {
        let mut display = Display::default();
        let s = status(WateringState::Idle);

        display.show_param(ScheduleParam::Hour);
        assert_eq!(
            display.render(&now(), &s),
            [Letter(b'h'), Blank, Blank, Blank, Blank, Blank, Digit(0), Digit(6)]
        );

        display.show_param(ScheduleParam::Volume);
        assert_eq!(
            display.render(&now(), &s),
            [Letter(b'd'), Blank, Blank, Blank, Digit(0), Digit(1), Digit(0), Digit(0)]
        );
    }
}
