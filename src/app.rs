//! Application core: wires clock, controller and display together and maps
//! keys and serial commands onto them.

use core::convert::Infallible;

use embedded_hal::digital::v2::OutputPin;
use embedded_storage::Storage;

use crate::clock::{DateTime, WallClock};
use crate::command::{Command, CommandError, Line, LineError, Reply};
use crate::controller::{WateringController, WateringError};
use crate::display::{Display, DisplayState, Frame};
use crate::record::WateringRecord;
use crate::schedule::ScheduleParam;

/// Front-panel keys. Debouncing happens before they get here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Key {
    /// Enable or disable the schedule
    Auto,
    /// Select the next schedule field
    Mode,
    Up,
    Down,
    /// Start or stop manual watering
    Manual,
}

/// Result of one serial command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Response {
    pub reply: Reply,
    /// Session ended by the command
    pub record: Option<WateringRecord>,
}

impl From<Reply> for Response {
    fn from(reply: Reply) -> Self {
        Self {
            reply,
            record: None,
        }
    }
}

/// Top-level application state.
///
/// Owns the wall clock, the controller and the display, and turns ticks,
/// command lines and key presses into controller calls. Nothing in here
/// touches hardware directly, so the whole control path runs on the host.
pub struct App<'a, V, S> {
    /// Calendar clock advanced once per tick
    clock: WallClock,
    /// Valve, flow accounting and schedule
    controller: WateringController<'a, V, S>,
    /// View state for the seven-segment display
    display: Display,
    /// Schedule field the Up/Down keys act on
    editing: ScheduleParam,
}

impl<'a, V, S> App<'a, V, S>
where
    V: OutputPin<Error = Infallible>,
    S: Storage,
{
    /// Assembles the application from its parts.
    ///
    /// # Arguments
    ///
    /// * `clock` - Wall clock, set over the serial link later
    /// * `controller` - Controller restored from the store
    /// * `display` - Display state machine
    pub fn new(clock: WallClock, controller: WateringController<'a, V, S>, display: Display) -> Self {
        Self {
            clock,
            controller,
            display,
            editing: ScheduleParam::default(),
        }
    }

    pub fn now(&self) -> DateTime {
        self.clock.now()
    }

    pub fn controller(&self) -> &WateringController<'a, V, S> {
        &self.controller
    }

    pub fn display(&self) -> &Display {
        &self.display
    }

    /// One-second tick: advance the clock, run the controller, then move
    /// the display along. Returns the record of a session that ended.
    pub fn tick(&mut self) -> Option<WateringRecord> {
        self.clock.tick();
        let report = self.controller.tick(self.clock.now());

        if report.started.is_some() {
            self.display.on_session_start();
        }
        self.display
            .on_tick(self.controller.state(), report.flow.refresh_display);

        report.record
    }

    /// Handles one line from the serial link.
    pub fn handle_line(&mut self, line: Result<Line, LineError>) -> Response {
        match line {
            Ok(line) => match Command::parse(&line) {
                Ok(command) => self.handle_command(command),
                Err(e) => Reply::Error(e).into(),
            },
            Err(e) => Reply::Error(CommandError::Line(e)).into(),
        }
    }

    pub fn handle_command(&mut self, command: Command) -> Response {
        #[cfg(feature = "debug-mode")]
        defmt::info!("Command: {}", command);

        let reply = match command {
            Command::SetTime(time) => {
                self.clock.set_time(time);
                Reply::TimeSet(time)
            }
            Command::SetDate(date) => {
                self.clock.set_date(date);
                Reply::DateSet(date)
            }
            Command::SetDateTime(now) => {
                self.clock.set(now);
                Reply::DateTimeSet(now)
            }
            Command::Schedule { start, volume } => match self.controller.configure(start, volume) {
                Ok(()) => Reply::AutoSet { start, volume },
                Err(_) => Reply::Error(CommandError::InvalidParams),
            },
            Command::Stop => {
                return Response {
                    reply: Reply::AutoStopped,
                    record: self.controller.stop_schedule(self.clock.now()),
                };
            }
            Command::ShowTime => {
                self.display.set_home(DisplayState::Clock);
                Reply::DisplayTime
            }
            Command::ShowDate => {
                self.display.set_home(DisplayState::Date);
                Reply::DisplayDate
            }
            Command::ResetTotal => match self.controller.reset_total() {
                Ok(()) => Reply::TotalReset,
                Err(_) => Reply::Error(CommandError::Busy),
            },
        };
        reply.into()
    }

    /// Handles one debounced key press.
    ///
    /// Up and Down only edit while a schedule field is on the display; the
    /// first press brings the field up.
    pub fn handle_key(&mut self, key: Key) -> Result<Option<WateringRecord>, WateringError> {
        let now = self.clock.now();
        let editing = matches!(self.display.state(), DisplayState::ScheduleParam(_));

        match key {
            Key::Auto => {
                if self.controller.schedule().enabled() {
                    return Ok(self.controller.stop_schedule(now));
                }
                self.controller.start_schedule();
            }
            Key::Mode => {
                if editing {
                    self.editing = self.editing.next();
                }
                self.display.show_param(self.editing);
            }
            Key::Up | Key::Down => {
                if editing {
                    self.controller.adjust(self.editing, key == Key::Up);
                }
                self.display.show_param(self.editing);
            }
            Key::Manual => {
                let record = self.controller.toggle_manual(now)?;
                if record.is_none() {
                    self.display.on_session_start();
                }
                return Ok(record);
            }
        }
        Ok(None)
    }

    /// Renders the current view.
    pub fn frame(&self) -> Frame {
        self.display.render(&self.clock.now(), &self.controller.status())
    }
}
