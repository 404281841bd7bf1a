//! Scheduled and manual watering controller.
//!
//! [`WateringController`] is the single owner of the valve. Both session
//! paths, the daily schedule and the manual button, go through it, so they
//! can never drive the valve at the same time: whichever session is active
//! refuses the other.
//!
//! # States
//!
//! | State              | Meaning                                       |
//! |--------------------|-----------------------------------------------|
//! | `Idle`             | schedule disabled, valve closed               |
//! | `Waiting`          | schedule armed, valve closed                  |
//! | `Watering(kind)`   | valve open, flow accounting running           |
//!
//! A session being active always means the valve is open and the flow meter
//! is running, and the other way round.
//!
//! # Tick Order
//!
//! [`WateringController::tick`] samples the flow meter, then evaluates the
//! scheduler against the new total, then applies the save policy. A session
//! that completes on a tick is therefore persisted with its final total.

use core::convert::Infallible;

use embedded_hal::digital::v2::OutputPin;
use embedded_storage::Storage;

use crate::clock::{DateTime, TimeOfDay};
use crate::flow::{FlowConfig, FlowMeter, FlowTick, PulseCounter};
use crate::record::{SessionKind, SessionOutcome, WateringRecord};
use crate::schedule::{ScheduleConfig, ScheduleError, ScheduleParam};
use crate::storage::NvStore;
use crate::valve::Valve;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WateringError {
    /// Another session owns the valve.
    Busy,
    /// The schedule parameters were rejected.
    Schedule(ScheduleError),
}

impl From<ScheduleError> for WateringError {
    fn from(e: ScheduleError) -> Self {
        Self::Schedule(e)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WateringState {
    Idle,
    Waiting,
    Watering(SessionKind),
}

/// Result of one controller tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct TickReport {
    pub flow: FlowTick,
    /// A session began on this tick
    pub started: Option<SessionKind>,
    /// A session ended on this tick
    pub record: Option<WateringRecord>,
}

/// Snapshot for displays and status replies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Status {
    pub state: WateringState,
    pub schedule: ScheduleConfig,
    pub current_rate: u32,
    pub total_volume: u64,
    /// Volume delivered in the active session
    pub delivered: u64,
    /// Volume left in the active scheduled session
    pub remaining: Option<u32>,
    pub valve_open: bool,
}

#[derive(Clone, Copy, Debug)]
struct Session {
    kind: SessionKind,
    started: DateTime,
    /// Flow total when the valve opened
    start_total: u64,
    /// Target snapshot for scheduled sessions
    target: Option<u32>,
}

/// Owner of the valve, the flow meter and the schedule.
///
/// At most one session runs at a time. Everything that changes persisted
/// state writes it back through the [`NvStore`] before returning.
pub struct WateringController<'a, V, S> {
    /// The only handle to the relay output
    valve: Valve<V>,
    /// Flow accounting, running exactly while a session is active
    flow: FlowMeter<'a>,
    /// Persisted total and schedule
    store: NvStore<S>,
    /// Daily schedule and today's slot
    schedule: ScheduleConfig,
    /// Active session, if the valve is open
    session: Option<Session>,
}

impl<'a, V, S> WateringController<'a, V, S>
where
    V: OutputPin<Error = Infallible>,
    S: Storage,
{
    /// Restores the controller from the store at boot.
    ///
    /// If the schedule is enabled and `now` is already past its start time,
    /// today's slot counts as used so a reboot never waters twice. This
    /// only works with a real boot time: without a battery-backed clock the
    /// caller passes midnight, nothing counts as past, and a reboot after
    /// the start time waters again that day once the clock is set.
    ///
    /// # Arguments
    ///
    /// * `valve` - Closed valve
    /// * `pulses` - Counter fed by the flow sensor interrupt
    /// * `flow_config` - Pulse-to-volume conversion
    /// * `store` - Non-volatile store holding the total and the schedule
    /// * `now` - Wall-clock time of day at boot
    pub fn init(
        valve: Valve<V>,
        pulses: &'a PulseCounter,
        flow_config: FlowConfig,
        mut store: NvStore<S>,
        now: TimeOfDay,
    ) -> Self {
        let flow = FlowMeter::load(pulses, flow_config, &mut store);

        let mut schedule = store.load_schedule().unwrap_or_else(|_| {
            #[cfg(feature = "debug-mode")]
            defmt::warn!("Failed to read schedule, using defaults");

            ScheduleConfig::default()
        });
        schedule.set_triggered_today(schedule.enabled() && now > schedule.start_time());

        #[cfg(feature = "debug-mode")]
        defmt::info!("Restored schedule {}, total {} ml", schedule, flow.total_volume());

        Self {
            valve,
            flow,
            store,
            schedule,
            session: None,
        }
    }

    /// Enables the schedule with a fresh day slot and persists it.
    pub fn start_schedule(&mut self) {
        self.schedule.arm();
        self.persist_schedule();
    }

    /// Disables the schedule and persists it.
    ///
    /// A scheduled session in progress is stopped and reported as aborted.
    /// A manual session is left alone.
    pub fn stop_schedule(&mut self, now: DateTime) -> Option<WateringRecord> {
        let record = match self.session {
            Some(session) if session.kind == SessionKind::Scheduled => {
                Some(self.end_session(now, SessionOutcome::Aborted))
            }
            _ => None,
        };
        self.schedule.disarm();
        self.persist_schedule();
        record
    }

    /// Sets start time and target volume, then enables the schedule.
    ///
    /// Invalid parameters leave the schedule untouched.
    pub fn configure(&mut self, start_time: TimeOfDay, target_volume: u32) -> Result<(), WateringError> {
        self.schedule.set(start_time, target_volume)?;
        self.start_schedule();
        Ok(())
    }

    /// Steps one schedule field up or down and persists the result.
    pub fn adjust(&mut self, param: ScheduleParam, up: bool) {
        if up {
            self.schedule.increment(param);
        } else {
            self.schedule.decrement(param);
        }
        self.persist_schedule();
    }

    /// Opens the valve for a manual session.
    ///
    /// Refused with [`WateringError::Busy`] while a scheduled session runs.
    /// Does nothing if a manual session is already running.
    pub fn start_manual(&mut self, now: DateTime) -> Result<(), WateringError> {
        match self.session {
            Some(session) if session.kind == SessionKind::Scheduled => Err(WateringError::Busy),
            Some(_) => Ok(()),
            None => {
                self.begin_session(SessionKind::Manual, now, None);
                Ok(())
            }
        }
    }

    /// Ends a manual session. Returns `None` if none was running.
    pub fn stop_manual(&mut self, now: DateTime) -> Option<WateringRecord> {
        match self.session {
            Some(session) if session.kind == SessionKind::Manual => {
                Some(self.end_session(now, SessionOutcome::Completed))
            }
            _ => None,
        }
    }

    /// Manual button: starts a manual session or ends the running one.
    pub fn toggle_manual(&mut self, now: DateTime) -> Result<Option<WateringRecord>, WateringError> {
        match self.session {
            Some(session) if session.kind == SessionKind::Manual => Ok(self.stop_manual(now)),
            _ => self.start_manual(now).map(|()| None),
        }
    }

    /// Zeroes the lifetime total, in memory and in the store.
    ///
    /// Refused with [`WateringError::Busy`] while a session runs, since the
    /// session measures its delivered volume against the total.
    pub fn reset_total(&mut self) -> Result<(), WateringError> {
        if self.session.is_some() {
            return Err(WateringError::Busy);
        }
        if self.flow.reset(&mut self.store).is_err() {
            #[cfg(feature = "debug-mode")]
            defmt::warn!("Failed to persist total reset");
        }
        Ok(())
    }

    /// Runs one sampling and scheduling step. `now` is the wall-clock time
    /// after it advanced for this tick.
    pub fn tick(&mut self, now: DateTime) -> TickReport {
        let mut report = TickReport {
            flow: self.flow.tick(),
            ..TickReport::default()
        };

        if let Some(session) = self.session {
            if let Some(target) = session.target {
                let delivered = self.flow.total_volume() - session.start_total;
                if delivered >= target as u64 {
                    report.record = Some(self.end_session(now, SessionOutcome::Completed));
                    // A session that ran past midnight used yesterday's slot.
                    if session.started.date == now.date {
                        self.schedule.set_triggered_today(true);
                        self.persist_schedule();
                    }
                }
            }
        }

        if now.time == TimeOfDay::MIDNIGHT && self.schedule.triggered_today() {
            self.schedule.set_triggered_today(false);
            self.persist_schedule();
        }

        if self.schedule.is_due(now.time) {
            if self.session.is_none() {
                let target = self.schedule.target_volume();
                self.begin_session(SessionKind::Scheduled, now, Some(target));
                report.started = Some(SessionKind::Scheduled);

                #[cfg(feature = "debug-mode")]
                defmt::info!("Scheduled watering started, target {} ml", target);
            } else {
                #[cfg(feature = "debug-mode")]
                defmt::warn!("Scheduled trigger refused, valve busy");
            }
        }

        if self.flow.maybe_persist(&mut self.store).is_err() {
            #[cfg(feature = "debug-mode")]
            defmt::warn!("Failed to persist total");
        }

        report
    }

    pub fn state(&self) -> WateringState {
        match (self.session, self.schedule.enabled()) {
            (Some(session), _) => WateringState::Watering(session.kind),
            (None, true) => WateringState::Waiting,
            (None, false) => WateringState::Idle,
        }
    }

    pub fn schedule(&self) -> &ScheduleConfig {
        &self.schedule
    }

    pub fn flow(&self) -> &FlowMeter<'a> {
        &self.flow
    }

    pub fn is_valve_open(&self) -> bool {
        self.valve.is_open()
    }

    /// Volume delivered in the active session.
    pub fn delivered(&self) -> u64 {
        self.session
            .map(|s| self.flow.total_volume() - s.start_total)
            .unwrap_or(0)
    }

    /// Volume still to deliver in the active scheduled session.
    pub fn remaining(&self) -> Option<u32> {
        let target = self.session?.target?;
        Some(target.saturating_sub(self.delivered().min(target as u64) as u32))
    }

    pub fn status(&self) -> Status {
        Status {
            state: self.state(),
            schedule: self.schedule,
            current_rate: self.flow.current_rate(),
            total_volume: self.flow.total_volume(),
            delivered: self.delivered(),
            remaining: self.remaining(),
            valve_open: self.valve.is_open(),
        }
    }

    /// Releases the valve and the store.
    pub fn free(self) -> (Valve<V>, NvStore<S>) {
        (self.valve, self.store)
    }

    fn begin_session(&mut self, kind: SessionKind, now: DateTime, target: Option<u32>) {
        let Ok(()) = self.valve.open();
        self.flow.start();
        self.session = Some(Session {
            kind,
            started: now,
            start_total: self.flow.total_volume(),
            target,
        });
    }

    fn end_session(&mut self, now: DateTime, outcome: SessionOutcome) -> WateringRecord {
        let Ok(()) = self.valve.close();
        self.flow.stop();
        if self.flow.force_save(&mut self.store).is_err() {
            #[cfg(feature = "debug-mode")]
            defmt::warn!("Failed to persist total at session end");
        }

        let total = self.flow.total_volume();
        let (kind, started, volume) = match self.session.take() {
            Some(s) => (s.kind, s.started, total - s.start_total),
            None => (SessionKind::Manual, now, 0),
        };
        let record = WateringRecord {
            kind,
            outcome,
            started,
            ended: now,
            volume,
            total,
        };

        #[cfg(feature = "debug-mode")]
        defmt::info!("Watering ended: {}", record);

        record
    }

    fn persist_schedule(&mut self) {
        if self.store.save_schedule(&self.schedule).is_err() {
            #[cfg(feature = "debug-mode")]
            defmt::warn!("Failed to persist schedule");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Date, WallClock};
    use crate::testing::{MemStorage, RelayPin};
    use crate::valve::ActiveLevel;

    const UNIT: FlowConfig = FlowConfig {
        ml_per_pulse: 1,
        tick_secs: 1,
    };

    fn tod(h: u8, m: u8, s: u8) -> TimeOfDay {
        TimeOfDay::new(h, m, s).unwrap()
    }

    fn at(h: u8, m: u8, s: u8) -> DateTime {
        DateTime::new(Date::new(2025, 5, 27).unwrap(), tod(h, m, s))
    }

    fn pulse(counter: &PulseCounter, n: u16) {
        for _ in 0..n {
            counter.record();
        }
    }

    fn controller(
        counter: &PulseCounter,
        mem: MemStorage,
        now: TimeOfDay,
    ) -> WateringController<'_, RelayPin, MemStorage> {
        let valve = Valve::new(RelayPin::default(), ActiveLevel::High).unwrap();
        WateringController::init(valve, counter, UNIT, NvStore::new(mem), now)
    }

    /// Store holding an enabled schedule at `start` for `volume` ml.
    fn armed_store(start: TimeOfDay, volume: u32) -> MemStorage {
        let mut store = NvStore::new(MemStorage::zeroed());
        let mut config = ScheduleConfig::default();
        config.set(start, volume).unwrap();
        config.arm();
        store.save_schedule(&config).unwrap();
        store.free()
    }

    #[test]
    fn scheduled_session_completes_at_target() {
        let counter = PulseCounter::new();
        let mut c = controller(&counter, armed_store(tod(6, 0, 0), 100), tod(5, 59, 59));
        assert_eq!(c.state(), WateringState::Waiting);

        let report = c.tick(at(6, 0, 0));
        assert_eq!(report.started, Some(SessionKind::Scheduled));
        assert!(c.is_valve_open());

        for (secs, remaining) in [(1, 70), (2, 40), (3, 10)] {
            pulse(&counter, 30);
            let report = c.tick(at(6, 0, secs));
            assert!(report.record.is_none());
            assert_eq!(c.state(), WateringState::Watering(SessionKind::Scheduled));
            assert_eq!(c.remaining(), Some(remaining));
        }

        pulse(&counter, 30);
        let record = c.tick(at(6, 0, 4)).record.unwrap();
        assert_eq!(record.kind, SessionKind::Scheduled);
        assert_eq!(record.outcome, SessionOutcome::Completed);
        assert_eq!(record.volume, 120);
        assert_eq!(record.duration_secs(), 4);

        assert_eq!(c.state(), WateringState::Waiting);
        assert!(c.schedule().triggered_today());
        assert!(!c.is_valve_open());
        assert!(!c.flow().is_running());

        // The final total is on the store as soon as the session ends.
        let (_, store) = c.free();
        assert_eq!(store.free().total(), 120);
    }

    #[test]
    fn completion_overshoots_by_less_than_one_tick() {
        let counter = PulseCounter::new();
        let mut c = controller(&counter, armed_store(tod(6, 0, 0), 150), tod(5, 0, 0));
        c.tick(at(6, 0, 0));

        let per_tick = 37;
        let mut secs = 1;
        let record = loop {
            pulse(&counter, per_tick);
            if let Some(record) = c.tick(at(6, 0, secs)).record {
                break record;
            }
            secs += 1;
        };
        assert!(record.volume >= 150);
        assert!(record.volume < 150 + per_tick as u64);
    }

    #[test]
    fn boot_after_start_time_consumes_the_slot() {
        let counter = PulseCounter::new();
        let c = controller(&counter, armed_store(tod(6, 0, 0), 100), tod(7, 0, 0));
        assert!(c.schedule().triggered_today());

        let c = controller(&counter, armed_store(tod(6, 0, 0), 100), tod(5, 0, 0));
        assert!(!c.schedule().triggered_today());
    }

    #[test]
    fn triggers_at_most_once_per_day() {
        let counter = PulseCounter::new();
        let mut c = controller(&counter, armed_store(tod(6, 0, 0), 100), tod(0, 0, 0));
        let mut clock = WallClock::new(DateTime::new(Date::new(2025, 5, 27).unwrap(), tod(0, 0, 0)));

        let mut starts = 0;
        for _ in 0..2 * 24 * 3600 {
            clock.tick();
            pulse(&counter, 60);
            if c.tick(clock.now()).started.is_some() {
                starts += 1;
            }
            // The slot stays used until midnight.
            if clock.now().time == tod(12, 0, 0) {
                assert!(c.schedule().triggered_today());
            }
        }
        assert_eq!(starts, 2);
    }

    #[test]
    fn midnight_rearms_the_slot() {
        let counter = PulseCounter::new();
        let mut c = controller(&counter, armed_store(tod(6, 0, 0), 100), tod(23, 0, 0));
        assert!(c.schedule().triggered_today());
        c.tick(DateTime::new(Date::new(2025, 5, 28).unwrap(), TimeOfDay::MIDNIGHT));
        assert!(!c.schedule().triggered_today());
    }

    #[test]
    fn manual_start_is_refused_during_scheduled_session() {
        let counter = PulseCounter::new();
        let mut c = controller(&counter, armed_store(tod(6, 0, 0), 100), tod(5, 0, 0));
        c.tick(at(6, 0, 0));

        assert_eq!(c.start_manual(at(6, 0, 0)), Err(WateringError::Busy));
        assert_eq!(c.toggle_manual(at(6, 0, 0)), Err(WateringError::Busy));
        assert_eq!(c.state(), WateringState::Watering(SessionKind::Scheduled));
    }

    #[test]
    fn scheduled_trigger_is_refused_during_manual_session() {
        let counter = PulseCounter::new();
        let mut c = controller(&counter, armed_store(tod(6, 0, 0), 100), tod(5, 0, 0));
        c.start_manual(at(5, 59, 0)).unwrap();

        let report = c.tick(at(6, 0, 0));
        assert!(report.started.is_none());
        assert_eq!(c.state(), WateringState::Watering(SessionKind::Manual));
        assert!(!c.schedule().triggered_today());
        assert_eq!(c.remaining(), None);

        // Pin driven once at construction and once for the manual open.
        let (valve, _) = c.free();
        assert_eq!(valve.free().writes, 2);
    }

    #[test]
    fn manual_toggle_emits_a_record() {
        let counter = PulseCounter::new();
        let mut c = controller(&counter, MemStorage::with_total(1000), tod(8, 0, 0));

        assert_eq!(c.toggle_manual(at(8, 0, 0)), Ok(None));
        assert!(c.is_valve_open());
        pulse(&counter, 25);
        c.tick(at(8, 0, 1));
        pulse(&counter, 25);
        c.tick(at(8, 0, 2));

        let record = c.toggle_manual(at(8, 0, 2)).unwrap().unwrap();
        assert_eq!(record.kind, SessionKind::Manual);
        assert_eq!(record.outcome, SessionOutcome::Completed);
        assert_eq!(record.volume, 50);
        assert_eq!(record.total, 1050);
        assert!(!c.is_valve_open());
        assert_eq!(c.state(), WateringState::Idle);
    }

    #[test]
    fn stopping_the_schedule_aborts_the_session() {
        let counter = PulseCounter::new();
        let mut c = controller(&counter, armed_store(tod(6, 0, 0), 500), tod(5, 0, 0));
        c.tick(at(6, 0, 0));
        pulse(&counter, 40);
        c.tick(at(6, 0, 1));

        let record = c.stop_schedule(at(6, 0, 1)).unwrap();
        assert_eq!(record.outcome, SessionOutcome::Aborted);
        assert_eq!(record.volume, 40);
        assert_eq!(c.state(), WateringState::Idle);
        assert!(!c.is_valve_open());

        let (_, store) = c.free();
        let mut store = NvStore::new(store.free());
        assert!(!store.load_schedule().unwrap().enabled());
        assert_eq!(store.load_total().unwrap(), 40);
    }

    #[test]
    fn stop_schedule_leaves_manual_session_running() {
        let counter = PulseCounter::new();
        let mut c = controller(&counter, armed_store(tod(6, 0, 0), 100), tod(5, 0, 0));
        c.start_manual(at(5, 0, 0)).unwrap();
        assert!(c.stop_schedule(at(5, 0, 1)).is_none());
        assert_eq!(c.state(), WateringState::Watering(SessionKind::Manual));
    }

    #[test]
    fn configure_validates_and_persists() {
        let counter = PulseCounter::new();
        let mut c = controller(&counter, MemStorage::zeroed(), tod(5, 0, 0));

        assert_eq!(
            c.configure(tod(7, 30, 0), 10_000),
            Err(WateringError::Schedule(ScheduleError::VolumeOutOfRange(10_000)))
        );
        assert_eq!(c.state(), WateringState::Idle);

        c.configure(tod(7, 30, 0), 800).unwrap();
        assert_eq!(c.state(), WateringState::Waiting);

        let (_, store) = c.free();
        let c = controller(&counter, store.free(), tod(5, 0, 0));
        assert_eq!(c.schedule().start_time(), tod(7, 30, 0));
        assert_eq!(c.schedule().target_volume(), 800);
        assert!(c.schedule().enabled());
    }

    #[test]
    fn session_across_midnight_keeps_the_next_day() {
        let counter = PulseCounter::new();
        let mut c = controller(&counter, armed_store(tod(23, 59, 58), 100), tod(23, 0, 0));
        let mut clock = WallClock::new(at(23, 59, 57));

        let mut starts = 0;
        let mut records = 0;
        for _ in 0..24 * 3600 + 20 {
            clock.tick();
            pulse(&counter, 10);
            let report = c.tick(clock.now());
            if report.started.is_some() {
                starts += 1;
            }
            if report.record.is_some() {
                records += 1;
            }
        }
        assert_eq!(starts, 2);
        assert_eq!(records, 2);
    }

    #[test]
    fn reset_total_is_refused_during_a_session() {
        let counter = PulseCounter::new();
        let mut c = controller(&counter, armed_store(tod(6, 0, 0), 100), tod(5, 0, 0));
        c.tick(at(6, 0, 0));
        pulse(&counter, 90);
        c.tick(at(6, 0, 1));

        assert_eq!(c.reset_total(), Err(WateringError::Busy));
        assert_eq!(c.delivered(), 90);
        assert_eq!(c.remaining(), Some(10));

        let mut pumped = 90;
        let mut secs = 2;
        let record = loop {
            pulse(&counter, 30);
            pumped += 30;
            if let Some(record) = c.tick(at(6, 0, secs)).record {
                break record;
            }
            secs += 1;
        };
        assert_eq!(pumped, 120);
        assert_eq!(record.volume, 120);
        assert_eq!(record.total, 120);

        // Allowed again once the valve is closed.
        assert_eq!(c.reset_total(), Ok(()));
        assert_eq!(c.flow().total_volume(), 0);
    }

    #[test]
    fn reset_total_survives_reboot() {
        let counter = PulseCounter::new();
        let mut c = controller(&counter, MemStorage::with_total(4321), tod(5, 0, 0));
        c.reset_total().unwrap();
        assert_eq!(c.flow().total_volume(), 0);

        let (_, store) = c.free();
        let c = controller(&counter, store.free(), tod(5, 0, 0));
        assert_eq!(c.flow().total_volume(), 0);
    }
}
