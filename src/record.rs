//! Watering session records.

use core::fmt;

use crate::clock::DateTime;

/// What started a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionKind {
    /// Started from the manual button
    Manual,
    /// Started by the daily schedule
    Scheduled,
}

/// How a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionOutcome {
    /// Target reached, or a manual session stopped by the operator
    Completed,
    /// Scheduled session cut short by disabling the schedule
    Aborted,
}

/// One finished watering session, emitted once and then dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WateringRecord {
    pub kind: SessionKind,
    pub outcome: SessionOutcome,
    pub started: DateTime,
    pub ended: DateTime,
    /// Volume delivered during the session, ml
    pub volume: u64,
    /// Lifetime total when the session ended, ml
    pub total: u64,
}

impl WateringRecord {
    pub fn duration_secs(&self) -> u32 {
        self.ended.seconds_since(&self.started)
    }
}

impl fmt::Display for WateringRecord {
    /// `REC AUTO DONE 2025-05-27 06:00:01 -> 2025-05-27 06:00:05 dur=0:04 vol=120ml total=5120ml`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            SessionKind::Manual => "MANUAL",
            SessionKind::Scheduled => "AUTO",
        };
        let outcome = match self.outcome {
            SessionOutcome::Completed => "DONE",
            SessionOutcome::Aborted => "ABORTED",
        };
        let secs = self.duration_secs();
        write!(
            f,
            "REC {} {} {} -> {} dur={}:{:02} vol={}ml total={}ml",
            kind,
            outcome,
            self.started,
            self.ended,
            secs / 60,
            secs % 60,
            self.volume,
            self.total
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Date, TimeOfDay};

    #[test]
    fn renders_one_line() {
        let day = Date::new(2025, 5, 27).unwrap();
        let record = WateringRecord {
            kind: SessionKind::Scheduled,
            outcome: SessionOutcome::Completed,
            started: DateTime::new(day, TimeOfDay::new(6, 0, 1).unwrap()),
            ended: DateTime::new(day, TimeOfDay::new(6, 2, 5).unwrap()),
            volume: 120,
            total: 5120,
        };
        assert_eq!(record.duration_secs(), 124);
        assert_eq!(
            record.to_string(),
            "REC AUTO DONE 2025-05-27 06:00:01 -> 2025-05-27 06:02:05 dur=2:04 vol=120ml total=5120ml"
        );
    }
}
