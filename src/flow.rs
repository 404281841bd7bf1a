//! Flow accounting engine.
//!
//! Converts flow-sensor pulses into an instantaneous rate and a cumulative
//! total, and decides when the total is written to the non-volatile store.
//!
//! # Pulse Hand-off
//!
//! The edge interrupt only increments a [`PulseCounter`]. Once per tick the
//! engine takes the count with an atomic swap, so a pulse that lands between
//! the read and the clear is never lost.
//!
//! # Save Policy
//!
//! EEPROM writes take milliseconds and wear the chip, so the total is not
//! written every tick. It is saved:
//!
//! - immediately once the unsaved part reaches [`IMMEDIATE_SAVE_THRESHOLD`]
//! - otherwise every [`PERIODIC_SAVE_TICKS`] ticks, if anything changed
//! - on [`FlowMeter::force_save`], before power-sensitive transitions

use embedded_storage::Storage;
use portable_atomic::{AtomicU16, Ordering};

use crate::storage::NvStore;

/// Sensor calibration: volume represented by one pulse, in ml.
///
/// The sensor emits 5 pulses per litre.
pub const ML_PER_PULSE: u32 = 200;

/// Length of one sampling tick in seconds.
pub const TICK_SECS: u32 = 1;

/// Unsaved volume (ml) that triggers a save on the same tick.
pub const IMMEDIATE_SAVE_THRESHOLD: u64 = 50;

/// Ticks between periodic saves of a changed total.
pub const PERIODIC_SAVE_TICKS: u8 = 10;

/// Largest total, in ml. The running total stops growing here, and a
/// stored value above it is treated as corrupt at boot (an erased EEPROM
/// reads 0xFFFF_FFFF).
pub const TOTAL_VOLUME_CEILING: u64 = 999_999_999;

/// Ticks after [`FlowMeter::start`] before the display is told to refresh.
pub const INITIAL_REFRESH_TICKS: u8 = 2;

/// Pulse count shared between the edge interrupt and the tick.
pub struct PulseCounter {
    count: AtomicU16,
}

impl Default for PulseCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl PulseCounter {
    pub const fn new() -> Self {
        Self {
            count: AtomicU16::new(0),
        }
    }

    /// Counts one pulse. Safe to call from interrupt context.
    pub fn record(&self) {
        // Wraps at u16::MAX; the tick drains the counter long before that.
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the pulses since the last call and resets the count.
    pub fn take(&self) -> u16 {
        self.count.swap(0, Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.count.store(0, Ordering::Relaxed);
    }
}

/// Unit conversion for the flow sensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlowConfig {
    /// Volume per pulse in ml
    pub ml_per_pulse: u32,
    /// Seconds between [`FlowMeter::tick`] calls
    pub tick_secs: u32,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            ml_per_pulse: ML_PER_PULSE,
            tick_secs: TICK_SECS,
        }
    }
}

impl FlowConfig {
    /// Volume in ml represented by `pulses`.
    pub fn volume(&self, pulses: u16) -> u32 {
        pulses as u32 * self.ml_per_pulse
    }

    /// Rate in ml/min for `volume` delivered over one tick.
    pub fn rate_per_minute(&self, volume: u32) -> u32 {
        volume.saturating_mul(60) / self.tick_secs.max(1)
    }
}

/// Result of one sampling tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlowTick {
    /// Pulses accounted on this tick
    pub pulses: u16,
    /// Volume added to the total on this tick, in ml
    pub volume: u32,
    /// The initial refresh delay after start elapsed on this tick
    pub refresh_display: bool,
}

/// Flow accounting state.
///
/// `total_volume` only grows while running; stopping keeps it so accounting
/// can resume. The only way to lower it is [`FlowMeter::reset`].
pub struct FlowMeter<'a> {
    /// Counter filled by the pulse interrupt
    pulses: &'a PulseCounter,
    /// Pulse-to-volume conversion
    config: FlowConfig,
    /// Rate measured on the last tick, ml/min
    current_rate: u32,
    /// Lifetime volume, ml
    total_volume: u64,
    /// Value last written to the store
    last_persisted_volume: u64,
    /// Whether pulses are accounted
    running: bool,
    /// Ticks since the last periodic save window
    ticks_since_save: u8,
    /// Ticks left before the post-start display refresh
    refresh_countdown: u8,
}

impl<'a> FlowMeter<'a> {
    /// Restores the engine from the store at boot.
    ///
    /// A stored total above [`TOTAL_VOLUME_CEILING`] is considered corrupt:
    /// the total starts at zero and zero is written back. A failed read also
    /// starts at zero but leaves the store alone. The engine starts stopped.
    pub fn load<S: Storage>(
        pulses: &'a PulseCounter,
        config: FlowConfig,
        store: &mut NvStore<S>,
    ) -> Self {
        let total_volume = match store.load_total() {
            Ok(total) if u64::from(total) <= TOTAL_VOLUME_CEILING => u64::from(total),
            Ok(_total) => {
                #[cfg(feature = "debug-mode")]
                defmt::warn!("Stored total {} is implausible, resetting", _total);

                if store.save_total(0).is_err() {
                    #[cfg(feature = "debug-mode")]
                    defmt::warn!("Failed to rewrite stored total");
                }
                0
            }
            Err(_) => {
                #[cfg(feature = "debug-mode")]
                defmt::warn!("Failed to read stored total");

                0
            }
        };

        Self {
            pulses,
            config,
            current_rate: 0,
            total_volume,
            last_persisted_volume: total_volume,
            running: false,
            ticks_since_save: 0,
            refresh_countdown: 0,
        }
    }

    /// Starts accounting. No-op if already running.
    ///
    /// Pulses counted while stopped are discarded, and the display refresh
    /// countdown is armed so the new state shows within
    /// [`INITIAL_REFRESH_TICKS`] ticks.
    pub fn start(&mut self) {
        if self.running {
            return;
        }
        self.pulses.clear();
        self.current_rate = 0;
        self.running = true;
        self.refresh_countdown = INITIAL_REFRESH_TICKS;
    }

    /// Stops accounting. The total is kept.
    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Samples the pulse counter and updates rate and total.
    ///
    /// Must be called once per [`FlowConfig::tick_secs`]. The counter is
    /// drained on every tick; pulses only count while running.
    pub fn tick(&mut self) -> FlowTick {
        let pulses = self.pulses.take();

        let mut refresh_display = false;
        if self.refresh_countdown > 0 {
            self.refresh_countdown -= 1;
            refresh_display = self.refresh_countdown == 0;
        }

        if !self.running {
            self.current_rate = 0;
            return FlowTick {
                refresh_display,
                ..FlowTick::default()
            };
        }

        let volume = self.config.volume(pulses);
        self.current_rate = self.config.rate_per_minute(volume);
        self.total_volume = (self.total_volume + volume as u64).min(TOTAL_VOLUME_CEILING);

        FlowTick {
            pulses,
            volume,
            refresh_display,
        }
    }

    /// Applies the save policy. Returns whether the total was written.
    ///
    /// Call once per tick, after the scheduler has acted on the new total.
    pub fn maybe_persist<S: Storage>(&mut self, store: &mut NvStore<S>) -> Result<bool, S::Error> {
        self.ticks_since_save = self.ticks_since_save.saturating_add(1);
        let periodic = self.ticks_since_save >= PERIODIC_SAVE_TICKS;
        if periodic {
            self.ticks_since_save = 0;
        }

        if !self.has_unsaved_changes() {
            return Ok(false);
        }
        if periodic || self.unsaved_volume() >= IMMEDIATE_SAVE_THRESHOLD {
            self.save(store)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Writes the total now, regardless of the save policy.
    pub fn force_save<S: Storage>(&mut self, store: &mut NvStore<S>) -> Result<(), S::Error> {
        self.save(store)
    }

    /// Zeroes the total, the rate and any pending pulses, and persists zero.
    pub fn reset<S: Storage>(&mut self, store: &mut NvStore<S>) -> Result<(), S::Error> {
        self.pulses.clear();
        self.current_rate = 0;
        self.total_volume = 0;
        self.save(store)
    }

    pub fn current_rate(&self) -> u32 {
        self.current_rate
    }

    pub fn total_volume(&self) -> u64 {
        self.total_volume
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.total_volume != self.last_persisted_volume
    }

    /// Volume not yet reflected in the store.
    pub fn unsaved_volume(&self) -> u64 {
        self.total_volume.abs_diff(self.last_persisted_volume)
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    fn save<S: Storage>(&mut self, store: &mut NvStore<S>) -> Result<(), S::Error> {
        // Always fits: the total saturates at the ceiling.
        let stored = u32::try_from(self.total_volume).unwrap_or(u32::MAX);
        store.save_total(stored)?;
        self.last_persisted_volume = self.total_volume;
        self.ticks_since_save = 0;
        Ok(())
    }
}
