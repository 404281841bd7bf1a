//! Core logic for the plant-watering valve controller.
//!
//! # Overview
//!
//! The controller measures water flow by counting sensor pulses, drives a
//! relay-controlled valve, keeps the cumulative volume in an I2C EEPROM and
//! waters either on a button press or once a day at a configured time for a
//! configured volume.
//!
//! Everything in this crate is hardware-agnostic: pins, storage and the I2C
//! bus come in through `embedded-hal` and `embedded-storage` traits, so the
//! same code runs in the firmware and in host tests.
//!
//! # Tick Ordering
//!
//! Once per second the firmware calls [`app::App::tick`], which in order:
//!
//! 1. advances the wall clock
//! 2. samples and clears the pulse counter, adding the volume to the total
//! 3. evaluates scheduler transitions (trigger, completion, midnight re-arm)
//! 4. persists the total if the save policy says so
//! 5. advances the display rotation
//!
//! # Module Organization
//!
//! - [`flow`] - Pulse counter and flow accounting engine
//! - [`controller`] - Watering state machine and valve arbitration
//! - [`schedule`] - Daily schedule configuration and parameter editing
//! - [`storage`] - Persisted layout on top of a byte-addressable store
//! - [`eeprom`] - AT24C02 I2C EEPROM driver
//! - [`valve`] - Relay output with configurable polarity
//! - [`clock`] - Wall clock and calendar
//! - [`record`] - Watering session records
//! - [`display`] - Display state and frame rendering
//! - [`command`] - Serial line assembly, parsing and replies
//! - [`app`] - Ties the above together behind tick/command/key entry points

#![cfg_attr(not(test), no_std)]

pub mod app;
pub mod clock;
pub mod command;
pub mod controller;
pub mod display;
pub mod eeprom;
pub mod flow;
pub mod record;
pub mod schedule;
pub mod storage;
pub mod valve;

#[cfg(test)]
pub(crate) mod testing;
