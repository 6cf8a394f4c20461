//! Energy budget controller.
//!
//! Keeps the energy drawn in each budget period (by default the clock hour)
//! under a cap by curtailing low-priority loads when the projection runs
//! over, and restoring them once margin reopens.
//!
//! The [`regulation`] module is the pure decision core. [`controller`] wires
//! it to the [`hardware`] seams on a periodic tick.

pub mod config;
pub mod controller;
pub mod domain;
pub mod hardware;
pub mod regulation;
pub mod telemetry;
