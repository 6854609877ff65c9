//! Failsafe mechanisms: bounded admission for simulated delays

mod delay_gate;

pub use delay_gate::{DelayGate, DelayOutcome};
