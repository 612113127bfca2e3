//! Checklist-item completion and pipeline automation engine for recruit onboarding.
//!
//! The [`checklist`] module owns per-recruit progress through heterogeneous checklist
//! items and raises lifecycle events; the [`automation`] module turns those events (and
//! scheduler sweeps) into notification dispatch requests for the configured recipients.

pub mod automation;
pub mod checklist;
pub mod config;
pub mod contacts;
pub mod error;
pub mod telemetry;
