// src/core/warden/mod.rs

//! The facility's auto-SCRAM safety supervisor (spec.md §4.6). Grounded on
//! the teacher's `core::warden` sentinel — where the teacher watches a
//! monitored master for subjective/objective-down conditions and triggers
//! a latched failover, this module watches the facility for any of six
//! fixed-priority trip conditions and triggers a latched, one-shot
//! `scram_all` broadcast to every linked PLC.

pub mod reasons;
pub mod supervisor;

pub use reasons::{MATRIX_FILL_THRESHOLD, RADIATION_TRIP_THRESHOLD, ScramReason, evaluate};
pub use supervisor::{SafetySupervisor, ScramSink};
