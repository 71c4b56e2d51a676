//! Core engine: the fetch → extract → push loop.

pub mod scheduler;

pub use scheduler::{CycleReport, Scheduler, SchedulerState};
