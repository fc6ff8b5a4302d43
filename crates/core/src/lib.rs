//! Job lifecycle and live-status engine for the bacillus CI service.
//!
//! The engine launches external build/test scripts as tracked, cancellable
//! job instances and derives an approximately-live view of their status from
//! an append-only run log plus the in-memory registry of running instances.
//! There is no database: everything durable is a plain file.
//!
//! The [`engine::Engine`] context object owns all shared state (job table,
//! registry, run log) and is constructed once at startup.

pub mod engine;
pub mod error;
pub mod hook;
pub mod jobs;
pub mod params;
pub mod runlog;
pub mod types;
