//! Request handlers, grouped by the area they serve.
//!
//! Handlers are thin: they translate requests into [`bacillus_core::engine::Engine`]
//! calls and engine results into responses.

pub mod admin;
pub mod console;
pub mod jobs;
pub mod runlog;
