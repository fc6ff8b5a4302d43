//! The run log: durable, append-only record of job launches and completions,
//! plus the per-request live rendering of its tail.

pub mod line;
pub mod reconcile;
pub mod writer;

pub use line::IndicatorStyle;
pub use reconcile::{render, LiveJobs, MAX_RENDER_WINDOW};
pub use writer::RunLog;
