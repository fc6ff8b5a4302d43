//! Job descriptors, instances and the on-disk protocol shared with job
//! processes (workspace, environment, console artifact, stage file).

pub mod console;
pub mod descriptor;
pub mod environment;
pub mod executor;
pub mod registry;
pub mod stage;
pub mod workspace;

pub use descriptor::{JobDescriptor, JobTable};
pub use registry::{CancelOutcome, JobRegistry, RunningJob};
