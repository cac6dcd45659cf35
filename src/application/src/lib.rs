pub mod engine;
pub mod sinks;
pub mod snapshot;
pub mod supervisor;

pub use snapshot::OutputData;
pub use supervisor::{AutoscaleManager, RunOutcome};
