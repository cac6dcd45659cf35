pub mod decision;
pub mod metrics;
pub mod queue;
