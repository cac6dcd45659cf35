//! Pure staffing math. No I/O, no state beyond what a caller feeds in;
//! every function here is exercised directly by the strategy layer.

pub mod backlog_drain;
pub mod capacity;
pub mod littles_law;
pub mod trend;

pub use backlog_drain::workers_to_drain;
pub use capacity::{apply_global_cap, clamp_to_limits};
pub use littles_law::required_workers;
pub use trend::TrendPredictor;
