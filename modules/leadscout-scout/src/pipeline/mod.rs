pub mod classifier;
pub mod controller;
pub mod exclusion;
pub mod executor;
pub mod ledger;
pub mod planner;
pub mod stats;
pub mod surface;

pub use controller::{RunController, RunOutcome, RunRequest};
