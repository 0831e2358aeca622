pub mod events;
pub mod handle;
pub mod icp;
pub mod infra;
pub mod lexicon;
pub mod pipeline;
pub mod suggestions;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;

pub use events::{EventSink, RunEvent};
pub use pipeline::{RunController, RunOutcome, RunRequest};
