pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, SearchSurfaceKind};
pub use error::LeadScoutError;
pub use types::*;
