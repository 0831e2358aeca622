pub mod mirror;
pub mod spend;
pub mod store;
