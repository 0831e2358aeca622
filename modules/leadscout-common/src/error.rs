use thiserror::Error;

#[derive(Error, Debug)]
pub enum LeadScoutError {
    #[error("Configuration error: {0}")]
    Config(String),
}
