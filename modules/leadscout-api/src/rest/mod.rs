pub mod history;
pub mod scrape;

pub use history::{api_queries, api_suggestions};
pub use scrape::{api_scrape, api_scrape_stop};
