pub mod accounts;
pub mod catalog;
pub mod config;
pub mod error;
pub mod ledger;
pub mod market;
pub mod model;
pub mod orders;
pub mod record;
pub mod reporting;
pub mod schema;
pub mod store;
pub mod telemetry;
pub mod utils;

pub use error::{ErrorKind, MarketError, Result};
pub use market::Marketplace;
