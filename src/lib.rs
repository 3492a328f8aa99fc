pub mod apis;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod infra;
pub mod logging;
pub mod metrics;
pub mod pipeline;

pub use error::{EtlError, Result};
