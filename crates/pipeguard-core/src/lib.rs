pub mod config;
pub mod error;
pub mod fsutil;
pub mod ids;
pub mod types;

pub use config::{path_within, Settings};
pub use error::{PipeguardError, Result};
pub use types::*;
