pub mod config;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod recommend;
pub mod search;
pub mod unify;

pub use error::{EdError, Result};

/// Package version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
