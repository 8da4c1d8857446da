pub mod common;
pub mod server;

pub type Error = crate::common::error::AmpliqError;
pub type Result<T> = std::result::Result<T, Error>;

/// Commonly used map type.
pub type Map<K, V> = std::collections::HashMap<K, V>;

pub const AMPLIQ_VERSION: &str = env!("CARGO_PKG_VERSION");
