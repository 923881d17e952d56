//! Core types shared across the pollwatch workspace.
//!
//! - Configuration structures ([`WatchConfig`], [`Config`])
//! - The configuration error type ([`ConfigError`])
//! - Fx-hashed path collections ([`PathMap`], [`PathSet`])

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod hash;

pub use config::{Config, WatchConfig};
pub use error::ConfigError;
pub use hash::{FxHashMap, FxHashSet, PathMap, PathSet, path_map_with_capacity};
