//! Cascade Core
//!
//! Core domain types, traits, and error handling for the cascade build
//! scheduler. This crate has minimal dependencies and defines the shared
//! vocabulary used by the scheduler and the command-line interface.

pub mod change;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod ids;
pub mod ports;

pub use error::{ConfigError, Error, Result};
pub use ids::*;
