//! # Prospect Common Library
//!
//! Shared code for the prospect workspace:
//! - Error and result types
//! - Configuration file resolution and TOML helpers
//! - Timestamp utilities

pub mod config;
pub mod error;
pub mod time;

pub use error::{Error, Result};
