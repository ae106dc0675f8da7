//! Zeyple Common - Shared types and configuration
//!
//! This crate provides the configuration, error type and key/address types
//! shared by the Zeyple filter core and its entry point.

pub mod config;
pub mod error;
pub mod types;

pub use crate::config::Config;
pub use crate::error::{Error, Result};
