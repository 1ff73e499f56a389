//! Relay daemon library
//!
//! This module re-exports the daemon's modules for integration testing.

pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod producer;
pub mod source;
