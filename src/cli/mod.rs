//! Command line interface module
//!
//! This module provides argument parsing, settings resolution from arguments and
//! environment, and the runner that drives the canonicalization pipeline.

pub mod args;
pub mod config;
pub mod runner;

pub use args::Args;
pub use config::Settings;
pub use runner::Runner;
