//! # playframe-cli
//!
//! Command-line interface for the PlayFrame scene orchestrator.
//!
//! ## Commands
//!
//! - `playframe run <message>` runs one request and streams its events
//! - `playframe chat` resumes one conversation turn after turn
//! - `playframe scenes` lists the configured scenes and their functions
//! - `playframe config` prints the effective configuration
//! - `playframe doctor` validates the configuration and model clients

pub mod commands;

pub use commands::Cli;
