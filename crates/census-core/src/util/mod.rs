//! Utility modules.
//!
//! # Modules
//!
//! - [`ids`]: Dataset id derivation and catalog URLs

pub mod ids;
