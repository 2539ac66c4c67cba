//! Centralized constants for the autoscaler.
//!
//! All project-wide constant values live here.
//! Change a value in one place and it applies everywhere.

pub mod autoscaler;
pub mod network;
pub mod paths;
pub mod state;
