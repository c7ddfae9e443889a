//! msgplane standard controller library.
//!
//! This crate primarily ships a `standard-controller` binary, but exposes a
//! small library surface for integration testing and reuse.

pub mod api;
pub mod config;
pub mod controller;
pub mod memory;
pub mod plans;
pub mod status;
