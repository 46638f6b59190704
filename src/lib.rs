//! Presence gateway library
//!
//! Shared by the coordinator, device and operator binaries and exposed for
//! integration testing.

pub mod domain;
pub mod infra;
pub mod io;
pub mod services;
