//! Application crate for the sigproxy binary.
//!
//! The binary in `main.rs` is a thin wrapper; the modules here carry the
//! behavior so the integration tests under `tests/` can drive the proxy and
//! the tunnel manager in-process.

pub mod cli;
pub mod config;
pub mod console;
pub mod proxy;
pub mod tunnel;
