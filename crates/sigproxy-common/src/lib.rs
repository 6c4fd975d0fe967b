//! # sigproxy-common
//!
//! Signing core for the sigproxy localhost proxy.
//!
//! This crate contains:
//! - The structured-field header parser (draft-ietf-httpbis-message-signatures-06)
//! - The signature material builder (covered components and the signature base)
//! - Private key loading and the request signer
//! - Shared header names and error definitions
//!
//! ## Architecture
//!
//! The signature base produced here is the contract that upstream verifiers
//! rely on. Any change to component normalisation, ordering or serialization
//! breaks every signature the proxy emits, so this crate is kept small and
//! covered by byte-exact tests.

pub mod error;
pub mod headers;
pub mod material;
pub mod signer;

// Re-export commonly used items at crate root
pub use error::{Result, SigningError};
pub use material::Material;
pub use signer::{Signer, SigningKey};
