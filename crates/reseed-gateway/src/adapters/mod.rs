//! Adapters for the reseed gateway.
//!
//! Concrete `Reseeder` implementations.

pub mod file_reseeder;

pub use file_reseeder::{peer_token, FileReseeder};
