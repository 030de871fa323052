//! Ports for the reseed gateway.

pub mod outbound;

pub use outbound::{Clock, Reseeder, SystemClock};
