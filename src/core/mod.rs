//! Core primitives.

pub mod rng;

pub use rng::DeterministicRng;
