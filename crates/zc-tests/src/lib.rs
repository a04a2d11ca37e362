//! # zc-tests
//!
//! Integration tests for the zerocoin state tracker.
//!
//! This crate provides:
//! - State tests for coin groups, accumulators and witnesses
//! - Connect tests for block validation, rollback and rebuild
//! - Property-based tests over random block histories

pub mod generators;
pub mod harness;




pub use generators::*;
pub use harness::*;
