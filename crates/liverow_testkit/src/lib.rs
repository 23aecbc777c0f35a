//! # LiveRow Testkit
//!
//! Test fixtures and integration helpers for LiveRow.
//!
//! This crate provides:
//! - Fixture entity types exercising every descriptor feature
//! - Engine constructors over the embedded store and cache
//! - Bounded-polling helpers for observing cross-thread effects
//!
//! The heavyweight cross-crate scenarios live in the `integration` module's
//! tests.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod integration;

pub use fixtures::*;
pub use integration::*;
