//! Shared foundational types for the Tock cycle simulator.
//!
//! This crate provides the [`Value`] type carried by every signal and
//! register: either a concrete payload or the [`Unknown`](Value::Unknown)
//! marker for a value the simulation has not determined yet.

#![warn(missing_docs)]

pub mod value;

pub use value::Value;
