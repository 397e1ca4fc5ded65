//! Shared data model, error taxonomy, and collaborator traits for the
//! agentrt execution runtime.
//!
//! This crate has no opinion on how an LLM is called or how a tool actually
//! runs; it only fixes the shapes that cross the boundaries between the
//! Agent Core, Tool Pipeline, Event Queue, DLQ, and Circuit Breaker, so those
//! crates can depend on this one without depending on each other.

#![deny(missing_docs)]

pub mod data;
pub mod error;
pub mod traits;

pub use data::*;
pub use error::*;
pub use traits::*;
