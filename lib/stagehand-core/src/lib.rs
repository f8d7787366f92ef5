//! Core primitives for managing the lifecycle of long-lived process components.
//!
//! Provides hierarchical service trees that start and stop nested services with explicit ordering, alongside a
//! bounded retry combinator for fallible asynchronous operations.
#![deny(warnings)]
#![deny(missing_docs)]

pub mod completion;
pub mod error;
pub mod retry;
pub mod service;
