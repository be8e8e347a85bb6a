//! The asynchronous job engine.
//!
//! [`store`] is the single authority over job records and their state
//! machine. [`dispatcher`] owns admission control and runs inference on a
//! bounded worker pool. [`progress`] translates runner callbacks and
//! outcomes into store mutations with sanitized, caller-safe messages.

pub mod dispatcher;
pub mod progress;
pub mod store;
