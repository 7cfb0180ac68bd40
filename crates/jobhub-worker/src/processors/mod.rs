//! Built-in record processor implementations.

pub mod payload;

pub use payload::PayloadProcessor;
