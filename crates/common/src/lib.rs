//! Helpers shared by the cloudmon crates.

pub mod context;

pub use context::FromMessage;
