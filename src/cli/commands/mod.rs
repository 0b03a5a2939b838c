//! CLI command implementations.

pub mod providers;
pub mod run;
pub mod validate;
