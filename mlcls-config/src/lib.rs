//! Run configuration of multi-label classification experiments.

mod common;
pub mod config;
pub mod unit;

pub use config::*;
pub use unit::*;
