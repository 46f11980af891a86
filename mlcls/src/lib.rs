//! Dataset building blocks for multi-label image classification.

mod common;
pub mod dataset;
