//! Domain types and pure logic shared by the ImgStudio crates.
//!
//! Nothing in here performs I/O: the polling schedule, result
//! classification, and generation-form validation are plain functions so
//! they can be unit tested without a runtime.

pub mod error;
pub mod generation;
pub mod polling;
pub mod types;
