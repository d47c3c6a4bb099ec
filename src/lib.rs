//! DASH on-demand packager
//!
//! Classifies the tracks of MP4 inputs, combines base and enhancement video
//! layers into single representations (optionally CENC-encrypting one
//! layer), writes each representation as a fragmented MP4 file and
//! describes the package in an MPD manifest.

pub mod api;
pub mod config;
pub mod container;
pub mod crypto;
pub mod error;
pub mod manifest;
pub mod package;
pub mod representation;

#[cfg(test)]
pub(crate) mod tests;

pub use api::*;
pub use config::PackagerConfig;
pub use error::{ContainerError, PackagerError, Result};
