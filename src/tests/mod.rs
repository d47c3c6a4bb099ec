//! Pipeline tests over synthesized MP4 inputs.

pub mod fixtures;
