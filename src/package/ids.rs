//! Run-wide representation identifiers.

use crate::container::FourCC;
use crate::error::{PackagerError, Result};

/// Hands out `v1`, `v2`, ... for video and `a1`, `a2`, ... for audio, in
/// request order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifierAllocator {
    video: u32,
    audio: u32,
}

impl IdentifierAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next identifier for a representation whose primary track has
    /// `handler`.
    pub fn allocate(&mut self, handler: FourCC) -> Result<String> {
        let (prefix, counter) = match handler.as_bytes() {
            b"vide" => ("v", &mut self.video),
            b"soun" => ("a", &mut self.audio),
            _ => return Err(PackagerError::UnsupportedHandler(handler.to_string())),
        };
        *counter += 1;
        Ok(format!("{}{}", prefix, counter))
    }
}
