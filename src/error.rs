use std::path::PathBuf;

use thiserror::Error;

use crate::representation::TrackClass;

/// Main error type for the packager
#[derive(Error, Debug)]
pub enum PackagerError {
    /// An input path does not carry the `.mp4` extension
    #[error("Only MP4 files are supported as input: {}", .0.display())]
    InputFormat(PathBuf),

    /// More than one track of a recognized class in a single input
    #[error("Only one {class} track allowed per input ({})", path.display())]
    DuplicateTrack { class: TrackClass, path: PathBuf },

    /// A video layer track was found without its counterpart layer
    #[error("Only combined tracks are supported momentarily: lone {class} track in {}", path.display())]
    UnsupportedLayerSplit { class: TrackClass, path: PathBuf },

    /// An input did not produce a single representation
    #[error("No representation has been created for {}", .0.display())]
    NoRepresentation(PathBuf),

    /// A representation's primary track has a handler we cannot name
    #[error("Unsupported handler type: {0}")]
    UnsupportedHandler(String),

    /// The output directory is missing and could not be created
    #[error("Output directory does not exist and cannot be created: {}", .0.display())]
    OutputDirectory(PathBuf),

    /// A standard I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Box-level decode/encode failure
    #[error("Container error: {0}")]
    Container(#[from] ContainerError),

    /// Invalid key material or cipher failure
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Manifest construction or serialization failure
    #[error("Manifest error: {0}")]
    Manifest(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PackagerError {
    /// Process exit status for this failure. Every reason maps to its own
    /// non-zero value; success is 0.
    pub fn exit_code(&self) -> i32 {
        match self {
            PackagerError::InputFormat(_) => 2,
            PackagerError::DuplicateTrack { .. } => 3,
            PackagerError::UnsupportedLayerSplit { .. } => 4,
            PackagerError::NoRepresentation(_) => 5,
            PackagerError::UnsupportedHandler(_) => 6,
            PackagerError::OutputDirectory(_) => 7,
            PackagerError::Io(_) => 8,
            PackagerError::Container(_) => 9,
            PackagerError::Encryption(_) => 10,
            PackagerError::Manifest(_) => 11,
            PackagerError::Config(_) => 12,
        }
    }
}

/// ISOBMFF-specific errors
#[derive(Error, Debug)]
pub enum ContainerError {
    /// The file has no movie box
    #[error("No moov box found in {0}")]
    MissingMoov(String),

    /// A mandatory child box is absent
    #[error("Missing {child} box in {parent}")]
    MissingBox {
        parent: &'static str,
        child: &'static str,
    },

    /// A box is shorter than its fixed fields
    #[error("Truncated {0} box")]
    Truncated(&'static str),

    /// A box header declares a size that does not fit its parent
    #[error("Invalid box size {size} at offset {offset}")]
    InvalidBoxSize { offset: u64, size: u64 },

    /// Sample tables disagree with each other
    #[error("Inconsistent sample table: {0}")]
    SampleTable(String),

    /// A sample index beyond the track's sample count
    #[error("Sample {index} out of range for track {track_id}")]
    SampleOutOfRange { track_id: u32, index: usize },
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, PackagerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct() {
        let errors = vec![
            PackagerError::InputFormat(PathBuf::from("clip.mov")),
            PackagerError::DuplicateTrack {
                class: TrackClass::Audio,
                path: PathBuf::from("a.mp4"),
            },
            PackagerError::UnsupportedLayerSplit {
                class: TrackClass::BaseVideo,
                path: PathBuf::from("a.mp4"),
            },
            PackagerError::NoRepresentation(PathBuf::from("a.mp4")),
            PackagerError::UnsupportedHandler("text".to_string()),
            PackagerError::OutputDirectory(PathBuf::from("/out")),
            PackagerError::Io(std::io::Error::new(std::io::ErrorKind::Other, "x")),
            PackagerError::Container(ContainerError::Truncated("mdhd")),
            PackagerError::Encryption("bad key".to_string()),
            PackagerError::Manifest("x".to_string()),
            PackagerError::Config("x".to_string()),
        ];

        let mut codes: Vec<i32> = errors.iter().map(|e| e.exit_code()).collect();
        assert!(codes.iter().all(|&c| c != 0));
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_duplicate_track_message_names_class() {
        let err = PackagerError::DuplicateTrack {
            class: TrackClass::EnhancementVideo,
            path: PathBuf::from("in.mp4"),
        };
        assert!(err.to_string().contains("dvhe"));
    }
}
