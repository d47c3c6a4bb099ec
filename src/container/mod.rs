//! MP4 container access: box helpers, the progressive-file reader and the
//! fragmented on-demand writer.

pub mod isobmff;
pub mod reader;
pub mod sample_table;
pub mod track;
pub mod writer;

pub use reader::open;
pub use track::{FourCC, MediaTrack, Mp4Track, Sample, SampleInfo};
pub use writer::{write, WriteOptions, WrittenRepresentation};
