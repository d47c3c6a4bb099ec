//! DASH manifest: document model, construction, normalization and
//! serialization.

pub mod builder;
pub mod codec;
pub mod model;
pub mod optimizer;
pub mod writer;

pub use builder::build_manifest;
pub use model::Mpd;
pub use optimizer::optimize;
pub use writer::{save, to_xml};
