//! Media inspection via ffprobe, with a per-path cache.

mod cache;
mod error;
mod ffprobe;
mod types;

pub use cache::ProbeCache;
pub use error::ProbeError;
pub use ffprobe::FfprobeProber;
pub use types::{MediaInfo, MediaProber, StreamInfo, StreamKind};
