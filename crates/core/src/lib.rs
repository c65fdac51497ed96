//! Live-stream perception pipeline: frame decoding, detector fan-out,
//! detection fusion and per-session identity caching.

pub mod decoding;
pub mod detection;
pub mod identity;
pub mod pipeline;
pub mod shared;
