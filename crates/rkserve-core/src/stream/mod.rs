//! Live classification of generator output.
//!
//! Fragments flow through three stages: [`Utf8Assembler`] turns bytes into
//! whole characters, [`StreamDemultiplexer`] splits text into content and
//! thinking segments, and [`SegmentStream`] drives both from an async
//! fragment stream while holding the request's resources.

mod demux;
mod segments;
mod utf8;

pub use demux::StreamDemultiplexer;
pub use segments::SegmentStream;
pub use utf8::Utf8Assembler;
