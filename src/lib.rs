//! mss-transmux: Smooth Streaming fragment transmuxing
//!
//! This crate converts Smooth-Streaming-style media fragments into
//! standards-conformant fragmented-MP4 structures that a generic media
//! pipeline can consume. Sample bytes are opaque payload passed through
//! unmodified; only container headers are parsed, validated, and patched.
//!
//! # Modules
//!
//! - `mp4` - recursive atom parsing over in-memory fragment buffers
//! - `codec` - codec descriptors (avcC / esds) from manifest codec strings
//! - `fmp4` - deterministic initialization segment synthesis
//! - `live` - live timeline extraction and tfdt reconciliation
//! - `processor` - per-session orchestration with injected collaborators
//!
//! # Architecture
//!
//! Two independent call paths feed a playback pipeline:
//!
//! 1. Once per representation, [`fmp4::synthesize_init_segment`] builds the
//!    ftyp + moov a decoder needs before any media fragment, using codec
//!    parameters from the manifest (Smooth Streaming servers never deliver
//!    an init segment of their own).
//! 2. Per fragment, [`processor::FragmentProcessor::process_fragment`]
//!    parses the buffer, corrects the live timeline against the tfrf
//!    vendor box when the session is live, and forwards or drops the
//!    fragment. Errors carry stable codes (see [`error::codes`]) so the
//!    external scheduler can apply live-specific recovery.
//!
//! All operations are synchronous and free of I/O; fragments arrive fully
//! buffered and run to completion or failure.

pub mod codec;
pub mod descriptor;
pub mod error;
pub mod fmp4;
pub mod live;
pub mod mp4;
pub mod processor;

#[cfg(test)]
mod test_support;

pub use codec::CodecDescriptor;
pub use descriptor::{MediaType, RepresentationDescriptor};
pub use error::{Error, Result};
pub use fmp4::{synthesize_init_segment, InitSegment};
pub use live::{correct_timeline, fragment_info, LiveTimelineInfo};
pub use processor::{
    ErrorSink, FragmentEvent, FragmentOutcome, FragmentProcessor, FragmentRequest, LogErrorSink,
    PlaybackClock, SegmentType,
};
