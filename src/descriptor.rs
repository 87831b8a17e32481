//! Representation descriptors supplied by the manifest model.

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// Media type of a representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum MediaType {
    Video,
    Audio,
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
        }
    }
}

/// Codec and timing parameters for one representation, extracted from the
/// manifest by the caller.
///
/// A descriptor is immutable for the lifetime of a streaming session; a
/// manifest refresh that changes codec parameters must produce a new
/// descriptor, never mutate one in place. Video-only and audio-only
/// attributes are explicit options: `width`/`height` apply to video tracks,
/// `channels`/`sampling_rate` to audio tracks. Absent audio attributes are
/// resolved from the codec-private data (or AAC-LC defaults) at descriptor
/// build time.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct RepresentationDescriptor {
    /// Representation id from the manifest (e.g. "video_0").
    pub id: String,
    /// Media type of the track.
    pub media_type: MediaType,
    /// RFC 6381 style codec string (e.g. "avc1.4d401f", "mp4a.40.2").
    pub codecs: String,
    /// Hex-encoded codec-private configuration blob.
    pub codec_private_data: String,
    /// Ticks per second for this representation's timeline.
    pub timescale: u32,
    /// Declared bandwidth in bits per second.
    pub bandwidth: u32,
    /// Zero-based track index within the manifest.
    pub track_index: u32,
    /// Frame width (video).
    pub width: Option<u32>,
    /// Frame height (video).
    pub height: Option<u32>,
    /// Channel count (audio).
    pub channels: Option<u16>,
    /// Sampling rate in Hz (audio).
    pub sampling_rate: Option<u32>,
}

impl RepresentationDescriptor {
    /// Track id used in synthesized moov boxes. Track ids are 1-based.
    pub fn track_id(&self) -> u32 {
        self.track_index + 1
    }
}
