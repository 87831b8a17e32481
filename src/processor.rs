//! Fragment processing orchestration.
//!
//! The processor validates inbound fragment-processing calls, parses the
//! fragment, applies live timeline correction, and hands the (possibly
//! patched) buffer onward. Collaborators are injected at construction: an
//! error sink for structured error events and a playback clock for
//! live-edge observability. The processor holds no per-fragment state, so
//! concurrent calls are safe as long as descriptors stay immutable.

use crate::descriptor::RepresentationDescriptor;
use crate::fmp4::synthesize_init_segment;
use crate::live::correct_timeline;
use crate::mp4::parse;
use crate::{Error, Result};

/// Receives structured error events. Each report is a single atomic emit;
/// implementations must tolerate concurrent reports.
pub trait ErrorSink: Send + Sync {
    fn report(&self, code: u32, message: &str);
}

/// Error sink that forwards reports to the `tracing` error level.
#[derive(Debug, Default)]
pub struct LogErrorSink;

impl ErrorSink for LogErrorSink {
    fn report(&self, code: u32, message: &str) {
        tracing::error!(code, message, "fragment processing error");
    }
}

/// Query for the current playback position, in seconds.
pub trait PlaybackClock: Send + Sync {
    fn current_time(&self) -> f64;
}

/// Discriminates the two inbound segment request kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentType {
    Initialization,
    Media,
}

/// The request half of a fragment-processing call.
#[derive(Debug, Clone)]
pub struct FragmentRequest {
    pub segment_type: SegmentType,
    /// Required for media segments; init-segment requests carry none.
    pub representation: Option<RepresentationDescriptor>,
}

/// A fragment-processing call. Both halves are optional so that caller
/// contract violations are detected here, explicitly, before any byte of
/// the response is read.
#[derive(Debug, Clone, Default)]
pub struct FragmentEvent {
    pub request: Option<FragmentRequest>,
    pub response: Option<Vec<u8>>,
}

/// Terminal state of a fragment-processing call.
#[derive(Debug)]
pub enum FragmentOutcome {
    /// The (possibly patched) buffer, ready for the playback pipeline.
    Forwarded(Vec<u8>),
    /// The fragment was dropped whole; the error has also been reported to
    /// the sink. Retry policy belongs to the external scheduler.
    Dropped(Error),
}

impl FragmentOutcome {
    pub fn is_forwarded(&self) -> bool {
        matches!(self, Self::Forwarded(_))
    }
}

/// Transmuxes Smooth Streaming fragments for one streaming session.
pub struct FragmentProcessor<S, C> {
    error_sink: S,
    clock: C,
    is_live: bool,
}

impl<S: ErrorSink, C: PlaybackClock> FragmentProcessor<S, C> {
    /// Create a processor for a session. `is_live` comes from the
    /// manifest's live/on-demand flag.
    pub fn new(error_sink: S, clock: C, is_live: bool) -> Self {
        Self {
            error_sink,
            clock,
            is_live,
        }
    }

    /// Process one fragment-processing call.
    ///
    /// Errors terminate the call: the error is reported to the sink with
    /// its stable code and no buffer is forwarded. Fragments are never
    /// partially forwarded.
    pub fn process_fragment(&self, event: FragmentEvent) -> FragmentOutcome {
        match self.try_process(event) {
            Ok(buf) => FragmentOutcome::Forwarded(buf),
            Err(err) => {
                self.error_sink.report(err.code(), &err.to_string());
                tracing::warn!(code = err.code(), error = %err, "fragment dropped");
                FragmentOutcome::Dropped(err)
            }
        }
    }

    /// Synthesize the initialization segment for a representation. This is
    /// an independent call path, invoked once per representation before any
    /// of its media fragments can be appended.
    pub fn generate_init_segment(&self, rep: &RepresentationDescriptor) -> Result<Vec<u8>> {
        match synthesize_init_segment(rep) {
            Ok(segment) => Ok(segment.data),
            Err(err) => {
                self.error_sink.report(err.code(), &err.to_string());
                Err(err)
            }
        }
    }

    fn try_process(&self, event: FragmentEvent) -> Result<Vec<u8>> {
        // Validate the call object before touching any response byte.
        let request = event.request.ok_or(Error::InvalidCallArguments)?;
        let mut response = event.response.ok_or(Error::InvalidCallArguments)?;
        if request.segment_type == SegmentType::Media && request.representation.is_none() {
            return Err(Error::InvalidCallArguments);
        }

        let atoms = parse(&response)?;

        match request.segment_type {
            // Initialization segments carry no fragment timeline; pass
            // them through untouched.
            SegmentType::Initialization => Ok(response),
            SegmentType::Media => {
                let rep = request
                    .representation
                    .as_ref()
                    .ok_or(Error::InvalidCallArguments)?;

                let info = correct_timeline(&atoms, &mut response, self.is_live)?;

                if let Some(info) = info {
                    if rep.timescale > 0 {
                        let edge_secs =
                            info.fragment_absolute_time as f64 / rep.timescale as f64;
                        let latency = edge_secs - self.clock.current_time();
                        tracing::debug!(
                            representation = %rep.id,
                            live_edge_secs = edge_secs,
                            latency_secs = latency,
                            "live timeline corrected"
                        );
                    }
                }

                Ok(response)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::codes;
    use crate::descriptor::MediaType;
    use crate::test_support::{moof_fragment, FragmentSpec};
    use assert_matches::assert_matches;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        reports: Mutex<Vec<(u32, String)>>,
    }

    impl ErrorSink for RecordingSink {
        fn report(&self, code: u32, message: &str) {
            self.reports.lock().unwrap().push((code, message.into()));
        }
    }

    struct FixedClock(f64);

    impl PlaybackClock for FixedClock {
        fn current_time(&self) -> f64 {
            self.0
        }
    }

    fn processor(is_live: bool) -> FragmentProcessor<RecordingSink, FixedClock> {
        FragmentProcessor::new(RecordingSink::default(), FixedClock(0.0), is_live)
    }

    fn video_rep() -> RepresentationDescriptor {
        RepresentationDescriptor {
            id: "video_0".into(),
            media_type: MediaType::Video,
            codecs: "avc1.4d401f".into(),
            codec_private_data: "1000".into(),
            timescale: 10_000_000,
            bandwidth: 1_000_000,
            track_index: 0,
            width: Some(1280),
            height: Some(720),
            channels: None,
            sampling_rate: None,
        }
    }

    fn media_event(buf: Vec<u8>) -> FragmentEvent {
        FragmentEvent {
            request: Some(FragmentRequest {
                segment_type: SegmentType::Media,
                representation: Some(video_rep()),
            }),
            response: Some(buf),
        }
    }

    #[test]
    fn test_missing_event_halves_are_invalid_arguments() {
        let p = processor(true);

        let outcome = p.process_fragment(FragmentEvent::default());
        assert_matches!(outcome, FragmentOutcome::Dropped(Error::InvalidCallArguments));

        let outcome = p.process_fragment(FragmentEvent {
            request: Some(FragmentRequest {
                segment_type: SegmentType::Media,
                representation: Some(video_rep()),
            }),
            response: None,
        });
        assert_matches!(outcome, FragmentOutcome::Dropped(Error::InvalidCallArguments));

        let reports = p.error_sink.reports.lock().unwrap();
        assert!(reports
            .iter()
            .all(|(code, _)| *code == codes::INVALID_CALL_ARGUMENTS));
        assert_eq!(reports.len(), 2);
    }

    #[test]
    fn test_media_request_without_representation_is_invalid() {
        let p = processor(false);
        let outcome = p.process_fragment(FragmentEvent {
            request: Some(FragmentRequest {
                segment_type: SegmentType::Media,
                representation: None,
            }),
            response: Some(moof_fragment(&FragmentSpec::default())),
        });
        assert_matches!(outcome, FragmentOutcome::Dropped(Error::InvalidCallArguments));
    }

    #[test]
    fn test_malformed_buffer_is_dropped() {
        let p = processor(false);
        // Declared size runs past the end of the buffer.
        let bogus = vec![0x00, 0x00, 0x01, 0x00, b'm', b'o', b'o', b'f'];
        let outcome = p.process_fragment(media_event(bogus));
        assert_matches!(outcome, FragmentOutcome::Dropped(Error::MalformedContainer(_)));
        let reports = p.error_sink.reports.lock().unwrap();
        assert_eq!(reports[0].0, codes::MALFORMED_CONTAINER);
    }

    #[test]
    fn test_live_fragment_without_tfrf_is_dropped_with_stable_code() {
        let p = processor(true);
        let buf = moof_fragment(&FragmentSpec {
            with_tfrf: false,
            ..Default::default()
        });
        let outcome = p.process_fragment(media_event(buf));
        assert_matches!(outcome, FragmentOutcome::Dropped(Error::MissingLiveTimelineData));
        let reports = p.error_sink.reports.lock().unwrap();
        assert_eq!(reports[0].0, codes::MISSING_LIVE_TIMELINE_DATA);
    }

    #[test]
    fn test_live_fragment_with_tfrf_is_forwarded_patched() {
        let p = processor(true);
        let buf = moof_fragment(&FragmentSpec {
            decode_time: 1000,
            tfrf_entries: &[(5000, 100)],
            ..Default::default()
        });
        let outcome = p.process_fragment(media_event(buf));
        let FragmentOutcome::Forwarded(forwarded) = outcome else {
            panic!("expected forwarded fragment");
        };

        let atoms = crate::mp4::parse(&forwarded).unwrap();
        let tfdt = crate::mp4::find_atom(&atoms, crate::mp4::AtomType::TFDT).unwrap();
        assert_matches!(
            tfdt.fields,
            crate::mp4::AtomFields::Tfdt {
                base_media_decode_time: 5000,
                ..
            }
        );
        assert!(p.error_sink.reports.lock().unwrap().is_empty());
    }

    #[test]
    fn test_on_demand_fragment_forwarded_unchanged() {
        let p = processor(false);
        let buf = moof_fragment(&FragmentSpec {
            decode_time: 1000,
            with_tfrf: false,
            ..Default::default()
        });
        let original = buf.clone();
        let outcome = p.process_fragment(media_event(buf));
        let FragmentOutcome::Forwarded(forwarded) = outcome else {
            panic!("expected forwarded fragment");
        };
        assert_eq!(forwarded, original);
    }

    #[test]
    fn test_init_segment_bypasses_timeline_correction() {
        // A live session must still forward init segments without tfrf.
        let p = processor(true);
        let seg = crate::fmp4::synthesize_init_segment(&video_rep()).unwrap();
        let outcome = p.process_fragment(FragmentEvent {
            request: Some(FragmentRequest {
                segment_type: SegmentType::Initialization,
                representation: None,
            }),
            response: Some(seg.data.clone()),
        });
        let FragmentOutcome::Forwarded(forwarded) = outcome else {
            panic!("expected forwarded init segment");
        };
        assert_eq!(forwarded, seg.data);
    }

    #[test]
    fn test_generate_init_segment_reports_unsupported_codec() {
        let p = processor(false);
        let mut rep = video_rep();
        rep.codecs = "avc7.4d401f".into();
        let err = p.generate_init_segment(&rep).unwrap_err();
        assert_matches!(err, Error::UnsupportedCodec { .. });
        let reports = p.error_sink.reports.lock().unwrap();
        assert_eq!(reports[0].0, codes::UNSUPPORTED_CODEC);
    }
}
