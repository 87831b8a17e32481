//! Codec descriptor construction from manifest codec parameters.
//!
//! Codec identification is an exact match of the four-character family code
//! at the start of the codec string against a closed allowlist (one video
//! family, one audio family). Codec identifiers are safety critical: a
//! one-character typo must fail loudly instead of silently producing a
//! corrupt decoder configuration, so there is no fuzzy or case-insensitive
//! matching.

use crate::descriptor::{MediaType, RepresentationDescriptor};
use crate::{Error, Result};
use bytes::{BufMut, BytesMut};

/// AVC family code (H.264).
const AVC_FAMILY: &str = "avc1";
/// AAC family code (MPEG-4 audio).
const AAC_FAMILY: &str = "mp4a";

/// Largest AudioSpecificConfig that fits the esds descriptor chain.
/// Descriptor payload lengths are encoded in a single byte, and the
/// enclosing ES descriptor adds 23 bytes around the config.
const MAX_AUDIO_SPECIFIC_CONFIG_LEN: usize = 232;

/// AudioSpecificConfig sampling frequency index table.
const AAC_SAMPLING_FREQUENCIES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// Decoder configuration for one supported codec family.
///
/// Constructed once per init-segment synthesis and discarded after use;
/// all bytes are copied out of the descriptor's codec-private data, so the
/// config may outlive the representation's parsing context.
#[derive(Debug, Clone, PartialEq)]
pub enum CodecDescriptor {
    Avc(AvcConfig),
    Aac(AacConfig),
}

impl CodecDescriptor {
    /// Build a codec descriptor for the representation.
    ///
    /// Fails with [`Error::UnsupportedCodec`] when the codec family is not
    /// the exact allowlisted code for the representation's media type.
    pub fn build(rep: &RepresentationDescriptor) -> Result<Self> {
        let family = rep.codecs.get(..4).unwrap_or("");
        match rep.media_type {
            MediaType::Video if family == AVC_FAMILY => {
                Ok(Self::Avc(AvcConfig::from_representation(rep)?))
            }
            MediaType::Audio if family == AAC_FAMILY => {
                Ok(Self::Aac(AacConfig::from_representation(rep)?))
            }
            media_type => Err(Error::UnsupportedCodec {
                codecs: rep.codecs.clone(),
                media_type,
            }),
        }
    }
}

/// AVC decoder configuration (avcC record contents).
#[derive(Debug, Clone, PartialEq)]
pub struct AvcConfig {
    pub profile: u8,
    pub profile_compatibility: u8,
    pub level: u8,
    /// Size in bytes of the NAL unit length prefix.
    pub nal_length_size: u8,
    pub sps: Vec<Vec<u8>>,
    pub pps: Vec<Vec<u8>>,
}

impl AvcConfig {
    fn from_representation(rep: &RepresentationDescriptor) -> Result<Self> {
        let private_data = decode_private_data(&rep.codec_private_data)?;
        let nalus = split_annex_b(&private_data);

        let mut sps: Vec<Vec<u8>> = Vec::new();
        let mut pps: Vec<Vec<u8>> = Vec::new();
        for nalu in nalus {
            match nalu.first().map(|b| b & 0x1f) {
                Some(7) => sps.push(nalu.to_vec()),
                Some(8) => pps.push(nalu.to_vec()),
                _ => {}
            }
        }

        // Profile/level come from the codec string suffix ("avc1.PPCCLL");
        // SPS bytes are the fallback when the suffix is absent.
        let (profile, profile_compatibility, level) = parse_avc_oti(&rep.codecs)
            .or_else(|| {
                sps.first()
                    .filter(|s| s.len() >= 4)
                    .map(|s| (s[1], s[2], s[3]))
            })
            .unwrap_or((0, 0, 0));

        Ok(Self {
            profile,
            profile_compatibility,
            level,
            nal_length_size: 4,
            sps,
            pps,
        })
    }

    /// Serialize as the payload of an `avcC` box.
    pub fn to_avcc_payload(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(16);
        buf.put_u8(1); // configuration version
        buf.put_u8(self.profile);
        buf.put_u8(self.profile_compatibility);
        buf.put_u8(self.level);
        buf.put_u8(0xfc | (self.nal_length_size - 1));
        buf.put_u8(0xe0 | (self.sps.len() as u8));
        for sps in &self.sps {
            buf.put_u16(sps.len() as u16);
            buf.put_slice(sps);
        }
        buf.put_u8(self.pps.len() as u8);
        for pps in &self.pps {
            buf.put_u16(pps.len() as u16);
            buf.put_slice(pps);
        }
        buf.to_vec()
    }
}

/// AAC decoder configuration (AudioSpecificConfig plus derived fields).
#[derive(Debug, Clone, PartialEq)]
pub struct AacConfig {
    pub object_type: u8,
    pub sampling_frequency_index: u8,
    pub channel_config: u8,
    pub audio_specific_config: Vec<u8>,
}

impl AacConfig {
    fn from_representation(rep: &RepresentationDescriptor) -> Result<Self> {
        let private_data = decode_private_data(&rep.codec_private_data)?;

        if private_data.is_empty() {
            // Manifests may omit the AudioSpecificConfig entirely; synthesize
            // an AAC-LC config from the declared audio attributes.
            return Ok(Self::synthesize_lc(
                rep.sampling_rate.unwrap_or(44100),
                rep.channels.unwrap_or(2),
            ));
        }

        if private_data.len() < 2 {
            return Err(Error::malformed(
                "AudioSpecificConfig shorter than two bytes",
            ));
        }
        if private_data.len() > MAX_AUDIO_SPECIFIC_CONFIG_LEN {
            return Err(Error::malformed(
                "AudioSpecificConfig too large for an esds descriptor",
            ));
        }

        let object_type = private_data[0] >> 3;
        let sampling_frequency_index =
            ((private_data[0] & 0x07) << 1) | (private_data[1] >> 7);
        let channel_config = (private_data[1] >> 3) & 0x0f;

        Ok(Self {
            object_type,
            sampling_frequency_index,
            channel_config,
            audio_specific_config: private_data,
        })
    }

    fn synthesize_lc(sampling_rate: u32, channels: u16) -> Self {
        let sampling_frequency_index = AAC_SAMPLING_FREQUENCIES
            .iter()
            .position(|&f| f == sampling_rate)
            .unwrap_or(4) as u8; // 44100 Hz
        let object_type = 0x02; // AAC LC
        let channel_config = channels as u8;

        let asc = vec![
            (object_type << 3) | (sampling_frequency_index >> 1),
            ((sampling_frequency_index & 0x01) << 7) | (channel_config << 3),
        ];

        Self {
            object_type,
            sampling_frequency_index,
            channel_config,
            audio_specific_config: asc,
        }
    }

    /// Sampling rate in Hz declared by the AudioSpecificConfig, when the
    /// frequency index is a known table entry.
    pub fn sampling_frequency(&self) -> Option<u32> {
        AAC_SAMPLING_FREQUENCIES
            .get(self.sampling_frequency_index as usize)
            .copied()
    }

    /// Serialize as the payload of an `esds` box (version/flags plus the
    /// ES descriptor chain).
    pub fn to_esds_payload(&self, bandwidth: u32) -> Vec<u8> {
        let asc_len = self.audio_specific_config.len();
        let decoder_config_len = 13 + 2 + asc_len;
        let es_len = 3 + 2 + decoder_config_len + 3;

        let mut buf = BytesMut::with_capacity(12 + es_len);
        buf.put_u32(0); // version/flags

        // ES_Descriptor
        buf.put_u8(0x03);
        buf.put_u8(es_len as u8);
        buf.put_u16(1); // ES_ID
        buf.put_u8(0); // stream dependence / URL / OCR flags

        // DecoderConfigDescriptor
        buf.put_u8(0x04);
        buf.put_u8(decoder_config_len as u8);
        buf.put_u8(0x40); // object type indication: MPEG-4 audio
        buf.put_u8(0x15); // stream type: audio
        buf.put_slice(&[0x00, 0x03, 0x00]); // buffer size
        buf.put_u32(bandwidth); // max bitrate
        buf.put_u32(bandwidth); // avg bitrate

        // DecoderSpecificInfo
        buf.put_u8(0x05);
        buf.put_u8(asc_len as u8);
        buf.put_slice(&self.audio_specific_config);

        // SLConfigDescriptor
        buf.put_u8(0x06);
        buf.put_u8(0x01);
        buf.put_u8(0x02);

        buf.to_vec()
    }
}

fn decode_private_data(hex_str: &str) -> Result<Vec<u8>> {
    if hex_str.is_empty() {
        return Ok(Vec::new());
    }
    hex::decode(hex_str)
        .map_err(|e| Error::malformed(format!("codec private data is not valid hex: {e}")))
}

/// Split an Annex-B byte stream on 4-byte start codes.
fn split_annex_b(data: &[u8]) -> Vec<&[u8]> {
    const START_CODE: [u8; 4] = [0, 0, 0, 1];
    let mut starts: Vec<usize> = Vec::new();
    let mut i = 0;
    while i + 4 <= data.len() {
        if data[i..i + 4] == START_CODE {
            starts.push(i + 4);
            i += 4;
        } else {
            i += 1;
        }
    }

    let mut nalus = Vec::with_capacity(starts.len());
    for (n, &start) in starts.iter().enumerate() {
        let end = starts
            .get(n + 1)
            .map(|&next| next - 4)
            .unwrap_or(data.len());
        if start < end {
            nalus.push(&data[start..end]);
        }
    }
    nalus
}

/// Parse the "PPCCLL" hex suffix of an AVC codec string.
fn parse_avc_oti(codecs: &str) -> Option<(u8, u8, u8)> {
    let oti = codecs.strip_prefix("avc1.")?.get(..6)?;
    let bytes = hex::decode(oti).ok()?;
    Some((bytes[0], bytes[1], bytes[2]))
}
