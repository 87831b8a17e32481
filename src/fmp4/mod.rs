//! Initialization segment synthesis.
//!
//! Smooth Streaming servers never deliver an initialization segment; the
//! player must synthesize one (ftyp + moov) from the manifest's codec
//! parameters before any media fragment can be appended. Output is fully
//! deterministic: creation times are pinned to the epoch, never wall clock,
//! so identical descriptors always produce byte-identical segments.

use crate::codec::CodecDescriptor;
use crate::descriptor::{MediaType, RepresentationDescriptor};
use crate::Result;
use bytes::{BufMut, BytesMut};

/// Synthesized initialization segment for one representation.
#[derive(Debug, Clone)]
pub struct InitSegment {
    /// Serialized ftyp + moov bytes.
    pub data: Vec<u8>,
    /// Representation timescale.
    pub timescale: u32,
    /// Track id declared in the moov.
    pub track_id: u32,
}

/// Synthesize the initialization segment for a representation.
///
/// Codec descriptor failures ([`crate::Error::UnsupportedCodec`]) propagate
/// unchanged; callers must not retry until the descriptor changes.
pub fn synthesize_init_segment(rep: &RepresentationDescriptor) -> Result<InitSegment> {
    let codec = CodecDescriptor::build(rep)?;
    let writer = InitSegmentWriter { rep, codec: &codec };

    let mut buf = BytesMut::with_capacity(1024);
    writer.write_ftyp(&mut buf);
    writer.write_moov(&mut buf);

    Ok(InitSegment {
        data: buf.to_vec(),
        timescale: rep.timescale,
        track_id: rep.track_id(),
    })
}

struct InitSegmentWriter<'a> {
    rep: &'a RepresentationDescriptor,
    codec: &'a CodecDescriptor,
}

impl InitSegmentWriter<'_> {
    fn write_ftyp(&self, buf: &mut BytesMut) {
        let brands = [b"isom", b"iso6", b"msdh"];
        let size = 8 + 4 + 4 + brands.len() * 4;

        buf.put_u32(size as u32);
        buf.put_slice(b"ftyp");
        buf.put_slice(b"iso6"); // major brand
        buf.put_u32(1); // minor version
        for brand in &brands {
            buf.put_slice(*brand);
        }
    }

    fn write_moov(&self, buf: &mut BytesMut) {
        let moov_start = buf.len();
        buf.put_u32(0); // placeholder size
        buf.put_slice(b"moov");

        self.write_mvhd(buf);
        self.write_trak(buf);
        self.write_mvex(buf);

        patch_size(buf, moov_start);
    }

    fn write_mvhd(&self, buf: &mut BytesMut) {
        buf.put_u32(120); // version 1
        buf.put_slice(b"mvhd");
        buf.put_u8(1); // version 1
        buf.put_slice(&[0, 0, 0]); // flags
        buf.put_u64(0); // creation time (pinned for determinism)
        buf.put_u64(0); // modification time
        buf.put_u32(self.rep.timescale);
        buf.put_u64(0); // duration unknown for fragmented content
        buf.put_u32(0x00010000); // rate = 1.0
        buf.put_u16(0x0100); // volume = 1.0
        buf.put_u16(0); // reserved
        buf.put_u64(0); // reserved
        write_identity_matrix(buf);
        for _ in 0..6 {
            buf.put_u32(0); // pre-defined
        }
        buf.put_u32(self.rep.track_id() + 1); // next track ID
    }

    fn write_trak(&self, buf: &mut BytesMut) {
        let trak_start = buf.len();
        buf.put_u32(0);
        buf.put_slice(b"trak");

        self.write_tkhd(buf);
        self.write_mdia(buf);

        patch_size(buf, trak_start);
    }

    fn write_tkhd(&self, buf: &mut BytesMut) {
        let is_video = self.rep.media_type == MediaType::Video;

        buf.put_u32(104); // version 1
        buf.put_slice(b"tkhd");
        buf.put_u8(1); // version 1
        buf.put_slice(&[0, 0, 7]); // flags: enabled, in_movie, in_preview
        buf.put_u64(0); // creation time
        buf.put_u64(0); // modification time
        buf.put_u32(self.rep.track_id());
        buf.put_u32(0); // reserved
        buf.put_u64(0); // duration
        buf.put_u64(0); // reserved
        buf.put_u16(0); // layer
        buf.put_u16(0); // alternate group
        buf.put_u16(if is_video { 0 } else { 0x0100 }); // volume
        buf.put_u16(0); // reserved
        write_identity_matrix(buf);
        // Width and height (16.16 fixed point); zero for audio tracks
        if is_video {
            buf.put_u32(self.rep.width.unwrap_or(0) << 16);
            buf.put_u32(self.rep.height.unwrap_or(0) << 16);
        } else {
            buf.put_u32(0);
            buf.put_u32(0);
        }
    }

    fn write_mdia(&self, buf: &mut BytesMut) {
        let mdia_start = buf.len();
        buf.put_u32(0);
        buf.put_slice(b"mdia");

        self.write_mdhd(buf);
        match self.rep.media_type {
            MediaType::Video => self.write_hdlr(buf, b"vide", b"VideoHandler"),
            MediaType::Audio => self.write_hdlr(buf, b"soun", b"SoundHandler"),
        }
        self.write_minf(buf);

        patch_size(buf, mdia_start);
    }

    fn write_mdhd(&self, buf: &mut BytesMut) {
        buf.put_u32(44); // version 1
        buf.put_slice(b"mdhd");
        buf.put_u8(1); // version 1
        buf.put_slice(&[0, 0, 0]); // flags
        buf.put_u64(0); // creation time
        buf.put_u64(0); // modification time
        buf.put_u32(self.rep.timescale);
        buf.put_u64(0); // duration
        buf.put_u16(0x55c4); // language: und
        buf.put_u16(0); // pre_defined
    }

    fn write_hdlr(&self, buf: &mut BytesMut, handler: &[u8; 4], name: &[u8]) {
        let size = 32 + name.len() + 1;
        buf.put_u32(size as u32);
        buf.put_slice(b"hdlr");
        buf.put_u32(0); // version/flags
        buf.put_u32(0); // pre_defined
        buf.put_slice(handler);
        buf.put_u32(0); // reserved
        buf.put_u32(0);
        buf.put_u32(0);
        buf.put_slice(name);
        buf.put_u8(0); // null terminator
    }

    fn write_minf(&self, buf: &mut BytesMut) {
        let minf_start = buf.len();
        buf.put_u32(0);
        buf.put_slice(b"minf");

        match self.rep.media_type {
            MediaType::Video => {
                buf.put_u32(20);
                buf.put_slice(b"vmhd");
                buf.put_u32(1); // version/flags
                buf.put_u16(0); // graphics mode
                buf.put_u16(0);
                buf.put_u16(0);
                buf.put_u16(0); // opcolor
            }
            MediaType::Audio => {
                buf.put_u32(16);
                buf.put_slice(b"smhd");
                buf.put_u32(0); // version/flags
                buf.put_u16(0); // balance
                buf.put_u16(0); // reserved
            }
        }

        self.write_dinf(buf);
        self.write_stbl(buf);

        patch_size(buf, minf_start);
    }

    fn write_dinf(&self, buf: &mut BytesMut) {
        buf.put_u32(36);
        buf.put_slice(b"dinf");

        // dref with one self-referencing url entry
        buf.put_u32(28);
        buf.put_slice(b"dref");
        buf.put_u32(0); // version/flags
        buf.put_u32(1); // entry count

        buf.put_u32(12);
        buf.put_slice(b"url ");
        buf.put_u32(1); // flags: self-contained
    }

    fn write_stbl(&self, buf: &mut BytesMut) {
        let stbl_start = buf.len();
        buf.put_u32(0);
        buf.put_slice(b"stbl");

        self.write_stsd(buf);

        // Empty sample tables (required for fMP4)
        self.write_empty_stts(buf);
        self.write_empty_stsc(buf);
        self.write_empty_stsz(buf);
        self.write_empty_stco(buf);

        patch_size(buf, stbl_start);
    }

    fn write_stsd(&self, buf: &mut BytesMut) {
        let stsd_start = buf.len();
        buf.put_u32(0);
        buf.put_slice(b"stsd");
        buf.put_u32(0); // version/flags
        buf.put_u32(1); // entry count

        match self.codec {
            CodecDescriptor::Avc(avc) => {
                let avc1_start = buf.len();
                buf.put_u32(0);
                buf.put_slice(b"avc1");
                buf.put_slice(&[0; 6]); // reserved
                buf.put_u16(1); // data reference index
                buf.put_u16(0); // pre_defined
                buf.put_u16(0); // reserved
                buf.put_slice(&[0; 12]); // pre_defined
                buf.put_u16(self.rep.width.unwrap_or(0) as u16);
                buf.put_u16(self.rep.height.unwrap_or(0) as u16);
                buf.put_u32(0x00480000); // horiz resolution 72 dpi
                buf.put_u32(0x00480000); // vert resolution 72 dpi
                buf.put_u32(0); // reserved
                buf.put_u16(1); // frame count
                buf.put_slice(&[0; 32]); // compressor name
                buf.put_u16(0x0018); // depth
                buf.put_i16(-1); // pre_defined

                let avcc = avc.to_avcc_payload();
                buf.put_u32((8 + avcc.len()) as u32);
                buf.put_slice(b"avcC");
                buf.put_slice(&avcc);

                patch_size(buf, avc1_start);
            }
            CodecDescriptor::Aac(aac) => {
                let channels = self
                    .rep
                    .channels
                    .filter(|&c| c > 0)
                    .unwrap_or_else(|| u16::from(aac.channel_config.max(2)));
                let sample_rate = self
                    .rep
                    .sampling_rate
                    .or_else(|| aac.sampling_frequency())
                    .unwrap_or(44100);

                let mp4a_start = buf.len();
                buf.put_u32(0);
                buf.put_slice(b"mp4a");
                buf.put_slice(&[0; 6]); // reserved
                buf.put_u16(1); // data reference index
                buf.put_u32(0); // reserved
                buf.put_u32(0); // reserved
                buf.put_u16(channels);
                buf.put_u16(16); // sample size
                buf.put_u16(0); // pre_defined
                buf.put_u16(0); // reserved
                buf.put_u32(sample_rate << 16);

                let esds = aac.to_esds_payload(self.rep.bandwidth);
                buf.put_u32((8 + esds.len()) as u32);
                buf.put_slice(b"esds");
                buf.put_slice(&esds);

                patch_size(buf, mp4a_start);
            }
        }

        patch_size(buf, stsd_start);
    }

    fn write_empty_stts(&self, buf: &mut BytesMut) {
        buf.put_u32(16);
        buf.put_slice(b"stts");
        buf.put_u32(0); // version/flags
        buf.put_u32(0); // entry count
    }

    fn write_empty_stsc(&self, buf: &mut BytesMut) {
        buf.put_u32(16);
        buf.put_slice(b"stsc");
        buf.put_u32(0); // version/flags
        buf.put_u32(0); // entry count
    }

    fn write_empty_stsz(&self, buf: &mut BytesMut) {
        buf.put_u32(20);
        buf.put_slice(b"stsz");
        buf.put_u32(0); // version/flags
        buf.put_u32(0); // sample size
        buf.put_u32(0); // sample count
    }

    fn write_empty_stco(&self, buf: &mut BytesMut) {
        buf.put_u32(16);
        buf.put_slice(b"stco");
        buf.put_u32(0); // version/flags
        buf.put_u32(0); // entry count
    }

    fn write_mvex(&self, buf: &mut BytesMut) {
        let mvex_start = buf.len();
        buf.put_u32(0);
        buf.put_slice(b"mvex");

        buf.put_u32(32);
        buf.put_slice(b"trex");
        buf.put_u32(0); // version/flags
        buf.put_u32(self.rep.track_id());
        buf.put_u32(1); // default sample description index
        buf.put_u32(0); // default sample duration
        buf.put_u32(0); // default sample size
        buf.put_u32(0); // default sample flags

        patch_size(buf, mvex_start);
    }
}

/// Backpatch the 32-bit size of the box starting at `start`.
fn patch_size(buf: &mut BytesMut, start: usize) {
    let size = (buf.len() - start) as u32;
    buf[start..start + 4].copy_from_slice(&size.to_be_bytes());
}

fn write_identity_matrix(buf: &mut BytesMut) {
    buf.put_u32(0x00010000);
    buf.put_u32(0);
    buf.put_u32(0);
    buf.put_u32(0);
    buf.put_u32(0x00010000);
    buf.put_u32(0);
    buf.put_u32(0);
    buf.put_u32(0);
    buf.put_u32(0x40000000);
}
