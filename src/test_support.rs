//! Builders for synthetic Smooth Streaming fragments used across unit
//! tests.

use crate::mp4::UuidType;
use bytes::{BufMut, BytesMut};

/// Shape of a synthetic media fragment.
pub struct FragmentSpec<'a> {
    pub sequence_number: u32,
    pub track_id: u32,
    pub decode_time: u64,
    pub tfdt_version: u8,
    pub with_tfrf: bool,
    pub tfrf_entries: &'a [(u64, u64)],
    pub tfxd: Option<(u64, u64)>,
}

impl Default for FragmentSpec<'_> {
    fn default() -> Self {
        Self {
            sequence_number: 1,
            track_id: 1,
            decode_time: 0,
            tfdt_version: 1,
            with_tfrf: true,
            tfrf_entries: &[],
            tfxd: None,
        }
    }
}

/// Serialize a moof + mdat fragment matching `spec`.
pub fn moof_fragment(spec: &FragmentSpec<'_>) -> Vec<u8> {
    let mut traf = BytesMut::new();

    // tfhd
    traf.put_u32(16);
    traf.put_slice(b"tfhd");
    traf.put_u32(0x020000); // default-base-is-moof
    traf.put_u32(spec.track_id);

    // tfdt
    if spec.tfdt_version == 1 {
        traf.put_u32(20);
        traf.put_slice(b"tfdt");
        traf.put_u32(0x01000000);
        traf.put_u64(spec.decode_time);
    } else {
        traf.put_u32(16);
        traf.put_slice(b"tfdt");
        traf.put_u32(0);
        traf.put_u32(spec.decode_time as u32);
    }

    if let Some((time, duration)) = spec.tfxd {
        let mut payload = BytesMut::new();
        payload.put_slice(&UuidType::TFXD.0);
        payload.put_u8(1); // version
        payload.put_slice(&[0, 0, 0]); // flags
        payload.put_u64(time);
        payload.put_u64(duration);
        put_box(&mut traf, b"uuid", &payload);
    }

    if spec.with_tfrf {
        let mut payload = BytesMut::new();
        payload.put_slice(&UuidType::TFRF.0);
        payload.put_u8(1); // version
        payload.put_slice(&[0, 0, 0]); // flags
        payload.put_u8(spec.tfrf_entries.len() as u8);
        for &(time, duration) in spec.tfrf_entries {
            payload.put_u64(time);
            payload.put_u64(duration);
        }
        put_box(&mut traf, b"uuid", &payload);
    }

    let mut moof = BytesMut::new();
    // mfhd
    moof.put_u32(16);
    moof.put_slice(b"mfhd");
    moof.put_u32(0);
    moof.put_u32(spec.sequence_number);
    put_box(&mut moof, b"traf", &traf);

    let mut buf = BytesMut::new();
    put_box(&mut buf, b"moof", &moof);

    // mdat with opaque sample payload
    let samples = [0xab_u8; 32];
    put_box(&mut buf, b"mdat", &samples);

    buf.to_vec()
}

fn put_box(buf: &mut BytesMut, box_type: &[u8; 4], payload: &[u8]) {
    buf.put_u32((8 + payload.len()) as u32);
    buf.put_slice(box_type);
    buf.put_slice(payload);
}
