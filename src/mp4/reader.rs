//! Recursive-descent atom parser over an in-memory fragment buffer.

use super::{Atom, AtomFields, AtomType, TimelineEntry, UuidType};
use crate::{Error, Result};

/// Parse a whole fragment buffer into its top-level atoms.
///
/// Pure and deterministic: the same buffer always yields the same tree, and
/// the source bytes are never modified. Unknown atom types are kept as
/// opaque leaves so they survive re-serialization untouched.
pub fn parse(buf: &[u8]) -> Result<Vec<Atom>> {
    parse_atoms(buf, 0, buf.len())
}

/// Parse the atoms in `buf[start..end]`. Restartable at any atom boundary.
pub fn parse_atoms(buf: &[u8], start: usize, end: usize) -> Result<Vec<Atom>> {
    if end > buf.len() || start > end {
        return Err(Error::malformed(format!(
            "parse range {}..{} exceeds buffer length {}",
            start,
            end,
            buf.len()
        )));
    }

    let mut atoms = Vec::new();
    let mut pos = start;

    while pos < end {
        let atom = parse_atom(buf, pos, end)?;
        pos += atom.size;
        atoms.push(atom);
    }

    Ok(atoms)
}

fn parse_atom(buf: &[u8], pos: usize, end: usize) -> Result<Atom> {
    if pos + 8 > end {
        return Err(Error::malformed(format!(
            "truncated atom header at offset {pos}"
        )));
    }

    let size32 = read_u32(buf, pos)? as usize;
    let atom_type = AtomType::from_bytes([buf[pos + 4], buf[pos + 5], buf[pos + 6], buf[pos + 7]]);

    let (size, mut header_size) = if size32 == 1 {
        // 64-bit extended size follows the type code
        if pos + 16 > end {
            return Err(Error::malformed(format!(
                "truncated extended size in {atom_type} at offset {pos}"
            )));
        }
        let size64 = read_u64(buf, pos + 8)?;
        (
            usize::try_from(size64)
                .map_err(|_| Error::malformed(format!("oversized {atom_type} atom")))?,
            16usize,
        )
    } else if size32 == 0 {
        // Atom extends to the end of the parse range
        (end - pos, 8usize)
    } else {
        (size32, 8usize)
    };

    // size comes from untrusted input and can be near usize::MAX for a
    // 64-bit extended size; compare against the remaining range instead of
    // computing pos + size.
    if size < header_size || size > end - pos {
        return Err(Error::malformed(format!(
            "{} atom at offset {} declares size {} but only {} bytes remain",
            atom_type,
            pos,
            size,
            end - pos
        )));
    }

    let mut uuid = None;
    if atom_type == AtomType::UUID {
        if size < header_size + 16 {
            return Err(Error::malformed(format!(
                "uuid atom at offset {pos} too small for its user type"
            )));
        }
        let mut user_type = [0u8; 16];
        user_type.copy_from_slice(&buf[pos + header_size..pos + header_size + 16]);
        uuid = Some(UuidType(user_type));
        header_size += 16;
    }

    let data_offset = pos + header_size;
    let data_end = pos + size;

    let children = if Atom::is_container(atom_type) {
        parse_atoms(buf, data_offset, data_end)?
    } else {
        Vec::new()
    };

    let fields = decode_fields(buf, atom_type, uuid, data_offset, data_end)?;

    if fields == AtomFields::Opaque && children.is_empty() && !Atom::is_container(atom_type) {
        tracing::trace!(atom = %atom_type, offset = pos, size, "retaining opaque atom");
    }

    Ok(Atom {
        atom_type,
        uuid,
        offset: pos,
        size,
        header_size,
        fields,
        children,
    })
}

fn decode_fields(
    buf: &[u8],
    atom_type: AtomType,
    uuid: Option<UuidType>,
    data_offset: usize,
    data_end: usize,
) -> Result<AtomFields> {
    match (atom_type, uuid) {
        (AtomType::MFHD, _) => {
            // version/flags then sequence number
            let sequence_number = read_u32(buf, require(data_offset + 4, 4, data_end, "mfhd")?)?;
            Ok(AtomFields::Mfhd { sequence_number })
        }
        (AtomType::TFHD, _) => {
            let track_id = read_u32(buf, require(data_offset + 4, 4, data_end, "tfhd")?)?;
            Ok(AtomFields::Tfhd { track_id })
        }
        (AtomType::TFDT, _) => {
            let version = buf[require(data_offset, 1, data_end, "tfdt")?];
            let base_media_decode_time = if version == 1 {
                read_u64(buf, require(data_offset + 4, 8, data_end, "tfdt")?)?
            } else {
                read_u32(buf, require(data_offset + 4, 4, data_end, "tfdt")?)? as u64
            };
            Ok(AtomFields::Tfdt {
                version,
                base_media_decode_time,
            })
        }
        (AtomType::UUID, Some(UuidType::TFXD)) => {
            let version = buf[require(data_offset, 1, data_end, "tfxd")?];
            let entry = read_timeline_entry(buf, data_offset + 4, data_end, version, "tfxd")?;
            Ok(AtomFields::Tfxd(entry))
        }
        (AtomType::UUID, Some(UuidType::TFRF)) => {
            let version = buf[require(data_offset, 1, data_end, "tfrf")?];
            let count = buf[require(data_offset + 4, 1, data_end, "tfrf")?] as usize;
            let entry_size = if version == 1 { 16 } else { 8 };
            let mut entries = Vec::with_capacity(count);
            for i in 0..count {
                let entry_offset = data_offset + 5 + i * entry_size;
                entries.push(read_timeline_entry(
                    buf,
                    entry_offset,
                    data_end,
                    version,
                    "tfrf",
                )?);
            }
            Ok(AtomFields::Tfrf { entries })
        }
        _ => Ok(AtomFields::Opaque),
    }
}

fn read_timeline_entry(
    buf: &[u8],
    offset: usize,
    data_end: usize,
    version: u8,
    name: &str,
) -> Result<TimelineEntry> {
    if version == 1 {
        Ok(TimelineEntry {
            fragment_absolute_time: read_u64(buf, require(offset, 8, data_end, name)?)?,
            fragment_duration: read_u64(buf, require(offset + 8, 8, data_end, name)?)?,
        })
    } else {
        Ok(TimelineEntry {
            fragment_absolute_time: read_u32(buf, require(offset, 4, data_end, name)?)? as u64,
            fragment_duration: read_u32(buf, require(offset + 4, 4, data_end, name)?)? as u64,
        })
    }
}

/// Bounds-check a field of `len` bytes at `offset` against the atom payload.
fn require(offset: usize, len: usize, data_end: usize, name: &str) -> Result<usize> {
    if offset + len > data_end {
        Err(Error::malformed(format!("truncated {name} atom payload")))
    } else {
        Ok(offset)
    }
}

fn read_u32(buf: &[u8], offset: usize) -> Result<u32> {
    let bytes: [u8; 4] = buf
        .get(offset..offset + 4)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| Error::malformed(format!("read past end of buffer at {offset}")))?;
    Ok(u32::from_be_bytes(bytes))
}

fn read_u64(buf: &[u8], offset: usize) -> Result<u64> {
    let bytes: [u8; 8] = buf
        .get(offset..offset + 8)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| Error::malformed(format!("read past end of buffer at {offset}")))?;
    Ok(u64::from_be_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{BufMut, BytesMut};

    fn leaf(atom_type: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u32((8 + payload.len()) as u32);
        buf.put_slice(atom_type);
        buf.put_slice(payload);
        buf.to_vec()
    }

    fn container(atom_type: &[u8; 4], children: &[Vec<u8>]) -> Vec<u8> {
        let inner: usize = children.iter().map(|c| c.len()).sum();
        let mut buf = BytesMut::new();
        buf.put_u32((8 + inner) as u32);
        buf.put_slice(atom_type);
        for child in children {
            buf.put_slice(child);
        }
        buf.to_vec()
    }

    #[test]
    fn test_parse_leaf_and_container() {
        let tfdt = {
            let mut p = BytesMut::new();
            p.put_u32(0x01000000); // version 1
            p.put_u64(123456789);
            leaf(b"tfdt", &p)
        };
        let traf = container(b"traf", &[tfdt]);
        let moof = container(b"moof", &[traf]);

        let atoms = parse(&moof).unwrap();
        assert_eq!(atoms.len(), 1);
        assert_eq!(atoms[0].atom_type, AtomType::MOOF);

        let tfdt = atoms[0].find(AtomType::TFDT).unwrap();
        assert_eq!(
            tfdt.fields,
            AtomFields::Tfdt {
                version: 1,
                base_media_decode_time: 123456789
            }
        );
    }

    #[test]
    fn test_unknown_atom_is_opaque_leaf() {
        let wxyz = leaf(b"wxyz", &[0xde, 0xad, 0xbe, 0xef]);
        let atoms = parse(&wxyz).unwrap();
        assert_eq!(atoms[0].atom_type, AtomType::from_bytes(*b"wxyz"));
        assert_eq!(atoms[0].fields, AtomFields::Opaque);
        assert!(atoms[0].children.is_empty());
    }

    #[test]
    fn test_size_zero_extends_to_end() {
        let mut buf = BytesMut::new();
        buf.put_u32(0);
        buf.put_slice(b"mdat");
        buf.put_slice(&[1, 2, 3, 4, 5]);
        let atoms = parse(&buf).unwrap();
        assert_eq!(atoms[0].size, 13);
        assert_eq!(atoms[0].data_size(), 5);
    }

    #[test]
    fn test_extended_size() {
        let mut buf = BytesMut::new();
        buf.put_u32(1);
        buf.put_slice(b"mdat");
        buf.put_u64(16 + 4);
        buf.put_slice(&[9, 9, 9, 9]);
        let atoms = parse(&buf).unwrap();
        assert_eq!(atoms[0].header_size, 16);
        assert_eq!(atoms[0].data_size(), 4);
    }

    #[test]
    fn test_declared_size_past_buffer_fails() {
        let mut buf = BytesMut::new();
        buf.put_u32(100);
        buf.put_slice(b"moof");
        buf.put_slice(&[0; 8]);
        let err = parse(&buf).unwrap_err();
        assert!(matches!(err, Error::MalformedContainer(_)));
    }

    #[test]
    fn test_huge_extended_size_fails() {
        // A 64-bit extended size near the usize ceiling must surface as a
        // malformed-container error, not an arithmetic panic.
        let mut buf = BytesMut::new();
        buf.put_slice(&leaf(b"free", &[0; 4]));
        buf.put_u32(1);
        buf.put_slice(b"mdat");
        buf.put_u64(u64::MAX);
        let err = parse(&buf).unwrap_err();
        assert!(matches!(err, Error::MalformedContainer(_)));
    }

    #[test]
    fn test_truncated_header_fails() {
        let err = parse(&[0, 0, 0]).unwrap_err();
        assert!(matches!(err, Error::MalformedContainer(_)));
    }

    #[test]
    fn test_roundtrip_of_untouched_atoms() {
        let a = leaf(b"free", &[1, 2, 3]);
        let b = container(b"moof", &[leaf(b"mfhd", &[0, 0, 0, 0, 0, 0, 0, 7])]);
        let mut buf = a.clone();
        buf.extend_from_slice(&b);

        let atoms = parse(&buf).unwrap();
        let rebuilt: Vec<u8> = atoms.iter().flat_map(|a| a.raw(&buf).to_vec()).collect();
        assert_eq!(rebuilt, buf);
    }

    #[test]
    fn test_uuid_tfrf_entries() {
        let mut payload = BytesMut::new();
        payload.put_slice(&UuidType::TFRF.0);
        payload.put_u8(1); // version
        payload.put_slice(&[0, 0, 0]); // flags
        payload.put_u8(2); // fragment count
        payload.put_u64(5000);
        payload.put_u64(100);
        payload.put_u64(4000);
        payload.put_u64(100);
        let tfrf = leaf(b"uuid", &payload);

        let atoms = parse(&tfrf).unwrap();
        assert_eq!(atoms[0].uuid, Some(UuidType::TFRF));
        match &atoms[0].fields {
            AtomFields::Tfrf { entries } => {
                assert_eq!(entries.len(), 2);
                assert_eq!(entries[0].fragment_absolute_time, 5000);
                assert_eq!(entries[1].fragment_absolute_time, 4000);
            }
            other => panic!("unexpected fields: {other:?}"),
        }
    }
}
