//! MP4 atom definitions for Smooth Streaming fragments.

/// Four-character atom type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AtomType(pub [u8; 4]);

impl AtomType {
    pub const FTYP: Self = Self(*b"ftyp");
    pub const MOOV: Self = Self(*b"moov");
    pub const MOOF: Self = Self(*b"moof");
    pub const MFHD: Self = Self(*b"mfhd");
    pub const TRAF: Self = Self(*b"traf");
    pub const TFHD: Self = Self(*b"tfhd");
    pub const TFDT: Self = Self(*b"tfdt");
    pub const TRUN: Self = Self(*b"trun");
    pub const MDAT: Self = Self(*b"mdat");
    pub const TRAK: Self = Self(*b"trak");
    pub const MDIA: Self = Self(*b"mdia");
    pub const MINF: Self = Self(*b"minf");
    pub const STBL: Self = Self(*b"stbl");
    pub const MVEX: Self = Self(*b"mvex");
    pub const UUID: Self = Self(*b"uuid");

    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Get the 4-char code as a string.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl std::fmt::Display for AtomType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 16-byte user type of a `uuid` extension atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UuidType(pub [u8; 16]);

impl UuidType {
    /// Smooth Streaming tfxd box: absolute time and duration of this
    /// fragment.
    pub const TFXD: Self = Self([
        0x6d, 0x1d, 0x9b, 0x05, 0x42, 0xd5, 0x44, 0xe6, 0x80, 0xe2, 0x14, 0x1d, 0xaf, 0xf7, 0x57,
        0xb2,
    ]);

    /// Smooth Streaming tfrf box: absolute times and durations of upcoming
    /// fragments at the live edge.
    pub const TFRF: Self = Self([
        0xd4, 0x80, 0x7e, 0xf2, 0xca, 0x39, 0x46, 0x95, 0x8e, 0x54, 0x26, 0xcb, 0x9e, 0x46, 0xa7,
        0x9f,
    ]);
}

/// One (absolute time, duration) anchor from a tfxd or tfrf box, in
/// representation timescale ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineEntry {
    pub fragment_absolute_time: u64,
    pub fragment_duration: u64,
}

/// Decoded fields for known leaf atoms. Unknown atoms stay `Opaque`.
#[derive(Debug, Clone, PartialEq)]
pub enum AtomFields {
    /// Payload not interpreted; the byte range is still tracked.
    Opaque,
    /// mfhd: fragment sequence number.
    Mfhd { sequence_number: u32 },
    /// tfhd: track id (flags-dependent optional fields are not decoded).
    Tfhd { track_id: u32 },
    /// tfdt: base media decode time.
    Tfdt { version: u8, base_media_decode_time: u64 },
    /// tfxd vendor box.
    Tfxd(TimelineEntry),
    /// tfrf vendor box. Entries are not guaranteed sorted.
    Tfrf { entries: Vec<TimelineEntry> },
}

/// A node in the parsed atom hierarchy.
///
/// Byte ranges index into the buffer the tree was parsed from; the tree
/// never outlives or copies that buffer.
#[derive(Debug, Clone)]
pub struct Atom {
    /// Atom type code.
    pub atom_type: AtomType,
    /// User type for `uuid` atoms.
    pub uuid: Option<UuidType>,
    /// Offset of the atom header within the source buffer.
    pub offset: usize,
    /// Total atom size including header.
    pub size: usize,
    /// Header size: 8, 16 (extended size), or +16 for uuid atoms.
    pub header_size: usize,
    /// Decoded fields for known leaf types.
    pub fields: AtomFields,
    /// Child atoms, present only for container types.
    pub children: Vec<Atom>,
}

impl Atom {
    /// Offset of the payload (after the header) within the source buffer.
    pub fn data_offset(&self) -> usize {
        self.offset + self.header_size
    }

    /// Payload size in bytes.
    pub fn data_size(&self) -> usize {
        self.size.saturating_sub(self.header_size)
    }

    /// The atom's raw bytes, header included.
    pub fn raw<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        &buf[self.offset..self.offset + self.size]
    }

    /// Check whether this atom type contains child atoms.
    pub fn is_container(atom_type: AtomType) -> bool {
        matches!(
            atom_type,
            AtomType::MOOF
                | AtomType::TRAF
                | AtomType::MOOV
                | AtomType::TRAK
                | AtomType::MDIA
                | AtomType::MINF
                | AtomType::STBL
                | AtomType::MVEX
        )
    }

    /// Find the first descendant (or self) with the given type.
    pub fn find(&self, atom_type: AtomType) -> Option<&Atom> {
        if self.atom_type == atom_type {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(atom_type))
    }

    /// Find the first descendant (or self) `uuid` atom with the given user
    /// type.
    pub fn find_uuid(&self, uuid: UuidType) -> Option<&Atom> {
        if self.uuid == Some(uuid) {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find_uuid(uuid))
    }
}

/// Find the first atom with the given type in a parsed forest.
pub fn find_atom(atoms: &[Atom], atom_type: AtomType) -> Option<&Atom> {
    atoms.iter().find_map(|a| a.find(atom_type))
}

/// Find the first `uuid` atom with the given user type in a parsed forest.
pub fn find_uuid_atom(atoms: &[Atom], uuid: UuidType) -> Option<&Atom> {
    atoms.iter().find_map(|a| a.find_uuid(uuid))
}
