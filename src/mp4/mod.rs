//! MP4 container parsing for Smooth Streaming fragments.
//!
//! Fragments arrive fully buffered, so the reader operates on byte slices
//! rather than a seekable stream. Parsing produces an [`Atom`] tree whose
//! byte ranges index into the source buffer; unknown atoms are kept as
//! opaque leaves for forward compatibility.

mod atoms;
mod reader;

pub use atoms::{find_atom, find_uuid_atom, Atom, AtomFields, AtomType, TimelineEntry, UuidType};
pub use reader::{parse, parse_atoms};
