//! Live timeline extraction and tfdt reconciliation.
//!
//! Live Smooth Streaming fragments carry vendor-extension UUID boxes in
//! their traf: tfxd anchors the current fragment on the absolute timeline,
//! tfrf lists the absolute times of upcoming fragments at the live edge.
//! The tfrf signal is authoritative for live playback; when the nominal
//! tfdt decode time drifts from it, the decode time is patched in place.

use crate::mp4::{find_atom, find_uuid_atom, Atom, AtomFields, AtomType, TimelineEntry, UuidType};
use crate::{Error, Result};

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// Absolute position of a live fragment on the stream timeline, in
/// representation timescale ticks since the manifest epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct LiveTimelineInfo {
    pub fragment_absolute_time: u64,
    pub fragment_duration: u64,
}

impl From<TimelineEntry> for LiveTimelineInfo {
    fn from(entry: TimelineEntry) -> Self {
        Self {
            fragment_absolute_time: entry.fragment_absolute_time,
            fragment_duration: entry.fragment_duration,
        }
    }
}

/// Correct the live timeline of a parsed media fragment.
///
/// For on-demand streams (`is_live == false`) this is a no-op. For live
/// streams the mandatory tfrf box is located under the fragment's traf; its
/// most recent entry (largest absolute time, entries are not guaranteed
/// sorted) becomes the authoritative decode time. When the tfdt base media
/// decode time disagrees with it by more than one tick, the decode-time
/// field is patched in place in `buf`.
///
/// Absence of the tfrf box on a live stream is a hard
/// [`Error::MissingLiveTimelineData`].
pub fn correct_timeline(
    atoms: &[Atom],
    buf: &mut [u8],
    is_live: bool,
) -> Result<Option<LiveTimelineInfo>> {
    if !is_live {
        return Ok(None);
    }

    let traf = find_atom(atoms, AtomType::TRAF)
        .ok_or(Error::MissingLiveTimelineData)?;

    let tfrf = traf
        .find_uuid(UuidType::TFRF)
        .ok_or(Error::MissingLiveTimelineData)?;
    let entries = match &tfrf.fields {
        AtomFields::Tfrf { entries } => entries,
        _ => return Err(Error::MissingLiveTimelineData),
    };
    let latest = entries
        .iter()
        .max_by_key(|e| e.fragment_absolute_time)
        .copied()
        .ok_or(Error::MissingLiveTimelineData)?;

    let tfdt = traf
        .find(AtomType::TFDT)
        .ok_or_else(|| Error::malformed("live fragment has no tfdt box"))?;
    let (version, decode_time) = match tfdt.fields {
        AtomFields::Tfdt {
            version,
            base_media_decode_time,
        } => (version, base_media_decode_time),
        _ => return Err(Error::malformed("tfdt fields not decoded")),
    };

    // A single tick of disagreement is tolerated; anything larger means the
    // nominal decode timestamp has drifted from the live-edge signal.
    let drift = decode_time.abs_diff(latest.fragment_absolute_time);
    if drift > 1 {
        tracing::debug!(
            decode_time,
            live_time = latest.fragment_absolute_time,
            drift,
            "patching tfdt decode time to live timeline"
        );
        patch_decode_time(buf, tfdt, version, latest.fragment_absolute_time)?;
    }

    Ok(Some(latest.into()))
}

/// Read the tfxd anchor (this fragment's own absolute time and duration),
/// when present. Used by fragment-info consumers; unlike tfrf its absence
/// is not an error.
pub fn fragment_info(atoms: &[Atom]) -> Option<LiveTimelineInfo> {
    let tfxd = find_uuid_atom(atoms, UuidType::TFXD)?;
    match tfxd.fields {
        AtomFields::Tfxd(entry) => Some(entry.into()),
        _ => None,
    }
}

/// Overwrite the base media decode time field of a tfdt atom in place.
///
/// In-place patching cannot grow the box, so a corrected time that does not
/// fit a version-0 field is an error rather than a truncation.
fn patch_decode_time(buf: &mut [u8], tfdt: &Atom, version: u8, time: u64) -> Result<()> {
    let field_offset = tfdt.data_offset() + 4;
    if version == 1 {
        buf[field_offset..field_offset + 8].copy_from_slice(&time.to_be_bytes());
    } else {
        let time32 = u32::try_from(time).map_err(|_| {
            Error::malformed("corrected decode time does not fit version 0 tfdt")
        })?;
        buf[field_offset..field_offset + 4].copy_from_slice(&time32.to_be_bytes());
    }
    Ok(())
}
