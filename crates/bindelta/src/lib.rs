//! Compact binary deltas in the bsdiff family
//!
//! This crate computes and applies binary patches between two byte
//! sequences. The encoder builds a suffix index over the old buffer, walks
//! the new buffer finding maximal matches, and emits a compact edit script
//! of control triples plus diff and extra byte segments; the script travels
//! zlib-compressed inside a small fixed header. The applier reconstructs the
//! new buffer as a stream, in bounded-size chunks, so neither side of a
//! large file has to fit in memory.
//!
//! The whole-buffer entry points are [`create_patch`] and [`apply_patch`];
//! the building blocks ([`diff`], [`PatchApplier`], [`ScriptDecoder`]) are
//! public for callers that stream from and to files.

pub mod apply;
pub mod compress;
pub mod diff;
pub mod error;
pub mod format;
pub mod ring;
pub mod search;
pub mod suffix;

pub use apply::{OldSource, PatchApplier, TRANSFER_SIZE};
pub use compress::{FRAME_HEADER_SIZE, ScriptDecoder, compress_script};
pub use diff::{diff, diff_with_index};
pub use error::{Error, Result};
pub use format::{ControlTriple, HEADER_SIZE, MAGIC, PatchHeader};
pub use ring::RingBuffer;
pub use search::search;
pub use suffix::SuffixArray;

use std::io::Cursor;
use tracing::debug;

/// Compute a complete patch file turning `old` into `new`.
///
/// The result is the 32-byte header followed by the compressed edit script.
/// The file format cannot describe empty buffers (a zero size field marks a
/// corrupt patch), so both inputs must be non-empty; the script-level
/// [`diff`] API has no such restriction.
pub fn create_patch(old: &[u8], new: &[u8]) -> Result<Vec<u8>> {
    if old.is_empty() {
        return Err(Error::EmptyInput("old"));
    }
    if new.is_empty() {
        return Err(Error::EmptyInput("new"));
    }
    debug!(
        "creating patch: old={} bytes, new={} bytes",
        old.len(),
        new.len()
    );

    let mut script = Vec::new();
    diff::diff(old, new, &mut script)?;
    let payload = compress::compress_script(&script)?;

    let header = PatchHeader::new(old.len() as u64, new.len() as u64, payload.len() as u64)?;
    let mut patch = Vec::with_capacity(HEADER_SIZE + payload.len());
    header.write(&mut patch)?;
    patch.extend_from_slice(&payload);

    debug!("patch created: {} bytes", patch.len());
    Ok(patch)
}

/// Apply a complete patch file to `old`, returning the new buffer.
///
/// Validates the header (magic tag, nonzero sizes, old-buffer length,
/// payload length) before streaming the script through a [`PatchApplier`].
pub fn apply_patch(old: &[u8], patch: &[u8]) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(patch);
    let header = PatchHeader::read(&mut cursor)?;

    if old.len() as u64 != header.old_size as u64 {
        return Err(Error::SizeMismatch {
            expected: header.old_size as u64,
            actual: old.len() as u64,
        });
    }
    if (patch.len() - HEADER_SIZE) as u64 != header.payload_size as u64 {
        return Err(Error::CorruptPatch(
            "payload size field disagrees with patch length".to_string(),
        ));
    }

    let mut decoder = ScriptDecoder::new(cursor, header.payload_size as u64)?;
    let mut out = Vec::new();
    out.try_reserve_exact(header.new_size as usize)?;

    let mut old_src = old;
    PatchApplier::new().apply(
        &mut old_src,
        old.len() as u64,
        &mut decoder,
        &mut out,
        header.new_size as u64,
    )?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_roundtrip() {
        let old = b"The quick brown fox jumps over the lazy dog";
        let new = b"The quick red fox leaps over the lazy dog";

        let patch = create_patch(old, new).unwrap();
        let result = apply_patch(old, &patch).unwrap();
        assert_eq!(result, new);
    }

    #[test]
    fn empty_inputs_are_rejected_at_file_level() {
        assert!(matches!(
            create_patch(b"", b"new").unwrap_err(),
            Error::EmptyInput("old")
        ));
        assert!(matches!(
            create_patch(b"old", b"").unwrap_err(),
            Error::EmptyInput("new")
        ));
    }

    #[test]
    fn wrong_old_buffer_is_rejected() {
        let patch = create_patch(b"original data", b"patched data").unwrap();
        let err = apply_patch(b"not the original", &patch).unwrap_err();
        assert!(matches!(err, Error::SizeMismatch { .. }));
    }
}
