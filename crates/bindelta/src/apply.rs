//! Streaming patch application
//!
//! Reconstructs the new buffer from an old-buffer random-access source plus
//! a sequential edit-script source. Copy and extra regions are moved in
//! bounded chunks, so memory use is O(transfer size) no matter how large the
//! regions are; arbitrarily large files can be patched without materializing
//! either side.

use crate::error::{Error, Result};
use crate::format::{ControlTriple, int_from_len};
use std::io::{Read, Seek, SeekFrom, Write};
use tracing::{debug, trace};

/// Default copy/extra transfer chunk size in bytes
pub const TRANSFER_SIZE: usize = 4096;

/// Random-access byte source over the old buffer
///
/// The script's `seek` field can move the old cursor backward, so
/// implementations must support arbitrary non-sequential offsets.
pub trait OldSource {
    /// Fill `buf` with the bytes at `offset`.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()>;
}

impl OldSource for &[u8] {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let start = usize::try_from(offset).map_err(|_| {
            Error::Read(std::io::Error::from(std::io::ErrorKind::UnexpectedEof))
        })?;
        let end = start.checked_add(buf.len()).filter(|&e| e <= self.len());
        match end {
            Some(end) => {
                buf.copy_from_slice(&self[start..end]);
                Ok(())
            }
            None => Err(Error::Read(std::io::Error::from(
                std::io::ErrorKind::UnexpectedEof,
            ))),
        }
    }
}

impl OldSource for std::fs::File {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.seek(SeekFrom::Start(offset)).map_err(Error::Read)?;
        self.read_exact(buf).map_err(Error::Read)
    }
}

/// Streaming patch applier
///
/// Holds only the transfer chunk size; one value can apply any number of
/// patches. Shrink the chunk size in tests to exercise the chunking paths.
#[derive(Debug, Clone, Copy)]
pub struct PatchApplier {
    transfer_size: usize,
}

impl Default for PatchApplier {
    fn default() -> Self {
        Self::new()
    }
}

impl PatchApplier {
    /// Applier with the default transfer chunk size.
    pub fn new() -> Self {
        Self {
            transfer_size: TRANSFER_SIZE,
        }
    }

    /// Applier with a custom transfer chunk size (minimum 1 byte).
    pub fn with_transfer_size(transfer_size: usize) -> Self {
        Self {
            transfer_size: transfer_size.max(1),
        }
    }

    /// Reconstruct the new buffer.
    ///
    /// Reads control triples, diff bytes, and extra bytes from `script` in
    /// the fixed triple/diff/extra order, random-accesses `old`, and appends
    /// exactly `new_size` bytes to `sink`. Old bytes addressed outside
    /// `[0, old_size)` contribute zero to the diff addition. Any triple that
    /// is negative or would overrun `new_size` aborts with
    /// [`Error::CorruptPatch`] before producing further output.
    pub fn apply<O, R, W>(
        &self,
        old: &mut O,
        old_size: u64,
        script: &mut R,
        sink: &mut W,
        new_size: u64,
    ) -> Result<u64>
    where
        O: OldSource,
        R: Read,
        W: Write,
    {
        let old_size = int_from_len(old_size)?;
        let new_size = int_from_len(new_size)?;
        debug!(
            "applying patch: old={} bytes, new={} bytes, chunk={}",
            old_size, new_size, self.transfer_size
        );

        let mut patch_buf = alloc_chunk(self.transfer_size)?;
        let mut old_buf = alloc_chunk(self.transfer_size)?;
        let mut ctrl_buf = [0u8; ControlTriple::SIZE];

        let mut old_pos: i64 = 0;
        let mut new_pos: i64 = 0;

        while new_pos < new_size {
            read_script(script, &mut ctrl_buf)?;
            let ctrl = ControlTriple::from_bytes(&ctrl_buf);
            trace!(
                "triple at newpos {}: copy={} extra={} seek={}",
                new_pos, ctrl.copy_len, ctrl.extra_len, ctrl.seek
            );

            if ctrl.copy_len < 0 || ctrl.extra_len < 0 {
                return Err(Error::CorruptPatch(
                    "negative length in control triple".to_string(),
                ));
            }
            if new_pos.checked_add(ctrl.copy_len).is_none_or(|e| e > new_size) {
                return Err(Error::CorruptPatch(
                    "copy region overruns declared new size".to_string(),
                ));
            }

            // Copy region: diff bytes plus old bytes, one bounded chunk at
            // a time.
            let mut remaining = ctrl.copy_len;
            while remaining > 0 {
                let len = remaining.min(self.transfer_size as i64) as usize;
                read_script(script, &mut patch_buf[..len])?;
                read_old_span(old, old_size, old_pos, &mut old_buf[..len])?;
                for (p, o) in patch_buf[..len].iter_mut().zip(&old_buf[..len]) {
                    *p = p.wrapping_add(*o);
                }
                sink.write_all(&patch_buf[..len]).map_err(Error::Write)?;
                remaining -= len as i64;
                old_pos += len as i64;
                new_pos += len as i64;
            }

            if new_pos.checked_add(ctrl.extra_len).is_none_or(|e| e > new_size) {
                return Err(Error::CorruptPatch(
                    "extra region overruns declared new size".to_string(),
                ));
            }

            // Extra region: verbatim stream bytes, same bounded chunks.
            let mut remaining = ctrl.extra_len;
            while remaining > 0 {
                let len = remaining.min(self.transfer_size as i64) as usize;
                read_script(script, &mut patch_buf[..len])?;
                sink.write_all(&patch_buf[..len]).map_err(Error::Write)?;
                remaining -= len as i64;
                new_pos += len as i64;
            }

            // The copy loop already advanced the old cursor by copy_len;
            // seek is the additional jump.
            old_pos = old_pos.checked_add(ctrl.seek).ok_or_else(|| {
                Error::CorruptPatch("old cursor out of range".to_string())
            })?;
        }

        debug!("patch applied: {} bytes written", new_pos);
        Ok(new_pos as u64)
    }
}

fn alloc_chunk(len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)?;
    buf.resize(len, 0);
    Ok(buf)
}

/// Read exactly `buf.len()` script bytes, keeping the error taxonomy: a
/// source that ends before the script does is a corrupt patch, decoder
/// failures keep their own classification, everything else is a read error.
fn read_script<R: Read>(script: &mut R, buf: &mut [u8]) -> Result<()> {
    script.read_exact(buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            return Error::CorruptPatch("edit script ends before declared new size".to_string());
        }
        match e.downcast::<Error>() {
            Ok(inner) => inner,
            Err(e) => Error::Read(e),
        }
    })
}

/// Read the old-buffer span starting at `old_pos`, zero-filling any part
/// outside `[0, old_size)`.
fn read_old_span<O: OldSource>(
    old: &mut O,
    old_size: i64,
    old_pos: i64,
    buf: &mut [u8],
) -> Result<()> {
    buf.fill(0);
    let span_start = old_pos.max(0);
    let span_end = old_pos.saturating_add(buf.len() as i64).min(old_size);
    if span_start >= span_end {
        return Ok(());
    }
    let dst = (span_start - old_pos) as usize;
    let len = (span_end - span_start) as usize;
    old.read_at(span_start as u64, &mut buf[dst..dst + len])
}
