//! Compressed payload framing and the streaming script decoder
//!
//! The edit script is carried through an opaque byte-stream compressor
//! (zlib). The payload begins with a fixed 8-byte framing header holding the
//! uncompressed script length, followed by the zlib stream. [`ScriptDecoder`]
//! is the owned per-session decoding context: it pulls compressed bytes in
//! bounded reads, inflates bounded bursts into a ring queue, and hands the
//! applier exactly the bytes it asks for. Memory use stays O(buffer sizes)
//! regardless of payload size.

use crate::error::{Error, Result};
use crate::ring::RingBuffer;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use flate2::{Compression, Decompress, FlushDecompress, Status};
use std::io::{Read, Write};
use tracing::{debug, trace};

/// Size of the framing header preceding the compressed stream
pub const FRAME_HEADER_SIZE: usize = 8;

/// Compressed bytes pulled from the patch source per refill
const IN_CHUNK: usize = 16 * 1024;

/// Uncompressed bytes produced per inflate burst
const OUT_CHUNK: usize = 16 * 1024;

/// Compress an edit script into a framed payload.
///
/// Output is the 8-byte little-endian uncompressed length followed by the
/// zlib stream.
pub fn compress_script(script: &[u8]) -> Result<Vec<u8>> {
    let mut payload = Vec::with_capacity(FRAME_HEADER_SIZE + script.len() / 2);
    payload
        .write_u64::<LittleEndian>(script.len() as u64)
        .map_err(Error::Write)?;

    let mut encoder = flate2::write::ZlibEncoder::new(payload, Compression::best());
    encoder.write_all(script).map_err(Error::Write)?;
    let payload = encoder.finish().map_err(Error::Write)?;

    debug!(
        "compressed {} script bytes into {} payload bytes",
        script.len(),
        payload.len()
    );
    Ok(payload)
}

/// Streaming decoder for a framed payload
///
/// One decoder value serves one patch-apply session; it owns the inflater
/// state and the ring queue, both released when the value drops. The reader
/// must be positioned at the payload's framing header.
#[derive(Debug)]
pub struct ScriptDecoder<R: Read> {
    reader: R,
    inflate: Decompress,
    ring: RingBuffer,
    in_buf: Vec<u8>,
    in_pos: usize,
    in_len: usize,
    /// Compressed bytes of the payload not yet pulled from the reader
    compressed_left: u64,
    /// Uncompressed bytes the framing header still promises
    unpacked_left: u64,
}

impl<R: Read> ScriptDecoder<R> {
    /// Read the framing header and prepare a decoding session.
    ///
    /// `payload_size` is the header-declared payload size, framing header
    /// included.
    pub fn new(mut reader: R, payload_size: u64) -> Result<Self> {
        if payload_size < FRAME_HEADER_SIZE as u64 {
            return Err(Error::CorruptPatch(
                "payload smaller than its framing header".to_string(),
            ));
        }
        let unpacked = reader.read_u64::<LittleEndian>().map_err(Error::Read)?;
        trace!("payload declares {} uncompressed script bytes", unpacked);

        let ring = RingBuffer::with_capacity(OUT_CHUNK * 2)?;
        let mut in_buf = Vec::new();
        in_buf.try_reserve_exact(IN_CHUNK)?;
        in_buf.resize(IN_CHUNK, 0);

        Ok(Self {
            reader,
            inflate: Decompress::new(true),
            ring,
            in_buf,
            in_pos: 0,
            in_len: 0,
            compressed_left: payload_size - FRAME_HEADER_SIZE as u64,
            unpacked_left: unpacked,
        })
    }

    /// Uncompressed bytes not yet handed out.
    pub fn remaining(&self) -> u64 {
        self.unpacked_left + self.ring.len() as u64
    }

    /// Inflate one burst into the ring queue.
    fn fill(&mut self) -> Result<()> {
        if self.in_pos == self.in_len && self.compressed_left > 0 {
            let want = (self.in_buf.len() as u64).min(self.compressed_left) as usize;
            self.reader
                .read_exact(&mut self.in_buf[..want])
                .map_err(Error::Read)?;
            self.in_pos = 0;
            self.in_len = want;
            self.compressed_left -= want as u64;
        }

        let mut burst = [0u8; OUT_CHUNK];
        let room = burst.len().min(self.ring.available());
        let before_in = self.inflate.total_in();
        let before_out = self.inflate.total_out();
        let status = self
            .inflate
            .decompress(
                &self.in_buf[self.in_pos..self.in_len],
                &mut burst[..room],
                FlushDecompress::None,
            )
            .map_err(|e| Error::Decompression(e.to_string()))?;
        let consumed = (self.inflate.total_in() - before_in) as usize;
        let produced = (self.inflate.total_out() - before_out) as usize;
        self.in_pos += consumed;

        if produced as u64 > self.unpacked_left {
            return Err(Error::CorruptPatch(
                "payload inflates past its declared script length".to_string(),
            ));
        }
        self.ring.insert(&burst[..produced]);
        self.unpacked_left -= produced as u64;

        if produced == 0 && consumed == 0 && self.unpacked_left > 0 {
            return match status {
                Status::StreamEnd => Err(Error::CorruptPatch(
                    "compressed stream ends before the declared script length".to_string(),
                )),
                _ if self.compressed_left == 0 => Err(Error::CorruptPatch(
                    "truncated compressed payload".to_string(),
                )),
                _ => Err(Error::Decompression("inflater made no progress".to_string())),
            };
        }
        Ok(())
    }
}

impl<R: Read> Read for ScriptDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.ring.is_empty() {
            if self.unpacked_left == 0 {
                return Ok(0);
            }
            self.fill().map_err(std::io::Error::other)?;
        }
        Ok(self.ring.pop(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn decode_all(payload: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = ScriptDecoder::new(Cursor::new(payload), payload.len() as u64)?;
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| e.downcast::<Error>().unwrap_or_else(Error::Read))?;
        Ok(out)
    }

    #[test]
    fn payload_roundtrip() {
        let script: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let payload = compress_script(&script).unwrap();
        assert!(payload.len() >= FRAME_HEADER_SIZE);

        assert_eq!(decode_all(&payload).unwrap(), script);
    }

    #[test]
    fn empty_script_roundtrip() {
        let payload = compress_script(b"").unwrap();
        assert_eq!(decode_all(&payload).unwrap(), b"");
    }

    #[test]
    fn decoder_reads_in_small_pieces() {
        let script = vec![0x5Au8; 100_000];
        let payload = compress_script(&script).unwrap();

        let mut decoder = ScriptDecoder::new(Cursor::new(&payload), payload.len() as u64).unwrap();
        let mut out = Vec::new();
        let mut piece = [0u8; 7];
        loop {
            let n = decoder.read(&mut piece).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&piece[..n]);
        }
        assert_eq!(out, script);
        assert_eq!(decoder.remaining(), 0);
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let script = vec![0x42u8; 50_000];
        let mut payload = compress_script(&script).unwrap();
        payload.truncate(payload.len() / 2);

        let err = decode_all(&payload).unwrap_err();
        assert!(matches!(
            err,
            Error::CorruptPatch(_) | Error::Decompression(_) | Error::Read(_)
        ));
    }

    #[test]
    fn overlong_stream_is_rejected() {
        // Frame claims fewer bytes than the stream actually inflates to.
        let script = vec![0x42u8; 50_000];
        let mut payload = compress_script(&script).unwrap();
        payload[..8].copy_from_slice(&1u64.to_le_bytes());

        let mut decoder =
            ScriptDecoder::new(Cursor::new(&payload), payload.len() as u64).unwrap();
        let mut out = Vec::new();
        let err = decoder.read_to_end(&mut out).unwrap_err();
        let err = err.downcast::<Error>().unwrap_or_else(Error::Read);
        assert!(matches!(err, Error::CorruptPatch(_)));
    }

    #[test]
    fn undersized_payload_field_is_rejected() {
        let err = ScriptDecoder::new(Cursor::new(&[0u8; 4][..]), 4).unwrap_err();
        assert!(matches!(err, Error::CorruptPatch(_)));
    }
}
