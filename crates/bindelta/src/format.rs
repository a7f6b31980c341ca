//! Patch stream framing shared by the encoder and the applier
//!
//! Defines the signed-magnitude integer encoding used for every fixed-width
//! field, the 32-byte patch file header, and the control triples that drive
//! patch application. The stream layout is: header, then the compressed
//! payload; the decompressed payload is a repetition of control triple,
//! `copy_len` diff bytes, `extra_len` extra bytes, until the declared new
//! size is produced.

use crate::error::{Error, Result};
use byteorder::{ByteOrder, LittleEndian};
use std::io::{Read, Write};

/// Magic tag at offset 0 of every patch file
pub const MAGIC: &[u8; 8] = b"BDELTA01";

/// Size of the fixed patch file header in bytes
pub const HEADER_SIZE: usize = 32;

/// Width of one encoded integer field in bytes
pub const INT_SIZE: usize = 8;

/// Encode a signed integer into 8 bytes: 63 bits of little-endian
/// magnitude with the sign carried in the top bit of the final byte.
/// This is magnitude-and-sign, not two's complement.
pub fn write_int(value: i64, buf: &mut [u8; INT_SIZE]) {
    let magnitude = value.unsigned_abs();
    LittleEndian::write_u64(buf, magnitude);
    if value < 0 {
        buf[7] |= 0x80;
    }
}

/// Decode an integer written by [`write_int`].
pub fn read_int(buf: &[u8; INT_SIZE]) -> i64 {
    let raw = LittleEndian::read_u64(buf);
    let magnitude = (raw & 0x7FFF_FFFF_FFFF_FFFF) as i64;
    if raw & 0x8000_0000_0000_0000 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

/// Convert a buffer length to a header field value, rejecting lengths
/// whose magnitude does not fit the 63-bit encoding.
pub fn int_from_len(len: u64) -> Result<i64> {
    i64::try_from(len).map_err(|_| Error::TooLarge(len))
}

/// Fixed-size patch file header
///
/// Layout (byte-exact):
///
/// ```text
/// offset 0   8 bytes   magic tag "BDELTA01"
/// offset 8   8 bytes   old buffer size   (signed-magnitude LE)
/// offset 16  8 bytes   new buffer size   (signed-magnitude LE)
/// offset 24  8 bytes   compressed payload size (signed-magnitude LE)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchHeader {
    /// Size of the old buffer in bytes
    pub old_size: i64,
    /// Size of the new buffer in bytes
    pub new_size: i64,
    /// Size of the compressed payload, framing header included
    pub payload_size: i64,
}

impl PatchHeader {
    /// Build a header from buffer and payload lengths.
    pub fn new(old_size: u64, new_size: u64, payload_size: u64) -> Result<Self> {
        Ok(Self {
            old_size: int_from_len(old_size)?,
            new_size: int_from_len(new_size)?,
            payload_size: int_from_len(payload_size)?,
        })
    }

    /// Read and validate a header from a stream.
    ///
    /// A wrong magic tag or any size field that is zero or negative is a
    /// corrupt-patch condition.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; HEADER_SIZE];
        reader.read_exact(&mut buf).map_err(Error::Read)?;

        if &buf[..8] != MAGIC {
            return Err(Error::CorruptPatch("bad magic tag".to_string()));
        }

        let mut field = [0u8; INT_SIZE];
        field.copy_from_slice(&buf[8..16]);
        let old_size = read_int(&field);
        field.copy_from_slice(&buf[16..24]);
        let new_size = read_int(&field);
        field.copy_from_slice(&buf[24..32]);
        let payload_size = read_int(&field);

        if old_size <= 0 || new_size <= 0 || payload_size <= 0 {
            return Err(Error::CorruptPatch(
                "zero or negative size field in header".to_string(),
            ));
        }

        Ok(Self {
            old_size,
            new_size,
            payload_size,
        })
    }

    /// Write the header to a stream.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut buf = [0u8; HEADER_SIZE];
        buf[..8].copy_from_slice(MAGIC);

        let mut field = [0u8; INT_SIZE];
        write_int(self.old_size, &mut field);
        buf[8..16].copy_from_slice(&field);
        write_int(self.new_size, &mut field);
        buf[16..24].copy_from_slice(&field);
        write_int(self.payload_size, &mut field);
        buf[24..32].copy_from_slice(&field);

        writer.write_all(&buf).map_err(Error::Write)
    }
}

/// One edit step of the script
///
/// `copy_len` bytes are produced by adding stored diff bytes to bytes read
/// from the old buffer at the current cursor, `extra_len` bytes are copied
/// verbatim from the stream, then `seek` repositions the old cursor relative
/// to its position after the copy region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlTriple {
    /// Length of the diff-encoded region
    pub copy_len: i64,
    /// Length of the verbatim region
    pub extra_len: i64,
    /// Relative old-cursor adjustment applied after both regions
    pub seek: i64,
}

impl ControlTriple {
    /// Encoded size of one triple in bytes
    pub const SIZE: usize = 3 * INT_SIZE;

    /// Decode a triple from its 24-byte wire form.
    pub fn from_bytes(buf: &[u8; Self::SIZE]) -> Self {
        let mut field = [0u8; INT_SIZE];
        field.copy_from_slice(&buf[0..8]);
        let copy_len = read_int(&field);
        field.copy_from_slice(&buf[8..16]);
        let extra_len = read_int(&field);
        field.copy_from_slice(&buf[16..24]);
        let seek = read_int(&field);
        Self {
            copy_len,
            extra_len,
            seek,
        }
    }

    /// Encode the triple into its 24-byte wire form.
    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        let mut field = [0u8; INT_SIZE];
        write_int(self.copy_len, &mut field);
        buf[0..8].copy_from_slice(&field);
        write_int(self.extra_len, &mut field);
        buf[8..16].copy_from_slice(&field);
        write_int(self.seek, &mut field);
        buf[16..24].copy_from_slice(&field);
        buf
    }

    /// Write the triple to a stream.
    pub fn write<W: Write>(self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.to_bytes()).map_err(Error::Write)
    }
}
