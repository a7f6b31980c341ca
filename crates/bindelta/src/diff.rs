//! Edit script encoder
//!
//! Drives a forward scan over the new buffer, repeatedly querying the suffix
//! index for the best old-buffer match, and turns the matches into control
//! triples via the greedy cut and overlap-trimming heuristic. The emitted
//! script is the uncompressed payload of the patch format: each triple is
//! followed by its diff-byte segment (wrapping byte-wise `new - old`) and its
//! verbatim extra segment.

use crate::error::{Error, Result};
use crate::format::ControlTriple;
use crate::search::search;
use crate::suffix::SuffixArray;
use std::io::Write;
use tracing::{debug, trace};

/// True if `at` is a valid old-buffer offset holding exactly `byte`.
fn old_matches(old: &[u8], at: i64, byte: u8) -> bool {
    at >= 0 && (at as usize) < old.len() && old[at as usize] == byte
}

/// Compute the edit script turning `old` into `new` and write it to `sink`.
///
/// Builds the suffix index internally; use [`diff_with_index`] to reuse one
/// index across several diffs against the same old buffer.
pub fn diff<W: Write>(old: &[u8], new: &[u8], sink: &mut W) -> Result<()> {
    let sa = SuffixArray::build(old)?;
    diff_with_index(&sa, old, new, sink)
}

/// Compute the edit script using a prebuilt suffix index over `old`.
///
/// Single forward pass over `new`; every candidate match costs one
/// O(log(oldsize)) index probe. The sink sees a pure append stream and any
/// write failure is propagated immediately.
pub fn diff_with_index<W: Write>(
    sa: &SuffixArray,
    old: &[u8],
    new: &[u8],
    sink: &mut W,
) -> Result<()> {
    let oldsize = old.len() as i64;
    let newsize = new.len() as i64;
    debug!("diffing {} bytes against {} bytes", newsize, oldsize);

    let mut scratch: Vec<u8> = Vec::new();
    scratch.try_reserve_exact(new.len())?;

    let mut scan: i64 = 0;
    let mut len: i64 = 0;
    let mut pos: i64 = 0;
    let mut last_scan: i64 = 0;
    let mut last_pos: i64 = 0;
    let mut last_offset: i64 = 0;
    let mut triples: u64 = 0;

    while scan < newsize {
        // Probe forward for the next strong match. `oldscore` counts how
        // many bytes of the probed region already agree with old under the
        // previous offset; a match that merely equals it is no improvement.
        let mut oldscore: i64 = 0;
        scan += len;
        let mut scsc = scan;
        while scan < newsize {
            let (l, p) = search(sa, old, &new[scan as usize..]);
            len = l as i64;
            pos = p as i64;

            while scsc < scan + len {
                if old_matches(old, scsc + last_offset, new[scsc as usize]) {
                    oldscore += 1;
                }
                scsc += 1;
            }

            if (len == oldscore && len != 0) || len > oldscore + 8 {
                break;
            }

            if old_matches(old, scan + last_offset, new[scan as usize]) {
                oldscore -= 1;
            }
            scan += 1;
        }

        if len != oldscore || scan == newsize {
            // Extend the previous match forward, keeping the prefix length
            // that maximizes the density score 2*matches - length.
            let mut s: i64 = 0;
            let mut sf: i64 = 0;
            let mut lenf: i64 = 0;
            let mut i: i64 = 0;
            while last_scan + i < scan && last_pos + i < oldsize {
                if old[(last_pos + i) as usize] == new[(last_scan + i) as usize] {
                    s += 1;
                }
                i += 1;
                if s * 2 - i > sf * 2 - lenf {
                    sf = s;
                    lenf = i;
                }
            }

            // And the new match backward, by the same score.
            let mut lenb: i64 = 0;
            if scan < newsize {
                let mut s: i64 = 0;
                let mut sb: i64 = 0;
                let mut i: i64 = 1;
                while scan >= last_scan + i && pos >= i {
                    if old[(pos - i) as usize] == new[(scan - i) as usize] {
                        s += 1;
                    }
                    if s * 2 - i > sb * 2 - lenb {
                        sb = s;
                        lenb = i;
                    }
                    i += 1;
                }
            }

            // The two extensions may claim the same bytes; score every split
            // point in the overlap and cut where prediction is best.
            if last_scan + lenf > scan - lenb {
                let overlap = (last_scan + lenf) - (scan - lenb);
                let mut s: i64 = 0;
                let mut best: i64 = 0;
                let mut cut: i64 = 0;
                for i in 0..overlap {
                    if new[(last_scan + lenf - overlap + i) as usize]
                        == old[(last_pos + lenf - overlap + i) as usize]
                    {
                        s += 1;
                    }
                    if new[(scan - lenb + i) as usize] == old[(pos - lenb + i) as usize] {
                        s -= 1;
                    }
                    if s > best {
                        best = s;
                        cut = i + 1;
                    }
                }
                lenf += cut - overlap;
                lenb -= cut;
            }

            let ctrl = ControlTriple {
                copy_len: lenf,
                extra_len: (scan - lenb) - (last_scan + lenf),
                seek: (pos - lenb) - (last_pos + lenf),
            };
            trace!(
                "triple {}: copy={} extra={} seek={}",
                triples, ctrl.copy_len, ctrl.extra_len, ctrl.seek
            );
            ctrl.write(sink)?;

            scratch.clear();
            for i in 0..lenf {
                scratch.push(
                    new[(last_scan + i) as usize].wrapping_sub(old[(last_pos + i) as usize]),
                );
            }
            sink.write_all(&scratch).map_err(Error::Write)?;
            sink.write_all(&new[(last_scan + lenf) as usize..(scan - lenb) as usize])
                .map_err(Error::Write)?;

            triples += 1;
            last_scan = scan - lenb;
            last_pos = pos - lenb;
            last_offset = pos - scan;
        }
    }

    debug!("edit script complete: {} control triples", triples);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::INT_SIZE;
    use crate::format::read_int;

    /// Parse a raw edit script back into (triple, diff bytes, extra bytes)
    /// steps for assertions.
    fn parse_script(mut script: &[u8]) -> Vec<(ControlTriple, Vec<u8>, Vec<u8>)> {
        let mut steps = Vec::new();
        while !script.is_empty() {
            let mut field = [0u8; INT_SIZE];
            field.copy_from_slice(&script[0..8]);
            let copy_len = read_int(&field);
            field.copy_from_slice(&script[8..16]);
            let extra_len = read_int(&field);
            field.copy_from_slice(&script[16..24]);
            let seek = read_int(&field);
            script = &script[ControlTriple::SIZE..];

            let diff_bytes = script[..copy_len as usize].to_vec();
            script = &script[copy_len as usize..];
            let extra_bytes = script[..extra_len as usize].to_vec();
            script = &script[extra_len as usize..];

            steps.push((
                ControlTriple {
                    copy_len,
                    extra_len,
                    seek,
                },
                diff_bytes,
                extra_bytes,
            ));
        }
        steps
    }

    /// Reference applier over in-memory buffers.
    fn replay(old: &[u8], script: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut old_pos: i64 = 0;
        for (ctrl, diff_bytes, extra_bytes) in parse_script(script) {
            for (i, &d) in diff_bytes.iter().enumerate() {
                let at = old_pos + i as i64;
                let o = if at >= 0 && (at as usize) < old.len() {
                    old[at as usize]
                } else {
                    0
                };
                out.push(d.wrapping_add(o));
            }
            old_pos += ctrl.copy_len;
            out.extend_from_slice(&extra_bytes);
            old_pos += ctrl.seek;
        }
        out
    }

    fn script_for(old: &[u8], new: &[u8]) -> Vec<u8> {
        let mut script = Vec::new();
        diff(old, new, &mut script).unwrap();
        script
    }

    #[test]
    fn empty_old_emits_single_extra_triple() {
        let script = script_for(b"", b"hello");
        let steps = parse_script(&script);

        assert_eq!(steps.len(), 1);
        let (ctrl, diff_bytes, extra_bytes) = &steps[0];
        assert_eq!(
            *ctrl,
            ControlTriple {
                copy_len: 0,
                extra_len: 5,
                seek: 0
            }
        );
        assert!(diff_bytes.is_empty());
        assert_eq!(extra_bytes, b"hello");
    }

    #[test]
    fn empty_new_emits_empty_script() {
        let script = script_for(b"anything", b"");
        assert!(script.is_empty());
    }

    #[test]
    fn identity_diff_is_one_zero_triple() {
        let old = b"identical content, byte for byte";
        let script = script_for(old, old);
        let steps = parse_script(&script);

        assert_eq!(steps.len(), 1);
        let (ctrl, diff_bytes, extra_bytes) = &steps[0];
        assert_eq!(ctrl.copy_len, old.len() as i64);
        assert_eq!(ctrl.extra_len, 0);
        assert!(diff_bytes.iter().all(|&b| b == 0));
        assert!(extra_bytes.is_empty());
    }

    #[test]
    fn single_byte_substitution() {
        let old = b"abcdefgh";
        let new = b"abcXefgh";
        let script = script_for(old, new);
        let steps = parse_script(&script);

        // The forward extension absorbs the whole buffer (density score
        // peaks at full length), so the substitution rides in the diff
        // segment of a single triple.
        assert_eq!(steps.len(), 1);
        let (ctrl, diff_bytes, extra_bytes) = &steps[0];
        assert_eq!(ctrl.copy_len, 8);
        assert_eq!(ctrl.extra_len, 0);
        assert_eq!(diff_bytes[3], b'X'.wrapping_sub(b'd'));
        assert!(
            diff_bytes
                .iter()
                .enumerate()
                .all(|(i, &b)| i == 3 || b == 0)
        );
        assert!(extra_bytes.is_empty());

        assert_eq!(replay(old, &script), new);
    }

    #[test]
    fn insertion_round_trips() {
        let old = b"the quick brown fox jumps over the lazy dog";
        let new = b"the quick brown cat and fox jumps over the lazy dog";
        assert_eq!(replay(old, &script_for(old, new)), new);
    }

    #[test]
    fn deletion_round_trips() {
        let old = b"one two three four five six seven";
        let new = b"one two four six seven";
        assert_eq!(replay(old, &script_for(old, new)), new);
    }

    #[test]
    fn disjoint_buffers_round_trip() {
        let old = vec![0x11u8; 300];
        let new = vec![0xEEu8; 200];
        assert_eq!(replay(&old, &script_for(&old, &new)), new);
    }

    #[test]
    fn rearranged_blocks_round_trip() {
        let mut old = Vec::new();
        let mut new = Vec::new();
        for block in [b"AAAA", b"BBBB", b"CCCC", b"DDDD"] {
            old.extend_from_slice(&block.repeat(64));
        }
        for block in [b"DDDD", b"AAAA", b"XXXX", b"BBBB"] {
            new.extend_from_slice(&block.repeat(64));
        }
        assert_eq!(replay(&old, &script_for(&old, &new)), new);
    }

    #[test]
    fn wraparound_diff_bytes_are_exact() {
        // 0x01 -> 0xFF forces the subtraction to wrap.
        let old = [0x01u8, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        let new = [0xFFu8, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        assert_eq!(replay(&old, &script_for(&old, &new)), new);
    }
}
