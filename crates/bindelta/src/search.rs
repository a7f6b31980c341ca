//! Longest-match lookup against the suffix index

use crate::suffix::SuffixArray;

/// Length of the common prefix of two byte slices.
fn match_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

/// Find the old-buffer offset whose suffix shares the longest prefix with
/// `target`.
///
/// Binary-searches the suffix index, narrowing until two candidates remain,
/// then compares their prefix lengths directly; ties go to the
/// later-considered candidate. Returns `(match_len, old_offset)`; a zero
/// length means no byte of `target` matches anywhere. O(log(oldsize) ·
/// match_len), no allocation.
pub fn search(sa: &SuffixArray, old: &[u8], target: &[u8]) -> (usize, usize) {
    let index = sa.as_slice();
    let mut st = 0usize;
    let mut en = old.len();

    while en - st >= 2 {
        let mid = st + (en - st) / 2;
        let off = index[mid] as usize;
        let shared = (old.len() - off).min(target.len());
        // memcmp order over the shared length; equal prefixes narrow toward
        // the lower half, same as strictly-greater ones.
        if old[off..off + shared] < target[..shared] {
            st = mid;
        } else {
            en = mid;
        }
    }

    let x = match_len(&old[index[st] as usize..], target);
    let y = match_len(&old[index[en] as usize..], target);
    if x > y {
        (x, index[st] as usize)
    } else {
        (y, index[en] as usize)
    }
}
