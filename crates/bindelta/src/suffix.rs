//! Suffix index construction over the old buffer
//!
//! Implements the doubling sort used by the diff encoder: suffixes are
//! bucketed by first byte, then repeatedly refined at doubling comparison
//! depths until every suffix holds a unique rank. During construction the
//! index array carries negative run-length markers (`I[i] == -len` means the
//! next `len` entries are fully sorted); the markers never escape this
//! module.

use crate::error::Result;
use tracing::debug;

/// Groups shorter than this are refined with a selection pass instead of a
/// three-way partition.
const SMALL_GROUP: i64 = 16;

/// Sorted suffix index over an old buffer
///
/// Holds a permutation of `0..=oldsize` (the entry `oldsize` is the empty
/// sentinel suffix) ordering the buffer's suffixes lexicographically.
#[derive(Debug)]
pub struct SuffixArray {
    index: Vec<i64>,
}

impl SuffixArray {
    /// Build the suffix index for `old`.
    ///
    /// O(n log n) comparisons, two O(n) integer arrays; the rank array is
    /// dropped once construction completes. Fails only if the arrays cannot
    /// be allocated.
    pub fn build(old: &[u8]) -> Result<Self> {
        let (index, _ranks) = build_arrays(old)?;
        Ok(Self { index })
    }

    /// Number of index entries (`oldsize + 1`).
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Always false: even an empty buffer has its sentinel suffix.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub(crate) fn as_slice(&self) -> &[i64] {
        &self.index
    }
}

fn alloc_array(len: usize) -> Result<Vec<i64>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)?;
    v.resize(len, 0);
    Ok(v)
}

/// Build both the suffix index and the rank array.
///
/// Exposed to tests so the `I[V[j]] == j` invariant can be checked directly;
/// callers outside this crate only see the index through [`SuffixArray`].
pub(crate) fn build_arrays(old: &[u8]) -> Result<(Vec<i64>, Vec<i64>)> {
    let oldsize = old.len();
    let n = oldsize + 1;
    debug!("building suffix index over {} bytes", oldsize);

    let mut index = alloc_array(n)?;
    let mut ranks = alloc_array(n)?;

    // Counting sort on the first byte seeds the ordering. After the fill
    // loop each bucket entry holds the end position of its bucket, which is
    // exactly the shared rank of every suffix in it.
    let mut buckets = [0i64; 256];
    for &b in old {
        buckets[b as usize] += 1;
    }
    for i in 1..256 {
        buckets[i] += buckets[i - 1];
    }
    for i in (1..256).rev() {
        buckets[i] = buckets[i - 1];
    }
    buckets[0] = 0;

    for (j, &b) in old.iter().enumerate() {
        buckets[b as usize] += 1;
        index[buckets[b as usize] as usize] = j as i64;
    }
    index[0] = oldsize as i64;
    for (j, &b) in old.iter().enumerate() {
        ranks[j] = buckets[b as usize];
    }
    ranks[oldsize] = 0;
    for i in 1..256 {
        if buckets[i] == buckets[i - 1] + 1 {
            index[buckets[i] as usize] = -1;
        }
    }
    index[0] = -1;

    // Double the comparison depth until the marker at the front covers the
    // whole array, meaning every suffix is uniquely ranked.
    let mut h: i64 = 1;
    while index[0] != -(n as i64) {
        let mut run: i64 = 0;
        let mut i: i64 = 0;
        while i < n as i64 {
            if index[i as usize] < 0 {
                run -= index[i as usize];
                i -= index[i as usize];
            } else {
                if run != 0 {
                    index[(i - run) as usize] = -run;
                }
                let group_len = ranks[index[i as usize] as usize] + 1 - i;
                split(&mut index, &mut ranks, i, group_len, h);
                i += group_len;
                run = 0;
            }
        }
        if run != 0 {
            index[(i - run) as usize] = -run;
        }
        h += h;
    }

    // The markers consumed the index; rebuild it from the rank array.
    for j in 0..n {
        index[ranks[j] as usize] = j as i64;
    }

    Ok((index, ranks))
}

enum Task {
    Range { start: i64, len: i64 },
    Assign { lt_end: i64, eq_end: i64 },
}

/// Refine a group of suffixes tied at depth `h`.
///
/// The comparison key for the suffix at `index[k]` is the rank of its
/// continuation `h` bytes in. Small groups use a stable selection pass;
/// larger ones a deterministic middle-pivot three-way partition. An explicit
/// work stack stands in for the original recursion so pathological inputs
/// cannot exhaust the call stack; pop order replays the recursive order
/// exactly (less-than range, equal-group rank assignment, greater-than
/// range), which the rank updates rely on.
fn split(index: &mut [i64], ranks: &mut [i64], start: i64, len: i64, h: i64) {
    let mut work = vec![Task::Range { start, len }];

    while let Some(task) = work.pop() {
        let (start, len) = match task {
            Task::Assign { lt_end, eq_end } => {
                for t in 0..eq_end - lt_end {
                    ranks[index[(lt_end + t) as usize] as usize] = eq_end - 1;
                }
                if lt_end == eq_end - 1 {
                    index[lt_end as usize] = -1;
                }
                continue;
            }
            Task::Range { start, len } => (start, len),
        };

        if len < SMALL_GROUP {
            // Selection pass: pull each minimum-key run to the front, give
            // it a shared rank, and mark singletons sorted.
            let mut k = start;
            while k < start + len {
                let mut run: i64 = 1;
                let mut min_key = ranks[(index[k as usize] + h) as usize];
                let mut i: i64 = 1;
                while k + i < start + len {
                    let key = ranks[(index[(k + i) as usize] + h) as usize];
                    if key < min_key {
                        min_key = key;
                        run = 0;
                    }
                    if key == min_key {
                        index.swap((k + run) as usize, (k + i) as usize);
                        run += 1;
                    }
                    i += 1;
                }
                for t in 0..run {
                    ranks[index[(k + t) as usize] as usize] = k + run - 1;
                }
                if run == 1 {
                    index[k as usize] = -1;
                }
                k += run;
            }
            continue;
        }

        // Deterministic middle pivot; the key sequence at any level is far
        // from adversarial by construction.
        let pivot = ranks[(index[(start + len / 2) as usize] + h) as usize];
        let mut lt_end: i64 = 0;
        let mut eq_end: i64 = 0;
        for i in start..start + len {
            let key = ranks[(index[i as usize] + h) as usize];
            if key < pivot {
                lt_end += 1;
            }
            if key == pivot {
                eq_end += 1;
            }
        }
        lt_end += start;
        eq_end += lt_end;

        let mut i = start;
        let mut j: i64 = 0;
        let mut k: i64 = 0;
        while i < lt_end {
            let key = ranks[(index[i as usize] + h) as usize];
            if key < pivot {
                i += 1;
            } else if key == pivot {
                index.swap(i as usize, (lt_end + j) as usize);
                j += 1;
            } else {
                index.swap(i as usize, (eq_end + k) as usize);
                k += 1;
            }
        }
        while lt_end + j < eq_end {
            if ranks[(index[(lt_end + j) as usize] + h) as usize] == pivot {
                j += 1;
            } else {
                index.swap((lt_end + j) as usize, (eq_end + k) as usize);
                k += 1;
            }
        }

        // LIFO stack: push in reverse of the required processing order.
        if start + len > eq_end {
            work.push(Task::Range {
                start: eq_end,
                len: start + len - eq_end,
            });
        }
        work.push(Task::Assign { lt_end, eq_end });
        if lt_end > start {
            work.push(Task::Range {
                start,
                len: lt_end - start,
            });
        }
    }
}
