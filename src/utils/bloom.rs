//! Per-chunk bloom filter over case-folded 4-grams.
//!
//! The filter is a plain byte array persisted verbatim in the data file, so
//! the probe sequence is frozen: double hashing `h1 + j*h2` with both hashes
//! derived from the 4-gram key by a fixed mixing function. Builder and
//! searcher must agree bit-for-bit.

use crate::utils::casefold::fmix32;

/// Derive the double-hashing pair for a 4-gram key.
///
/// `h2` is forced odd so it is never zero and the probe walk never
/// degenerates to a single bit.
#[inline]
fn probe_pair(hash: u32) -> (u32, u32) {
    let h1 = hash;
    let h2 = fmix32(hash ^ 0x27d4_eb2f) | 1;
    (h1, h2)
}

/// Set `iterations` bits for `hash` in `index`.
pub fn bloom_update(index: &mut [u8], hash: u32, iterations: u32) {
    if index.is_empty() {
        return;
    }

    let bits = (index.len() * 8) as u32;
    let (h1, h2) = probe_pair(hash);

    for j in 0..iterations {
        let bit = h1.wrapping_add(j.wrapping_mul(h2)) % bits;
        index[(bit / 8) as usize] |= 1 << (bit % 8);
    }
}

/// Test whether every probe bit for `hash` is set.
///
/// An empty index means the chunk was too small to carry one; it filters
/// nothing, so everything is possibly present.
pub fn bloom_test(index: &[u8], hash: u32, iterations: u32) -> bool {
    if index.is_empty() {
        return true;
    }

    let bits = (index.len() * 8) as u32;
    let (h1, h2) = probe_pair(hash);

    for j in 0..iterations {
        let bit = h1.wrapping_add(j.wrapping_mul(h2)) % bits;
        if index[(bit / 8) as usize] & (1 << (bit % 8)) == 0 {
            return false;
        }
    }
    true
}

/// Index size for a chunk with `data_size` bytes of file contents.
///
/// Data compresses roughly 5x and the index should stay around 10% of the
/// compressed payload, hence the /50. Tiny indices are not worth storing.
pub fn index_size_for(data_size: usize) -> usize {
    let index_size = data_size / 50;
    if index_size < 1024 {
        0
    } else {
        index_size
    }
}

/// Optimal hash iteration count `k = ln2 * m / n`, rounded and clamped to
/// `[1, 16]`.
pub fn index_hash_iterations(index_size: usize, item_count: usize) -> u32 {
    let m = (index_size * 8) as f64;
    let n = item_count as f64;
    let k = if item_count == 0 {
        1.0
    } else {
        std::f64::consts::LN_2 * m / n
    };

    (k.round() as u32).clamp(1, 16)
}
