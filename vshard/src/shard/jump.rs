//! Jump Consistent Hash
//!
//! Lamping & Veach, "A Fast, Minimal Memory, Consistent Hash Algorithm".
//! Growing the bucket count from n to n+1 only moves keys into bucket n.

const JUMP_MULTIPLIER: u64 = 2_862_933_555_777_941_757;

/// Map a 64-bit fingerprint to a bucket in `[0, buckets)`
///
/// Returns 0 when `buckets` is 0 or 1.
pub fn jump_hash(mut key: u64, buckets: usize) -> usize {
    if buckets <= 1 {
        return 0;
    }

    let mut b: i64 = -1;
    let mut j: i64 = 0;

    while j < buckets as i64 {
        b = j;
        key = key.wrapping_mul(JUMP_MULTIPLIER).wrapping_add(1);
        j = ((b + 1) as f64 * ((1u64 << 31) as f64 / ((key >> 33) + 1) as f64)) as i64;
    }

    b as usize
}
