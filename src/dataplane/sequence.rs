//! RFC 793 sequence-number arithmetic
//!
//! Sequence numbers live in a 32-bit circular space; `a` is before `b`
//! when the signed distance `a - b` is negative. Plain integer comparison
//! is wrong as soon as a connection crosses the 2^32 boundary.

/// `a` strictly before `b`
#[inline]
pub fn seq_lt(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) < 0
}

/// `a` before or equal to `b`
#[inline]
pub fn seq_le(a: u32, b: u32) -> bool {
    a == b || seq_lt(a, b)
}

/// `a` strictly after `b`
#[inline]
pub fn seq_gt(a: u32, b: u32) -> bool {
    seq_lt(b, a)
}

/// `a` after or equal to `b`
#[inline]
pub fn seq_ge(a: u32, b: u32) -> bool {
    seq_le(b, a)
}

/// `lo < x <= hi` in sequence space
#[inline]
pub fn seq_in_window(x: u32, lo: u32, hi: u32) -> bool {
    seq_lt(lo, x) && seq_le(x, hi)
}
