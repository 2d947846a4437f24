//! Circular 32-bit sequence number arithmetic (spec §4.1).
//!
//! Every comparison between two sequence numbers in the tracker, the
//! retransmit queue, and the congestion controller must go through here
//! rather than through `u32`'s native `<`/`>` — those break the moment a
//! sequence wraps past `u32::MAX`, which a long-running client will
//! eventually do.

/// `a` is considered ahead of `b` iff `(a - b) mod 2^32` falls in `(0, 2^31)`.
pub fn ahead_of(a: u32, b: u32) -> bool {
    let diff = a.wrapping_sub(b);
    diff != 0 && diff < 0x8000_0000
}

/// Signed circular distance from `b` to `a`: positive when `a` is ahead of
/// `b`, negative when behind, magnitude bounded by `2^31`.
pub fn circular_distance(a: u32, b: u32) -> i64 {
    let diff = a.wrapping_sub(b) as i64;
    if diff >= 0x8000_0000 {
        diff - 0x1_0000_0000
    } else {
        diff
    }
}

/// `a >= b` under circular semantics (ahead of or equal to).
pub fn at_or_ahead(a: u32, b: u32) -> bool {
    a == b || ahead_of(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_ahead() {
        assert!(ahead_of(5, 3));
        assert!(!ahead_of(3, 5));
        assert!(!ahead_of(3, 3));
    }

    #[test]
    fn wraparound_ahead() {
        // scenario 7: expected_seq = 0xFFFFFFFE, then 0xFFFFFFFF, 0, 1
        assert!(ahead_of(0xFFFF_FFFF, 0xFFFF_FFFE));
        assert!(ahead_of(0, 0xFFFF_FFFF));
        assert!(ahead_of(1, 0));
        assert!(ahead_of(1, 0xFFFF_FFFE));
    }

    #[test]
    fn half_range_boundary() {
        // exactly half the range is ahead, the other half is not (per the
        // (0, 2^31) open interval in the spec).
        assert!(ahead_of(0x8000_0000, 0));
        assert!(!ahead_of(0, 0x8000_0000));
    }

    #[test]
    fn distance_signs() {
        assert_eq!(circular_distance(5, 3), 2);
        assert_eq!(circular_distance(3, 5), -2);
        assert_eq!(circular_distance(1, 0xFFFF_FFFE), 3);
    }

    #[test]
    fn at_or_ahead_equal() {
        assert!(at_or_ahead(7, 7));
        assert!(at_or_ahead(8, 7));
        assert!(!at_or_ahead(6, 7));
    }
}
