//! Tiny decimal-rendering helper shared by the reassembler's missing-list
//! truncation and the chunked sender's Begin/chunk payload framing. Kept
//! separate from `core::fmt` since these crates are `no_std` without
//! `alloc` and the payloads being built are plain byte buffers, not
//! `Display` targets.

/// Writes `value`'s decimal digits into `out`, returning how many bytes
/// were written. `u16`'s largest value is 5 digits, so `out` must be at
/// least that long.
pub(crate) fn write_u16(mut value: u16, out: &mut [u8; 5]) -> usize {
    if value == 0 {
        out[0] = b'0';
        return 1;
    }
    let mut tmp = [0u8; 5];
    let mut n = 0;
    while value > 0 {
        tmp[n] = b'0' + (value % 10) as u8;
        value /= 10;
        n += 1;
    }
    for i in 0..n {
        out[i] = tmp[n - 1 - i];
    }
    n
}
