//! Shared utilities.

mod bitset;

pub use bitset::{BitSet, Iter as BitSetIter};

/// Mask with the low `bits` bits set (`bits` may be 64).
#[must_use]
pub const fn low_mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// Repeats `byte` across a `bit_size`-bit pattern (`0x55` at 16 bits is `0x5555`).
#[must_use]
pub const fn replicate_byte(byte: u8, bit_size: u32) -> u64 {
    (u64::MAX / 0xff * byte as u64) & low_mask(bit_size)
}

/// Sign-extends the low `bits` bits of `raw`.
#[must_use]
pub const fn sign_extend(raw: u64, bits: u32) -> i64 {
    if bits >= 64 {
        raw as i64
    } else {
        let shift = 64 - bits;
        ((raw << shift) as i64) >> shift
    }
}

/// Rounds an `f32` to the nearest IEEE half-precision bit pattern (ties to even).
#[must_use]
pub fn f32_to_f16_bits(x: f32) -> u16 {
    let bits = x.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exp = ((bits >> 23) & 0xff) as i32;
    let mant = bits & 0x7f_ffff;

    if exp == 0xff {
        return sign | 0x7c00 | if mant != 0 { 0x200 } else { 0 };
    }
    let e = exp - 127 + 15;
    if e >= 0x1f {
        return sign | 0x7c00;
    }
    if e <= 0 {
        if e < -10 {
            return sign;
        }
        let m = mant | 0x80_0000;
        let shift = (14 - e) as u32;
        return sign | round_half_even(m, shift) as u16;
    }
    let biased = ((e as u32) << 10) | (mant >> 13);
    let rem = mant & 0x1fff;
    let rounded = if rem > 0x1000 || (rem == 0x1000 && biased & 1 == 1) {
        biased + 1
    } else {
        biased
    };
    sign | rounded as u16
}

fn round_half_even(m: u32, shift: u32) -> u32 {
    let kept = m >> shift;
    let rem = m & ((1 << shift) - 1);
    let halfway = 1 << (shift - 1);
    if rem > halfway || (rem == halfway && kept & 1 == 1) {
        kept + 1
    } else {
        kept
    }
}
