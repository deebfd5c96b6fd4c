//! Bit extraction from fixed-width node words.
//!
//! A packed node is an unsigned integer of at most 64 bits. Fields are laid out
//! from the least significant bit upwards; `tail` reads the lowest field,
//! `head` the highest one and `body` anything in between.

/// Mask with the low `bits` bits set.
#[inline]
pub fn mask(bits: u32) -> u64 {
    debug_assert!(bits <= 64);
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// Number of bits needed to represent `value` (0 for 0).
#[inline]
pub fn bits_for(value: u64) -> u32 {
    64 - value.leading_zeros()
}

/// The `bits` most significant bits of a word that is `width` bits wide.
#[inline]
pub fn head(word: u64, width: u32, bits: u32) -> u64 {
    debug_assert!(bits <= width && width <= 64);
    if bits == 0 {
        return 0;
    }
    (word >> (width - bits)) & mask(bits)
}

/// `bits` bits starting at bit `shift`.
#[inline]
pub fn body(word: u64, shift: u32, bits: u32) -> u64 {
    debug_assert!(shift + bits <= 64);
    if bits == 0 || shift >= 64 {
        return 0;
    }
    (word >> shift) & mask(bits)
}

/// The `bits` least significant bits.
#[inline]
pub fn tail(word: u64, bits: u32) -> u64 {
    word & mask(bits)
}

/// Places `value` at bit `shift`. `value` must already fit in the field.
#[inline]
pub fn place(value: u64, shift: u32, bits: u32) -> u64 {
    debug_assert!(value & !mask(bits) == 0, "value {value} wider than {bits} bits");
    if bits == 0 {
        return 0;
    }
    value << shift
}

/// Little-endian read of a `len`-byte group (1..=8 bytes).
#[inline]
pub fn read_le(bytes: &[u8]) -> u64 {
    debug_assert!(bytes.len() <= 8);
    let mut out = 0u64;
    for (i, &b) in bytes.iter().enumerate() {
        out |= u64::from(b) << (i * 8);
    }
    out
}

/// Little-endian write of the low `out.len()` bytes of `word`.
#[inline]
pub fn write_le(word: u64, out: &mut [u8]) {
    debug_assert!(out.len() <= 8);
    for (i, b) in out.iter_mut().enumerate() {
        *b = (word >> (i * 8)) as u8;
    }
}
