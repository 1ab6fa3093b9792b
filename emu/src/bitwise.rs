use std::ops::RangeInclusive;

/// Contains some helper methods to manipulate bits,
/// the index (`bit_idx`) is supposed to be from lsb to msb (right to left)
pub trait Bits: Copy {
    /// Width of the implementing type in bits.
    const BITS: u8;

    fn is_bit_on(&self, bit_idx: u8) -> bool;

    fn set_bit_on(&mut self, bit_idx: u8);

    fn set_bit_off(&mut self, bit_idx: u8);

    /// Extracts `bits_range` and moves it down to bit 0.
    fn get_bits(&self, bits_range: RangeInclusive<u8>) -> Self;

    /// Returns a sign-extended copy of the value.
    /// `number_of_bits` is the width of the two's complement value stored
    /// in the low bits.
    fn sign_extended(&self, number_of_bits: u8) -> Self;

    fn is_bit_off(&self, bit_idx: u8) -> bool {
        !self.is_bit_on(bit_idx)
    }

    fn set_bit(&mut self, bit_idx: u8, value: bool) {
        if value {
            self.set_bit_on(bit_idx);
        } else {
            self.set_bit_off(bit_idx);
        }
    }

    fn get_bit(&self, bit_idx: u8) -> bool {
        self.is_bit_on(bit_idx)
    }

    /// Checks if a certain sequence of bit is set to 1.
    fn are_bits_on(&self, bits_range: RangeInclusive<u8>) -> bool {
        bits_range.into_iter().all(|idx| self.is_bit_on(idx))
    }
}

macro_rules! impl_bits {
    ($($t:ty),*) => {
        $(
            impl Bits for $t {
                const BITS: u8 = <$t>::BITS as u8;

                fn is_bit_on(&self, bit_idx: u8) -> bool {
                    debug_assert!(bit_idx < <Self as Bits>::BITS);
                    (*self >> bit_idx) & 1 == 1
                }

                fn set_bit_on(&mut self, bit_idx: u8) {
                    debug_assert!(bit_idx < <Self as Bits>::BITS);
                    *self |= 1 << bit_idx;
                }

                fn set_bit_off(&mut self, bit_idx: u8) {
                    debug_assert!(bit_idx < <Self as Bits>::BITS);
                    *self &= !(1 << bit_idx);
                }

                fn get_bits(&self, bits_range: RangeInclusive<u8>) -> Self {
                    let start = *bits_range.start();
                    let length = bits_range.len() as u32;
                    if length >= <Self as Bits>::BITS as u32 {
                        return *self >> start;
                    }
                    (*self >> start) & ((1 << length) - 1)
                }

                fn sign_extended(&self, number_of_bits: u8) -> Self {
                    debug_assert!(number_of_bits > 0 && number_of_bits <= <Self as Bits>::BITS);
                    let unused = <Self as Bits>::BITS - number_of_bits;
                    // Move the sign bit to the top, then arithmetic-shift it back down.
                    (((*self << unused) as <$t as SignedTwin>::Signed) >> unused) as Self
                }
            }
        )*
    };
}

trait SignedTwin {
    type Signed;
}

impl SignedTwin for u8 {
    type Signed = i8;
}
impl SignedTwin for u16 {
    type Signed = i16;
}
impl SignedTwin for u32 {
    type Signed = i32;
}
impl SignedTwin for u64 {
    type Signed = i64;
}

impl_bits!(u8, u16, u32, u64);
