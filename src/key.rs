// MIT License
//
// Copyright (c) 2020 Gregory Meyer
//
// Permission is hereby granted, free of charge, to any person
// obtaining a copy of this software and associated documentation files
// (the "Software"), to deal in the Software without restriction,
// including without limitation the rights to use, copy, modify, merge,
// publish, distribute, sublicense, and/or sell copies of the Software,
// and to permit persons to whom the Software is furnished to do so,
// subject to the following conditions:
//
// The above copyright notice and this permission notice shall be
// included in all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND,
// EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF
// MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND
// NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS
// BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN
// ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN
// CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! Built-in hashing for common key types.

/// A key type with a built-in 32-bit hash.
///
/// Maps constructed through [`HashMap::new`] and [`HashMap::with_capacity`]
/// hash their keys with [`hash32`] and compare them with `==`. Implementations
/// must be consistent with equality: keys that compare equal must return the
/// same hash.
///
/// Strings hash as FNV-1a over their bytes; integers hash as FNV-1a over
/// their little-endian byte representation. Maps keyed by anything else can
/// supply their own callbacks through [`Options`].
///
/// [`HashMap::new`]: crate::HashMap::new
/// [`HashMap::with_capacity`]: crate::HashMap::with_capacity
/// [`hash32`]: Key::hash32
/// [`Options`]: crate::Options
pub trait Key: Eq {
    /// Returns the 32-bit hash of this key.
    fn hash32(&self) -> u32;
}

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 16_777_619;

/// Hashes a byte slice with 32-bit FNV-1a.
pub fn fnv1a(bytes: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;

    for &byte in bytes {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }

    hash
}

impl Key for String {
    fn hash32(&self) -> u32 {
        fnv1a(self.as_bytes())
    }
}

impl Key for str {
    fn hash32(&self) -> u32 {
        fnv1a(self.as_bytes())
    }
}

impl<T: Key + ?Sized> Key for &T {
    fn hash32(&self) -> u32 {
        (**self).hash32()
    }
}

macro_rules! impl_key_for_integers {
    ($($int:ty),*) => {$(
        impl Key for $int {
            fn hash32(&self) -> u32 {
                fnv1a(&self.to_le_bytes())
            }
        }
    )*};
}

impl_key_for_integers!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize);

impl Key for bool {
    fn hash32(&self) -> u32 {
        fnv1a(&[u8::from(*self)])
    }
}

impl Key for char {
    fn hash32(&self) -> u32 {
        fnv1a(&u32::from(*self).to_le_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a_reference_vectors() {
        assert_eq!(fnv1a(b""), 0x811c_9dc5);
        assert_eq!(fnv1a(b"a"), 0xe40c_292c);
        assert_eq!(fnv1a(b"foobar"), 0xbf9c_f968);
    }

    #[test]
    fn string_forms_agree() {
        assert_eq!("foo".hash32(), "foo".to_string().hash32());
        assert_eq!("foo".hash32(), fnv1a(b"foo"));
    }

    #[test]
    fn references_delegate() {
        let key = 42_u64;
        assert_eq!((&key).hash32(), key.hash32());
    }
}
