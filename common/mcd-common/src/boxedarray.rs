//! Heap-allocated fixed-size byte arrays for the expansion unit memories.
//!
//! The `Decode` implementation that bincode derives for `Box<[u8; LEN]>` decodes onto the stack and
//! then moves to the heap, which is a problem for arrays as large as program RAM. This wrapper
//! decodes directly into heap memory.

use bincode::de::read::Reader;
use bincode::de::{BorrowDecoder, Decoder};
use bincode::error::DecodeError;
use bincode::{BorrowDecode, Decode, Encode};
use std::ops::{Deref, DerefMut};

#[derive(Debug, Clone, PartialEq, Eq, Encode)]
pub struct BoxedByteArray<const LEN: usize>(Box<[u8; LEN]>);

fn zeroed<const LEN: usize>() -> Box<[u8; LEN]> {
    match vec![0; LEN].into_boxed_slice().try_into() {
        Ok(array) => array,
        Err(_) => unreachable!("boxed slice has length LEN"),
    }
}

impl<const LEN: usize> BoxedByteArray<LEN> {
    #[must_use]
    pub fn new() -> Self {
        Self(zeroed())
    }

    /// Copy `bytes` into a new array. Returns `None` if the slice length is not exactly `LEN`.
    #[must_use]
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != LEN {
            return None;
        }

        let mut array = zeroed::<LEN>();
        array.copy_from_slice(bytes);
        Some(Self(array))
    }

    pub fn fill(&mut self, value: u8) {
        self.0.fill(value);
    }
}

impl<const LEN: usize> Default for BoxedByteArray<LEN> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const LEN: usize> Deref for BoxedByteArray<LEN> {
    type Target = [u8; LEN];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<const LEN: usize> DerefMut for BoxedByteArray<LEN> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<const LEN: usize, Context> Decode<Context> for BoxedByteArray<LEN> {
    fn decode<D: Decoder<Context = Context>>(decoder: &mut D) -> Result<Self, DecodeError> {
        let mut array = zeroed::<LEN>();
        decoder.reader().read(array.as_mut())?;
        Ok(Self(array))
    }
}

impl<'de, const LEN: usize, Context> BorrowDecode<'de, Context> for BoxedByteArray<LEN> {
    fn borrow_decode<D: BorrowDecoder<'de, Context = Context>>(
        decoder: &mut D,
    ) -> Result<Self, DecodeError> {
        Self::decode(decoder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn from_slice_requires_exact_length() {
        assert!(BoxedByteArray::<4>::from_slice(&[1, 2, 3]).is_none());
        assert!(BoxedByteArray::<4>::from_slice(&[1, 2, 3, 4, 5]).is_none());

        let array = BoxedByteArray::<4>::from_slice(&[1, 2, 3, 4]).unwrap();
        assert_eq!(*array, [1, 2, 3, 4]);
    }

    #[test]
    fn decodes_raw_bytes() {
        let config = bincode::config::standard().with_fixed_int_encoding();

        let mut array = BoxedByteArray::<16>::new();
        for (i, byte) in array.iter_mut().enumerate() {
            *byte = i as u8;
        }

        let bytes = bincode::encode_to_vec(&array, config).unwrap();
        assert_eq!(bytes.len(), 16);

        let (decoded, len): (BoxedByteArray<16>, usize) =
            bincode::decode_from_slice(&bytes, config).unwrap();
        assert_eq!(len, 16);
        assert_eq!(decoded, array);
    }
}
