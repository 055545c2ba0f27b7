//! # Bitstring Codec
//!
//! The bit array behind a status list, and its `encodedList` form.
//!
//! Bit 0 is the left-most (most significant) bit of byte 0. The encoded
//! form is the multibase base64url prefix `u` followed by the unpadded
//! base64url encoding of the GZIP-compressed raw bytes.

use std::io::{Read, Write};

use base64ct::{Base64UrlUnpadded, Encoding};
use bitvec::prelude::{BitVec, Msb0};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use vcsl_core::StatusError;

/// Multibase prefix for base64url without padding.
const MULTIBASE_BASE64URL: char = 'u';

/// A fixed-length status bit array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitstring {
    bits: BitVec<u8, Msb0>,
}

impl Bitstring {
    /// An all-zero bitstring of `len` bits.
    pub fn zeroed(len: u64) -> Result<Self, StatusError> {
        let len = to_usize(len)?;
        Ok(Self {
            bits: BitVec::repeat(false, len),
        })
    }

    /// Number of bits.
    pub fn len(&self) -> u64 {
        self.bits.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Read bit `index`.
    pub fn get(&self, index: u64) -> Result<bool, StatusError> {
        let i = self.check(index)?;
        Ok(self.bits[i])
    }

    /// Write bit `index`.
    pub fn set(&mut self, index: u64, value: bool) -> Result<(), StatusError> {
        let i = self.check(index)?;
        self.bits.set(i, value);
        Ok(())
    }

    /// Number of set bits.
    pub fn count_ones(&self) -> u64 {
        self.bits.count_ones() as u64
    }

    /// Raw bytes, zero-padded to a whole byte.
    pub fn as_bytes(&self) -> &[u8] {
        self.bits.as_raw_slice()
    }

    /// Produce the `encodedList` string.
    pub fn encode(&self) -> Result<String, StatusError> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(self.as_bytes())
            .and_then(|()| encoder.finish())
            .map(|gz| format!("{MULTIBASE_BASE64URL}{}", Base64UrlUnpadded::encode_string(&gz)))
            .map_err(|e| StatusError::Storage(format!("bitstring compression failed: {e}")))
    }

    /// Parse an `encodedList` string.
    ///
    /// With `expected_len`, the decoded byte length must match exactly and
    /// the result is truncated to that many bits. Without it, every decoded
    /// byte contributes eight bits.
    pub fn decode(encoded: &str, expected_len: Option<u64>) -> Result<Self, StatusError> {
        let body = encoded
            .strip_prefix(MULTIBASE_BASE64URL)
            .ok_or_else(|| StatusError::data("encodedList lacks the multibase 'u' prefix", encoded))?;
        let gz = Base64UrlUnpadded::decode_vec(body)
            .map_err(|e| StatusError::data(format!("encodedList is not base64url: {e}"), encoded))?;
        let mut raw = Vec::new();
        GzDecoder::new(gz.as_slice())
            .read_to_end(&mut raw)
            .map_err(|e| StatusError::data(format!("encodedList is not gzip: {e}"), encoded))?;

        let mut bits = BitVec::<u8, Msb0>::from_vec(raw);
        if let Some(len) = expected_len {
            let len = to_usize(len)?;
            if bits.as_raw_slice().len() != len.div_ceil(8) {
                return Err(StatusError::data(
                    format!(
                        "encodedList holds {} bytes, expected {}",
                        bits.as_raw_slice().len(),
                        len.div_ceil(8)
                    ),
                    encoded,
                ));
            }
            bits.truncate(len);
        }
        Ok(Self { bits })
    }

    fn check(&self, index: u64) -> Result<usize, StatusError> {
        usize::try_from(index)
            .ok()
            .filter(|i| *i < self.bits.len())
            .ok_or_else(|| {
                StatusError::validation(format!(
                    "status index {index} is outside a list of {} bits",
                    self.bits.len()
                ))
            })
    }
}

fn to_usize(len: u64) -> Result<usize, StatusError> {
    usize::try_from(len)
        .map_err(|_| StatusError::validation(format!("bitstring length {len} is too large")))
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Setting a bit changes exactly that bit.
        #[test]
        fn set_touches_one_bit(len in 1u64..512, seed in any::<u64>(), value in any::<bool>()) {
            let index = seed % len;
            let mut bs = Bitstring::zeroed(len).unwrap();
            bs.set(index, value).unwrap();
            for i in 0..len {
                prop_assert_eq!(bs.get(i).unwrap(), i == index && value);
            }
        }

        /// Decoding an encoded list yields the same bits.
        #[test]
        fn encoding_preserves_bits(
            len in 1u64..2048,
            set in prop::collection::vec(any::<u64>(), 0..32),
        ) {
            let mut bs = Bitstring::zeroed(len).unwrap();
            for s in set {
                bs.set(s % len, true).unwrap();
            }
            let back = Bitstring::decode(&bs.encode().unwrap(), Some(len)).unwrap();
            prop_assert_eq!(back, bs);
        }
    }
}
