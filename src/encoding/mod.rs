//! Binary Encoding Module
//!
//! A small, fixed-width serialisation layer used by the metadata file
//! ([`crate::manifest`]). All integers are little-endian; strings and byte
//! buffers carry a `u32` length prefix; floating-point values are written
//! as their IEEE-754 bit pattern.
//!
//! The format is deliberately minimal — no tags, no schema evolution —
//! because the only consumer is the metadata snapshot, which is versioned
//! and checksummed as a whole by its caller.
//!
//! # Traits
//!
//! - [`Encode`] — append the value's byte representation to a buffer.
//! - [`Decode`] — read a value back from a byte slice, returning the value
//!   together with the number of bytes consumed.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------


// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use thiserror::Error;

const U32_SIZE: usize = std::mem::size_of::<u32>();
const U64_SIZE: usize = std::mem::size_of::<u64>();

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors raised while encoding or decoding.
#[derive(Debug, Error)]
pub enum EncodingError {
    /// Input ended before the value was complete.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// A length prefix would not fit in 32 bits.
    #[error("length {0} exceeds encodable range")]
    LengthOverflow(usize),

    /// A boolean byte was neither 0 nor 1.
    #[error("invalid boolean byte {0:#04x}")]
    InvalidBool(u8),

    /// A string payload was not valid UTF-8.
    #[error("string payload is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

// ------------------------------------------------------------------------------------------------
// Traits
// ------------------------------------------------------------------------------------------------

/// Types that can be appended to an encode buffer.
pub trait Encode {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError>;
}

/// Types that can be read back from a byte slice.
///
/// `decode_from` returns the decoded value and the number of bytes it
/// consumed, so callers can decode consecutive fields from one slice.
pub trait Decode: Sized {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError>;
}

// ------------------------------------------------------------------------------------------------
// Primitive implementations
// ------------------------------------------------------------------------------------------------

impl Encode for bool {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        buf.push(u8::from(*self));
        Ok(())
    }
}

impl Decode for bool {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let byte = *buf.first().ok_or(EncodingError::UnexpectedEof)?;
        match byte {
            0 => Ok((false, 1)),
            1 => Ok((true, 1)),
            other => Err(EncodingError::InvalidBool(other)),
        }
    }
}

impl Encode for u32 {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        buf.extend_from_slice(&self.to_le_bytes());
        Ok(())
    }
}

impl Decode for u32 {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let bytes = take(buf, U32_SIZE)?;
        let mut raw = [0u8; U32_SIZE];
        raw.copy_from_slice(bytes);
        Ok((u32::from_le_bytes(raw), U32_SIZE))
    }
}

impl Encode for u64 {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        buf.extend_from_slice(&self.to_le_bytes());
        Ok(())
    }
}

impl Decode for u64 {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let bytes = take(buf, U64_SIZE)?;
        let mut raw = [0u8; U64_SIZE];
        raw.copy_from_slice(bytes);
        Ok((u64::from_le_bytes(raw), U64_SIZE))
    }
}

impl Encode for f64 {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.to_bits().encode_to(buf)
    }
}

impl Decode for f64 {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let (bits, n) = u64::decode_from(buf)?;
        Ok((f64::from_bits(bits), n))
    }
}

// ------------------------------------------------------------------------------------------------
// Length-prefixed payloads
// ------------------------------------------------------------------------------------------------

impl Encode for Vec<u8> {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        let len = u32::try_from(self.len())
            .map_err(|_| EncodingError::LengthOverflow(self.len()))?;
        len.encode_to(buf)?;
        buf.extend_from_slice(self);
        Ok(())
    }
}

impl Decode for Vec<u8> {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let (len, prefix) = u32::decode_from(buf)?;
        let len = len as usize;
        let bytes = take(&buf[prefix..], len)?;
        Ok((bytes.to_vec(), prefix + len))
    }
}

impl Encode for String {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        let len = u32::try_from(self.len())
            .map_err(|_| EncodingError::LengthOverflow(self.len()))?;
        len.encode_to(buf)?;
        buf.extend_from_slice(self.as_bytes());
        Ok(())
    }
}

impl Decode for String {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let (bytes, n) = <Vec<u8>>::decode_from(buf)?;
        Ok((String::from_utf8(bytes)?, n))
    }
}

// ------------------------------------------------------------------------------------------------
// Sequence helpers
// ------------------------------------------------------------------------------------------------

/// Encodes a slice as a `u32` element count followed by the elements.
pub fn encode_seq<T: Encode>(items: &[T], buf: &mut Vec<u8>) -> Result<(), EncodingError> {
    let count = u32::try_from(items.len())
        .map_err(|_| EncodingError::LengthOverflow(items.len()))?;
    count.encode_to(buf)?;
    for item in items {
        item.encode_to(buf)?;
    }
    Ok(())
}

/// Decodes a sequence written by [`encode_seq`].
pub fn decode_seq<T: Decode>(buf: &[u8]) -> Result<(Vec<T>, usize), EncodingError> {
    let (count, mut offset) = u32::decode_from(buf)?;
    let mut items = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let (item, n) = T::decode_from(&buf[offset..])?;
        offset += n;
        items.push(item);
    }
    Ok((items, offset))
}

// ------------------------------------------------------------------------------------------------
// Top-level helpers
// ------------------------------------------------------------------------------------------------

/// Encodes a value into a fresh buffer.
pub fn encode_to_vec<T: Encode>(value: &T) -> Result<Vec<u8>, EncodingError> {
    let mut buf = Vec::new();
    value.encode_to(&mut buf)?;
    Ok(buf)
}

/// Decodes a value from the start of a slice.
pub fn decode_from_slice<T: Decode>(buf: &[u8]) -> Result<(T, usize), EncodingError> {
    T::decode_from(buf)
}

/// Returns the first `n` bytes of `buf`, or [`EncodingError::UnexpectedEof`].
fn take(buf: &[u8], n: usize) -> Result<&[u8], EncodingError> {
    buf.get(..n).ok_or(EncodingError::UnexpectedEof)
}
