//! Big-endian reading and writing primitives for the class file format.
//!
//! Every multi-byte quantity in a class file is stored big-endian. The [`JvmIO`] trait gives the
//! fixed-width integer and float types a uniform conversion surface, and the free functions on top
//! of it provide bounds-checked reads that advance an offset, plus appending writes into a
//! growable buffer.
//!
//! # Supported Types
//! - **Unsigned integers**: `u8`, `u16`, `u32`, `u64`
//! - **Signed integers**: `i8`, `i16`, `i32`, `i64`
//! - **Floating point**: `f32`, `f64`

use crate::Result;

/// Endian-aware conversion between a primitive and its byte representation.
pub trait JvmIO: Sized + Copy {
    /// Associated type representing the byte array type for this numeric type.
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Read T from a byte buffer in big-endian
    fn from_be_bytes(bytes: Self::Bytes) -> Self;

    /// Write T to a byte buffer in big-endian
    fn to_be_bytes(self) -> Self::Bytes;
}

macro_rules! impl_jvm_io {
    ($($ty:ty => $len:expr),* $(,)?) => {
        $(
            impl JvmIO for $ty {
                type Bytes = [u8; $len];

                fn from_be_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_be_bytes(bytes)
                }

                fn to_be_bytes(self) -> Self::Bytes {
                    <$ty>::to_be_bytes(self)
                }
            }
        )*
    };
}

impl_jvm_io!(
    u8 => 1,
    i8 => 1,
    u16 => 2,
    i16 => 2,
    u32 => 4,
    i32 => 4,
    u64 => 8,
    i64 => 8,
    f32 => 4,
    f64 => 8,
);

/// Safely reads a value of type `T` in big-endian byte order from a data buffer at a specific
/// offset, advancing the offset past the value.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the buffer does not hold enough bytes.
pub fn read_be_at<T: JvmIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(out_of_bounds_error!());
    };
    if end > data.len() {
        return Err(out_of_bounds_error!());
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(out_of_bounds_error!());
    };

    *offset = end;
    Ok(T::from_be_bytes(read))
}

/// Appends `value` in big-endian byte order.
pub fn write_be<T: JvmIO>(out: &mut Vec<u8>, value: T) {
    out.extend_from_slice(value.to_be_bytes().as_ref());
}

/// Overwrites `data[offset..]` with `value` in big-endian byte order.
///
/// Used to back-patch lengths that are only known after the body was written.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the value does not fit at `offset`.
pub fn patch_be_at<T: JvmIO>(data: &mut [u8], offset: usize, value: T) -> Result<()> {
    let bytes = value.to_be_bytes();
    let bytes = bytes.as_ref();
    let Some(end) = offset.checked_add(bytes.len()) else {
        return Err(out_of_bounds_error!());
    };
    if end > data.len() {
        return Err(out_of_bounds_error!());
    }
    data[offset..end].copy_from_slice(bytes);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_BUFFER: [u8; 8] = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];

    #[test]
    fn read_advances_offset() {
        let mut offset = 0;
        let first: u16 = read_be_at(&TEST_BUFFER, &mut offset).unwrap();
        let second: u32 = read_be_at(&TEST_BUFFER, &mut offset).unwrap();
        assert_eq!(first, 0x0102);
        assert_eq!(second, 0x0304_0506);
        assert_eq!(offset, 6);
    }

    #[test]
    fn read_past_end_fails() {
        let mut offset = 6;
        assert!(read_be_at::<u32>(&TEST_BUFFER, &mut offset).is_err());
        assert_eq!(offset, 6);
    }

    #[test]
    fn write_and_patch() {
        let mut out = Vec::new();
        write_be(&mut out, 0xCAFE_BABE_u32);
        write_be(&mut out, 0_u16);
        patch_be_at(&mut out, 4, 0x0034_u16).unwrap();
        assert_eq!(out, [0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x34]);
        assert!(patch_be_at(&mut out, 5, 1_u16).is_err());
    }

    #[test]
    fn floats_round_trip_bits() {
        let mut out = Vec::new();
        write_be(&mut out, 1.5_f64);
        let mut offset = 0;
        assert_eq!(read_be_at::<f64>(&out, &mut offset).unwrap(), 1.5);
        assert_eq!(offset, 8);
    }
}
