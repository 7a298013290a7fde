// Licensed under the Apache-2.0 license

//! Byte-addressable register file exposed to the bus master.
//!
//! The protocol engine moves single bytes in and out of the file. Application
//! code uses the typed accessors, which store multi-byte values in big-endian
//! wire order so a master sees the same layout on every host.
//!
//! ```
//! use usi_i2c_slave::i2c::register_file::RegisterFile;
//!
//! let mut regs = RegisterFile::<16>::new();
//! regs.write_u16(5, 0x1234).unwrap();
//! assert_eq!(regs.get(5), Some(0x12));
//! assert_eq!(regs.get(6), Some(0x34));
//! assert_eq!(regs.read_u16(5), Ok(0x1234));
//! ```

use zerocopy::byteorder::{BigEndian, I16, I32, U16, U32};
use zerocopy::{FromBytes, IntoBytes};

/// Register file access errors.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RegisterError {
    /// `index..index + width` does not fit in the register file.
    OutOfBounds { index: usize, width: usize },
}

/// A value that can be stored in the register file in wire byte order.
pub trait RegisterValue: Copy {
    /// Number of registers the value occupies.
    const WIDTH: usize;

    /// Serializes into exactly [`WIDTH`](Self::WIDTH) bytes.
    fn to_wire(self, dst: &mut [u8]);

    /// Deserializes from exactly [`WIDTH`](Self::WIDTH) bytes.
    fn from_wire(src: &[u8]) -> Option<Self>;
}

macro_rules! impl_register_value {
    ($native:ty) => {
        impl RegisterValue for $native {
            const WIDTH: usize = core::mem::size_of::<$native>();

            fn to_wire(self, dst: &mut [u8]) {
                dst.copy_from_slice(self.as_bytes());
            }

            fn from_wire(src: &[u8]) -> Option<Self> {
                <$native>::read_from_bytes(src).ok()
            }
        }
    };
    ($native:ty, $wire:ident) => {
        impl RegisterValue for $native {
            const WIDTH: usize = core::mem::size_of::<$native>();

            fn to_wire(self, dst: &mut [u8]) {
                dst.copy_from_slice($wire::<BigEndian>::new(self).as_bytes());
            }

            fn from_wire(src: &[u8]) -> Option<Self> {
                $wire::<BigEndian>::read_from_bytes(src)
                    .ok()
                    .map(|wire| wire.get())
            }
        }
    };
}

impl_register_value!(u8);
impl_register_value!(i8);
impl_register_value!(u16, U16);
impl_register_value!(i16, I16);
impl_register_value!(u32, U32);
impl_register_value!(i32, I32);

macro_rules! typed_accessors {
    ($($ty:ident),*) => {
        paste::paste! {
            $(
                #[doc = concat!("Reads a `", stringify!($ty), "` stored at `index` in wire order.")]
                ///
                /// # Errors
                ///
                /// [`RegisterError::OutOfBounds`] if the value does not fit.
                pub fn [<read_ $ty>](&self, index: usize) -> Result<$ty, RegisterError> {
                    self.read::<$ty>(index)
                }

                #[doc = concat!("Stores a `", stringify!($ty), "` at `index` in wire order.")]
                ///
                /// # Errors
                ///
                /// [`RegisterError::OutOfBounds`] if the value does not fit.
                pub fn [<write_ $ty>](&mut self, index: usize, value: $ty) -> Result<(), RegisterError> {
                    self.write::<$ty>(index, value)
                }
            )*
        }
    };
}

/// Fixed-capacity register file of `N` bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisterFile<const N: usize> {
    bytes: [u8; N],
}

impl<const N: usize> Default for RegisterFile<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> RegisterFile<N> {
    /// Number of registers.
    pub const CAPACITY: usize = N;

    /// Creates a zero-filled register file.
    #[must_use]
    pub const fn new() -> Self {
        const { assert!(N > 0, "register file needs at least one register") };
        Self { bytes: [0; N] }
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Raw byte at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<u8> {
        self.bytes.get(index).copied()
    }

    /// Overwrites the raw byte at `index`.
    ///
    /// # Errors
    ///
    /// [`RegisterError::OutOfBounds`] if `index >= N`.
    pub fn set(&mut self, index: usize, value: u8) -> Result<(), RegisterError> {
        let slot = self
            .bytes
            .get_mut(index)
            .ok_or(RegisterError::OutOfBounds { index, width: 1 })?;
        *slot = value;
        Ok(())
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Copies `data` into consecutive registers starting at `index`.
    ///
    /// # Errors
    ///
    /// [`RegisterError::OutOfBounds`] if the block does not fit; nothing is
    /// written in that case.
    pub fn write_bytes(&mut self, index: usize, data: &[u8]) -> Result<(), RegisterError> {
        self.window_mut(index, data.len())?.copy_from_slice(data);
        Ok(())
    }

    /// Reads a typed value starting at `index`.
    ///
    /// # Errors
    ///
    /// [`RegisterError::OutOfBounds`] if `index + T::WIDTH > N`.
    pub fn read<T: RegisterValue>(&self, index: usize) -> Result<T, RegisterError> {
        let out_of_bounds = RegisterError::OutOfBounds {
            index,
            width: T::WIDTH,
        };
        let end = index.checked_add(T::WIDTH).ok_or(out_of_bounds)?;
        self.bytes
            .get(index..end)
            .and_then(T::from_wire)
            .ok_or(out_of_bounds)
    }

    /// Stores a typed value starting at `index`.
    ///
    /// # Errors
    ///
    /// [`RegisterError::OutOfBounds`] if `index + T::WIDTH > N`; nothing is
    /// written in that case.
    pub fn write<T: RegisterValue>(&mut self, index: usize, value: T) -> Result<(), RegisterError> {
        value.to_wire(self.window_mut(index, T::WIDTH)?);
        Ok(())
    }

    typed_accessors!(u8, i8, u16, i16, u32, i32);

    fn window_mut(&mut self, index: usize, width: usize) -> Result<&mut [u8], RegisterError> {
        let out_of_bounds = RegisterError::OutOfBounds { index, width };
        let end = index.checked_add(width).ok_or(out_of_bounds)?;
        self.bytes.get_mut(index..end).ok_or(out_of_bounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_access() {
        let mut regs = RegisterFile::<8>::new();

        assert_eq!(regs.get(3), Some(0));
        regs.set(3, 0xAB).unwrap();
        assert_eq!(regs.get(3), Some(0xAB));

        assert_eq!(regs.get(8), None);
        assert_eq!(
            regs.set(8, 1),
            Err(RegisterError::OutOfBounds { index: 8, width: 1 })
        );
    }

    #[test]
    fn test_wire_order_is_big_endian() {
        let mut regs = RegisterFile::<16>::new();

        regs.write_u16(5, 0x1234).unwrap();
        assert_eq!(&regs.as_bytes()[5..7], &[0x12, 0x34]);

        regs.write_u32(8, 0xDEAD_BEEF).unwrap();
        assert_eq!(&regs.as_bytes()[8..12], &[0xDE, 0xAD, 0xBE, 0xEF]);

        regs.write_i16(0, -2).unwrap();
        assert_eq!(&regs.as_bytes()[0..2], &[0xFF, 0xFE]);
    }

    #[test]
    fn test_typed_round_trip() {
        let mut regs = RegisterFile::<32>::new();

        for value in [0u8, 1, 0x7F, 0x80, 0xFF] {
            regs.write_u8(1, value).unwrap();
            assert_eq!(regs.read_u8(1), Ok(value));
        }
        for value in [i8::MIN, -1, 0, 1, i8::MAX] {
            regs.write_i8(2, value).unwrap();
            assert_eq!(regs.read_i8(2), Ok(value));
        }
        for value in [0u16, 0x00FF, 0xFF00, u16::MAX] {
            regs.write_u16(3, value).unwrap();
            assert_eq!(regs.read_u16(3), Ok(value));
        }
        for value in [i16::MIN, -300, 0, 300, i16::MAX] {
            regs.write_i16(7, value).unwrap();
            assert_eq!(regs.read_i16(7), Ok(value));
        }
        for value in [0u32, 0x0102_0304, u32::MAX] {
            regs.write_u32(11, value).unwrap();
            assert_eq!(regs.read_u32(11), Ok(value));
        }
        for value in [i32::MIN, -70_000, 0, 70_000, i32::MAX] {
            regs.write_i32(28, value).unwrap();
            assert_eq!(regs.read_i32(28), Ok(value));
        }
    }

    #[test]
    fn test_signed_and_unsigned_share_layout() {
        let mut regs = RegisterFile::<4>::new();

        regs.write_i32(0, -1).unwrap();
        assert_eq!(regs.read_u32(0), Ok(u32::MAX));
        assert_eq!(regs.read_u16(2), Ok(0xFFFF));
    }

    #[test]
    fn test_typed_bounds() {
        let mut regs = RegisterFile::<8>::new();

        assert!(regs.write_u32(4, 1).is_ok());
        assert_eq!(
            regs.write_u32(5, 1),
            Err(RegisterError::OutOfBounds { index: 5, width: 4 })
        );
        assert_eq!(
            regs.read_u16(7),
            Err(RegisterError::OutOfBounds { index: 7, width: 2 })
        );
        assert_eq!(
            regs.read_u16(usize::MAX),
            Err(RegisterError::OutOfBounds {
                index: usize::MAX,
                width: 2
            })
        );
        // a failed write leaves neighbours alone
        assert_eq!(&regs.as_bytes()[4..8], &[0, 0, 0, 1]);
    }

    #[test]
    fn test_write_bytes() {
        let mut regs = RegisterFile::<4>::new();

        regs.write_bytes(1, &[1, 2, 3]).unwrap();
        assert_eq!(regs.as_bytes(), &[0, 1, 2, 3]);
        assert!(regs.write_bytes(2, &[9, 9, 9]).is_err());
        assert_eq!(regs.as_bytes(), &[0, 1, 2, 3]);
    }
}
