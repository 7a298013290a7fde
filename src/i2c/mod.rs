// Licensed under the Apache-2.0 license

//! USI I2C slave driver module.
//!
//! This module implements an I2C slave on top of a "universal serial
//! interface" peripheral, which only offers a shift register, a bit counter
//! and a start detector. The byte-level protocol runs in [`usi_slave`], the
//! hardware is reached through the traits in [`traits`], and [`shared`]
//! provides the interrupt-safe wrapper used by firmware.

pub mod common;
pub mod register_file;
pub mod shared;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
pub mod traits;
pub mod usi_slave;
