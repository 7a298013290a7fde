// Licensed under the Apache-2.0 license

//! # USI Hardware Abstraction Traits
//!
//! The engine never touches hardware registers directly. It talks to two
//! small capabilities that together describe a "universal serial interface"
//! style peripheral: a shift register with an edge counter and a start
//! detector, wired to two open-drain lines.
//!
//! ## Trait Hierarchy
//!
//! ```text
//! BusLine (SCL/SDA line control)     BitCounter (shift register + counter)
//!         └────────────┬──────────────────────┘
//!                 UsiHardware (blanket composite)
//!
//! I2cSlaveCore (address + mode control)
//!     └── I2cSlaveEvents (event entry point + status)
//! ```

use crate::i2c::common::{BusEvent, SlaveEvent, SlaveStatus};
use embedded_hal::i2c::{AddressMode, SevenBitAddress};

/// Control of the two open-drain bus lines.
///
/// "Release" means high impedance: the line is pulled high by the bus
/// resistors unless another device drives it low.
pub trait BusLine {
    /// Hardware-specific error type
    type Error: core::fmt::Debug;

    /// Stretch the clock: pull SCL low until [`release_clock`](Self::release_clock).
    fn hold_clock(&mut self) -> Result<(), Self::Error>;

    /// Stop stretching the clock.
    fn release_clock(&mut self) -> Result<(), Self::Error>;

    /// Let the shift register output drive SDA (MSB first).
    fn drive_data(&mut self) -> Result<(), Self::Error>;

    /// Put SDA back to high impedance.
    fn release_data(&mut self) -> Result<(), Self::Error>;

    /// Instantaneous SCL level.
    fn clock_is_high(&mut self) -> Result<bool, Self::Error>;

    /// Instantaneous SDA level.
    fn data_is_high(&mut self) -> Result<bool, Self::Error>;
}

/// Shift register, bit counter and condition flags of the serial interface.
///
/// Shares the error type of the [`BusLine`] it is composed with.
pub trait BitCounter: BusLine {
    /// Byte clocked in from SDA since the counter was last armed.
    fn shift_in(&mut self) -> Result<u8, Self::Error>;

    /// Load the byte to clock out on SDA.
    fn shift_out(&mut self, byte: u8) -> Result<(), Self::Error>;

    /// Raise the next overflow after `bits` more clocked bits (8 for a byte,
    /// 1 for an ACK slot).
    fn arm_counter(&mut self, bits: u8) -> Result<(), Self::Error>;

    /// Whether a stop condition was seen since flags were last cleared.
    fn stop_detected(&mut self) -> Result<bool, Self::Error>;

    /// Clear start, overflow and stop flags.
    fn clear_flags(&mut self) -> Result<(), Self::Error>;

    /// Allow counter overflows to raise [`BusEvent::CounterOverflow`].
    fn enable_overflow_events(&mut self) -> Result<(), Self::Error>;

    /// Stop raising overflow events until the next start condition.
    fn disable_overflow_events(&mut self) -> Result<(), Self::Error>;

    /// Arm or disarm the start condition detector.
    fn set_start_detection(&mut self, enabled: bool) -> Result<(), Self::Error>;
}

/// Everything the slave engine needs from the hardware.
pub trait UsiHardware: BusLine + BitCounter {}

/// Blanket implementation: line control + counter makes a usable interface
impl<T> UsiHardware for T where T: BusLine + BitCounter {}

/// Core slave functionality - address and mode control
pub trait I2cSlaveCore<A: AddressMode = SevenBitAddress> {
    /// Error type of the slave implementation
    type Error: core::fmt::Debug;

    /// Release the bus lines and start answering to the configured address
    ///
    /// # Errors
    ///
    /// Returns an error if the hardware could not be configured.
    fn enable_slave_mode(&mut self) -> Result<(), Self::Error>;

    /// Release the bus lines and ignore all further bus events
    ///
    /// # Errors
    ///
    /// Returns an error if the hardware could not be configured.
    fn disable_slave_mode(&mut self) -> Result<(), Self::Error>;

    /// Check if slave mode is currently enabled
    fn is_slave_mode_enabled(&self) -> bool;

    /// Configured slave address
    fn slave_address(&self) -> A;
}

/// Event-driven slave operation
pub trait I2cSlaveEvents<A: AddressMode = SevenBitAddress>: I2cSlaveCore<A> {
    /// Handle a hardware event (called from the ISR shim)
    ///
    /// Must complete in bounded time; the clock is stretched while it runs.
    ///
    /// # Errors
    ///
    /// Returns an error on hardware failure. The engine has already reset
    /// itself to wait for the next start condition when this happens.
    fn handle_slave_event(&mut self, event: BusEvent) -> Result<(), Self::Error>;

    /// Current slave status
    fn slave_status(&self) -> SlaveStatus;

    /// Last protocol event
    fn last_slave_event(&self) -> Option<SlaveEvent>;
}
