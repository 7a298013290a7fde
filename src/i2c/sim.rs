// Licensed under the Apache-2.0 license

//! Host-side model of a USI peripheral and a bit-banging bus master.
//!
//! [`SimUsi`] implements the hardware traits on plain state: an 8-bit shift
//! register, a bit counter that reloads after each overflow, and wired-AND
//! SDA between the master and the slave output. [`SimMaster`] clocks bits
//! through it one at a time and dispatches the resulting events into a
//! [`UsiSlave`], the same way an interrupt vector would on hardware.

use crate::common::Logger;
use crate::i2c::common::{BusEvent, ACK_BITS, BYTE_BITS};
use crate::i2c::traits::{BitCounter, BusLine};
use crate::i2c::usi_slave::{Error, UsiSlave};
use core::convert::Infallible;
use heapless::Vec;

/// Hardware calls recorded per dispatched event.
pub const TRACE_DEPTH: usize = 32;

/// One recorded hardware call.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HardwareOp {
    HoldClock,
    ReleaseClock,
    DriveData,
    ReleaseData,
    SampleClock,
    SampleData,
    ShiftOut(u8),
    Arm(u8),
    ClearFlags,
}

/// Simulated serial interface.
#[derive(Debug)]
pub struct SimUsi {
    shift: u8,
    bits_left: u8,
    armed_bits: u8,
    overflow_enabled: bool,
    start_detection: bool,
    stop_flag: bool,
    data_driven: bool,
    clock_held: bool,
    master_data: bool,
    clock_stuck_high: bool,
    stretches: u32,
    clock_polls: u32,
    ack_pulses: u32,
    trace: Vec<HardwareOp, TRACE_DEPTH>,
}

impl Default for SimUsi {
    fn default() -> Self {
        Self::new()
    }
}

impl SimUsi {
    #[must_use]
    pub fn new() -> Self {
        Self {
            shift: 0,
            bits_left: BYTE_BITS,
            armed_bits: BYTE_BITS,
            overflow_enabled: false,
            start_detection: false,
            stop_flag: false,
            data_driven: false,
            clock_held: false,
            master_data: true,
            clock_stuck_high: false,
            stretches: 0,
            clock_polls: 0,
            ack_pulses: 0,
            trace: Vec::new(),
        }
    }

    /// Wired-AND of the master and the slave output stage.
    #[must_use]
    pub fn data_level(&self) -> bool {
        let slave_low = self.data_driven && self.shift & 0x80 == 0;
        self.master_data && !slave_low
    }

    #[must_use]
    pub fn clock_held(&self) -> bool {
        self.clock_held
    }

    #[must_use]
    pub fn data_driven(&self) -> bool {
        self.data_driven
    }

    #[must_use]
    pub fn overflow_events_enabled(&self) -> bool {
        self.overflow_enabled
    }

    /// Number of times the slave stretched the clock.
    #[must_use]
    pub fn stretches(&self) -> u32 {
        self.stretches
    }

    /// Number of SCL samples taken by the slave.
    #[must_use]
    pub fn clock_polls(&self) -> u32 {
        self.clock_polls
    }

    /// ACK bits the slave pulled low.
    #[must_use]
    pub fn ack_pulses(&self) -> u32 {
        self.ack_pulses
    }

    /// Hardware calls made while handling the last dispatched event.
    #[must_use]
    pub fn trace(&self) -> &[HardwareOp] {
        &self.trace
    }

    /// Fault injection: SCL never reads low.
    pub fn set_clock_stuck_high(&mut self, stuck: bool) {
        self.clock_stuck_high = stuck;
    }

    fn record(&mut self, op: HardwareOp) {
        // A full trace just stops recording.
        let _ = self.trace.push(op);
    }

    /// Clocks one bit; returns the sampled SDA level and whether the counter
    /// overflowed with events enabled.
    fn clock_bit(&mut self, master_bit: bool) -> (bool, bool) {
        self.master_data = master_bit;
        let level = self.data_level();
        if self.armed_bits == ACK_BITS && self.data_driven && !level {
            self.ack_pulses += 1;
        }
        self.shift = (self.shift << 1) | u8::from(level);
        self.bits_left = self.bits_left.saturating_sub(1);
        let overflow = self.bits_left == 0;
        if overflow {
            self.bits_left = BYTE_BITS;
        }
        (level, overflow && self.overflow_enabled)
    }
}

impl BusLine for SimUsi {
    type Error = Infallible;

    fn hold_clock(&mut self) -> Result<(), Self::Error> {
        self.record(HardwareOp::HoldClock);
        self.clock_held = true;
        self.stretches += 1;
        Ok(())
    }

    fn release_clock(&mut self) -> Result<(), Self::Error> {
        self.record(HardwareOp::ReleaseClock);
        self.clock_held = false;
        Ok(())
    }

    fn drive_data(&mut self) -> Result<(), Self::Error> {
        self.record(HardwareOp::DriveData);
        self.data_driven = true;
        Ok(())
    }

    fn release_data(&mut self) -> Result<(), Self::Error> {
        self.record(HardwareOp::ReleaseData);
        self.data_driven = false;
        Ok(())
    }

    fn clock_is_high(&mut self) -> Result<bool, Self::Error> {
        self.record(HardwareOp::SampleClock);
        self.clock_polls += 1;
        Ok(self.clock_stuck_high)
    }

    fn data_is_high(&mut self) -> Result<bool, Self::Error> {
        self.record(HardwareOp::SampleData);
        Ok(self.data_level())
    }
}

impl BitCounter for SimUsi {
    fn shift_in(&mut self) -> Result<u8, Self::Error> {
        Ok(self.shift)
    }

    fn shift_out(&mut self, byte: u8) -> Result<(), Self::Error> {
        self.record(HardwareOp::ShiftOut(byte));
        self.shift = byte;
        Ok(())
    }

    fn arm_counter(&mut self, bits: u8) -> Result<(), Self::Error> {
        self.record(HardwareOp::Arm(bits));
        self.armed_bits = bits;
        self.bits_left = bits;
        Ok(())
    }

    fn stop_detected(&mut self) -> Result<bool, Self::Error> {
        Ok(self.stop_flag)
    }

    fn clear_flags(&mut self) -> Result<(), Self::Error> {
        self.record(HardwareOp::ClearFlags);
        self.stop_flag = false;
        Ok(())
    }

    fn enable_overflow_events(&mut self) -> Result<(), Self::Error> {
        self.overflow_enabled = true;
        Ok(())
    }

    fn disable_overflow_events(&mut self) -> Result<(), Self::Error> {
        self.overflow_enabled = false;
        Ok(())
    }

    fn set_start_detection(&mut self, enabled: bool) -> Result<(), Self::Error> {
        self.start_detection = enabled;
        Ok(())
    }
}

/// Bus master clocking a [`UsiSlave`] backed by [`SimUsi`].
pub struct SimMaster<'a, L: Logger, const N: usize> {
    slave: &'a mut UsiSlave<SimUsi, L, N>,
    stop_in_ack_window: bool,
}

impl<'a, L: Logger, const N: usize> SimMaster<'a, L, N> {
    pub fn new(slave: &'a mut UsiSlave<SimUsi, L, N>) -> Self {
        Self {
            slave,
            stop_in_ack_window: false,
        }
    }

    #[must_use]
    pub fn slave(&self) -> &UsiSlave<SimUsi, L, N> {
        self.slave
    }

    pub fn slave_mut(&mut self) -> &mut UsiSlave<SimUsi, L, N> {
        self.slave
    }

    /// Start or repeated start: SDA falls while SCL is high.
    ///
    /// # Errors
    ///
    /// Whatever the slave returns for the start event.
    pub fn start(&mut self) -> Result<(), Error<Infallible>> {
        let hw = self.slave.hardware_mut();
        hw.master_data = false;
        if hw.start_detection {
            self.dispatch(BusEvent::Start)?;
        }
        Ok(())
    }

    /// Stop: SDA rises while SCL is high. Raises no event, only the flag.
    pub fn stop(&mut self) {
        let hw = self.slave.hardware_mut();
        hw.master_data = true;
        hw.stop_flag = true;
    }

    /// Makes the next [`write_byte`](Self::write_byte) raise the stop flag
    /// before its ACK bit is handled, as a slow handler would observe it.
    pub fn stop_in_ack_window(&mut self) {
        self.stop_in_ack_window = true;
    }

    /// Clocks out `byte` MSB first and returns whether the slave ACKed it.
    ///
    /// # Errors
    ///
    /// Whatever the slave returns for the events raised on the way.
    pub fn write_byte(&mut self, byte: u8) -> Result<bool, Error<Infallible>> {
        for bit in (0..8).rev() {
            self.clock_bit((byte >> bit) & 1 == 1)?;
        }
        if core::mem::take(&mut self.stop_in_ack_window) {
            self.slave.hardware_mut().stop_flag = true;
        }
        let level = self.clock_bit(true)?;
        Ok(!level)
    }

    /// Clocks in one byte, then ACKs it if `ack`, NACKs otherwise.
    ///
    /// # Errors
    ///
    /// Whatever the slave returns for the events raised on the way.
    pub fn read_byte(&mut self, ack: bool) -> Result<u8, Error<Infallible>> {
        let mut byte = 0u8;
        for _ in 0..8 {
            byte = (byte << 1) | u8::from(self.clock_bit(true)?);
        }
        self.clock_bit(!ack)?;
        Ok(byte)
    }

    /// START, every byte of `bytes` (address byte first), STOP. Gives up at
    /// the first NACK.
    ///
    /// # Errors
    ///
    /// Whatever the slave returns for the events raised on the way.
    pub fn write_transaction(&mut self, bytes: &[u8]) -> Result<bool, Error<Infallible>> {
        self.start()?;
        for &byte in bytes {
            if !self.write_byte(byte)? {
                self.stop();
                return Ok(false);
            }
        }
        self.stop();
        Ok(true)
    }

    /// START, `address_byte`, then `out.len()` bytes with a NACK on the last
    /// one, STOP. Returns `false` if the address was not acknowledged.
    ///
    /// # Errors
    ///
    /// Whatever the slave returns for the events raised on the way.
    pub fn read_transaction(
        &mut self,
        address_byte: u8,
        out: &mut [u8],
    ) -> Result<bool, Error<Infallible>> {
        self.start()?;
        if !self.write_byte(address_byte)? {
            self.stop();
            return Ok(false);
        }
        let count = out.len();
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.read_byte(i + 1 < count)?;
        }
        self.stop();
        Ok(true)
    }

    fn clock_bit(&mut self, master_bit: bool) -> Result<bool, Error<Infallible>> {
        let (level, overflow) = self.slave.hardware_mut().clock_bit(master_bit);
        if overflow {
            self.dispatch(BusEvent::CounterOverflow)?;
        }
        Ok(level)
    }

    fn dispatch(&mut self, event: BusEvent) -> Result<(), Error<Infallible>> {
        self.slave.hardware_mut().trace.clear();
        self.slave.handle(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_line_is_wired_and() {
        let mut usi = SimUsi::new();
        assert!(usi.data_level());

        usi.shift_out(0x7F).unwrap();
        usi.drive_data().unwrap();
        assert!(!usi.data_level());

        usi.shift_out(0x80).unwrap();
        assert!(usi.data_level());
        usi.master_data = false;
        assert!(!usi.data_level());
    }

    #[test]
    fn test_counter_overflows_after_armed_bits() {
        let mut usi = SimUsi::new();
        usi.enable_overflow_events().unwrap();
        usi.arm_counter(ACK_BITS).unwrap();
        assert_eq!(usi.clock_bit(true), (true, true));

        // reloads to a full byte
        for _ in 0..7 {
            assert!(!usi.clock_bit(false).1);
        }
        assert!(usi.clock_bit(true).1);
        assert_eq!(usi.shift_in().unwrap(), 0x01);
    }

    #[test]
    fn test_overflow_masked_when_disabled() {
        let mut usi = SimUsi::new();
        for _ in 0..8 {
            assert!(!usi.clock_bit(true).1);
        }
        assert_eq!(usi.shift_in().unwrap(), 0xFF);
    }

    #[test]
    fn test_clear_flags_drops_stop() {
        let mut usi = SimUsi::new();
        usi.stop_flag = true;
        assert!(usi.stop_detected().unwrap());
        usi.clear_flags().unwrap();
        assert!(!usi.stop_detected().unwrap());
        assert_eq!(usi.trace(), &[HardwareOp::ClearFlags]);
    }
}
