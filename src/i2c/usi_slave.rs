// Licensed under the Apache-2.0 license

//! I2C slave protocol engine for USI-style serial interfaces.
//!
//! The interface only provides a shift register, a bit counter and a start
//! detector, so the byte-level I2C grammar is implemented here as a state
//! machine driven by two events: [`BusEvent::Start`] and
//! [`BusEvent::CounterOverflow`]. Each byte is followed by a one-bit
//! ACK window; while `ack_pending` is set the counter is armed for a single
//! bit so the next overflow lands exactly on the ACK/NACK slot.
//!
//! Every handling pass stretches the clock first and releases it last, so the
//! master cannot clock the next bit in before the state for it is committed.
//!
//! # Register pointer
//!
//! The first byte of a write selects the register pointer. Data bytes are
//! stored from there on; the increment after a stored byte is deferred until
//! the next data byte actually arrives, so after a write the pointer rests on
//! the last register written. A read never sends a pointer: it starts at the
//! current pointer and advances once per byte the master ACKs.

use crate::common::{Logger, NoOpLogger};
use crate::i2c::common::{
    BusEvent, SlaveConfig, SlaveEvent, SlaveStatus, TransactionState, ACK_BITS, BYTE_BITS,
};
use crate::i2c::register_file::{RegisterError, RegisterFile};
use crate::i2c::traits::{I2cSlaveCore, I2cSlaveEvents, UsiHardware};
use embedded_hal::i2c::{ErrorKind, SevenBitAddress};

/// Default register file size: every value of the 8-bit pointer is valid.
pub const DEFAULT_REGISTER_COUNT: usize = 256;

/// Byte shifted out for reads outside the register file.
pub const FILL_BYTE: u8 = 0xFF;

/// Slave engine errors, generic over the hardware error `E`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error<E> {
    /// A bus line or counter operation failed.
    Line(E),
    /// SCL stayed high for the whole configured spin limit.
    ClockStretchTimeout,
    /// Typed register access outside the register file.
    Register(RegisterError),
    /// No engine installed in the shared slot.
    NotInstalled,
    /// The shared engine is already borrowed.
    Busy,
}

impl<E> From<RegisterError> for Error<E> {
    fn from(err: RegisterError) -> Self {
        Error::Register(err)
    }
}

impl<E: core::fmt::Debug> embedded_hal::i2c::Error for Error<E> {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::Line(_) | Error::ClockStretchTimeout => ErrorKind::Bus,
            Error::Register(_) | Error::NotInstalled | Error::Busy => ErrorKind::Other,
        }
    }
}

/// Slave engine bound to one serial interface.
pub struct UsiSlave<H: UsiHardware, L: Logger = NoOpLogger, const N: usize = DEFAULT_REGISTER_COUNT>
{
    hardware: H,
    config: SlaveConfig,
    registers: RegisterFile<N>,
    state: TransactionState,
    pointer: usize,
    ack_pending: bool,
    advance_pending: bool,
    enabled: bool,
    last_event: Option<SlaveEvent>,
    logger: L,
}

impl<H: UsiHardware, L: Logger, const N: usize> UsiSlave<H, L, N> {
    /// Creates a disabled engine with a zeroed register file.
    ///
    /// Call [`enable_slave_mode`](I2cSlaveCore::enable_slave_mode) before
    /// routing events to it.
    pub fn new(hardware: H, config: SlaveConfig, logger: L) -> Self {
        Self {
            hardware,
            config,
            registers: RegisterFile::new(),
            state: TransactionState::AwaitAddress,
            pointer: 0,
            ack_pending: false,
            advance_pending: false,
            enabled: false,
            last_event: None,
            logger,
        }
    }

    /// Entry point for the interrupt shim.
    ///
    /// Events are ignored while slave mode is disabled.
    ///
    /// # Errors
    ///
    /// [`Error::Line`] or [`Error::ClockStretchTimeout`]. The engine has
    /// reset itself to [`TransactionState::AwaitAddress`] with both lines
    /// released before returning.
    pub fn handle(&mut self, event: BusEvent) -> Result<(), Error<H::Error>> {
        if !self.enabled {
            return Ok(());
        }
        let result = match event {
            BusEvent::Start => self.on_start(),
            BusEvent::CounterOverflow => self.on_overflow(),
        };
        if let Err(err) = result {
            self.logger
                .error(format_args!("{:?} in {:?}, resetting", err, self.state));
            self.fail_safe();
            return Err(err);
        }
        Ok(())
    }

    #[must_use]
    pub fn registers(&self) -> &RegisterFile<N> {
        &self.registers
    }

    /// Register file access for the foreground.
    ///
    /// Holding `&mut self` already excludes the event handler; see
    /// [`SharedSlave`](crate::i2c::shared::SharedSlave) for interrupt-driven use.
    pub fn registers_mut(&mut self) -> &mut RegisterFile<N> {
        &mut self.registers
    }

    #[must_use]
    pub fn pointer(&self) -> usize {
        self.pointer
    }

    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    #[must_use]
    pub fn config(&self) -> &SlaveConfig {
        &self.config
    }

    #[must_use]
    pub fn hardware(&self) -> &H {
        &self.hardware
    }

    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hardware
    }

    /// Tears the engine down, handing the hardware back.
    pub fn release(self) -> H {
        self.hardware
    }

    fn on_start(&mut self) -> Result<(), Error<H::Error>> {
        self.hardware.hold_clock().map_err(Error::Line)?;

        let repeated = self.state.in_transaction()
            && !self.hardware.stop_detected().map_err(Error::Line)?;
        self.state = TransactionState::AwaitAddress;
        self.ack_pending = false;
        self.advance_pending = false;

        self.hardware.release_data().map_err(Error::Line)?;
        self.hardware.shift_out(0).map_err(Error::Line)?;
        self.hardware.enable_overflow_events().map_err(Error::Line)?;
        self.hardware.arm_counter(BYTE_BITS).map_err(Error::Line)?;
        self.hardware.clear_flags().map_err(Error::Line)?;

        self.last_event = Some(if repeated {
            SlaveEvent::RepeatedStart
        } else {
            SlaveEvent::Start
        });

        self.hardware.release_clock().map_err(Error::Line)
    }

    fn on_overflow(&mut self) -> Result<(), Error<H::Error>> {
        // The master's ACK bit is sampled before stretching, then SDA may only
        // change once SCL is low again.
        let master_ack = if self.ack_pending && self.state == TransactionState::ReadAckPoll {
            let acked = !self.hardware.data_is_high().map_err(Error::Line)?;
            self.wait_clock_low()?;
            acked
        } else {
            false
        };

        self.hardware.hold_clock().map_err(Error::Line)?;

        if self.ack_pending {
            self.ack_pending = false;
            self.after_ack_bit(master_ack)?;
        } else {
            self.after_byte()?;
        }

        self.hardware.clear_flags().map_err(Error::Line)?;
        self.hardware.release_clock().map_err(Error::Line)
    }

    /// Eight bits were clocked in or out.
    fn after_byte(&mut self) -> Result<(), Error<H::Error>> {
        match self.state {
            TransactionState::AwaitAddress => {
                let byte = self.hardware.shift_in().map_err(Error::Line)?;
                let address = byte >> 1;
                let read = byte & 1 == 1;

                match self.config.matches(address, read) {
                    Some(general_call) => {
                        self.logger.debug(format_args!(
                            "address 0x{:02x} matched, {}",
                            address,
                            if read { "read" } else { "write" }
                        ));
                        self.last_event = Some(SlaveEvent::AddressMatched { read, general_call });
                        self.state = if read {
                            TransactionState::ReadDataPre
                        } else {
                            TransactionState::AwaitRegisterPointer
                        };
                        self.send_ack()
                    }
                    None => {
                        // Not for us: stay silent until the next start.
                        self.last_event = Some(SlaveEvent::AddressIgnored { address });
                        self.end_transaction()
                    }
                }
            }
            TransactionState::AwaitRegisterPointer => {
                let raw = self.hardware.shift_in().map_err(Error::Line)?;
                self.pointer = self.config.pointer_policy.place(usize::from(raw), N);
                self.advance_pending = false;
                self.logger
                    .debug(format_args!("register pointer 0x{:02x}", self.pointer));
                self.last_event = Some(SlaveEvent::PointerSet {
                    pointer: self.pointer,
                });
                self.state = TransactionState::WriteData;
                self.send_ack()
            }
            TransactionState::WriteData => {
                let value = self.hardware.shift_in().map_err(Error::Line)?;
                if self.advance_pending {
                    self.pointer = self.config.pointer_policy.advance(self.pointer, N);
                    self.advance_pending = false;
                }
                let index = self.pointer;
                if self.registers.set(index, value).is_ok() {
                    self.last_event = Some(SlaveEvent::ByteWritten { index, value });
                    self.state = TransactionState::PostWriteAck;
                    self.send_ack()
                } else {
                    self.logger
                        .debug(format_args!("write to 0x{:02x} rejected", index));
                    self.last_event = Some(SlaveEvent::Rejected { index });
                    self.end_transaction()
                }
            }
            TransactionState::ReadDataPre => {
                // Byte is out, let the master drive its ACK bit.
                self.hardware.release_data().map_err(Error::Line)?;
                self.hardware.arm_counter(ACK_BITS).map_err(Error::Line)?;
                self.ack_pending = true;
                self.state = TransactionState::ReadAckPoll;
                Ok(())
            }
            TransactionState::PostWriteAck | TransactionState::ReadAckPoll => {
                self.unexpected("byte overflow")
            }
        }
    }

    /// The one-bit ACK window ended.
    fn after_ack_bit(&mut self, master_ack: bool) -> Result<(), Error<H::Error>> {
        match self.state {
            TransactionState::ReadAckPoll => {
                if master_ack {
                    self.pointer = self.config.pointer_policy.advance(self.pointer, N);
                    self.state = TransactionState::ReadDataPre;
                    self.load_read_byte()
                } else {
                    self.logger.debug(format_args!(
                        "master NACK, pointer 0x{:02x}",
                        self.pointer
                    ));
                    self.last_event = Some(SlaveEvent::MasterNack);
                    self.end_transaction()
                }
            }
            TransactionState::ReadDataPre => self.load_read_byte(),
            TransactionState::PostWriteAck => {
                self.hardware.release_data().map_err(Error::Line)?;
                if self.hardware.stop_detected().map_err(Error::Line)? {
                    self.logger.debug(format_args!("stop"));
                    self.last_event = Some(SlaveEvent::Stop);
                    self.end_transaction()
                } else {
                    self.state = TransactionState::WriteData;
                    self.advance_pending = true;
                    self.hardware.arm_counter(BYTE_BITS).map_err(Error::Line)
                }
            }
            TransactionState::AwaitRegisterPointer | TransactionState::WriteData => {
                self.hardware.release_data().map_err(Error::Line)?;
                self.hardware.arm_counter(BYTE_BITS).map_err(Error::Line)
            }
            TransactionState::AwaitAddress => self.unexpected("ACK overflow"),
        }
    }

    fn send_ack(&mut self) -> Result<(), Error<H::Error>> {
        self.hardware.shift_out(0).map_err(Error::Line)?;
        self.hardware.drive_data().map_err(Error::Line)?;
        self.hardware.arm_counter(ACK_BITS).map_err(Error::Line)?;
        self.ack_pending = true;
        Ok(())
    }

    fn load_read_byte(&mut self) -> Result<(), Error<H::Error>> {
        let index = self.pointer;
        let value = if let Some(value) = self.registers.get(index) {
            self.last_event = Some(SlaveEvent::ByteRead { index, value });
            value
        } else {
            self.last_event = Some(SlaveEvent::Rejected { index });
            FILL_BYTE
        };
        self.hardware.shift_out(value).map_err(Error::Line)?;
        self.hardware.drive_data().map_err(Error::Line)?;
        self.hardware.arm_counter(BYTE_BITS).map_err(Error::Line)
    }

    /// Back to address decoding; overflow events stay off until next start.
    fn end_transaction(&mut self) -> Result<(), Error<H::Error>> {
        self.state = TransactionState::AwaitAddress;
        self.ack_pending = false;
        self.advance_pending = false;
        self.hardware.release_data().map_err(Error::Line)?;
        self.hardware.disable_overflow_events().map_err(Error::Line)?;
        self.hardware.arm_counter(BYTE_BITS).map_err(Error::Line)
    }

    fn unexpected(&mut self, what: &str) -> Result<(), Error<H::Error>> {
        self.logger.error(format_args!(
            "unexpected {} in {:?}, resetting",
            what, self.state
        ));
        self.last_event = Some(SlaveEvent::FailSafeReset);
        self.end_transaction()
    }

    fn wait_clock_low(&mut self) -> Result<(), Error<H::Error>> {
        for _ in 0..self.config.clock_spin_limit {
            if !self.hardware.clock_is_high().map_err(Error::Line)? {
                return Ok(());
            }
            core::hint::spin_loop();
        }
        Err(Error::ClockStretchTimeout)
    }

    /// Best-effort reset after a failure; hardware errors are ignored here.
    fn fail_safe(&mut self) {
        self.state = TransactionState::AwaitAddress;
        self.ack_pending = false;
        self.advance_pending = false;
        self.last_event = Some(SlaveEvent::FailSafeReset);
        let _ = self.hardware.release_data();
        let _ = self.hardware.disable_overflow_events();
        let _ = self.hardware.clear_flags();
        let _ = self.hardware.release_clock();
    }
}

impl<H: UsiHardware, L: Logger, const N: usize> I2cSlaveCore<SevenBitAddress>
    for UsiSlave<H, L, N>
{
    type Error = Error<H::Error>;

    fn enable_slave_mode(&mut self) -> Result<(), Self::Error> {
        self.state = TransactionState::AwaitAddress;
        self.ack_pending = false;
        self.advance_pending = false;
        self.hardware.release_data().map_err(Error::Line)?;
        self.hardware.release_clock().map_err(Error::Line)?;
        self.hardware.disable_overflow_events().map_err(Error::Line)?;
        self.hardware.arm_counter(BYTE_BITS).map_err(Error::Line)?;
        self.hardware.clear_flags().map_err(Error::Line)?;
        self.hardware.set_start_detection(true).map_err(Error::Line)?;
        self.enabled = true;
        self.logger.debug(format_args!(
            "slave enabled at 0x{:02x}",
            self.config.address
        ));
        Ok(())
    }

    fn disable_slave_mode(&mut self) -> Result<(), Self::Error> {
        self.enabled = false;
        self.state = TransactionState::AwaitAddress;
        self.ack_pending = false;
        self.advance_pending = false;
        self.hardware.set_start_detection(false).map_err(Error::Line)?;
        self.hardware.disable_overflow_events().map_err(Error::Line)?;
        self.hardware.release_data().map_err(Error::Line)?;
        self.hardware.release_clock().map_err(Error::Line)
    }

    fn is_slave_mode_enabled(&self) -> bool {
        self.enabled
    }

    fn slave_address(&self) -> SevenBitAddress {
        self.config.address
    }
}

impl<H: UsiHardware, L: Logger, const N: usize> I2cSlaveEvents<SevenBitAddress>
    for UsiSlave<H, L, N>
{
    fn handle_slave_event(&mut self, event: BusEvent) -> Result<(), Self::Error> {
        self.handle(event)
    }

    fn slave_status(&self) -> SlaveStatus {
        SlaveStatus {
            enabled: self.enabled,
            address: self.config.address,
            state: self.state,
            pointer: self.pointer,
            ack_pending: self.ack_pending,
            last_event: self.last_event,
        }
    }

    fn last_slave_event(&self) -> Option<SlaveEvent> {
        self.last_event
    }
}
