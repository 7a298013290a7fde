// Licensed under the Apache-2.0 license

//! Common types and constants for the USI I2C slave engine.
//!
//! This module provides the configuration builder, the protocol state and
//! event enums, and the status snapshot shared by the engine, the interrupt
//! shim and the simulator.

use embedded_hal::i2c::SevenBitAddress;

/// Highest valid 7-bit address.
pub const MAX_SEVEN_BIT_ADDRESS: u8 = 0x7F;

/// The general-call address, only answered when enabled in [`SlaveConfig`].
pub const GENERAL_CALL_ADDRESS: u8 = 0x00;

/// Default cap on the number of SCL polls in one wait.
pub const DEFAULT_CLOCK_SPIN_LIMIT: u32 = 10_000;

/// Bits per data byte.
pub const BYTE_BITS: u8 = 8;

/// Bits in the acknowledge slot.
pub const ACK_BITS: u8 = 1;

/// Asynchronous hardware events that drive the engine.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum BusEvent {
    /// Start (or repeated start) condition detected on the bus.
    Start,
    /// The bit counter reached the programmed number of clocked bits.
    CounterOverflow,
}

/// Position of the engine in the slave transaction grammar.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum TransactionState {
    /// Waiting for the address byte after a start condition.
    #[default]
    AwaitAddress,
    /// Addressed for write, waiting for the register pointer byte.
    AwaitRegisterPointer,
    /// Waiting for the next data byte of a write.
    WriteData,
    /// A data byte was stored and is being acknowledged.
    PostWriteAck,
    /// Addressed for read, the next register byte is about to be shifted out.
    ReadDataPre,
    /// A byte was shifted out, waiting for the master's ACK/NACK bit.
    ReadAckPoll,
}

impl TransactionState {
    /// True once the address phase has been acknowledged.
    #[must_use]
    pub fn in_transaction(self) -> bool {
        self != Self::AwaitAddress
    }
}

/// Handling of register pointers that fall outside the register file.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum PointerPolicy {
    /// Pointer arithmetic is modulo the register file capacity.
    #[default]
    Wrap,
    /// The pointer saturates on the last register.
    Clamp,
    /// Writes outside the file are NACKed, reads outside it return `0xFF`.
    Reject,
}

impl PointerPolicy {
    /// Maps a pointer byte received from the master onto the register file.
    ///
    /// Under [`PointerPolicy::Reject`] the raw value is kept so that the
    /// access itself can be refused. An empty file leaves `raw` untouched.
    #[must_use]
    pub fn place(self, raw: usize, capacity: usize) -> usize {
        if capacity == 0 {
            return raw;
        }
        match self {
            Self::Wrap => raw % capacity,
            Self::Clamp => raw.min(capacity - 1),
            Self::Reject => raw.min(capacity),
        }
    }

    /// Pointer value after one auto-increment.
    #[must_use]
    pub fn advance(self, pointer: usize, capacity: usize) -> usize {
        self.place(pointer.saturating_add(1), capacity)
    }
}

/// Protocol-level outcome of the last handled event.
///
/// Mismatches and NACKs are part of normal bus traffic and are reported here
/// instead of through `Err`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SlaveEvent {
    /// Start condition with no transaction in progress.
    Start,
    /// Start condition that interrupted an acknowledged transaction.
    RepeatedStart,
    /// Address byte for another device; the bus is ignored until next start.
    AddressIgnored { address: u8 },
    /// Our address (or the general call) was acknowledged.
    AddressMatched { read: bool, general_call: bool },
    /// Register pointer byte accepted.
    PointerSet { pointer: usize },
    /// A data byte was stored in the register file.
    ByteWritten { index: usize, value: u8 },
    /// A register byte was loaded for transmission.
    ByteRead { index: usize, value: u8 },
    /// Master ended the read with NACK.
    MasterNack,
    /// Stop condition observed after a written byte.
    Stop,
    /// Access outside the register file refused under `PointerPolicy::Reject`.
    Rejected { index: usize },
    /// Unexpected event ordering or hardware failure; state was reset.
    FailSafeReset,
}

/// Snapshot of the slave engine.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SlaveStatus {
    /// Whether slave mode is currently enabled
    pub enabled: bool,
    /// Configured slave address
    pub address: SevenBitAddress,
    /// Current transaction state
    pub state: TransactionState,
    /// Current register pointer
    pub pointer: usize,
    /// Whether the next overflow is the ACK/NACK bit
    pub ack_pending: bool,
    /// Last protocol event
    pub last_event: Option<SlaveEvent>,
}

/// Configuration validation failures.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConfigurationError {
    /// Address does not fit in 7 bits.
    InvalidAddress(u8),
    /// Clock spin limit must allow at least one poll.
    InvalidSpinLimit,
}

/// Validated slave configuration.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SlaveConfig {
    pub address: SevenBitAddress,
    pub pointer_policy: PointerPolicy,
    pub clock_spin_limit: u32,
    pub general_call: bool,
}

impl SlaveConfig {
    /// Address predicate used in the address phase. Returns `Some(general_call)`
    /// when the address is ours.
    #[must_use]
    pub fn matches(&self, address: u8, read: bool) -> Option<bool> {
        if address == self.address {
            Some(false)
        } else if self.general_call && address == GENERAL_CALL_ADDRESS && !read {
            Some(true)
        } else {
            None
        }
    }
}

pub struct SlaveConfigBuilder {
    address: SevenBitAddress,
    pointer_policy: PointerPolicy,
    clock_spin_limit: u32,
    general_call: bool,
}

impl SlaveConfigBuilder {
    #[must_use]
    pub fn new(address: SevenBitAddress) -> Self {
        Self {
            address,
            pointer_policy: PointerPolicy::default(),
            clock_spin_limit: DEFAULT_CLOCK_SPIN_LIMIT,
            general_call: false,
        }
    }
    #[must_use]
    pub fn pointer_policy(mut self, policy: PointerPolicy) -> Self {
        self.pointer_policy = policy;
        self
    }
    #[must_use]
    pub fn clock_spin_limit(mut self, polls: u32) -> Self {
        self.clock_spin_limit = polls;
        self
    }
    #[must_use]
    pub fn general_call(mut self, enabled: bool) -> Self {
        self.general_call = enabled;
        self
    }

    /// Validates and freezes the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] for addresses that do not fit in 7 bits
    /// or a zero spin limit.
    pub fn build(self) -> Result<SlaveConfig, ConfigurationError> {
        if self.address > MAX_SEVEN_BIT_ADDRESS {
            return Err(ConfigurationError::InvalidAddress(self.address));
        }
        if self.clock_spin_limit == 0 {
            return Err(ConfigurationError::InvalidSpinLimit);
        }
        Ok(SlaveConfig {
            address: self.address,
            pointer_policy: self.pointer_policy,
            clock_spin_limit: self.clock_spin_limit,
            general_call: self.general_call,
        })
    }
}
