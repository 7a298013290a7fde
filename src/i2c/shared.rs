// Licensed under the Apache-2.0 license

//! Interrupt-safe home for a [`UsiSlave`].
//!
//! The engine runs from the start-condition and counter-overflow interrupts
//! while application code reads and updates registers in the foreground.
//! [`SharedSlave`] keeps the engine behind a `critical_section::Mutex` so
//! both sides go through a critical section and a multi-byte register update
//! can never be observed half-written by the bus master.
//!
//! ```ignore
//! static SLAVE: SharedSlave<Usi> = SharedSlave::new();
//!
//! #[interrupt]
//! fn USI_START() {
//!     let _ = SLAVE.handle(BusEvent::Start);
//! }
//!
//! #[interrupt]
//! fn USI_OVERFLOW() {
//!     let _ = SLAVE.handle(BusEvent::CounterOverflow);
//! }
//! ```

use crate::common::{Logger, NoOpLogger};
use crate::i2c::common::{BusEvent, SlaveStatus};
use crate::i2c::register_file::RegisterValue;
use crate::i2c::traits::{I2cSlaveEvents, UsiHardware};
use crate::i2c::usi_slave::{Error, UsiSlave, DEFAULT_REGISTER_COUNT};
use core::cell::RefCell;
use critical_section::Mutex;

pub struct SharedSlave<
    H: UsiHardware,
    L: Logger = NoOpLogger,
    const N: usize = DEFAULT_REGISTER_COUNT,
> {
    slave: Mutex<RefCell<Option<UsiSlave<H, L, N>>>>,
}

impl<H: UsiHardware, L: Logger, const N: usize> Default for SharedSlave<H, L, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: UsiHardware, L: Logger, const N: usize> SharedSlave<H, L, N> {
    /// Empty slot, usable in a `static`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slave: Mutex::new(RefCell::new(None)),
        }
    }

    /// Moves `slave` into the slot, returning the previous occupant.
    pub fn install(&self, slave: UsiSlave<H, L, N>) -> Option<UsiSlave<H, L, N>> {
        critical_section::with(|cs| self.slave.borrow(cs).replace(Some(slave)))
    }

    /// Empties the slot.
    pub fn take(&self) -> Option<UsiSlave<H, L, N>> {
        critical_section::with(|cs| self.slave.borrow(cs).take())
    }

    /// Runs `f` on the installed engine inside a critical section.
    ///
    /// # Errors
    ///
    /// [`Error::NotInstalled`] if the slot is empty, [`Error::Busy`] if called
    /// re-entrantly from within `f`.
    pub fn with<R>(
        &self,
        f: impl FnOnce(&mut UsiSlave<H, L, N>) -> R,
    ) -> Result<R, Error<H::Error>> {
        critical_section::with(|cs| {
            let mut slot = self
                .slave
                .borrow(cs)
                .try_borrow_mut()
                .map_err(|_| Error::Busy)?;
            let slave = slot.as_mut().ok_or(Error::NotInstalled)?;
            Ok(f(slave))
        })
    }

    /// Interrupt entry point.
    ///
    /// # Errors
    ///
    /// [`Error::NotInstalled`] before [`install`](Self::install), otherwise
    /// whatever the engine reports.
    pub fn handle(&self, event: BusEvent) -> Result<(), Error<H::Error>> {
        self.with(|slave| slave.handle(event))?
    }

    /// Reads a typed register value atomically with respect to the bus.
    ///
    /// # Errors
    ///
    /// [`Error::Register`] if the value does not fit at `index`.
    pub fn read<T: RegisterValue>(&self, index: usize) -> Result<T, Error<H::Error>> {
        self.with(|slave| slave.registers().read::<T>(index))?
            .map_err(Error::from)
    }

    /// Stores a typed register value atomically with respect to the bus.
    ///
    /// # Errors
    ///
    /// [`Error::Register`] if the value does not fit at `index`.
    pub fn write<T: RegisterValue>(&self, index: usize, value: T) -> Result<(), Error<H::Error>> {
        self.with(|slave| slave.registers_mut().write(index, value))?
            .map_err(Error::from)
    }

    /// Status snapshot, `None` while the slot is empty.
    pub fn status(&self) -> Option<SlaveStatus> {
        self.with(|slave| slave.slave_status()).ok()
    }
}
