// Licensed under the Apache-2.0 license

//! Crate-wide helpers shared by the driver modules.
//!
//! Drivers take a [`Logger`] type parameter that defaults to [`NoOpLogger`], so
//! logging costs nothing unless a sink is wired in. [`UartLogger`] forwards the
//! messages to any `embedded_io::Write` implementation, typically a UART.

use core::fmt;
use embedded_io::Write;

/// Destination for driver diagnostics.
///
/// Implementations are called from interrupt context and must not block for
/// longer than writing the message out takes.
pub trait Logger {
    /// Trace-level information about normal protocol progress.
    fn debug(&mut self, args: fmt::Arguments<'_>);

    /// Conditions the driver recovered from by resetting its state.
    fn error(&mut self, args: fmt::Arguments<'_>);
}

/// Logger that discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpLogger;

impl Logger for NoOpLogger {
    #[inline(always)]
    fn debug(&mut self, _args: fmt::Arguments<'_>) {}

    #[inline(always)]
    fn error(&mut self, _args: fmt::Arguments<'_>) {}
}

/// Logger writing one line per message to an `embedded_io::Write` sink.
///
/// Write failures are dropped: a broken console must not take the bus down.
pub struct UartLogger<W: Write> {
    uart: W,
}

impl<W: Write> UartLogger<W> {
    pub fn new(uart: W) -> Self {
        Self { uart }
    }

    /// Gives the sink back.
    pub fn into_inner(self) -> W {
        self.uart
    }

    fn line(&mut self, prefix: &str, args: fmt::Arguments<'_>) {
        let _ = self.uart.write_all(prefix.as_bytes());
        let _ = self.uart.write_fmt(args);
        let _ = self.uart.write_all(b"\r\n");
    }
}

impl<W: Write> Logger for UartLogger<W> {
    fn debug(&mut self, args: fmt::Arguments<'_>) {
        self.line("[i2c] ", args);
    }

    fn error(&mut self, args: fmt::Arguments<'_>) {
        self.line("[i2c] error: ", args);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct VecSink(Vec<u8>);

    impl embedded_io::ErrorType for VecSink {
        type Error = core::convert::Infallible;
    }

    impl Write for VecSink {
        fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
            self.0.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    #[test]
    fn test_uart_logger_formats_lines() {
        let mut logger = UartLogger::new(VecSink(Vec::new()));

        logger.debug(format_args!("address 0x{:02x} matched", 0x20));
        logger.error(format_args!("reset"));

        let out = String::from_utf8(logger.into_inner().0).unwrap();
        assert_eq!(out, "[i2c] address 0x20 matched\r\n[i2c] error: reset\r\n");
    }

    #[test]
    fn test_noop_logger_accepts_messages() {
        let mut logger = NoOpLogger;
        logger.debug(format_args!("{}", 1));
        logger.error(format_args!("{}", 2));
    }
}
