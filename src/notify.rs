//! Delivery notifications
//!
//! A notifier is told every time a batch of lines reached a client. It is a
//! purely local side effect: its failures are logged by the caller and never
//! affect delivery.

use std::fmt::Debug;
use std::io::Write;

use crate::error::Result;

pub trait Notifier: Send + Sync + Debug {
    /// Called after lines were written to `recipient`
    fn notify(&self, recipient: &str) -> Result<()>;
}

/// Does nothing. The default.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentNotifier;

impl Notifier for SilentNotifier {
    fn notify(&self, _recipient: &str) -> Result<()> {
        Ok(())
    }
}

/// Rings the terminal bell on the server's stderr
#[derive(Debug, Default, Clone, Copy)]
pub struct BellNotifier;

impl Notifier for BellNotifier {
    fn notify(&self, _recipient: &str) -> Result<()> {
        let mut stderr = std::io::stderr().lock();
        stderr.write_all(b"\x07")?;
        stderr.flush()?;
        Ok(())
    }
}
