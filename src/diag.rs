//! RT-safe diagnostics channel.
//!
//! The audio thread **records facts**. The main thread **formats and logs**.
//!
//! Records are fixed-size and `Copy`, pushed through a lock-free SPSC ring.
//! If the ring is full the record is dropped rather than blocking. The
//! receiving side drains them off the audio thread and forwards each one to
//! the `log` facade.
//!
//! # Example
//!
//! ```ignore
//! // audio thread
//! diag.report(Diagnostic::alloc_failed("MagSmear", 2050));
//!
//! // main thread
//! rx.log_pending();
//! ```

use rtrb::{Consumer, Producer, RingBuffer};
use std::fmt;

/// Default ring capacity.
pub const DIAG_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagKind {
    /// Real-time pool could not serve a scratch request.
    AllocFailed,
}

/// One diagnostic record. No heap data, so it can be built on the audio thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagKind,
    /// Name of the unit that raised it.
    pub unit: &'static str,
    /// Floats requested, for allocation failures.
    pub requested: usize,
}

impl Diagnostic {
    pub const fn alloc_failed(unit: &'static str, requested: usize) -> Self {
        Self {
            kind: DiagKind::AllocFailed,
            unit,
            requested,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DiagKind::AllocFailed => write!(
                f,
                "{}: alloc failed, increase real-time memory (requested {} floats)",
                self.unit, self.requested
            ),
        }
    }
}

/// Audio-thread end of the channel.
#[derive(Debug)]
pub struct DiagSender {
    tx: Producer<Diagnostic>,
}

/// Main-thread end of the channel.
#[derive(Debug)]
pub struct DiagReceiver {
    rx: Consumer<Diagnostic>,
}

/// Create a sender/receiver pair holding up to `capacity` records.
pub fn new_diag_queue(capacity: usize) -> (DiagSender, DiagReceiver) {
    let (tx, rx) = RingBuffer::new(capacity);
    (DiagSender { tx }, DiagReceiver { rx })
}

impl DiagSender {
    /// Fire and forget. Returns `false` if the record was dropped.
    ///
    /// # RT Safety
    /// - No allocation
    /// - No locking
    /// - No formatting
    #[inline]
    pub fn report(&mut self, diag: Diagnostic) -> bool {
        self.tx.push(diag).is_ok()
    }
}

impl DiagReceiver {
    /// Take every pending record.
    pub fn drain(&mut self) -> Vec<Diagnostic> {
        let mut out = Vec::with_capacity(self.rx.slots());
        while let Ok(diag) = self.rx.pop() {
            out.push(diag);
        }
        out
    }

    /// Drain and emit each record as a `log::warn!`. Returns how many were logged.
    pub fn log_pending(&mut self) -> usize {
        let mut count = 0;
        while let Ok(diag) = self.rx.pop() {
            log::warn!("{}", diag);
            count += 1;
        }
        count
    }
}
