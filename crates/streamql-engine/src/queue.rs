//! Bounded pull queue terminating an interactive query.
//!
//! Runtime partition threads push `(rendered key, row)` pairs; one caller
//! drains them. The enqueue side blocks when the queue is full, which is the
//! backpressure mechanism: a slow consumer throttles the producing partition
//! thread. Closing the queue drops the receiver, which unblocks any sender
//! stuck on a full queue; a send that fails during close resolves as a clean
//! shutdown rather than an error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, Sender};
use streamql_core::Row;

use crate::error::{Error, Result};
use crate::topology::RecordKey;

/// Capacity of the hand-off buffer between partition threads and the caller.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Create a connected producer/queue pair with the given capacity.
pub fn bounded_row_queue(capacity: usize) -> (QueueProducer, RowQueue) {
    let (tx, rx) = bounded(capacity);
    let closing = Arc::new(AtomicBool::new(false));
    (
        QueueProducer {
            tx,
            closing: Arc::clone(&closing),
        },
        RowQueue {
            rx: Mutex::new(Some(rx)),
            closing,
        },
    )
}

// ---------------------------------------------------------------------------
// Producer side
// ---------------------------------------------------------------------------

/// Per-record callback handle held by the terminal topology step.
#[derive(Debug, Clone)]
pub struct QueueProducer {
    tx: Sender<(String, Row)>,
    closing: Arc<AtomicBool>,
}

impl QueueProducer {
    /// Enqueue one record, blocking while the queue is full. A `None` row is
    /// silently dropped. A send interrupted by queue close resolves as a
    /// clean no-op; any other failed send is an invariant breach naming the
    /// offending key.
    pub fn push(&self, key: &RecordKey, row: Option<Row>) -> Result<()> {
        let Some(row) = row else {
            return Ok(());
        };
        match self.tx.send((key.render(), row)) {
            Ok(()) => Ok(()),
            Err(_) if self.closing.load(Ordering::Acquire) => Ok(()),
            Err(_) => Err(Error::Invariant(format!(
                "Interrupted while enqueueing record for key: {}",
                key.render()
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Consumer side
// ---------------------------------------------------------------------------

/// The caller-facing end of the queue.
#[derive(Debug)]
pub struct RowQueue {
    rx: Mutex<Option<Receiver<(String, Row)>>>,
    closing: Arc<AtomicBool>,
}

impl RowQueue {
    /// Take the next pending record without blocking.
    pub fn poll(&self) -> Option<(String, Row)> {
        let rx = self.rx.lock().expect("row queue poisoned");
        rx.as_ref().and_then(|rx| rx.try_recv().ok())
    }

    /// Wait up to `timeout` for the next record.
    ///
    /// The wait happens on a clone of the receiver taken outside the lock,
    /// so `close` never stalls behind a waiting consumer.
    pub fn poll_timeout(&self, timeout: Duration) -> Option<(String, Row)> {
        let rx = {
            let guard = self.rx.lock().expect("row queue poisoned");
            guard.as_ref().cloned()
        };
        rx.and_then(|rx| rx.recv_timeout(timeout).ok())
    }

    /// Drain everything currently pending.
    pub fn drain(&self) -> Vec<(String, Row)> {
        let rx = self.rx.lock().expect("row queue poisoned");
        match rx.as_ref() {
            Some(rx) => rx.try_iter().collect(),
            None => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        let rx = self.rx.lock().expect("row queue poisoned");
        rx.as_ref().map(|rx| rx.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Close the queue. Drops the receiver so producers blocked on a full
    /// queue unblock immediately. Idempotent.
    pub fn close(&self) {
        self.closing.store(true, Ordering::Release);
        self.rx.lock().expect("row queue poisoned").take();
    }
}

// ===========================================================================
// Tests
// ===========================================================================
