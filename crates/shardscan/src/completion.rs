use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tracing::{debug, error, warn};

use crate::sink::EventSink;

/// Detects when the last scan worker finishes and signals end of stream.
///
/// Workers only report after their last submit has returned, so the signal
/// always follows every event.
#[derive(Debug)]
pub struct CompletionTracker<'a, K: ?Sized> {
    finished: AtomicUsize,
    expected: usize,
    signaled: AtomicBool,
    sink: &'a K,
}

impl<'a, K> CompletionTracker<'a, K>
where
    K: EventSink + ?Sized,
{
    pub fn new(expected: usize, sink: &'a K) -> Self {
        CompletionTracker {
            finished: AtomicUsize::new(0),
            expected,
            signaled: AtomicBool::new(false),
            sink,
        }
    }

    /// Report that a worker has drained the queue.
    ///
    /// Returns true for exactly one caller, the one that completed the count.
    /// That caller signals end of stream before returning.
    pub fn report_finished(&self) -> bool {
        // Increment and compare in one step, two workers can't both see the
        // final count.
        let finished = self.finished.fetch_add(1, Ordering::AcqRel) + 1;

        if finished == self.expected {
            debug!(finished, "last scan worker finished");
            self.signal_end_of_stream();
            return true;
        }

        if finished > self.expected {
            warn!(
                finished,
                expected = self.expected,
                "more completion reports than workers"
            );
        }

        false
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::Acquire)
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    pub fn is_signaled(&self) -> bool {
        self.signaled.load(Ordering::Acquire)
    }

    /// Send end of stream to the sink, at most once.
    ///
    /// Delivery errors are logged only, the scan is done regardless.
    pub(crate) fn signal_end_of_stream(&self) {
        if self.signaled.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Err(e) = self.sink.signal_end_of_stream() {
            error!(%e, "failed to signal end of stream");
        }
    }
}
