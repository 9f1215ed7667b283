//! Consumer-side IQ stream.
//!
//! [`IqStream`] turns the batch-oriented [`SampleQueue`] into a
//! caller-sized read interface: each [`IqStream::read`] fills as much of the
//! caller's buffer as the current batch allows, pulling the next batch from
//! the queue only once the current one is used up. Short reads are normal.
//!
//! Reads block the calling thread (up to the given timeout) and are meant to
//! run on a dedicated consumer thread or inside `spawn_blocking`, not on an
//! async task.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use spyserver_core::error::{Error, Result};
use spyserver_core::sample::{Complex32, SampleBatch, SampleQueue};

/// Reader over a [`SampleQueue`] that hands out samples in caller-sized
/// chunks.
///
/// A stream created with [`IqStream::new`] is active for its whole
/// lifetime. Streams obtained from
/// [`SpyServerDevice::setup_stream`](crate::device::SpyServerDevice::setup_stream)
/// start inactive and follow the device's activate/deactivate calls.
#[derive(Debug)]
pub struct IqStream {
    queue: Arc<SampleQueue>,
    active: Arc<AtomicBool>,
    current: SampleBatch,
    start: usize,
}

impl IqStream {
    /// Create an active stream reading from `queue`.
    pub fn new(queue: Arc<SampleQueue>) -> Self {
        Self::with_flag(queue, Arc::new(AtomicBool::new(true)))
    }

    /// Create a stream whose activity is controlled through `active`.
    pub(crate) fn with_flag(queue: Arc<SampleQueue>, active: Arc<AtomicBool>) -> Self {
        Self {
            queue,
            active,
            current: SampleBatch::new(),
            start: 0,
        }
    }

    /// Copy up to `out.len()` samples into `out`.
    ///
    /// Returns the number of samples written, which may be less than
    /// requested when the current batch runs out. Fails with
    /// [`Error::StreamInactive`] if the stream is not active and with
    /// [`Error::Timeout`] if no batch arrives within `timeout`.
    pub fn read(&mut self, out: &mut [Complex32], timeout: Duration) -> Result<usize> {
        if !self.is_active() {
            return Err(Error::StreamInactive);
        }
        if out.is_empty() {
            return Ok(0);
        }

        if self.current.is_empty() {
            match self.queue.dequeue_timeout(timeout) {
                Some(batch) => {
                    self.current = batch;
                    self.start = 0;
                }
                None => return Err(Error::Timeout),
            }
        }

        let remaining = &self.current[self.start..];
        let count = out.len().min(remaining.len());
        out[..count].copy_from_slice(&remaining[..count]);
        self.start += count;

        if self.start >= self.current.len() {
            self.current.clear();
            self.start = 0;
        }

        Ok(count)
    }

    /// Whether reads are currently allowed.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub(crate) fn shares_flag(&self, flag: &Arc<AtomicBool>) -> bool {
        Arc::ptr_eq(&self.active, flag)
    }

    /// Samples left in the batch being consumed.
    pub fn buffered(&self) -> usize {
        self.current.len() - self.start
    }

    /// Whether the queue evicted a batch since the last read.
    pub fn overflow(&self) -> bool {
        self.queue.overflow()
    }

    /// Drop the partially consumed batch and everything queued.
    pub fn flush(&mut self) {
        self.current.clear();
        self.start = 0;
        self.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spyserver_core::sample::sample_queue;

    fn ramp(len: usize) -> SampleBatch {
        (0..len).map(|i| Complex32::new(i as f32, -(i as f32))).collect()
    }

    #[test]
    fn slices_batch_across_reads() {
        let queue = sample_queue(4).unwrap();
        queue.enqueue(ramp(10));
        let mut stream = IqStream::new(queue);
        let mut out = [Complex32::default(); 3];

        let mut counts = Vec::new();
        let mut seen = Vec::new();
        for _ in 0..4 {
            let n = stream.read(&mut out, Duration::from_millis(10)).unwrap();
            counts.push(n);
            seen.extend_from_slice(&out[..n]);
        }
        assert_eq!(counts, vec![3, 3, 3, 1]);
        assert_eq!(seen, ramp(10));
        assert_eq!(stream.buffered(), 0);

        let result = stream.read(&mut out, Duration::from_millis(10));
        assert!(matches!(result, Err(Error::Timeout)));
    }

    #[test]
    fn large_buffer_takes_one_batch_at_a_time() {
        let queue = sample_queue(4).unwrap();
        queue.enqueue(ramp(5));
        queue.enqueue(ramp(7));
        let mut stream = IqStream::new(queue);
        let mut out = [Complex32::default(); 64];

        assert_eq!(stream.read(&mut out, Duration::from_millis(10)).unwrap(), 5);
        assert_eq!(stream.read(&mut out, Duration::from_millis(10)).unwrap(), 7);
        assert_eq!(out[6], Complex32::new(6.0, -6.0));
    }

    #[test]
    fn buffered_tracks_remaining_samples() {
        let queue = sample_queue(4).unwrap();
        queue.enqueue(ramp(8));
        let mut stream = IqStream::new(queue);
        let mut out = [Complex32::default(); 5];

        stream.read(&mut out, Duration::from_millis(10)).unwrap();
        assert_eq!(stream.buffered(), 3);
    }

    #[test]
    fn inactive_stream_refuses_reads() {
        let queue = sample_queue(4).unwrap();
        queue.enqueue(ramp(4));
        let active = Arc::new(AtomicBool::new(false));
        let mut stream = IqStream::with_flag(Arc::clone(&queue), Arc::clone(&active));
        let mut out = [Complex32::default(); 4];

        assert!(matches!(
            stream.read(&mut out, Duration::from_millis(10)),
            Err(Error::StreamInactive)
        ));
        // Nothing was consumed.
        assert_eq!(queue.len(), 1);

        active.store(true, Ordering::SeqCst);
        assert_eq!(stream.read(&mut out, Duration::from_millis(10)).unwrap(), 4);
    }

    #[test]
    fn empty_output_buffer_reads_nothing() {
        let queue = sample_queue(4).unwrap();
        queue.enqueue(ramp(4));
        let mut stream = IqStream::new(Arc::clone(&queue));
        assert_eq!(stream.read(&mut [], Duration::from_millis(10)).unwrap(), 0);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn overflow_visible_then_cleared_by_read() {
        let queue = sample_queue(1).unwrap();
        queue.enqueue(ramp(2));
        queue.enqueue(ramp(3));
        let mut stream = IqStream::new(queue);
        assert!(stream.overflow());

        let mut out = [Complex32::default(); 8];
        assert_eq!(stream.read(&mut out, Duration::from_millis(10)).unwrap(), 3);
        assert!(!stream.overflow());
    }

    #[test]
    fn flush_discards_pending_samples() {
        let queue = sample_queue(4).unwrap();
        queue.enqueue(ramp(6));
        queue.enqueue(ramp(6));
        let mut stream = IqStream::new(Arc::clone(&queue));
        let mut out = [Complex32::default(); 2];
        stream.read(&mut out, Duration::from_millis(10)).unwrap();

        stream.flush();
        assert_eq!(stream.buffered(), 0);
        assert!(queue.is_empty());
    }

    #[test]
    fn waits_for_late_batch() {
        let queue = sample_queue(4).unwrap();
        let producer = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                queue.enqueue(ramp(2));
            })
        };
        let mut stream = IqStream::new(queue);
        let mut out = [Complex32::default(); 4];
        assert_eq!(stream.read(&mut out, Duration::from_secs(5)).unwrap(), 2);
        producer.join().unwrap();
    }
}
