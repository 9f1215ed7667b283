//! Sample types handed from the protocol client to consumers.
//!
//! Whatever the wire format, samples are delivered as interleaved complex
//! `f32` pairs. One [`SampleBatch`] is produced per IQ message and moved
//! through the [`SampleQueue`] to exactly one consumer.

use std::sync::Arc;

pub use num_complex::Complex32;

use crate::error::Result;
use crate::queue::CappedQueue;

/// Decoded samples from one IQ message, in arrival order.
pub type SampleBatch = Vec<Complex32>;

/// Queue bridging the receive task and the consumer.
pub type SampleQueue = CappedQueue<SampleBatch>;

/// Default number of batches buffered before the oldest is evicted.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Size in bytes of one complex sample as delivered to consumers.
pub const COMPLEX_SAMPLE_SIZE: usize = std::mem::size_of::<Complex32>();

/// Create a shareable sample queue with the given batch capacity.
pub fn sample_queue(capacity: usize) -> Result<Arc<SampleQueue>> {
    Ok(Arc::new(SampleQueue::new(capacity)?))
}
