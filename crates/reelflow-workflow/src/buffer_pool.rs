//! Frame exchange between a decoder thread and the thread consuming frames.
//!
//! A buffer is always in exactly one place: the available set, in flight to
//! the producer, the ready queue, or held by the last consumer. The consumer
//! gets an `Arc` so the frame stays valid for as long as it is referenced;
//! the buffer comes back to the available set once the next `consume`
//! displaces it and nobody else holds it.

use parking_lot::Mutex;
use reelflow_core::{FrameBuffer, SharedFrameBuffer, VideoFormat};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::trace;

/// Snapshot of a pool's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub capacity: usize,
    /// Buffers the pool is accountable for.
    pub owned: usize,
    pub available: usize,
    pub ready: usize,
    pub in_flight: usize,
    pub held: bool,
}

struct PoolInner {
    available: Vec<FrameBuffer>,
    ready: VecDeque<FrameBuffer>,
    held: Option<SharedFrameBuffer>,
    in_flight: usize,
    owned: usize,
}

impl PoolInner {
    /// Put a buffer back, dropping it if the pool grew past its capacity.
    fn reclaim(&mut self, capacity: usize, mut frame: FrameBuffer) {
        if self.owned > capacity {
            self.owned -= 1;
            return;
        }
        frame.position = None;
        self.available.push(frame);
    }

    fn release_held(&mut self, capacity: usize) {
        if let Some(prev) = self.held.take() {
            match Arc::try_unwrap(prev) {
                Ok(frame) => self.reclaim(capacity, frame),
                // Still referenced by a consumer; it frees the memory.
                Err(_) => self.owned -= 1,
            }
        }
    }
}

pub struct BufferPool {
    format: VideoFormat,
    capacity: usize,
    inner: Mutex<PoolInner>,
}

impl BufferPool {
    /// Create a pool with `capacity` preallocated buffers.
    pub fn new(format: VideoFormat, capacity: usize) -> Self {
        let available = (0..capacity).map(|_| Self::allocate(format)).collect();
        Self {
            format,
            capacity,
            inner: Mutex::new(PoolInner {
                available,
                ready: VecDeque::with_capacity(capacity),
                held: None,
                in_flight: 0,
                owned: capacity,
            }),
        }
    }

    fn allocate(format: VideoFormat) -> FrameBuffer {
        FrameBuffer::new(format.width, format.height, format.pixel_format)
    }

    pub fn format(&self) -> VideoFormat {
        self.format
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Hand a buffer to the producer. Allocates when none is available.
    pub fn acquire(&self) -> FrameBuffer {
        let mut inner = self.inner.lock();
        inner.in_flight += 1;
        match inner.available.pop() {
            Some(frame) => frame,
            None => {
                inner.owned += 1;
                trace!(owned = inner.owned, "buffer pool grew");
                drop(inner);
                Self::allocate(self.format)
            }
        }
    }

    /// Queue a filled buffer for the consumer.
    pub fn publish(&self, frame: FrameBuffer) {
        let mut inner = self.inner.lock();
        inner.in_flight = inner.in_flight.saturating_sub(1);
        inner.ready.push_back(frame);
    }

    /// Return a buffer the producer filled but nobody wants.
    pub fn recycle(&self, frame: FrameBuffer) {
        let mut inner = self.inner.lock();
        inner.in_flight = inner.in_flight.saturating_sub(1);
        inner.reclaim(self.capacity, frame);
    }

    /// Take the oldest filled buffer. `None` if nothing is ready.
    pub fn consume(&self) -> Option<SharedFrameBuffer> {
        let mut inner = self.inner.lock();
        let frame = Arc::new(inner.ready.pop_front()?);
        inner.release_held(self.capacity);
        inner.held = Some(frame.clone());
        Some(frame)
    }

    /// Number of filled buffers waiting.
    pub fn ready_count(&self) -> usize {
        self.inner.lock().ready.len()
    }

    /// Drop queued frames, e.g. after a seek.
    pub fn flush(&self) {
        let mut inner = self.inner.lock();
        while let Some(frame) = inner.ready.pop_front() {
            inner.reclaim(self.capacity, frame);
        }
    }

    /// Flush and release the held frame.
    pub fn reset(&self) {
        self.flush();
        let mut inner = self.inner.lock();
        inner.release_held(self.capacity);
    }

    pub fn stats(&self) -> PoolStats {
        let inner = self.inner.lock();
        PoolStats {
            capacity: self.capacity,
            owned: inner.owned,
            available: inner.available.len(),
            ready: inner.ready.len(),
            in_flight: inner.in_flight,
            held: inner.held.is_some(),
        }
    }
}
