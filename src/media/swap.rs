//! Double-buffered frame handoff between the decode and render threads
//!
//! Two slots, one "which slot is readable" flag, two condition variables.
//! The decode thread fills the back slot, flips the flag and signals the
//! render thread; the render thread consumes the readable slot, clears the
//! flag and signals the decoder. At most one frame of latency, exactly two
//! frames of memory, and synchronous backpressure: if render falls behind,
//! decode blocks on the free-slot wait instead of queueing.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::MediaError;

/// One frame slot: tightly packed YUV 4:2:0 planes plus dimensions.
#[derive(Debug, Default, Clone)]
pub struct FrameBuffer {
    pub width: u32,
    pub height: u32,
    /// Y, U, V planes, stride == visible width
    pub planes: [Vec<u8>; 3],
}

impl FrameBuffer {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[derive(Debug, Default)]
struct SwapState {
    /// Index of the consumer-readable slot, if a frame is pending
    readable: Option<usize>,
    /// Slot the consumer is currently reading, if any
    reading: Option<usize>,
    /// Slot the producer writes next
    back: usize,
    shutdown: bool,
}

/// The two-slot handoff itself. Exactly one producer (decode thread) and one
/// consumer (render thread).
#[derive(Default)]
pub struct FrameSwap {
    slots: [Mutex<FrameBuffer>; 2],
    state: Mutex<SwapState>,
    frame_ready: Condvar,
    slot_free: Condvar,
}

impl FrameSwap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Producer side: wait for a free slot, fill it, mark it readable.
    ///
    /// Blocks while the previous frame is still unconsumed; this is the
    /// pipeline's backpressure. Returns [`MediaError::ShutDown`] once
    /// [`shutdown`](Self::shutdown) has been called, including when the
    /// producer was already blocked waiting.
    pub fn publish<F>(&self, fill: F) -> Result<(), MediaError>
    where
        F: FnOnce(&mut FrameBuffer),
    {
        let back = {
            let mut state = self.state.lock();
            // A pending unconsumed frame is the backpressure condition; the
            // back slot still being read only happens while the consumer
            // drains the previous frame.
            while !state.shutdown
                && (state.readable.is_some() || state.reading == Some(state.back))
            {
                self.slot_free.wait(&mut state);
            }
            if state.shutdown {
                return Err(MediaError::ShutDown);
            }
            state.back
        };

        // The state lock is dropped while writing: the consumer may be
        // reading the other slot concurrently.
        fill(&mut self.slots[back].lock());

        let mut state = self.state.lock();
        if state.shutdown {
            return Err(MediaError::ShutDown);
        }
        state.readable = Some(back);
        state.back = 1 - back;
        drop(state);
        self.frame_ready.notify_one();
        Ok(())
    }

    /// Consumer side: wait up to `timeout` for a readable slot and hand it
    /// to `read`. Returns `Ok(None)` when no frame arrived in time, so the
    /// render loop can keep servicing input.
    pub fn consume<F, R>(&self, timeout: Duration, read: F) -> Result<Option<R>, MediaError>
    where
        F: FnOnce(&FrameBuffer) -> R,
    {
        let deadline = Instant::now() + timeout;
        let front = {
            let mut state = self.state.lock();
            loop {
                if state.shutdown {
                    return Err(MediaError::ShutDown);
                }
                match state.readable.take() {
                    Some(front) => {
                        state.reading = Some(front);
                        break front;
                    }
                    None => {
                        if self.frame_ready.wait_until(&mut state, deadline).timed_out() {
                            return Ok(None);
                        }
                    }
                }
            }
        };
        // The frame is taken: the producer may start filling the other slot
        // while we read this one.
        self.slot_free.notify_one();

        let result = read(&self.slots[front].lock());

        let mut state = self.state.lock();
        state.reading = None;
        drop(state);
        self.slot_free.notify_one();
        Ok(Some(result))
    }

    /// Unblock both sides permanently. Called at the start of session
    /// teardown, before the transport threads are joined.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        state.shutdown = true;
        drop(state);
        self.frame_ready.notify_all();
        self.slot_free.notify_all();
    }

    pub fn is_shut_down(&self) -> bool {
        self.state.lock().shutdown
    }
}
