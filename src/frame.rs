//! Frame pacing for multiple frames in flight.
//!
//! [`FrameSync`] keeps the CPU from recording into a frame slot whose
//! previous commands the GPU may still be executing. Each slot remembers the
//! fence value signaled after its last frame was submitted; moving to the
//! next slot blocks only when that value has not completed yet.
//!
//! ```text
//! Frame 0: [record slot 0] [present] [signal 1] ───────────────────────────►
//!                                    [GPU executes frame 0] ────────────────►
//! Frame 1:                            [record slot 1] [present] [signal 2] ─►
//! Frame 2:                                          [wait 1] [record slot 0] ►
//! ```
//!
//! | Frames in flight | Behavior |
//! |------------------|----------|
//! | 1 | CPU waits for the GPU every frame |
//! | 2 | CPU records frame N+1 while the GPU renders frame N |
//! | 3 | More latency, smoother under uneven frame times |

use crate::backend::traits::{BackendResult, GraphicsContext};

/// Default number of frames in flight
pub const DEFAULT_FRAMES_IN_FLIGHT: usize = 2;

const LOG_TARGET: &str = "frame";

/// Per-slot fence bookkeeping
#[derive(Debug)]
pub struct FrameSync {
    /// Fence value each slot must reach before it is reused
    watermarks: Vec<u64>,
    /// Slot the frame just presented was recorded into
    slot: usize,
    next_value: u64,
    frame_count: u64,
}

impl FrameSync {
    /// Create frame pacing for `frames_in_flight` slots
    ///
    /// # Panics
    ///
    /// Panics if `frames_in_flight` is 0.
    pub fn new(frames_in_flight: usize) -> Self {
        assert!(frames_in_flight > 0, "frames_in_flight must be at least 1");
        Self {
            watermarks: vec![0; frames_in_flight],
            slot: 0,
            // Fences start out completed at 0
            next_value: 1,
            frame_count: 0,
        }
    }

    pub fn frames_in_flight(&self) -> usize {
        self.watermarks.len()
    }

    /// Slot the next frame records into
    pub fn current_slot(&self) -> usize {
        self.slot
    }

    /// Number of completed [`wait_for_frame`](Self::wait_for_frame) calls
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Fence value the given slot waits for before reuse
    pub fn watermark(&self, slot: usize) -> Option<u64> {
        self.watermarks.get(slot).copied()
    }

    /// Close the presented frame and make the next slot safe to record
    ///
    /// Signals the direct queue, records the value for the slot that was
    /// just used, then waits only if the slot the context moved on to still
    /// has work in flight. The slot's command allocators are reset after.
    pub fn wait_for_frame<C: GraphicsContext + ?Sized>(
        &mut self,
        ctx: &mut C,
    ) -> BackendResult<usize> {
        let value = self.next_value;
        ctx.signal_fence(value)?;
        self.next_value += 1;
        self.watermarks[self.slot] = value;

        let next = ctx.current_frame() % self.watermarks.len();
        let required = self.watermarks[next];
        let completed = ctx.completed_fence_value();
        if completed < required {
            log::trace!(
                target: LOG_TARGET,
                "FrameSync: slot {} busy (fence {} < {}), waiting",
                next,
                completed,
                required
            );
            ctx.wait_fence(required)?;
        }

        ctx.reset_allocator(next)?;
        self.slot = next;
        self.frame_count += 1;
        Ok(next)
    }

    /// Block until every submitted frame has executed
    ///
    /// Call before resizing or destroying resources.
    pub fn wait_idle<C: GraphicsContext + ?Sized>(&mut self, ctx: &mut C) -> BackendResult<()> {
        let value = self.next_value;
        ctx.signal_fence(value)?;
        self.next_value += 1;

        if ctx.completed_fence_value() < value {
            log::trace!(target: LOG_TARGET, "FrameSync: waiting for idle (fence {})", value);
            ctx.wait_fence(value)?;
        }

        // Every slot is free now
        self.watermarks.iter_mut().for_each(|mark| *mark = 0);
        self.slot = ctx.current_frame() % self.watermarks.len();
        Ok(())
    }

    /// Follow the context's back buffer after the swapchain was recreated
    ///
    /// Only valid while idle, see [`wait_idle`](Self::wait_idle).
    pub fn sync_slot<C: GraphicsContext + ?Sized>(&mut self, ctx: &C) {
        self.slot = ctx.current_frame() % self.watermarks.len();
    }
}

impl Default for FrameSync {
    fn default() -> Self {
        Self::new(DEFAULT_FRAMES_IN_FLIGHT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::{DummyContext, Event};
    use crate::backend::types::TextureSize;
    use std::time::Duration;

    fn context(frames: usize) -> DummyContext {
        DummyContext::new(frames, TextureSize::new(8, 8), TextureSize::new(8, 8))
    }

    fn fence_events(ctx: &DummyContext) -> Vec<Event> {
        ctx.events()
            .iter()
            .copied()
            .filter(|event| {
                matches!(
                    event,
                    Event::SignalFence(_) | Event::WaitFence(_) | Event::ResetAllocator(_)
                )
            })
            .collect()
    }

    #[test]
    #[should_panic(expected = "frames_in_flight must be at least 1")]
    fn test_zero_frames_panics() {
        FrameSync::new(0);
    }

    #[test]
    fn test_completed_slot_is_not_waited_on() {
        let mut ctx = context(2);
        let mut sync = FrameSync::new(2);

        for _ in 0..4 {
            ctx.present().unwrap();
            sync.wait_for_frame(&mut ctx).unwrap();
        }

        assert!(fence_events(&ctx)
            .iter()
            .all(|event| !matches!(event, Event::WaitFence(_))));
        assert_eq!(sync.frame_count(), 4);
    }

    #[test]
    fn test_busy_slot_waits_before_reset() {
        let mut ctx = context(2);
        let fence = ctx.fence();
        fence.set_auto_complete(false);
        let mut sync = FrameSync::new(2);

        // Frame in slot 0, nothing in flight for slot 1 yet
        ctx.present().unwrap();
        assert_eq!(sync.wait_for_frame(&mut ctx).unwrap(), 1);
        assert_eq!(sync.watermark(0), Some(1));

        // Slot 0 is reused while its fence value 1 is still pending
        ctx.present().unwrap();
        let worker = {
            let fence = fence.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(10));
                fence.complete(1);
            })
        };
        assert_eq!(sync.wait_for_frame(&mut ctx).unwrap(), 0);
        worker.join().unwrap();

        assert_eq!(
            fence_events(&ctx),
            vec![
                Event::SignalFence(1),
                Event::ResetAllocator(1),
                Event::SignalFence(2),
                Event::WaitFence(1),
                Event::ResetAllocator(0),
            ]
        );
    }

    #[test]
    fn test_finished_slot_skips_wait() {
        let mut ctx = context(2);
        let fence = ctx.fence();
        fence.set_auto_complete(false);
        let mut sync = FrameSync::new(2);

        ctx.present().unwrap();
        sync.wait_for_frame(&mut ctx).unwrap();
        fence.complete(1);

        ctx.present().unwrap();
        sync.wait_for_frame(&mut ctx).unwrap();
        assert!(!fence_events(&ctx).contains(&Event::WaitFence(1)));
        assert_eq!(ctx.events().last(), Some(&Event::ResetAllocator(0)));
    }

    #[test]
    fn test_single_frame_in_flight_waits_every_frame() {
        let mut ctx = context(1);
        let fence = ctx.fence();
        fence.set_auto_complete(false);
        let mut sync = FrameSync::new(1);

        ctx.present().unwrap();
        fence.complete(1);
        sync.wait_for_frame(&mut ctx).unwrap();
        assert!(!fence_events(&ctx).contains(&Event::WaitFence(1)));

        // Unfinished work in the only slot must be waited for
        ctx.present().unwrap();
        let worker = {
            let fence = fence.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(10));
                fence.complete(2);
            })
        };
        sync.wait_for_frame(&mut ctx).unwrap();
        worker.join().unwrap();
        assert!(fence_events(&ctx).contains(&Event::WaitFence(2)));
    }

    #[test]
    fn test_wait_idle_drains_everything() {
        let mut ctx = context(2);
        let mut sync = FrameSync::new(2);
        ctx.present().unwrap();
        sync.wait_for_frame(&mut ctx).unwrap();

        sync.wait_idle(&mut ctx).unwrap();
        assert_eq!(ctx.completed_fence_value(), 2);
        assert_eq!(sync.watermark(0), Some(0));
        assert_eq!(sync.watermark(1), Some(0));
    }
}
