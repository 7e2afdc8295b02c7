//! Frame-in-flight slots and their synchronization.
//!
//! # Overview
//!
//! Each of the [`MAX_FRAMES_IN_FLIGHT`] slots cycles through
//!
//! ```text
//! Idle -> Acquiring -> Recording -> Submitted -> (fence wait) -> Idle
//!              \
//!               `-> Idle   (acquire reported the swap chain out of date)
//! ```
//!
//! [`FrameSlots`] is the pure state machine; [`FrameSynchronizer`] pairs
//! it with the semaphores and fence of every slot. The slot index is
//! independent of the swap-chain image index: the synchronizer also
//! remembers which slot last submitted work for each image so an image
//! is never re-recorded while an older slot's submission still uses it.

use std::sync::Arc;

use tracing::{debug, info};

use renderer_rhi::device::Device;
use renderer_rhi::sync::{FrameSync, MAX_FRAMES_IN_FLIGHT};

use crate::error::{RendererError, RendererResult};

/// Lifecycle state of one frame-in-flight slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SlotState {
    /// The slot's previous submission has retired.
    #[default]
    Idle,
    /// Waiting for the swap chain to hand out an image.
    Acquiring,
    /// Recording and updating per-image resources.
    Recording,
    /// Work submitted; the fence is pending.
    Submitted,
}

/// Pure state machine for all slots and the image-to-slot map.
#[derive(Clone, Debug, Default)]
pub struct FrameSlots {
    states: [SlotState; MAX_FRAMES_IN_FLIGHT],
    current: usize,
    image_owners: Vec<Option<usize>>,
}

impl FrameSlots {
    /// Creates idle slots for a swap chain of `image_count` images.
    pub fn new(image_count: usize) -> Self {
        Self {
            states: [SlotState::Idle; MAX_FRAMES_IN_FLIGHT],
            current: 0,
            image_owners: vec![None; image_count],
        }
    }

    /// Slot the next frame uses.
    #[inline]
    pub fn current(&self) -> usize {
        self.current
    }

    #[inline]
    pub fn state(&self, slot: usize) -> SlotState {
        self.states[slot]
    }

    fn transition(&mut self, slot: usize, from: SlotState, to: SlotState) -> RendererResult<()> {
        let state = self.states[slot];
        if state != from {
            return Err(RendererError::InvalidSlotTransition {
                slot,
                from: state,
                to,
            });
        }
        self.states[slot] = to;
        Ok(())
    }

    /// Marks the slot's fence as observed signaled.
    ///
    /// This is the only way out of [`SlotState::Submitted`]. Retiring an
    /// idle slot is a no-op.
    pub fn retire(&mut self, slot: usize) -> RendererResult<()> {
        match self.states[slot] {
            SlotState::Idle => Ok(()),
            _ => self.transition(slot, SlotState::Submitted, SlotState::Idle),
        }
    }

    /// `Idle -> Acquiring`.
    ///
    /// # Errors
    ///
    /// Returns [`RendererError::SlotInUse`] if the slot is not idle.
    pub fn begin_acquire(&mut self, slot: usize) -> RendererResult<()> {
        let state = self.states[slot];
        if state != SlotState::Idle {
            return Err(RendererError::SlotInUse { slot, state });
        }
        self.states[slot] = SlotState::Acquiring;
        Ok(())
    }

    /// `Acquiring -> Idle`, when no image was acquired.
    pub fn abort_acquire(&mut self, slot: usize) -> RendererResult<()> {
        self.transition(slot, SlotState::Acquiring, SlotState::Idle)
    }

    /// `Acquiring -> Recording`.
    pub fn begin_recording(&mut self, slot: usize) -> RendererResult<()> {
        self.transition(slot, SlotState::Acquiring, SlotState::Recording)
    }

    /// `Recording -> Submitted`.
    pub fn mark_submitted(&mut self, slot: usize) -> RendererResult<()> {
        self.transition(slot, SlotState::Recording, SlotState::Submitted)
    }

    /// Advances to the next slot modulo [`MAX_FRAMES_IN_FLIGHT`].
    pub fn advance(&mut self) {
        self.current = (self.current + 1) % MAX_FRAMES_IN_FLIGHT;
    }

    /// Records that `slot` is about to use `image`.
    ///
    /// Returns the other slot whose submission still uses the image, if
    /// any; the caller must wait for that slot's fence and retire it
    /// before touching the image's resources.
    pub fn claim_image(&mut self, image: usize, slot: usize) -> Option<usize> {
        let owner = self.image_owners.get_mut(image)?;
        let previous = owner.replace(slot);
        previous.filter(|&p| p != slot && self.states[p] == SlotState::Submitted)
    }

    /// Forgets image ownership after the swap chain was rebuilt.
    pub fn reset_images(&mut self, image_count: usize) {
        self.image_owners = vec![None; image_count];
    }
}

/// Semaphores, fences and slot states for every frame in flight.
pub struct FrameSynchronizer {
    syncs: Vec<FrameSync>,
    slots: FrameSlots,
}

impl FrameSynchronizer {
    /// Creates [`MAX_FRAMES_IN_FLIGHT`] slots with signaled fences.
    ///
    /// # Errors
    ///
    /// Returns an error if any synchronization object creation fails.
    pub fn new(device: Arc<Device>, image_count: usize) -> RendererResult<Self> {
        let syncs = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| FrameSync::new(device.clone()))
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            "Frame synchronizer created with {} frames in flight",
            MAX_FRAMES_IN_FLIGHT
        );

        Ok(Self {
            syncs,
            slots: FrameSlots::new(image_count),
        })
    }

    /// Synchronization objects of `slot`.
    #[inline]
    pub fn sync(&self, slot: usize) -> &FrameSync {
        &self.syncs[slot]
    }

    #[inline]
    pub fn slots(&self) -> &FrameSlots {
        &self.slots
    }

    /// Waits for the current slot's previous submission and starts acquiring.
    ///
    /// Blocks without timeout. The fence is left signaled; it is reset
    /// by [`Self::image_acquired`] once an image is actually acquired.
    ///
    /// # Returns
    ///
    /// The slot index.
    pub fn begin_frame(&mut self) -> RendererResult<usize> {
        let slot = self.slots.current();
        self.syncs[slot].fence().wait(u64::MAX)?;
        self.slots.retire(slot)?;
        self.slots.begin_acquire(slot)?;
        Ok(slot)
    }

    /// Records a successful acquire of `image` by `slot`.
    ///
    /// Waits for any other slot still using the image, then resets the
    /// slot's fence and moves it to [`SlotState::Recording`].
    pub fn image_acquired(&mut self, slot: usize, image: usize) -> RendererResult<()> {
        if let Some(owner) = self.slots.claim_image(image, slot) {
            debug!("Image {} still used by slot {}, waiting", image, owner);
            self.syncs[owner].fence().wait(u64::MAX)?;
            self.slots.retire(owner)?;
        }
        self.syncs[slot].fence().reset()?;
        self.slots.begin_recording(slot)
    }

    /// Returns the slot to idle after an out-of-date acquire.
    pub fn acquire_failed(&mut self, slot: usize) -> RendererResult<()> {
        self.slots.abort_acquire(slot)
    }

    /// Marks the slot's work as submitted and advances to the next slot.
    pub fn submitted(&mut self, slot: usize) -> RendererResult<()> {
        self.slots.mark_submitted(slot)?;
        self.slots.advance();
        Ok(())
    }

    /// Called after the swap chain was rebuilt with `image_count` images.
    ///
    /// The device is idle at this point, so every submitted slot has retired.
    pub fn swapchain_rebuilt(&mut self, image_count: usize) -> RendererResult<()> {
        for slot in 0..MAX_FRAMES_IN_FLIGHT {
            if self.syncs[slot].fence().is_signaled() {
                self.slots.retire(slot)?;
            }
        }
        self.slots.reset_images(image_count);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_frame(slots: &mut FrameSlots, image: usize) -> usize {
        let slot = slots.current();
        slots.retire(slot).unwrap();
        slots.begin_acquire(slot).unwrap();
        if let Some(owner) = slots.claim_image(image, slot) {
            slots.retire(owner).unwrap();
        }
        slots.begin_recording(slot).unwrap();
        slots.mark_submitted(slot).unwrap();
        slots.advance();
        slot
    }

    #[test]
    fn test_full_cycle() {
        let mut slots = FrameSlots::new(3);
        assert_eq!(slots.state(0), SlotState::Idle);

        slots.begin_acquire(0).unwrap();
        assert_eq!(slots.state(0), SlotState::Acquiring);
        slots.begin_recording(0).unwrap();
        assert_eq!(slots.state(0), SlotState::Recording);
        slots.mark_submitted(0).unwrap();
        assert_eq!(slots.state(0), SlotState::Submitted);
        slots.retire(0).unwrap();
        assert_eq!(slots.state(0), SlotState::Idle);
    }

    #[test]
    fn test_slots_advance_modulo() {
        let mut slots = FrameSlots::new(3);
        let used: Vec<usize> = (0..5).map(|i| run_frame(&mut slots, i % 3)).collect();
        assert_eq!(used, vec![0, 1, 0, 1, 0]);
    }

    #[test]
    fn test_submitted_slot_refuses_new_frame() {
        let mut slots = FrameSlots::new(2);
        run_frame(&mut slots, 0);
        run_frame(&mut slots, 1);

        // Slot 0 is submitted again; starting it without a fence wait fails
        match slots.begin_acquire(0) {
            Err(RendererError::SlotInUse { slot, state }) => {
                assert_eq!(slot, 0);
                assert_eq!(state, SlotState::Submitted);
            }
            other => panic!("Expected SlotInUse, got {:?}", other),
        }
    }

    #[test]
    fn test_no_two_in_flight_submissions_share_a_slot() {
        let mut slots = FrameSlots::new(3);
        for frame in 0..10 {
            let slot = slots.current();
            if frame >= MAX_FRAMES_IN_FLIGHT {
                // Still submitted until its fence is observed
                assert!(slots.begin_acquire(slot).is_err());
                slots.retire(slot).unwrap();
            }
            slots.begin_acquire(slot).unwrap();
            slots.begin_recording(slot).unwrap();
            slots.mark_submitted(slot).unwrap();
            slots.advance();

            let in_flight = (0..MAX_FRAMES_IN_FLIGHT)
                .filter(|&s| slots.state(s) == SlotState::Submitted)
                .count();
            assert!(in_flight <= MAX_FRAMES_IN_FLIGHT);
        }
    }

    #[test]
    fn test_abort_acquire_leaves_slot_idle() {
        let mut slots = FrameSlots::new(2);
        slots.begin_acquire(0).unwrap();
        slots.abort_acquire(0).unwrap();
        assert_eq!(slots.state(0), SlotState::Idle);
        assert_eq!(slots.current(), 0);
    }

    #[test]
    fn test_out_of_order_transition() {
        let mut slots = FrameSlots::new(2);
        match slots.mark_submitted(0) {
            Err(RendererError::InvalidSlotTransition { from, to, .. }) => {
                assert_eq!(from, SlotState::Idle);
                assert_eq!(to, SlotState::Submitted);
            }
            other => panic!("Expected InvalidSlotTransition, got {:?}", other),
        }
    }

    #[test]
    fn test_claim_image_reports_busy_owner() {
        let mut slots = FrameSlots::new(2);
        run_frame(&mut slots, 1); // slot 0 submitted with image 1

        slots.begin_acquire(1).unwrap();
        assert_eq!(slots.claim_image(1, 1), Some(0));
    }

    #[test]
    fn test_claim_image_ignores_retired_owner() {
        let mut slots = FrameSlots::new(2);
        run_frame(&mut slots, 1);
        slots.retire(0).unwrap();

        assert_eq!(slots.claim_image(1, 1), None);
    }

    #[test]
    fn test_claim_image_out_of_range() {
        let mut slots = FrameSlots::new(2);
        assert_eq!(slots.claim_image(5, 0), None);
    }

    #[test]
    fn test_reset_images() {
        let mut slots = FrameSlots::new(2);
        run_frame(&mut slots, 0);
        slots.reset_images(3);
        assert_eq!(slots.claim_image(0, 1), None);
        assert_eq!(slots.claim_image(2, 1), None);
    }

    #[test]
    fn test_frame_synchronizer_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FrameSynchronizer>();
    }
}
