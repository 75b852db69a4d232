//! # Reference Soak Workload
//!
//! Replays the allocation patterns a game puts through each role and
//! verifies that data written into every allocation survives for as long
//! as the role promises.
//!
//! ## Safety Note
//!
//! Tags are written into memory handed out by the strategies. Every write
//! stays within the requested `size` of a live allocation, and reads only
//! happen while the owning role still guarantees the allocation.

#![allow(unsafe_code)]

use std::ptr::NonNull;

use rand::seq::SliceRandom;
use rand::Rng;
use strata_core::{LifecycleEvent, RING_FRAME_WINDOW};

use crate::error::{SoakError, SoakResult};
use crate::roles::{AllocatorRole, AllocatorRoleSet};
use crate::router::SignalRouter;

const KIB: usize = 1024;
const MIB: usize = 1024 * KIB;

/// Small-object request sizes.
pub const SMALL_SIZES: [usize; 6] = [4, 8, 12, 16, 32, 64];

/// Frame-data alignments.
pub const FRAME_ALIGNMENTS: [usize; 4] = [4, 8, 16, 32];

/// Live small objects during churn.
pub const SMALL_OBJECT_COUNT: usize = 4096;

/// Frames of triple-buffered traffic.
pub const FRAME_COUNT: usize = 32;

/// Allocations per frame and per mapping.
pub const ALLOCATIONS_PER_FRAME: usize = 1024;

/// Bytes needed for a start and end tag.
const TAG_SIZE: usize = std::mem::size_of::<u32>();

/// One allocation with the tag written into it.
#[derive(Clone, Copy, Debug)]
struct Tagged {
    ptr: NonNull<u8>,
    size: usize,
    tag: u32,
}

impl Tagged {
    /// Offset of the end tag, or `None` when it would overlap the start tag.
    fn tail_offset(size: usize) -> Option<usize> {
        (size >= 2 * TAG_SIZE).then(|| size - TAG_SIZE)
    }

    /// Writes `tag` at the start of the allocation, and at its end when
    /// there is room for a second tag.
    fn stamp(ptr: NonNull<u8>, size: usize, tag: u32) -> Self {
        debug_assert!(size >= TAG_SIZE);
        let tagged = Self { ptr, size, tag };
        // SAFETY: the allocation is live and at least `size` bytes long; both
        // unaligned writes end within it and never overlap.
        unsafe {
            ptr.as_ptr().cast::<u32>().write_unaligned(tag);
            if let Some(offset) = Self::tail_offset(size) {
                ptr.as_ptr().add(offset).cast::<u32>().write_unaligned(tag);
            }
        }
        tagged
    }

    /// Checks both tags, reporting the first one that changed.
    fn verify(&self, phase: &'static str, index: usize) -> SoakResult<()> {
        // SAFETY: as in `stamp`; the caller only verifies live allocations.
        let (head, tail) = unsafe {
            let head = self.ptr.as_ptr().cast::<u32>().read_unaligned();
            let tail = Self::tail_offset(self.size).map_or(head, |offset| {
                self.ptr.as_ptr().add(offset).cast::<u32>().read_unaligned()
            });
            (head, tail)
        };
        for found in [head, tail] {
            if found != self.tag {
                return Err(SoakError::TagMismatch {
                    phase,
                    index,
                    expected: self.tag,
                    found,
                });
            }
        }
        Ok(())
    }
}

/// Counters for a completed run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SoakSummary {
    /// Successful allocations.
    pub allocations: u64,
    /// Successful individual releases.
    pub releases: u64,
    /// Lifecycle events dispatched.
    pub events: u64,
}

/// Drives one workload against a role set.
pub struct SoakRunner<'a, 'r, R> {
    roles: &'a mut AllocatorRoleSet<'r>,
    router: &'a SignalRouter,
    rng: R,
    summary: SoakSummary,
}

impl<'a, 'r, R: Rng> SoakRunner<'a, 'r, R> {
    /// Creates a runner; `rng` drives sizes and release orders.
    pub fn new(roles: &'a mut AllocatorRoleSet<'r>, router: &'a SignalRouter, rng: R) -> Self {
        Self {
            roles,
            router,
            rng,
            summary: SoakSummary::default(),
        }
    }

    /// Counters so far.
    #[must_use]
    pub const fn summary(&self) -> SoakSummary {
        self.summary
    }

    /// Runs every phase in order, bracketed by `GameInit` and `GameShutdown`.
    ///
    /// # Errors
    ///
    /// The first failure of any phase.
    pub fn run_all(&mut self) -> SoakResult<SoakSummary> {
        self.signal("game", LifecycleEvent::GameInit)?;
        self.general_heap_batches()?;
        self.small_object_churn()?;
        self.scratch_systems()?;
        self.frame_traffic()?;
        self.level_cycles()?;
        self.signal("game", LifecycleEvent::GameShutdown)?;
        Ok(self.summary)
    }

    /// 1024 blocks of 1 KiB, then mixed-alignment batches released in
    /// random order.
    ///
    /// # Errors
    ///
    /// Allocation, alignment or tag failures.
    pub fn general_heap_batches(&mut self) -> SoakResult<()> {
        const PHASE: &str = "general_heap";
        let role = AllocatorRole::GeneralHeap;

        let mut live = Vec::with_capacity(1024);
        for index in 0..1024 {
            let ptr = self.allocate(PHASE, role, KIB, 16)?;
            live.push(Tagged::stamp(ptr, KIB, tag(1, index)));
        }
        self.verify_all(PHASE, &live)?;
        self.release_all(PHASE, role, &mut live)?;

        for alignment in [4, 8, 16, 32, 64, 128, 256, 4096] {
            for index in 0..64 {
                let size = self.rng.gen_range(TAG_SIZE..=4 * KIB);
                let ptr = self.allocate(PHASE, role, size, alignment)?;
                live.push(Tagged::stamp(ptr, size, tag(2, index + alignment)));
            }
        }
        self.verify_all(PHASE, &live)?;
        live.shuffle(&mut self.rng);
        self.release_all(PHASE, role, &mut live)
    }

    /// 4096 small objects, then 16 rounds that free a random half and
    /// refill it.
    ///
    /// # Errors
    ///
    /// Allocation or tag failures.
    pub fn small_object_churn(&mut self) -> SoakResult<()> {
        const PHASE: &str = "small_object";
        let role = AllocatorRole::SmallObject;

        let mut live = Vec::with_capacity(SMALL_OBJECT_COUNT);
        let mut serial = 0;
        while live.len() < SMALL_OBJECT_COUNT {
            live.push(self.small_object(PHASE, serial)?);
            serial += 1;
        }

        for _ in 0..16 {
            live.shuffle(&mut self.rng);
            let keep = live.len() / 2;
            let mut released = live.split_off(keep);
            self.release_all(PHASE, role, &mut released)?;
            self.verify_all(PHASE, &live)?;

            while live.len() < SMALL_OBJECT_COUNT {
                live.push(self.small_object(PHASE, serial)?);
                serial += 1;
            }
        }
        self.verify_all(PHASE, &live)?;
        self.release_all(PHASE, role, &mut live)
    }

    /// Three systems borrow scratch space in turn, each preceded by a flush.
    ///
    /// # Errors
    ///
    /// Allocation, dispatch or tag failures.
    pub fn scratch_systems(&mut self) -> SoakResult<()> {
        const PHASE: &str = "scratch";
        let role = AllocatorRole::ScratchSpace;

        for (system, (count, size)) in [(4, 4 * MIB), (1, 32 * MIB), (2, 16 * MIB)].into_iter().enumerate() {
            self.signal(PHASE, LifecycleEvent::FlushScratch)?;
            let mut live = Vec::with_capacity(count);
            for index in 0..count {
                let ptr = self.allocate(PHASE, role, size, 16)?;
                live.push(Tagged::stamp(ptr, size, tag(3 + system, index)));
            }
            self.verify_all(PHASE, &live)?;
        }
        self.signal(PHASE, LifecycleEvent::FlushScratch)
    }

    /// Per-frame CPU and GPU traffic. Everything written since the last
    /// ring wraparound is verified at every frame boundary.
    ///
    /// # Errors
    ///
    /// Allocation, dispatch or tag failures.
    pub fn frame_traffic(&mut self) -> SoakResult<()> {
        const PHASE: &str = "frames";
        let roles = [AllocatorRole::SingleFrameCpu, AllocatorRole::SingleFrameGpu];

        let mut window: Vec<Tagged> = Vec::new();
        let mut boundaries = 0;
        for frame in 0..FRAME_COUNT {
            for (lane, &role) in roles.iter().enumerate() {
                for index in 0..ALLOCATIONS_PER_FRAME {
                    let size = *SMALL_SIZES.choose(&mut self.rng).unwrap_or(&TAG_SIZE);
                    let alignment = *FRAME_ALIGNMENTS.choose(&mut self.rng).unwrap_or(&TAG_SIZE);
                    let ptr = self.allocate(PHASE, role, size, alignment)?;
                    let serial = (frame * roles.len() + lane) * ALLOCATIONS_PER_FRAME + index;
                    window.push(Tagged::stamp(ptr, size, tag(16, serial)));
                }
            }

            self.verify_all(PHASE, &window)?;
            self.signal(PHASE, LifecycleEvent::NextFrame)?;
            boundaries += 1;
            if boundaries > RING_FRAME_WINDOW {
                boundaries = 0;
                window.clear();
            }
        }
        Ok(())
    }

    /// Menu data that persists, then two levels loaded and unloaded on top
    /// of it.
    ///
    /// # Errors
    ///
    /// Allocation, dispatch or tag failures.
    pub fn level_cycles(&mut self) -> SoakResult<()> {
        const PHASE: &str = "levels";

        let mut menu = Vec::new();
        for index in 0..5 {
            let ptr = self.allocate(PHASE, AllocatorRole::LevelCpu, 2 * KIB, 16)?;
            menu.push(Tagged::stamp(ptr, 2 * KIB, tag(32, index)));
        }
        for index in 0..4 {
            let ptr = self.allocate(PHASE, AllocatorRole::LevelGpu, 2 * MIB, 16)?;
            menu.push(Tagged::stamp(ptr, 2 * MIB, tag(33, index)));
        }

        for (level, small_chunks) in [21, 23].into_iter().enumerate() {
            self.signal(PHASE, LifecycleEvent::LevelBeginLoad)?;
            let mut data = Vec::new();
            let chunks = std::iter::repeat(8 * MIB).take(15).chain(std::iter::repeat(MIB).take(small_chunks));
            for (index, size) in chunks.enumerate() {
                let ptr = self.allocate(PHASE, AllocatorRole::LevelGpu, size, 16)?;
                data.push(Tagged::stamp(ptr, size, tag(34 + level, index)));
            }
            self.signal(PHASE, LifecycleEvent::LevelLoadComplete)?;
            self.verify_all(PHASE, &data)?;
            self.verify_all(PHASE, &menu)?;

            self.signal(PHASE, LifecycleEvent::LevelUnload)?;
            self.verify_all(PHASE, &menu)?;
        }
        Ok(())
    }

    fn small_object(&mut self, phase: &'static str, serial: usize) -> SoakResult<Tagged> {
        let size = *SMALL_SIZES.choose(&mut self.rng).unwrap_or(&TAG_SIZE);
        let ptr = self.allocate(phase, AllocatorRole::SmallObject, size, 16)?;
        Ok(Tagged::stamp(ptr, size, tag(8, serial)))
    }

    fn allocate(
        &mut self,
        phase: &'static str,
        role: AllocatorRole,
        size: usize,
        alignment: usize,
    ) -> SoakResult<NonNull<u8>> {
        let ptr = self
            .roles
            .allocate(role, size, alignment)
            .map_err(|source| SoakError::Alloc { phase, role, source })?;
        let addr = ptr.as_ptr() as usize;
        if addr % alignment != 0 {
            return Err(SoakError::Misaligned {
                phase,
                addr,
                alignment,
            });
        }
        self.summary.allocations += 1;
        Ok(ptr)
    }

    fn release_all(&mut self, phase: &'static str, role: AllocatorRole, live: &mut Vec<Tagged>) -> SoakResult<()> {
        for tagged in live.drain(..) {
            self.roles
                .get_mut(role)
                .release(tagged.ptr)
                .map_err(|source| SoakError::Alloc { phase, role, source })?;
            self.summary.releases += 1;
        }
        Ok(())
    }

    fn verify_all(&self, phase: &'static str, live: &[Tagged]) -> SoakResult<()> {
        live.iter()
            .enumerate()
            .try_for_each(|(index, tagged)| tagged.verify(phase, index))
    }

    fn signal(&mut self, phase: &'static str, event: LifecycleEvent) -> SoakResult<()> {
        self.router
            .dispatch(event, self.roles)
            .map_err(|source| SoakError::Dispatch { phase, source })?;
        self.summary.events += 1;
        Ok(())
    }
}

/// Tag for allocation `index` of workload stream `stream`.
fn tag(stream: usize, index: usize) -> u32 {
    let mixed = (stream as u32).wrapping_mul(0x9E37_79B9) ^ (index as u32).wrapping_mul(0x85EB_CA6B);
    mixed | 1
}
