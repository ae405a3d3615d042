//! Frame-scoped bump allocation.
//!
//! The [`FrameArena`] hands out 16-byte aligned blocks of memory that live until the arena is
//! [reset](FrameArena::reset) at the start of the next frame. Blocks are written through the arena
//! while commands are being recorded, then [shared](FrameArena::share) with evaluation jobs as
//! read-only [`FrameView`]s. Sharing seals the owning bucket: nothing else is allocated in it this
//! frame, and the arena refuses to reset while any view is still alive.
//!
//! Buckets are kept across frames, so a steady per-frame workload stops reserving memory after
//! the first frame.

use std::{fmt, ops::Range, sync::Arc};

use bevy::log::debug;
use bytemuck::{Pod, Zeroable};

use crate::{
    config::ArenaConfig,
    errors::{ArenaError, ArenaResult},
};

/// Alignment of every block handed out by the arena.
pub const ARENA_ALIGNMENT: usize = 16;

#[repr(C, align(16))]
#[derive(Clone, Copy, Pod, Zeroable)]
struct Chunk([u8; ARENA_ALIGNMENT]);

struct Bucket {
    storage: Arc<Vec<Chunk>>,
    used: usize,
    sealed: bool,
}

impl Bucket {
    fn try_new(size: usize) -> ArenaResult<Self> {
        let chunks = size.div_ceil(ARENA_ALIGNMENT);
        let mut storage = Vec::new();
        storage
            .try_reserve_exact(chunks)
            .map_err(|_| ArenaError::OutOfMemory { requested: size })?;
        storage.resize(chunks, Chunk::zeroed());

        Ok(Self {
            storage: Arc::new(storage),
            used: 0,
            sealed: false,
        })
    }

    fn capacity(&self) -> usize {
        self.storage.len() * ARENA_ALIGNMENT
    }

    fn fits(&self, padded: usize) -> bool {
        !self.sealed && self.capacity() - self.used >= padded
    }

    fn in_flight(&self) -> bool {
        Arc::strong_count(&self.storage) > 1
    }
}

/// Handle to a block allocated during the current frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameBlock {
    bucket: usize,
    offset: usize,
    len: usize,
    epoch: u64,
}

impl FrameBlock {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.len
    }
}

/// Read-only view of an arena block that can be moved to another thread.
#[derive(Clone)]
pub struct FrameView {
    storage: Arc<Vec<Chunk>>,
    offset: usize,
    len: usize,
    epoch: u64,
}

impl FrameView {
    pub fn bytes(&self) -> &[u8] {
        let bytes: &[u8] = bytemuck::cast_slice(self.storage.as_slice());
        &bytes[self.offset..self.offset + self.len]
    }

    /// Reinterprets the block as a slice of `T`. Returns `None` if the length is not a multiple of
    /// `T`'s size.
    pub fn cast<T: Pod>(&self) -> Option<&[T]> {
        bytemuck::try_cast_slice(self.bytes()).ok()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

impl fmt::Debug for FrameView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameView")
            .field("offset", &self.offset)
            .field("len", &self.len)
            .field("epoch", &self.epoch)
            .finish()
    }
}

pub struct FrameArena {
    buckets: Vec<Bucket>,
    current: usize,
    bucket_size: usize,
    epoch: u64,
}

impl Default for FrameArena {
    fn default() -> Self {
        Self::new(&ArenaConfig::default())
    }
}

impl FrameArena {
    pub fn new(config: &ArenaConfig) -> Self {
        Self {
            buckets: Vec::new(),
            current: 0,
            bucket_size: config.bucket_size.max(ARENA_ALIGNMENT),
            epoch: 0,
        }
    }

    /// Allocates `len` bytes for the current frame. The block starts zeroed only the first time
    /// its memory is handed out; reused memory keeps whatever the previous frame wrote.
    pub fn allocate(&mut self, len: usize) -> ArenaResult<FrameBlock> {
        let padded = len.div_ceil(ARENA_ALIGNMENT).max(1) * ARENA_ALIGNMENT;

        if let Some(block) = self.bump(len, padded) {
            return Ok(block);
        }

        self.advance(padded)?;
        self.bump(len, padded)
            .ok_or(ArenaError::OutOfMemory { requested: len })
    }

    /// Allocates a block holding a copy of `values`.
    pub fn allocate_slice<T: Pod>(&mut self, values: &[T]) -> ArenaResult<FrameBlock> {
        let bytes: &[u8] = bytemuck::cast_slice(values);
        let block = self.allocate(bytes.len())?;
        self.bytes_mut(&block)?.copy_from_slice(bytes);
        Ok(block)
    }

    fn bump(&mut self, len: usize, padded: usize) -> Option<FrameBlock> {
        let bucket = self.buckets.get_mut(self.current)?;
        if !bucket.fits(padded) {
            return None;
        }

        let offset = bucket.used;
        bucket.used += padded;

        Some(FrameBlock {
            bucket: self.current,
            offset,
            len,
            epoch: self.epoch,
        })
    }

    /// Moves the bump cursor to the next bucket that can hold `padded` bytes, reserving a new one
    /// when every remaining bucket is too small or sealed.
    fn advance(&mut self, padded: usize) -> ArenaResult<()> {
        let start = if self.buckets.is_empty() {
            0
        } else {
            self.current + 1
        };

        if let Some(index) = (start..self.buckets.len()).find(|i| self.buckets[*i].fits(padded)) {
            self.current = index;
            return Ok(());
        }

        let bucket = Bucket::try_new(self.bucket_size.max(padded))?;
        self.buckets.push(bucket);
        self.current = self.buckets.len() - 1;
        debug!(
            "Frame arena grew to {} buckets ({} bytes)",
            self.buckets.len(),
            self.capacity()
        );

        Ok(())
    }

    fn check(&self, block: &FrameBlock) -> ArenaResult<()> {
        if block.epoch != self.epoch {
            return Err(ArenaError::StaleHandle {
                epoch: block.epoch,
                current: self.epoch,
            });
        }
        Ok(())
    }

    pub fn bytes(&self, block: &FrameBlock) -> ArenaResult<&[u8]> {
        self.check(block)?;
        let bucket = self
            .buckets
            .get(block.bucket)
            .ok_or(ArenaError::ForeignHandle)?;
        let bytes: &[u8] = bytemuck::cast_slice(bucket.storage.as_slice());
        bytes.get(block.range()).ok_or(ArenaError::ForeignHandle)
    }

    pub fn bytes_mut(&mut self, block: &FrameBlock) -> ArenaResult<&mut [u8]> {
        self.check(block)?;
        let bucket = self
            .buckets
            .get_mut(block.bucket)
            .ok_or(ArenaError::ForeignHandle)?;
        let storage = Arc::get_mut(&mut bucket.storage).ok_or(ArenaError::Sealed {
            bucket: block.bucket,
        })?;
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(storage.as_mut_slice());
        bytes.get_mut(block.range()).ok_or(ArenaError::ForeignHandle)
    }

    /// Hands out a read-only view of `block`, sealing its bucket for the rest of the frame.
    pub fn share(&mut self, block: &FrameBlock) -> ArenaResult<FrameView> {
        self.check(block)?;
        let bucket = self
            .buckets
            .get_mut(block.bucket)
            .ok_or(ArenaError::ForeignHandle)?;
        if block.offset + block.len > bucket.capacity() {
            return Err(ArenaError::ForeignHandle);
        }
        bucket.sealed = true;

        Ok(FrameView {
            storage: Arc::clone(&bucket.storage),
            offset: block.offset,
            len: block.len,
            epoch: block.epoch,
        })
    }

    /// Rewinds every bucket for a new frame. Handles from earlier frames become stale.
    ///
    /// Fails without touching anything while a [`FrameView`] is still alive, since jobs of the
    /// previous frame may still be reading from it.
    pub fn reset(&mut self) -> ArenaResult<()> {
        if let Some(bucket) = self.buckets.iter().position(Bucket::in_flight) {
            return Err(ArenaError::BucketInFlight { bucket });
        }

        for bucket in self.buckets.iter_mut() {
            bucket.used = 0;
            bucket.sealed = false;
        }
        self.current = 0;
        self.epoch += 1;

        Ok(())
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Total bytes reserved across all buckets.
    pub fn capacity(&self) -> usize {
        self.buckets.iter().map(Bucket::capacity).sum()
    }

    /// Bytes handed out during the current frame, including alignment padding.
    pub fn used(&self) -> usize {
        self.buckets.iter().map(|bucket| bucket.used).sum()
    }
}

impl fmt::Debug for FrameArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameArena")
            .field("buckets", &self.buckets.len())
            .field("current", &self.current)
            .field("used", &self.used())
            .field("capacity", &self.capacity())
            .field("epoch", &self.epoch)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_arena() -> FrameArena {
        FrameArena::new(&ArenaConfig { bucket_size: 256 })
    }

    fn run_frame(arena: &mut FrameArena) {
        for len in [3, 48, 100, 17, 200, 64, 5] {
            arena.allocate(len).unwrap();
        }
    }

    #[test]
    fn blocks_are_aligned() {
        let mut arena = small_arena();
        for len in [1, 7, 16, 33] {
            let block = arena.allocate(len).unwrap();
            let ptr = arena.bytes(&block).unwrap().as_ptr();
            assert_eq!(ptr as usize % ARENA_ALIGNMENT, 0);
            assert_eq!(arena.bytes(&block).unwrap().len(), len);
        }
    }

    #[test]
    fn reset_reuses_buckets() {
        let mut arena = small_arena();
        run_frame(&mut arena);
        let buckets = arena.bucket_count();
        let capacity = arena.capacity();
        assert!(buckets > 1);

        for _ in 0..4 {
            arena.reset().unwrap();
            run_frame(&mut arena);
            assert_eq!(arena.bucket_count(), buckets);
            assert_eq!(arena.capacity(), capacity);
        }
    }

    #[test]
    fn oversized_request_gets_its_own_bucket() {
        let mut arena = small_arena();
        let block = arena.allocate(1000).unwrap();
        assert_eq!(arena.bytes(&block).unwrap().len(), 1000);
        assert!(arena.capacity() >= 1000);
    }

    #[test]
    fn stale_handles_are_rejected() {
        let mut arena = small_arena();
        let block = arena.allocate(8).unwrap();
        arena.reset().unwrap();
        assert_eq!(
            arena.bytes(&block),
            Err(ArenaError::StaleHandle {
                epoch: 0,
                current: 1
            })
        );
    }

    #[test]
    fn shared_views_block_reset_and_writes() {
        let mut arena = small_arena();
        let block = arena.allocate_slice(&[1u16, 2, 3]).unwrap();
        let view = arena.share(&block).unwrap();
        assert_eq!(view.cast::<u16>(), Some(&[1u16, 2, 3][..]));

        assert_eq!(
            arena.bytes_mut(&block),
            Err(ArenaError::Sealed { bucket: 0 })
        );
        assert_eq!(arena.reset(), Err(ArenaError::BucketInFlight { bucket: 0 }));

        let next = arena.allocate(8).unwrap();
        assert_ne!(next.bucket, block.bucket);

        drop(view);
        arena.reset().unwrap();
        let reused = arena.allocate(8).unwrap();
        assert!(arena.bytes_mut(&reused).is_ok());
    }
}
