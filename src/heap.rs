use std::ptr::{self, NonNull};

use tracing::{trace, warn};

use crate::{
  block::Provenance,
  error::{HeapError, Result},
  list::{BlockId, BlockList, Search},
  region::{RegionGrower, Sbrk},
};

/// Public view of one block, in address order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
  pub payload: NonNull<u8>,
  pub size: usize,
  pub provenance: Provenance,
}

/// Snapshot of the heap's bookkeeping.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
  /// Blocks ever created; never decreases.
  pub blocks: usize,
  pub in_use: usize,
  pub free: usize,
  /// Recorded sizes of the blocks in use.
  pub in_use_bytes: usize,
  /// Recorded sizes of the free blocks.
  pub free_bytes: usize,
  /// Bytes taken from the grower, headers and padding included.
  pub region_bytes: usize,
}

/// First-fit heap over a region obtained from `G`.
///
/// Freed blocks stay in the region and are reused by later requests that fit;
/// they are neither split, merged with their neighbours, nor returned to the
/// grower.
///
/// A heap is single-threaded: it is neither `Send` nor `Sync`.
#[derive(Debug)]
pub struct Heap<G: RegionGrower = Sbrk> {
  grower: G,
  blocks: BlockList,
}

impl Heap<Sbrk> {
  /// Creates a heap growing the program break.
  pub fn new() -> Self {
    Self::with_grower(Sbrk::new())
  }
}

impl Default for Heap<Sbrk> {
  fn default() -> Self {
    Self::new()
  }
}

impl<G: RegionGrower> Heap<G> {
  pub fn with_grower(grower: G) -> Self {
    Self {
      grower,
      blocks: BlockList::new(),
    }
  }

  pub fn grower(&self) -> &G {
    &self.grower
  }

  /// Allocates `size` bytes, reusing the first free block large enough.
  ///
  /// The returned block may be larger than requested when it is reused.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>> {
    if size == 0 {
      return Err(HeapError::InvalidSize);
    }

    let id = match self.blocks.search(size) {
      Search::Hit(id) => {
        self
          .blocks
          .get_mut(id)
          .claim()
          .map_err(HeapError::from)
          .inspect_err(|error| warn!(%error, "allocation rejected"))?;
        id
      }
      Search::Miss { last } => self.blocks.append(&mut self.grower, last, size)?,
    };

    Ok(self.blocks[id].payload())
  }

  /// Marks the block at `ptr` as free. Null is ignored.
  ///
  /// Releasing a pointer twice, or one this heap never returned, is reported
  /// as [`HeapError::InvariantViolation`] and changes nothing.
  pub fn release(
    &mut self,
    ptr: *mut u8,
  ) -> Result<()> {
    let Some(payload) = NonNull::new(ptr) else {
      return Ok(());
    };

    let id = self.locate(payload)?;

    self
      .blocks
      .get_mut(id)
      .release()
      .map_err(HeapError::from)
      .inspect_err(|error| warn!(%error, "release rejected"))?;

    trace!(block = id.index(), payload = ?payload, "released");
    Ok(())
  }

  /// Makes room for `size` bytes at `ptr`, moving the data if needed.
  ///
  /// Null behaves as [`Heap::allocate`]. Blocks already large enough are kept
  /// as they are. Otherwise the data moves to a new block and the old one is
  /// released; if that allocation fails, `ptr` is left valid and untouched.
  pub fn resize(
    &mut self,
    ptr: *mut u8,
    size: usize,
  ) -> Result<NonNull<u8>> {
    let Some(payload) = NonNull::new(ptr) else {
      return self.allocate(size);
    };

    let id = self.locate(payload)?;
    let block = &self.blocks[id];

    block
      .ensure_in_use()
      .map_err(HeapError::from)
      .inspect_err(|error| warn!(%error, "resize rejected"))?;

    let current = block.size();

    if current >= size {
      return Ok(payload);
    }

    let moved = self.allocate(size)?;

    //  Safety:
    //  -   `payload` holds `current` bytes, `moved` at least `size > current`.
    //  -   `moved` is a different block, `payload` still being in use.
    unsafe { ptr::copy_nonoverlapping(payload.as_ptr(), moved.as_ptr(), current.min(size)) };

    self.release(payload.as_ptr())?;

    Ok(moved)
  }

  /// Allocates `count * element_size` bytes, all zero.
  pub fn zeroed_allocate(
    &mut self,
    count: usize,
    element_size: usize,
  ) -> Result<NonNull<u8>> {
    let size = count
      .checked_mul(element_size)
      .ok_or(HeapError::Overflow { count, element_size })?;

    let payload = self.allocate(size)?;

    //  Safety:
    //  -   `payload` holds at least `size` bytes.
    unsafe { payload.as_ptr().write_bytes(0, size) };

    Ok(payload)
  }

  /// Recorded size of the block at `ptr`.
  pub fn usable_size(
    &self,
    ptr: NonNull<u8>,
  ) -> Result<usize> {
    let id = self.locate(ptr)?;

    Ok(self.blocks[id].size())
  }

  pub fn block_count(&self) -> usize {
    self.blocks.len()
  }

  pub fn blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
    self.blocks.iter().map(|block| BlockInfo {
      payload: block.payload(),
      size: block.size(),
      provenance: block.provenance(),
    })
  }

  pub fn stats(&self) -> HeapStats {
    self.blocks.iter().fold(HeapStats::default(), |mut stats, block| {
      stats.blocks += 1;
      stats.region_bytes += block.span();

      if block.is_free() {
        stats.free += 1;
        stats.free_bytes += block.size();
      } else {
        stats.in_use += 1;
        stats.in_use_bytes += block.size();
      }

      stats
    })
  }

  //  Recovers the block owning `payload`, checking its in-region header.
  fn locate(
    &self,
    payload: NonNull<u8>,
  ) -> Result<BlockId> {
    let id = self
      .blocks
      .find(payload)
      .inspect_err(|error| warn!(%error, "unknown pointer"))?;

    //  Safety:
    //  -   The header belongs to a span reserved from `self.grower`, which is still alive.
    let checked = unsafe { self.blocks[id].check_stamp(id.index()) };

    checked
      .map_err(HeapError::from)
      .inspect_err(|error| warn!(%error, "corrupted header"))?;

    Ok(id)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{block::HEADER_SIZE, error::Violation, region::Arena};

  fn arena_heap() -> Heap<Arena> {
    Heap::with_grower(Arena::with_capacity(4096))
  }

  #[test]
  fn test_zero_size_and_null() {
    let mut heap = arena_heap();

    assert_eq!(heap.allocate(0), Err(HeapError::InvalidSize));
    assert_eq!(heap.release(ptr::null_mut()), Ok(()));
    assert_eq!(heap.block_count(), 0);
  }

  #[test]
  fn test_first_allocation_installs_head() {
    let mut heap = arena_heap();
    let base = heap.grower().base();

    let p = heap.allocate(5).unwrap();

    assert_eq!(p.as_ptr(), unsafe { base.as_ptr().add(HEADER_SIZE) });
    assert_eq!(heap.grower().used(), crate::align!(5 + HEADER_SIZE));
  }

  #[test]
  fn test_reuse_then_grow_then_double_release() {
    let mut heap = arena_heap();

    let p1 = heap.allocate(16).unwrap();
    heap.release(p1.as_ptr()).unwrap();

    let p2 = heap.allocate(8).unwrap();
    assert_eq!(p2, p1);
    assert_eq!(heap.usable_size(p2), Ok(16));

    heap.release(p2.as_ptr()).unwrap();

    let p3 = heap.allocate(32).unwrap();
    assert_ne!(p3, p1);
    assert_eq!(heap.block_count(), 2);

    let result = heap.release(p1.as_ptr());
    assert_eq!(
      result,
      Err(HeapError::InvariantViolation(Violation::DoubleRelease { address: p1.as_ptr() as usize }))
    );

    //  The rejected release left the block free, it is reused exactly once.
    assert_eq!(heap.allocate(4).unwrap(), p1);
    assert_ne!(heap.allocate(4).unwrap(), p1);
  }

  #[test]
  fn test_writes_stay_in_payload() {
    let mut heap = arena_heap();

    let a = heap.allocate(13).unwrap();
    let b = heap.allocate(7).unwrap();

    unsafe { a.as_ptr().write_bytes(0xFF, 13) };

    assert_eq!(heap.usable_size(b), Ok(7));
    assert!(heap.release(b.as_ptr()).is_ok());
    assert!(heap.release(a.as_ptr()).is_ok());
  }

  #[test]
  fn test_overrun_is_detected() {
    let mut heap = arena_heap();

    let a = heap.allocate(8).unwrap();
    let b = heap.allocate(8).unwrap();

    unsafe { a.as_ptr().write_bytes(0xFF, 8 + HEADER_SIZE) };

    assert!(matches!(
      heap.release(b.as_ptr()),
      Err(HeapError::InvariantViolation(Violation::CorruptedHeader { .. }))
    ));
    assert_eq!(heap.stats().in_use, 2);
  }

  #[test]
  fn test_unknown_pointer() {
    let mut heap = arena_heap();
    let mut local = 0u8;

    let a = heap.allocate(32).unwrap();

    assert!(matches!(
      heap.release(&mut local),
      Err(HeapError::InvariantViolation(Violation::UnknownPointer { .. }))
    ));
    assert!(matches!(
      heap.release(unsafe { a.as_ptr().add(1) }),
      Err(HeapError::InvariantViolation(Violation::UnknownPointer { .. }))
    ));
    assert!(matches!(
      heap.resize(&mut local, 64),
      Err(HeapError::InvariantViolation(Violation::UnknownPointer { .. }))
    ));
  }

  #[test]
  fn test_resize_in_place() {
    let mut heap = arena_heap();

    let p = heap.allocate(24).unwrap();

    assert_eq!(heap.resize(p.as_ptr(), 24), Ok(p));
    assert_eq!(heap.resize(p.as_ptr(), 1), Ok(p));
    assert_eq!(heap.resize(p.as_ptr(), 0), Ok(p));
    assert_eq!(heap.block_count(), 1);
    assert_eq!(heap.usable_size(p), Ok(24));
  }

  #[test]
  fn test_resize_moves_and_frees() {
    let mut heap = arena_heap();

    let p = heap.allocate(4).unwrap();
    unsafe { p.as_ptr().copy_from_nonoverlapping([1u8, 2, 3, 4].as_ptr(), 4) };

    let q = heap.resize(p.as_ptr(), 64).unwrap();

    assert_ne!(p, q);
    assert_eq!(unsafe { std::slice::from_raw_parts(q.as_ptr(), 4) }, &[1, 2, 3, 4]);

    let old = heap.blocks().find(|block| block.payload == p).unwrap();
    assert_eq!(old.provenance, Provenance::Released);
  }

  #[test]
  fn test_resize_null_and_released() {
    let mut heap = arena_heap();

    assert_eq!(heap.resize(ptr::null_mut(), 0), Err(HeapError::InvalidSize));

    let p = heap.resize(ptr::null_mut(), 8).unwrap();
    heap.release(p.as_ptr()).unwrap();

    assert!(matches!(
      heap.resize(p.as_ptr(), 64),
      Err(HeapError::InvariantViolation(Violation::UseAfterRelease { .. }))
    ));
  }

  #[test]
  fn test_resize_failure_keeps_original() {
    let mut heap = Heap::with_grower(Arena::with_capacity(64));

    let p = heap.allocate(8).unwrap();
    unsafe { p.as_ptr().write_bytes(0x5A, 8) };

    assert!(matches!(heap.resize(p.as_ptr(), 1024), Err(HeapError::OutOfMemory { .. })));
    assert_eq!(heap.blocks().next().unwrap().provenance, Provenance::Fresh);
    assert_eq!(unsafe { std::slice::from_raw_parts(p.as_ptr(), 8) }, &[0x5A; 8]);
    assert!(heap.release(p.as_ptr()).is_ok());
  }

  #[test]
  fn test_zeroed_allocate() {
    let mut heap = arena_heap();

    let dirty = heap.allocate(32).unwrap();
    unsafe { dirty.as_ptr().write_bytes(0xEE, 32) };
    heap.release(dirty.as_ptr()).unwrap();

    let zeroed = heap.zeroed_allocate(4, 6).unwrap();

    assert_eq!(zeroed, dirty);
    assert!(unsafe { std::slice::from_raw_parts(zeroed.as_ptr(), 24) }.iter().all(|&b| b == 0));
  }

  #[test]
  fn test_zeroed_allocate_overflow() {
    let mut heap = arena_heap();

    assert_eq!(
      heap.zeroed_allocate(usize::MAX, 2),
      Err(HeapError::Overflow { count: usize::MAX, element_size: 2 })
    );
    assert_eq!(heap.zeroed_allocate(0, 8), Err(HeapError::InvalidSize));
    assert_eq!(heap.block_count(), 0);
  }

  #[test]
  fn test_out_of_memory() {
    let mut heap = Heap::with_grower(Arena::with_capacity(32));

    assert!(heap.allocate(8).is_ok());
    assert!(matches!(heap.allocate(64), Err(HeapError::OutOfMemory { .. })));
    assert_eq!(heap.block_count(), 1);
  }

  #[test]
  #[tracing_test::traced_test]
  fn test_violations_are_logged() {
    let mut heap = arena_heap();

    let p = heap.allocate(8).unwrap();
    heap.release(p.as_ptr()).unwrap();

    assert!(heap.release(p.as_ptr()).is_err());
    assert!(logs_contain("released twice"));
  }

  #[test]
  fn test_stats() {
    let mut heap = arena_heap();

    let a = heap.allocate(10).unwrap();
    heap.allocate(20).unwrap();
    heap.release(a.as_ptr()).unwrap();

    assert_eq!(
      heap.stats(),
      HeapStats {
        blocks: 2,
        in_use: 1,
        free: 1,
        in_use_bytes: 20,
        free_bytes: 10,
        region_bytes: heap.grower().used(),
      }
    );
  }
}
