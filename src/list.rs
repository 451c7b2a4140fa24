//! Address-ordered list of block metadata.
//!
//! ```text
//!   blocks:   [ 0 ] ──next──▶ [ 1 ] ──next──▶ [ 2 ] ──next──▶ (tail)
//!               │               │               │
//!   region:   ┌─▼──────┬─────┬──▼─────┬───────┬─▼──────┬────┐
//!             │ header │ A0  │ header │  A1   │ header │ A2 │
//!             └────────┴─────┴────────┴───────┴────────┴────┘
//!             low address                         high address
//! ```
//!
//! Entries are only ever appended at the tail, by growing the region, so the
//! table index order is the address order and `next(id)` is `id + 1`.

use std::{ops::Index, ptr::NonNull};

use tracing::{debug, trace, warn};

use crate::{
  block::{Block, HEADER_SIZE},
  error::{HeapError, Result, Violation},
  region::RegionGrower,
};

/// Identity of a block: its position in the list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct BlockId(usize);

impl BlockId {
  pub fn index(self) -> usize {
    self.0
  }
}

/// Outcome of a first-fit search.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Search {
  /// First free block large enough.
  Hit(BlockId),
  /// No block fits; `last` is the tail, `None` if the list is empty.
  Miss { last: Option<BlockId> },
}

#[derive(Debug, Default)]
pub(crate) struct BlockList {
  blocks: Vec<Block>,
}

impl BlockList {
  pub fn new() -> Self {
    Self { blocks: Vec::new() }
  }

  pub fn len(&self) -> usize {
    self.blocks.len()
  }

  pub fn head(&self) -> Option<BlockId> {
    (!self.blocks.is_empty()).then_some(BlockId(0))
  }

  pub fn tail(&self) -> Option<BlockId> {
    self.blocks.len().checked_sub(1).map(BlockId)
  }

  pub fn next(
    &self,
    id: BlockId,
  ) -> Option<BlockId> {
    let next = id.0 + 1;

    (next < self.blocks.len()).then_some(BlockId(next))
  }

  pub fn iter(&self) -> impl Iterator<Item = &Block> {
    self.blocks.iter()
  }

  pub fn get_mut(
    &mut self,
    id: BlockId,
  ) -> &mut Block {
    &mut self.blocks[id.0]
  }

  /// First-fit scan from the head for a free block of at least `size` bytes.
  pub fn search(
    &self,
    size: usize,
  ) -> Search {
    let mut last = None;
    let mut current = self.head();

    while let Some(id) = current {
      let block = &self[id];

      if block.is_free() && block.size() >= size {
        trace!(size, block = id.0, capacity = block.size(), "first fit");
        return Search::Hit(id);
      }

      last = Some(id);
      current = self.next(id);
    }

    trace!(size, blocks = self.blocks.len(), "no free block fits");
    Search::Miss { last }
  }

  /// Grows the region by one block of `size` bytes and links it after `last`.
  ///
  /// On failure the list is left untouched.
  pub fn append<G: RegionGrower>(
    &mut self,
    grower: &mut G,
    last: Option<BlockId>,
    size: usize,
  ) -> Result<BlockId> {
    debug_assert_eq!(last, self.tail(), "append must happen at the tail");

    let span = size
      .checked_add(HEADER_SIZE)
      .and_then(crate::align::align_up)
      .ok_or(HeapError::OutOfMemory { requested: usize::MAX })?;

    let expected = grower.grow(0)?;
    let header = grower.grow(span)?;

    if header != expected {
      warn!(
        expected = ?expected,
        found = ?header,
        "region top moved between peek and growth"
      );
    }

    if let Some(last) = last {
      let tail_end = self[last].end();

      if (header.as_ptr() as usize) < tail_end {
        let violation = Violation::OutOfOrder {
          found: header.as_ptr() as usize,
          tail_end,
        };
        warn!(%violation, "refusing to link block");
        return Err(violation.into());
      }
    }

    let id = BlockId(self.blocks.len());
    let block = Block::new(header, size, span);

    //  Safety:
    //  -   `grower` just reserved `span >= HEADER_SIZE` bytes at `header`.
    unsafe { block.write_stamp(id.0) };

    debug!(size, span, header = ?header, block = id.0, "grew region");

    self.blocks.push(block);
    Ok(id)
  }

  /// Finds the block whose payload starts at `payload`.
  pub fn find(
    &self,
    payload: NonNull<u8>,
  ) -> Result<BlockId> {
    let address = payload.as_ptr() as usize;

    self
      .blocks
      .binary_search_by_key(&address, |block| block.payload().as_ptr() as usize)
      .map(BlockId)
      .map_err(|_| Violation::UnknownPointer { address }.into())
  }
}

impl Index<BlockId> for BlockList {
  type Output = Block;

  fn index(
    &self,
    id: BlockId,
  ) -> &Block {
    &self.blocks[id.0]
  }
}
