//! Sources of region memory.
//!
//! A [`RegionGrower`] owns the top of a region and moves it upwards on
//! request, the way `sbrk(2)` moves the program break.
//!
//! ```text
//!   grow(0)  -> top                 (peek)
//!   grow(n)  -> top, top += n       (previous top = start of the new span)
//!
//!   ┌──────────────┬─────────────┬────────────────────────┐
//!   │  reserved    │  new span   │      unreserved        │
//!   └──────────────┴─────────────┴────────────────────────┘
//!                  ▲             ▲
//!              previous top    new top
//! ```

use std::ptr::NonNull;

use libc::{c_void, intptr_t, sbrk};
use tracing::debug;

use crate::error::{HeapError, Result};

/// Grows a region of memory.
///
/// # Safety
///
/// Implementors guarantee that a successful `grow(n)` returns the start of `n`
/// bytes which nobody else uses, readable and writable for as long as the
/// grower is alive, and that a failed call leaves the top unchanged.
pub unsafe trait RegionGrower {
  /// Moves the top of the region up by `delta` bytes, returning the previous
  /// top. `grow(0)` returns the current top without reserving anything.
  fn grow(
    &mut self,
    delta: usize,
  ) -> Result<NonNull<u8>>;
}

/// Grows the process data segment through `sbrk(2)`.
///
/// The program break is shared by the whole process: any other `sbrk` user
/// (including the C allocator) may move it between two calls.
#[derive(Debug, Default)]
pub struct Sbrk;

impl Sbrk {
  pub const fn new() -> Self {
    Self
  }
}

unsafe impl RegionGrower for Sbrk {
  fn grow(
    &mut self,
    delta: usize,
  ) -> Result<NonNull<u8>> {
    let increment = intptr_t::try_from(delta).map_err(|_| HeapError::OutOfMemory { requested: delta })?;

    let address = unsafe { sbrk(increment) };

    if address == usize::MAX as *mut c_void {
      debug!(delta, "sbrk refused to grow");
      return Err(HeapError::OutOfMemory { requested: delta });
    }

    NonNull::new(address as *mut u8).ok_or(HeapError::OutOfMemory { requested: delta })
  }
}

/// Fixed-capacity region backed by a private, word-aligned buffer.
///
/// Useful wherever the program break should be left alone, and for
/// deterministic tests: growth beyond the capacity fails with `OutOfMemory`.
#[derive(Debug)]
pub struct Arena {
  base: NonNull<u8>,
  words: usize,
  top: usize,
}

impl Arena {
  /// Creates an arena able to hold at least `capacity` bytes.
  pub fn with_capacity(capacity: usize) -> Self {
    let words = capacity.div_ceil(std::mem::size_of::<usize>());
    let storage: Box<[usize]> = vec![0usize; words].into_boxed_slice();

    let raw = Box::into_raw(storage) as *mut usize as *mut u8;
    let base = NonNull::new(raw).unwrap_or(NonNull::dangling());

    Self { base, words, top: 0 }
  }

  /// Total bytes the arena can hand out.
  pub fn capacity(&self) -> usize {
    self.words * std::mem::size_of::<usize>()
  }

  /// Bytes handed out so far.
  pub fn used(&self) -> usize {
    self.top
  }

  /// Start of the arena.
  pub fn base(&self) -> NonNull<u8> {
    self.base
  }
}

unsafe impl RegionGrower for Arena {
  fn grow(
    &mut self,
    delta: usize,
  ) -> Result<NonNull<u8>> {
    let top = self
      .top
      .checked_add(delta)
      .filter(|&top| top <= self.capacity())
      .ok_or(HeapError::OutOfMemory { requested: delta })?;

    //  Safety:
    //  -   `self.top <= capacity`, hence the result is within the buffer or one past its end.
    let previous = unsafe { self.base.add(self.top) };

    self.top = top;
    Ok(previous)
  }
}

impl Drop for Arena {
  fn drop(&mut self) {
    let slice = std::ptr::slice_from_raw_parts_mut(self.base.as_ptr() as *mut usize, self.words);

    //  Safety:
    //  -   `base` and `words` come from the boxed slice leaked in `with_capacity`.
    drop(unsafe { Box::from_raw(slice) });
  }
}
