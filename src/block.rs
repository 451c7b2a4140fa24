//! Per-block metadata.

use std::{mem, ptr::{self, NonNull}};

use crate::{align, error::Violation};

/// Lifecycle of a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Provenance {
  /// Created by growing the region, in use.
  Fresh,
  /// Taken back from the free list, in use.
  Reused,
  /// Released by its owner, free for reuse.
  Released,
}

impl Provenance {
  pub fn is_free(self) -> bool {
    self == Provenance::Released
  }
}

/// Header written into the region right before each payload.
///
/// The block table is authoritative; the stamp only lets the heap notice that
/// a payload overrun reached the next block's header.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Stamp {
  pub id: usize,
  pub size: usize,
}

/// Bytes reserved in the region in front of every payload.
pub const HEADER_SIZE: usize = align!(mem::size_of::<Stamp>());

/// Metadata of one block of the region.
#[derive(Debug)]
pub(crate) struct Block {
  header: NonNull<u8>,
  size: usize,
  span: usize,
  provenance: Provenance,
}

impl Block {
  /// Creates an in-use block over `span` bytes starting at `header`.
  pub fn new(
    header: NonNull<u8>,
    size: usize,
    span: usize,
  ) -> Self {
    debug_assert!(span >= size + HEADER_SIZE);

    Self {
      header,
      size,
      span,
      provenance: Provenance::Fresh,
    }
  }

  pub fn size(&self) -> usize {
    self.size
  }

  pub fn span(&self) -> usize {
    self.span
  }

  pub fn provenance(&self) -> Provenance {
    self.provenance
  }

  pub fn is_free(&self) -> bool {
    self.provenance.is_free()
  }

  pub fn header(&self) -> NonNull<u8> {
    self.header
  }

  pub fn payload(&self) -> NonNull<u8> {
    //  Safety:
    //  -   `span >= size + HEADER_SIZE`, hence the payload lies within the grown span.
    unsafe { self.header.add(HEADER_SIZE) }
  }

  /// Address one past the end of the grown span.
  pub fn end(&self) -> usize {
    self.header().as_ptr() as usize + self.span
  }

  /// Marks a free block as in use again.
  pub fn claim(&mut self) -> Result<(), Violation> {
    if !self.is_free() {
      return Err(Violation::ClaimInUse { address: self.payload().as_ptr() as usize });
    }

    self.provenance = Provenance::Reused;
    Ok(())
  }

  /// Marks an in-use block as free.
  pub fn release(&mut self) -> Result<(), Violation> {
    if self.is_free() {
      return Err(Violation::DoubleRelease { address: self.payload().as_ptr() as usize });
    }

    self.provenance = Provenance::Released;
    Ok(())
  }

  /// Fails unless the block is currently handed out.
  pub fn ensure_in_use(&self) -> Result<(), Violation> {
    if self.is_free() {
      return Err(Violation::UseAfterRelease { address: self.payload().as_ptr() as usize });
    }

    Ok(())
  }

  /// Writes the block's stamp into its header slot.
  ///
  /// # Safety
  ///
  /// The header slot must be writable.
  pub unsafe fn write_stamp(
    &self,
    id: usize,
  ) {
    let stamp = Stamp { id, size: self.size };

    unsafe { ptr::write_unaligned(self.header.as_ptr() as *mut Stamp, stamp) }
  }

  /// Checks the in-region header against the table entry `id`.
  ///
  /// # Safety
  ///
  /// The header slot must be readable.
  pub unsafe fn check_stamp(
    &self,
    id: usize,
  ) -> Result<(), Violation> {
    let stamp = unsafe { ptr::read_unaligned(self.header.as_ptr() as *const Stamp) };

    if stamp != (Stamp { id, size: self.size }) {
      return Err(Violation::CorruptedHeader { address: self.payload().as_ptr() as usize });
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn block_over(buffer: &mut [usize]) -> Block {
    let header = NonNull::new(buffer.as_mut_ptr() as *mut u8).unwrap();

    Block::new(header, 16, HEADER_SIZE + 16)
  }

  #[test]
  fn test_header_is_word_aligned() {
    assert_eq!(HEADER_SIZE % mem::size_of::<usize>(), 0);
    assert!(HEADER_SIZE >= mem::size_of::<Stamp>());
  }

  #[test]
  fn test_transitions() {
    let mut buffer = [0usize; 8];
    let mut block = block_over(&mut buffer);

    assert_eq!(block.provenance(), Provenance::Fresh);
    assert!(block.ensure_in_use().is_ok());

    block.release().unwrap();
    assert_eq!(block.provenance(), Provenance::Released);
    assert!(matches!(block.release(), Err(Violation::DoubleRelease { .. })));
    assert!(matches!(block.ensure_in_use(), Err(Violation::UseAfterRelease { .. })));

    block.claim().unwrap();
    assert_eq!(block.provenance(), Provenance::Reused);
    assert!(!block.is_free());
    assert!(matches!(block.claim(), Err(Violation::ClaimInUse { .. })));
    assert_eq!(block.provenance(), Provenance::Reused);
  }

  #[test]
  fn test_stamp_detects_overwrite() {
    let mut buffer = [0usize; 8];
    let block = block_over(&mut buffer);

    unsafe {
      block.write_stamp(3);
      assert!(block.check_stamp(3).is_ok());
      assert!(block.check_stamp(4).is_err());

      block.header().as_ptr().write_bytes(0xAB, 4);
      assert!(matches!(block.check_stamp(3), Err(Violation::CorruptedHeader { .. })));
    }
  }
}
