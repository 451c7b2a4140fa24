//! Error types returned by the heap.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, HeapError>;

/// Failure of a heap operation.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum HeapError {
  /// A zero-byte allocation was requested.
  #[error("allocation size must be non-zero")]
  InvalidSize,

  /// The region grower refused to extend the region.
  ///
  /// `requested` is the growth asked of the grower, header and padding
  /// included; `usize::MAX` when that growth is not representable.
  #[error("region could not grow by {requested} bytes")]
  OutOfMemory { requested: usize },

  /// `count * element_size` does not fit in a `usize`.
  #[error("{count} elements of {element_size} bytes overflow the address space")]
  Overflow { count: usize, element_size: usize },

  /// The caller or a buffer overrun broke one of the heap's invariants.
  ///
  /// This signals a programming error on the caller's side; the heap itself
  /// is left unchanged by the failed operation.
  #[error("heap invariant violated: {0}")]
  InvariantViolation(#[from] Violation),
}

/// Broken heap invariant, detected at a state transition.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum Violation {
  /// `release` on a block that is already free.
  #[error("block at {address:#x} released twice")]
  DoubleRelease { address: usize },

  /// A block in use was about to be handed out again.
  #[error("block at {address:#x} claimed while in use")]
  ClaimInUse { address: usize },

  /// `resize` on a block that has been released.
  #[error("block at {address:#x} used after release")]
  UseAfterRelease { address: usize },

  /// The pointer is not the payload of any block of this heap.
  #[error("pointer {address:#x} was not handed out by this heap")]
  UnknownPointer { address: usize },

  /// The in-region header no longer matches the block table.
  #[error("header of block at {address:#x} was overwritten")]
  CorruptedHeader { address: usize },

  /// The grower returned a span below the tail block.
  #[error("region grew at {found:#x}, below the tail block ending at {tail_end:#x}")]
  OutOfOrder { found: usize, tail_end: usize },
}
