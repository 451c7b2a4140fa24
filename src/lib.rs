//! # firstfit - A First-Fit Free-List Heap
//!
//! This crate provides a small user-space heap which manages a single growable
//! region, by default the program's data segment grown through `sbrk(2)`.
//!
//! ## Overview
//!
//! Every allocation is a block: a header slot followed by the payload handed to
//! the caller. Blocks are kept in address order and are never removed:
//!
//! ```text
//!   Region after allocate(16), allocate(40), release(first):
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                              REGION                                  │
//!   │                                                                      │
//!   │   ┌────────┬──────────────┬────────┬──────────────────────────────┐  │
//!   │   │ header │  16 (free)   │ header │          40 (in use)         │  │
//!   │   └────────┴──────────────┴────────┴──────────────────────────────┘  │
//!   │            ▲                                                     ▲   │
//!   │            │                                                     │   │
//!   │     reused by the next                                       Region  │
//!   │     request of <= 16 bytes                                     Top   │
//!   │                                                                      │
//!   └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! An allocation walks the blocks from the lowest address and takes the first
//! free one which is large enough (first fit). When none fits, the region grows
//! by one block at its top.
//!
//! ## Crate Structure
//!
//! ```text
//!   firstfit
//!   ├── align      - Word rounding (align!, align_up)
//!   ├── block      - Block metadata and provenance (internal)
//!   ├── list       - Address-ordered block list, first-fit search (internal)
//!   ├── region     - RegionGrower trait, Sbrk and Arena growers
//!   ├── heap       - Heap: allocate, release, resize, zeroed_allocate
//!   └── error      - HeapError and Violation
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use firstfit::{Arena, Heap};
//!
//! let mut heap = Heap::with_grower(Arena::with_capacity(4096));
//!
//! let first = heap.allocate(16)?;
//! heap.release(first.as_ptr())?;
//!
//! // Freed blocks are reused, even for smaller requests.
//! let second = heap.allocate(8)?;
//! assert_eq!(first, second);
//!
//! // A second release of the same block is reported, not ignored.
//! heap.release(second.as_ptr())?;
//! assert!(heap.release(second.as_ptr()).is_err());
//! # Ok::<(), firstfit::HeapError>(())
//! ```
//!
//! ## Block Layout
//!
//! ```text
//!   ┌───────────────────────┬────────────────────────────────┐
//!   │     Header slot       │         User Data              │
//!   │  ┌─────────────────┐  │                                │
//!   │  │ id              │  │  ┌──────────────────────────┐  │
//!   │  │ size: N         │  │  │     N bytes usable       │  │
//!   │  └─────────────────┘  │  └──────────────────────────┘  │
//!   │   HEADER_SIZE bytes   │                                │
//!   └───────────────────────┴────────────────────────────────┘
//!                           ▲
//!                           └── Pointer returned to user
//! ```
//!
//! The block table itself lives outside the region. The header slot only
//! carries a copy of the block's identity, so that an overrun from the
//! previous payload is detected instead of corrupting the heap.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: a `Heap` is neither `Send` nor `Sync`
//! - **No coalescing**: adjacent free blocks are never merged
//! - **No splitting**: a reused block keeps its whole size
//! - **No shrinking**: the region is never handed back to the grower
//! - **Word alignment only**: payloads are `usize`-aligned when the region start is

pub mod align;
mod block;
mod error;
mod heap;
mod list;
mod region;

pub use block::{HEADER_SIZE, Provenance};
pub use error::{HeapError, Result, Violation};
pub use heap::{BlockInfo, Heap, HeapStats};
pub use region::{Arena, RegionGrower, Sbrk};
