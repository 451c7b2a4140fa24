use std::{io::Read, ptr::NonNull};

use firstfit::{Heap, HeapError};
use libc::sbrk;
use tracing_subscriber::EnvFilter;

//  Shows where the program break sits, then waits for ENTER so that the
//  process can be inspected (`pmap`, `/proc/<pid>/maps`, `gdb`).
fn checkpoint(label: &str) {
  println!("[{}] pid {} break at {:?}", label, std::process::id(), unsafe { sbrk(0) });
  println!(">>> ENTER to continue");
  let _ = std::io::stdin().bytes().next();
}

fn print_alloc(
  heap: &Heap,
  size: usize,
  addr: NonNull<u8>,
) {
  println!(
    "Allocated {} bytes (block holds {}), address = {:?}, program break = {:?}",
    size,
    heap.usable_size(addr).unwrap_or(0),
    addr,
    unsafe { sbrk(0) }
  );
}

fn main() -> Result<(), HeapError> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let mut heap = Heap::new();

  checkpoint("start");

  // --------------------------------------------------------------------
  // 1) Allocate 16 bytes and write into them.
  // --------------------------------------------------------------------
  let first = heap.allocate(16)?;
  println!("\n[1] Allocate 16 bytes");
  print_alloc(&heap, 16, first);

  unsafe { first.as_ptr().write_bytes(0xAB, 16) };
  println!("[1] Initialized first block with 0xAB");

  checkpoint("step done");

  // --------------------------------------------------------------------
  // 2) Release it, then ask for 8 bytes: the freed block is reused whole.
  // --------------------------------------------------------------------
  heap.release(first.as_ptr())?;
  println!("\n[2] Released first block at {:?}", first);

  let second = heap.allocate(8)?;
  print_alloc(&heap, 8, second);
  println!(
    "[2] second == first? {}",
    if second == first {
      "Yes, it reused the freed block"
    } else {
      "No, it allocated somewhere else"
    }
  );

  checkpoint("step done");

  // --------------------------------------------------------------------
  // 3) Ask for 32 bytes: nothing free fits, the region grows.
  // --------------------------------------------------------------------
  let third = heap.allocate(32)?;
  println!("\n[3] Allocate 32 bytes");
  print_alloc(&heap, 32, third);
  checkpoint("after 32 byte alloc");

  // --------------------------------------------------------------------
  // 4) Grow the 32 byte block: the content moves, the old block is freed.
  // --------------------------------------------------------------------
  unsafe { third.as_ptr().write_bytes(0x11, 32) };
  let moved = heap.resize(third.as_ptr(), 64 * 1024)?;
  println!("\n[4] Resized 32 bytes to 64 KiB: {:?} -> {:?}", third, moved);
  checkpoint("after resize");

  // --------------------------------------------------------------------
  // 5) Zeroed allocation and an overflowing one.
  // --------------------------------------------------------------------
  let zeroed = heap.zeroed_allocate(4, 4)?;
  println!("\n[5] zeroed_allocate(4, 4) = {:?}", zeroed);

  match heap.zeroed_allocate(usize::MAX, 2) {
    Err(error) => println!("[5] zeroed_allocate(usize::MAX, 2) failed: {}", error),
    Ok(ptr) => println!("[5] zeroed_allocate(usize::MAX, 2) unexpectedly returned {:?}", ptr),
  }

  checkpoint("step done");

  // --------------------------------------------------------------------
  // 6) Releasing twice is reported instead of corrupting the heap.
  // --------------------------------------------------------------------
  heap.release(second.as_ptr())?;
  if let Err(error) = heap.release(second.as_ptr()) {
    println!("\n[6] Second release rejected: {}", error);
  }

  println!("\n[7] Blocks, in address order:");
  for block in heap.blocks() {
    println!("    {:?} size = {:>6} {:?}", block.payload, block.size, block.provenance);
  }
  println!("    {:?}", heap.stats());

  println!("\n[8] End of example. Released blocks were never returned to the OS; it reclaims them at exit.");

  Ok(())
}
