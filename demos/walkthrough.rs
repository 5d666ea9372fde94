use std::io::Read;
use std::ptr::NonNull;

use tagalloc::{Allocator, AllocError, SbrkGrower};

/// Pauses between steps so the printed block list and threshold can be
/// compared with the process mapping (`pmap <pid>` shows the `[heap]` segment
/// ending at the printed program break).
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

fn print_program_break(
  label: &str,
  heap: &Allocator<SbrkGrower>,
) {
  println!(
    "[{}] PID = {}, program break = {:?}, heap size = {} bytes",
    label,
    std::process::id(),
    heap.grower().program_break(),
    heap.heap_size(),
  );
}

fn print_blocks(heap: &Allocator<SbrkGrower>) {
  for block in heap.blocks() {
    println!(
      "    block @ {:#06x}  {:>6} bytes  {}",
      block.offset,
      block.size,
      match (block.allocated, block.filler) {
        (_, true) => "filler",
        (true, false) => "allocated",
        (false, false) => "free",
      }
    );
  }
  if let Some(threshold) = heap.threshold() {
    println!("    short-circuit threshold = {threshold} bytes");
  }
}

fn print_alloc(
  label: &str,
  size: usize,
  ptr: Option<NonNull<u8>>,
) {
  match ptr {
    Some(ptr) => println!("\n{label} Allocated {size} bytes, address = {ptr:?}"),
    None => println!("\n{label} Allocation of {size} bytes failed"),
  }
}

fn main() -> Result<(), AllocError> {
  env_logger::init();

  // Touch stdin and stdout before taking over the program break, so their
  // buffers are not carved out of it later.
  println!("tagalloc walkthrough");
  block_until_enter_pressed();

  let mut heap = Allocator::init(SbrkGrower::new()?)?;

  print_program_break("start", &heap);
  print_blocks(&heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 1) Two small allocations grow the heap one block at a time.
  // --------------------------------------------------------------------
  let first = heap.allocate(16);
  print_alloc("[1]", 16, first);
  let second = heap.allocate(16);
  print_alloc("[1]", 16, second);
  print_program_break("after two allocations", &heap);
  print_blocks(&heap);

  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 2) Free the first block and ask for the same size again.
  //    First-fit hands the freed block straight back.
  // --------------------------------------------------------------------
  if let Some(first) = first {
    unsafe { heap.deallocate(first)? };
    println!("\n[2] Deallocated first block at {first:?}");
  }
  let third = heap.allocate(16);
  print_alloc("[2]", 16, third);
  println!(
    "[2] third == first? {}",
    if third == first {
      "Yes, it reused the freed block"
    } else {
      "No, it allocated somewhere else"
    }
  );

  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 3) Allocate a large block, free it, and carve a small one out of it.
  //    The remainder stays on the free list.
  // --------------------------------------------------------------------
  let guard = heap.allocate(8);
  let big = heap.allocate(4096);
  print_alloc("[3]", 4096, big);
  let tail = heap.allocate(8);
  if let Some(big) = big {
    unsafe { heap.deallocate(big)? };
  }
  let small = heap.allocate(100);
  print_alloc("[3]", 100, small);
  print_blocks(&heap);

  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 4) Free neighbors: they are merged into a single free block.
  // --------------------------------------------------------------------
  for ptr in [small, guard].into_iter().flatten() {
    unsafe { heap.deallocate(ptr)? };
  }
  println!("\n[4] Freed the split block and its left neighbor");
  print_blocks(&heap);

  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 5) Freeing the same pointer twice is caught instead of corrupting the
  //    free list.
  // --------------------------------------------------------------------
  if let Some(tail) = tail {
    unsafe { heap.deallocate(tail)? };
    match unsafe { heap.deallocate(tail) } {
      Err(err) => println!("\n[5] Second free rejected: {err}"),
      Ok(()) => println!("\n[5] Second free went through?!"),
    }
  }

  // --------------------------------------------------------------------
  // 6) End of demo. Everything still live is freed; the break stays put.
  // --------------------------------------------------------------------
  let stats = heap.check()?;
  println!("\n[6] Heap check passed: {stats:?}");

  let (grower, _) = heap.shutdown();
  println!(
    "[6] All blocks freed. Program break = {:?}",
    grower.program_break()
  );

  Ok(())
}
