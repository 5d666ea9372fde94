//! # tagalloc - An Explicit Free-List Allocator
//!
//! This crate provides a single-threaded **boundary-tag allocator** that
//! manages one contiguous, growable heap. Freed blocks go on an explicit
//! free list and are merged with their free neighbors right away, so the
//! space can be reused by later requests.
//!
//! ## Overview
//!
//! Every block carries its size and allocation bit twice, in a header and
//! in a footer:
//!
//! ```text
//!   Allocated block:
//!   ┌────────┬────────────────────────────────────────┬────────┐
//!   │ size|1 │             client payload             │ size|1 │
//!   └────────┴────────────────────────────────────────┴────────┘
//!            ▲
//!            └── Pointer returned to user (8-byte aligned)
//!
//!   Free block:
//!   ┌────────┬────────┬────────┬──────────────────────┬────────┐
//!   │ size|0 │  prev  │  next  │        unused        │ size|0 │
//!   └────────┴────────┴────────┴──────────────────────┴────────┘
//! ```
//!
//! The footer of the block on the left sits in the word right before a
//! block's header, so both neighbors are found in O(1) when freeing.
//!
//! ## Heap Layout
//!
//! ```text
//!   ┌──────────┬───────┬───────┬───────┬─────── ··· ──┬──────────┐
//!   │ sentinel │ block │ block │ block │               │ terminal │
//!   └──────────┴───────┴───────┴───────┴─────── ··· ──┴──────────┘
//!        │                                                  ▲
//!        │  threshold + free-list head                      │
//!        └──────────────────────────────────────  grow here ┘
//! ```
//!
//! - The **sentinel** is a permanent allocated block. Its payload holds the
//!   free-list head and the short-circuit threshold.
//! - The **terminal marker** is a zero-size allocated header at the end of
//!   the heap. Growing the heap turns it into the new block's header.
//!
//! ## Allocation
//!
//! Requests are served **first-fit** from the free list. A block larger
//! than needed is split when the leftover can stand as a free block. When
//! nothing fits the heap is grown through a [`HeapGrower`].
//!
//! The **short-circuit threshold** remembers the smallest request that
//! recently found no fit. Requests at least that large skip the scan and go
//! straight to growth. Freeing a block at least as large as the threshold
//! raises it past that block.
//!
//! ## Crate Structure
//!
//! ```text
//!   tagalloc
//!   ├── align      - Alignment unit and align! macro
//!   ├── block      - Boundary tags and offset addressing of the region
//!   ├── free_list  - Intrusive doubly linked free list
//!   ├── allocator  - Allocator: init, allocate, deallocate, shutdown
//!   ├── check      - Heap consistency checker
//!   ├── grower     - HeapGrower trait, sbrk and arena growers
//!   ├── registry   - RangeRegistry trait for test harnesses
//!   └── error      - AllocError
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use tagalloc::{Allocator, ArenaGrower};
//!
//! let mut heap = Allocator::init(ArenaGrower::new().unwrap()).unwrap();
//!
//! let a = heap.allocate(16).unwrap();
//! let _b = heap.allocate(16).unwrap();
//! unsafe { heap.deallocate(a).unwrap() };
//!
//! // the freed block is reused right away
//! assert_eq!(heap.allocate(16), Some(a));
//! heap.shutdown();
//! ```
//!
//! ## Limitations
//!
//! - **Single-threaded only**: No synchronization primitives
//! - **No resizing**: [`Allocator::resize`] always fails
//! - **No trimming**: The heap never shrinks
//!
//! ## Safety
//!
//! Metadata lives inside the managed memory itself. Every metadata access is
//! bounds-checked against the region, but freeing a pointer this allocator
//! did not hand out, or writing past an allocation, still corrupts the heap.
//! That is why [`Allocator::deallocate`] is `unsafe`.

pub mod align;
mod allocator;
mod block;
mod check;
mod error;
mod free_list;
mod grower;
mod registry;

pub use allocator::{Allocator, AllocatorOptions, BlockInfo, Blocks, Counters};
pub use block::{MIN_BLOCK, OVERHEAD, WORD};
pub use check::HeapStats;
pub use error::{AllocError, Result};
#[cfg(unix)]
pub use grower::SbrkGrower;
pub use grower::{ArenaGrower, DEFAULT_ARENA_CAPACITY, HeapGrower};
pub use registry::{LiveRanges, NoRegistry, RangeRegistry};
