use std::collections::BTreeSet;

use crate::align::is_aligned;
use crate::allocator::{Allocator, FIRST_BLOCK, SENTINEL, SENTINEL_SIZE};
use crate::block::{MIN_BLOCK, WORD, footer_of};
use crate::error::{AllocError, Result};
use crate::free_list::{self, HEAD};
use crate::grower::HeapGrower;
use crate::registry::RangeRegistry;

/// Totals gathered by [`Allocator::check`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
  pub heap_size: usize,
  pub allocated_blocks: usize,
  pub allocated_bytes: usize,
  pub free_blocks: usize,
  pub free_bytes: usize,
  pub largest_free: usize,
}

fn corrupted(
  offset: usize,
  reason: &'static str,
) -> AllocError {
  AllocError::Corrupted { offset, reason }
}

impl<G: HeapGrower, R: RangeRegistry> Allocator<G, R> {
  /// Walks the heap and the free list and verifies every layout invariant.
  pub fn check(&self) -> Result<HeapStats> {
    let region = &self.region;
    let len = region.len();
    let mut stats = HeapStats {
      heap_size: len,
      ..HeapStats::default()
    };

    let sentinel = region.tag(SENTINEL);
    if sentinel.size() != SENTINEL_SIZE || !sentinel.is_allocated() {
      return Err(corrupted(SENTINEL, "bad sentinel header"));
    }
    if region.tag(footer_of(SENTINEL, SENTINEL_SIZE)) != sentinel {
      return Err(corrupted(SENTINEL, "sentinel footer does not match header"));
    }

    let mut free = BTreeSet::new();
    let mut offset = FIRST_BLOCK;
    let mut previous_free = false;

    loop {
      if offset + WORD > len {
        return Err(corrupted(offset, "heap walk ran past the end of the region"));
      }

      let tag = region.tag(offset);
      let size = tag.size();

      if size == 0 {
        if !tag.is_allocated() || offset + WORD != len {
          return Err(corrupted(offset, "misplaced terminal marker"));
        }
        break;
      }

      if !is_aligned(size) || size < MIN_BLOCK {
        return Err(corrupted(offset, "bad block size"));
      }
      if offset + size > len - WORD {
        return Err(corrupted(offset, "block overruns the region"));
      }
      if region.tag(footer_of(offset, size)) != tag {
        return Err(corrupted(offset, "footer does not match header"));
      }

      if tag.is_allocated() {
        stats.allocated_blocks += 1;
        stats.allocated_bytes += size;
        previous_free = false;
      } else {
        if previous_free {
          return Err(corrupted(offset, "adjacent free blocks not coalesced"));
        }
        if let Some(threshold) = self.threshold() {
          if size >= threshold {
            return Err(corrupted(offset, "free block not below threshold"));
          }
        }
        stats.free_blocks += 1;
        stats.free_bytes += size;
        stats.largest_free = stats.largest_free.max(size);
        free.insert(offset);
        previous_free = true;
      }

      offset += size;
    }

    let mut seen = BTreeSet::new();
    let mut prev = HEAD;
    for node in free_list::iter(region) {
      if !free.contains(&node) {
        return Err(corrupted(node, "free list node is not a free block"));
      }
      if !seen.insert(node) {
        return Err(corrupted(node, "free list node appears twice"));
      }
      if free_list::prev(region, node) != prev {
        return Err(corrupted(node, "broken prev link"));
      }
      prev = node;
    }

    if seen.len() != free.len() {
      let missing = free.difference(&seen).next().copied().unwrap_or(FIRST_BLOCK);
      return Err(corrupted(missing, "free block missing from free list"));
    }

    Ok(stats)
  }
}
