//! Explicit free list threaded through the payload of free blocks.
//!
//! ```text
//!   free block:  ┌────────┬────────┬────────┬─── ··· ───┬────────┐
//!                │ header │  prev  │  next  │  unused   │ footer │
//!                └────────┴────────┴────────┴─── ··· ───┴────────┘
//! ```
//!
//! Links are offsets into the region. The sentinel block at offset 0 is laid
//! out like a free-list node, so its `next` word is the list head and every
//! real node has a valid `prev`. A `next` of 0 ends the list.

use crate::block::{Region, WORD};

/// Offset of the node whose `next` word is the list head.
pub const HEAD: usize = 0;

const NIL: u64 = 0;

fn prev_slot(node: usize) -> usize {
  node + WORD
}

fn next_slot(node: usize) -> usize {
  node + 2 * WORD
}

pub fn prev(
  region: &Region,
  node: usize,
) -> usize {
  region.read(prev_slot(node)) as usize
}

pub fn next(
  region: &Region,
  node: usize,
) -> Option<usize> {
  match region.read(next_slot(node)) {
    NIL => None,
    next => Some(next as usize),
  }
}

pub fn first(region: &Region) -> Option<usize> {
  next(region, HEAD)
}

/// Empties the list.
pub fn clear(region: &mut Region) {
  region.write(next_slot(HEAD), NIL);
}

/// Links `block` in as the first node.
pub fn insert_front(
  region: &mut Region,
  block: usize,
) {
  let old_first = region.read(next_slot(HEAD));

  region.write(prev_slot(block), HEAD as u64);
  region.write(next_slot(block), old_first);
  if old_first != NIL {
    region.write(prev_slot(old_first as usize), block as u64);
  }
  region.write(next_slot(HEAD), block as u64);
}

/// Unlinks `block` using its own links.
pub fn remove(
  region: &mut Region,
  block: usize,
) {
  let prev = region.read(prev_slot(block));
  let next = region.read(next_slot(block));

  region.write(next_slot(prev as usize), next);
  if next != NIL {
    region.write(prev_slot(next as usize), prev);
  }
}

pub fn iter(region: &Region) -> Iter<'_> {
  Iter {
    region,
    current: first(region),
  }
}

/// Walks the list head to tail.
pub struct Iter<'a> {
  region: &'a Region,
  current: Option<usize>,
}

impl Iterator for Iter<'_> {
  type Item = usize;

  fn next(&mut self) -> Option<usize> {
    let node = self.current?;
    self.current = next(self.region, node);
    Some(node)
  }
}

#[cfg(test)]
mod tests {
  use std::ptr::NonNull;

  use super::*;

  #[repr(align(8))]
  struct MemPool<const N: usize>([u8; N]);

  fn region(pool: &mut MemPool<256>) -> Region {
    let mut region = Region::new(NonNull::new(pool.0.as_mut_ptr()).unwrap());
    region.extend(256);
    region
  }

  #[test]
  fn test_insert_is_lifo() {
    let mut pool = MemPool([0; 256]);
    let mut region = region(&mut pool);

    assert_eq!(first(&region), None);

    insert_front(&mut region, 32);
    insert_front(&mut region, 96);
    insert_front(&mut region, 160);

    assert_eq!(iter(&region).collect::<Vec<_>>(), vec![160, 96, 32]);
    assert_eq!(prev(&region, 160), HEAD);
    assert_eq!(prev(&region, 96), 160);
    assert_eq!(prev(&region, 32), 96);
  }

  #[test]
  fn test_remove() {
    let mut pool = MemPool([0; 256]);
    let mut region = region(&mut pool);

    insert_front(&mut region, 32);
    insert_front(&mut region, 96);
    insert_front(&mut region, 160);

    // middle
    remove(&mut region, 96);
    assert_eq!(iter(&region).collect::<Vec<_>>(), vec![160, 32]);
    assert_eq!(prev(&region, 32), 160);

    // head
    remove(&mut region, 160);
    assert_eq!(iter(&region).collect::<Vec<_>>(), vec![32]);
    assert_eq!(prev(&region, 32), HEAD);

    // last remaining
    remove(&mut region, 32);
    assert_eq!(first(&region), None);

    insert_front(&mut region, 96);
    assert_eq!(iter(&region).collect::<Vec<_>>(), vec![96]);
  }
}
