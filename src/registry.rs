use std::collections::BTreeMap;
use std::ptr::NonNull;

/// Observer told about every range the allocator hands out and takes back.
///
/// A harness can use it to track which ranges are live; the allocator never
/// reads anything back from it.
pub trait RangeRegistry {
  fn on_alloc(
    &mut self,
    _ptr: NonNull<u8>,
    _size: usize,
  ) {
  }

  fn on_free(
    &mut self,
    ptr: NonNull<u8>,
  );
}

/// Registry that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRegistry;

impl RangeRegistry for NoRegistry {
  fn on_free(
    &mut self,
    _ptr: NonNull<u8>,
  ) {
  }
}

/// Records the live `[lo, hi)` ranges and any overlap between them.
#[derive(Debug, Default)]
pub struct LiveRanges {
  ranges: BTreeMap<usize, usize>,
  overlaps: Vec<(usize, usize)>,
  unknown_frees: Vec<usize>,
}

impl LiveRanges {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.ranges.len()
  }

  pub fn is_empty(&self) -> bool {
    self.ranges.is_empty()
  }

  pub fn contains(
    &self,
    lo: usize,
  ) -> bool {
    self.ranges.contains_key(&lo)
  }

  /// Pairs of range starts that were live at the same time and overlapped.
  pub fn overlaps(&self) -> &[(usize, usize)] {
    &self.overlaps
  }

  /// Frees of addresses that were never recorded as allocated.
  pub fn unknown_frees(&self) -> &[usize] {
    &self.unknown_frees
  }

  pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
    self.ranges.iter().map(|(&lo, &hi)| (lo, hi))
  }
}

impl RangeRegistry for LiveRanges {
  fn on_alloc(
    &mut self,
    ptr: NonNull<u8>,
    size: usize,
  ) {
    let lo = ptr.as_ptr().addr();
    let hi = lo + size;

    if let Some((&before, &before_hi)) = self.ranges.range(..hi).next_back() {
      if before_hi > lo {
        self.overlaps.push((before, lo));
      }
    }

    self.ranges.insert(lo, hi);
  }

  fn on_free(
    &mut self,
    ptr: NonNull<u8>,
  ) {
    let lo = ptr.as_ptr().addr();
    if self.ranges.remove(&lo).is_none() {
      self.unknown_frees.push(lo);
    }
  }
}
