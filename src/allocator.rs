use std::ptr::NonNull;

use log::{debug, error, trace, warn};

use crate::align::{ALIGNMENT, checked_align, is_aligned};
use crate::block::{MIN_BLOCK, OVERHEAD, Region, WORD, block_of, payload_of};
use crate::error::{AllocError, Result};
use crate::free_list;
use crate::grower::HeapGrower;
use crate::registry::{NoRegistry, RangeRegistry};

/// The sentinel block. Its two payload words hold the short-circuit
/// threshold and the free-list head.
pub(crate) const SENTINEL: usize = 0;
pub(crate) const SENTINEL_SIZE: usize = MIN_BLOCK;
const THRESHOLD_SLOT: usize = SENTINEL + WORD;

/// Offset of the first real block (and of the initial terminal marker).
pub(crate) const FIRST_BLOCK: usize = SENTINEL + SENTINEL_SIZE;

const BOOTSTRAP_SIZE: usize = SENTINEL_SIZE + WORD;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatorOptions {
  /// Skip the free-list scan for requests the threshold marks as hopeless.
  pub short_circuit: bool,
}

impl Default for AllocatorOptions {
  fn default() -> Self {
    Self { short_circuit: true }
  }
}

/// Event counts, for observing what the allocator did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Counters {
  /// Successful calls to the grower after bootstrap.
  pub grows: usize,
  /// Grows that did not start at the end of the heap and were bridged.
  pub gaps: usize,
  /// Requests that went straight to growth because of the threshold.
  pub short_circuits: usize,
  /// Requests satisfied from the free list.
  pub reuses: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  pub offset: usize,
  pub size: usize,
  pub allocated: bool,
  /// Permanently allocated block bridging space the heap does not own.
  pub filler: bool,
}

/// Explicit free-list allocator over a heap obtained from `G`.
///
/// ```text
///   offset 0                      32
///   ┌────────┬─────────┬──────┬────────┬─── ··· ───┬────────┐
///   │ header │threshold│ head │ footer │  blocks   │ 0 / a  │
///   └────────┴─────────┴──────┴────────┴─── ··· ───┴────────┘
///    sentinel block (allocated)                     terminal
/// ```
pub struct Allocator<G: HeapGrower, R: RangeRegistry = NoRegistry> {
  pub(crate) grower: G,
  pub(crate) registry: R,
  pub(crate) region: Region,
  options: AllocatorOptions,
  counters: Counters,
}

impl<G: HeapGrower> Allocator<G, NoRegistry> {
  /// Lays out a fresh heap with default options and no registry.
  pub fn init(grower: G) -> Result<Self> {
    Self::init_with(grower, NoRegistry, AllocatorOptions::default())
  }
}

impl<G: HeapGrower, R: RangeRegistry> Allocator<G, R> {
  /// Lays out the sentinel block and the terminal marker.
  ///
  /// The grower must not have handed out any memory yet.
  pub fn init_with(
    mut grower: G,
    registry: R,
    options: AllocatorOptions,
  ) -> Result<Self> {
    let base = grower.heap_base();
    if !is_aligned(base.as_ptr().addr()) {
      return Err(AllocError::InitFailed { requested: BOOTSTRAP_SIZE });
    }

    let start = grower
      .grow(BOOTSTRAP_SIZE)
      .ok_or(AllocError::InitFailed { requested: BOOTSTRAP_SIZE })?;
    if start != base {
      return Err(AllocError::NonContiguous {
        expected: base.as_ptr().addr(),
        got: start.as_ptr().addr(),
      });
    }

    let mut region = Region::new(base);
    region.extend(BOOTSTRAP_SIZE);
    region.set(SENTINEL, SENTINEL_SIZE, true);
    region.write(THRESHOLD_SLOT, 0);
    free_list::clear(&mut region);
    region.set_header(FIRST_BLOCK, 0, true);

    debug!("heap initialized at {:?}", base);

    Ok(Self {
      grower,
      registry,
      region,
      options,
      counters: Counters::default(),
    })
  }

  /// Returns an 8-byte aligned pointer to at least `size` usable bytes.
  ///
  /// `None` for a zero-sized request or when the heap cannot grow.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Option<NonNull<u8>> {
    if size == 0 {
      return None;
    }

    let Some(reqsz) = request_size(size) else {
      warn!("allocation of {size} bytes overflows the block size");
      return None;
    };

    let block = match self.find_fit(reqsz) {
      Some(block) => {
        self.place(block, reqsz);
        self.counters.reuses += 1;
        block
      }
      None => match self.grow(reqsz) {
        Ok(block) => block,
        Err(err) => {
          warn!("allocation of {size} bytes failed: {err}");
          return None;
        }
      },
    };

    let ptr = self.region.address(payload_of(block));
    self
      .registry
      .on_alloc(ptr, self.region.size_of(block) - OVERHEAD);
    trace!("allocate({size}) = {ptr:?} (block {block:#x})");

    Some(ptr)
  }

  /// Returns the block behind `ptr` to the heap, merging it with free
  /// neighbors on both sides.
  ///
  /// # Safety
  ///
  /// `ptr` must have been returned by `allocate` on this allocator, and the
  /// caller must not use the memory afterwards. Freeing the same pointer
  /// twice is reported as [`AllocError::DoubleFree`] as long as the block has
  /// not been handed out again in between.
  pub unsafe fn deallocate(
    &mut self,
    ptr: NonNull<u8>,
  ) -> Result<()> {
    let addr = ptr.as_ptr().addr();
    let block = self.block_at(ptr)?;

    let tag = self.region.tag(block);
    if !tag.is_allocated() {
      error!("double free of {ptr:?}");
      return Err(AllocError::DoubleFree { addr });
    }
    if tag.is_filler() {
      return Err(AllocError::InvalidPointer { addr });
    }
    let size = tag.size();
    let mut end = block
      .checked_add(size)
      .filter(|&end| size >= MIN_BLOCK && end <= self.region.len() - WORD)
      .ok_or(AllocError::InvalidPointer { addr })?;
    if self.region.left_tag(end) != tag {
      return Err(AllocError::InvalidPointer { addr });
    }

    // The freed header reads free from here on, even once it sits inside a
    // merged block.
    self.region.set(block, size, false);

    let mut start = block;

    let left = self.region.left_tag(start);
    if !left.is_allocated() {
      start -= left.size();
      free_list::remove(&mut self.region, start);
      debug!("coalesce left: {start:#x} + {block:#x}");
    }

    let right = self.region.tag(end);
    if !right.is_allocated() {
      free_list::remove(&mut self.region, end);
      debug!("coalesce right: {block:#x} + {end:#x}");
      end += right.size();
    }

    let merged = end - start;
    self.region.set(start, merged, false);
    free_list::insert_front(&mut self.region, start);
    self.raise_threshold(merged);

    self.registry.on_free(ptr);
    trace!("deallocate({ptr:?}): free block {start:#x}, {merged} bytes");

    Ok(())
  }

  /// Resizing in place is not supported; this always fails and leaves the
  /// allocation untouched.
  pub fn resize(
    &mut self,
    _ptr: NonNull<u8>,
    _new_size: usize,
  ) -> Result<NonNull<u8>> {
    Err(AllocError::Unsupported)
  }

  /// Frees every block that is still allocated and hands back the
  /// collaborators.
  pub fn shutdown(mut self) -> (G, R) {
    let live: Vec<_> = self
      .blocks()
      .filter(|block| block.allocated && !block.filler)
      .map(|block| self.region.address(payload_of(block.offset)))
      .collect();

    debug!("shutdown: freeing {} live blocks", live.len());
    for ptr in live {
      // SAFETY: every pointer comes from an allocated block found by the
      // heap walk, and each is freed once.
      if let Err(err) = unsafe { self.deallocate(ptr) } {
        error!("shutdown: failed to free {ptr:?}: {err}");
      }
    }

    (self.grower, self.registry)
  }

  /// Smallest request size currently presumed to have no fit.
  pub fn threshold(&self) -> Option<usize> {
    match self.region.read(THRESHOLD_SLOT) {
      0 => None,
      threshold => Some(threshold as usize),
    }
  }

  pub fn heap_size(&self) -> usize {
    self.region.len()
  }

  pub fn counters(&self) -> Counters {
    self.counters
  }

  pub fn options(&self) -> AllocatorOptions {
    self.options
  }

  pub fn grower(&self) -> &G {
    &self.grower
  }

  pub fn registry(&self) -> &R {
    &self.registry
  }

  /// Walks the heap from the first block after the sentinel up to the
  /// terminal marker.
  pub fn blocks(&self) -> Blocks<'_> {
    Blocks {
      region: &self.region,
      offset: FIRST_BLOCK,
    }
  }

  /// Offset of `ptr`'s block within the heap.
  pub fn offset_of(
    &self,
    ptr: NonNull<u8>,
  ) -> Option<usize> {
    self.block_at(ptr).ok()
  }

  fn block_at(
    &self,
    ptr: NonNull<u8>,
  ) -> Result<usize> {
    let addr = ptr.as_ptr().addr();
    match self.region.offset_of(ptr) {
      Some(offset) if is_aligned(offset) && offset >= payload_of(FIRST_BLOCK) => {
        Ok(block_of(offset))
      }
      _ => Err(AllocError::InvalidPointer { addr }),
    }
  }

  fn find_fit(
    &mut self,
    reqsz: usize,
  ) -> Option<usize> {
    let threshold = self.threshold();

    if self.options.short_circuit {
      if let Some(threshold) = threshold {
        if reqsz >= threshold {
          trace!("{reqsz} >= threshold {threshold}, skipping search");
          self.counters.short_circuits += 1;
          return None;
        }
      }
    }

    for block in free_list::iter(&self.region) {
      let size = self.region.size_of(block);
      trace!("  free block {block:#x}: {size} bytes");
      if size >= reqsz {
        return Some(block);
      }
    }

    if threshold.is_none_or(|threshold| threshold > reqsz) {
      debug!("no fit for {reqsz}, threshold lowered to {reqsz}");
      self.set_threshold(Some(reqsz));
    }

    None
  }

  /// Takes `block` off the free list and allocates its first `reqsz` bytes,
  /// splitting off the remainder when it can stand as a free block.
  fn place(
    &mut self,
    block: usize,
    reqsz: usize,
  ) {
    free_list::remove(&mut self.region, block);

    let size = self.region.size_of(block);
    let rest = size - reqsz;

    if rest >= MIN_BLOCK {
      let remainder = block + reqsz;
      self.region.set(block, reqsz, true);
      self.region.set(remainder, rest, false);
      free_list::insert_front(&mut self.region, remainder);
      debug!("split {block:#x}: {reqsz} allocated, {rest} free at {remainder:#x}");
    } else {
      self.region.set(block, size, true);
    }
  }

  /// Extends the heap by one allocated block of `reqsz` bytes.
  ///
  /// The old terminal marker becomes the new block's header and a new
  /// terminal marker is written after it. When the grower hands out space
  /// past the end of the heap, the gap is bridged and the grow is retried
  /// once with room for the bridge.
  fn grow(
    &mut self,
    reqsz: usize,
  ) -> Result<usize> {
    let base = self.region.base().as_ptr().addr();
    let mut request = reqsz;
    let mut got = base;

    for _ in 0..2 {
      let start = self
        .grower
        .grow(request)
        .ok_or(AllocError::OutOfMemory { requested: request })?;
      self.counters.grows += 1;

      got = start.as_ptr().addr();
      let Some(offset) = got
        .checked_sub(base)
        .filter(|&offset| offset >= self.region.len())
      else {
        break;
      };

      if let Some(block) = self.adopt(offset, request, reqsz) {
        debug!("heap grown by {request} bytes to {}", self.region.len());
        return Ok(block);
      }
      request = reqsz + MIN_BLOCK + ALIGNMENT;
    }

    Err(AllocError::NonContiguous {
      expected: base + self.region.len(),
      got,
    })
  }

  /// Lays out the chunk of `size` bytes at `offset`, at or past the end of
  /// the heap, and allocates `reqsz` bytes from it if they fit.
  ///
  /// A chunk past the end starts with a filler block running from the old
  /// terminal marker to a footer in the chunk's first aligned word, so
  /// nothing is written into the gap. Whatever the allocation leaves over
  /// becomes a free block when it is large enough, otherwise it is absorbed
  /// by the block before it. A new terminal marker closes the chunk.
  fn adopt(
    &mut self,
    offset: usize,
    size: usize,
    reqsz: usize,
  ) -> Option<usize> {
    let old_terminal = self.region.len() - WORD;
    let terminal = ((offset + size) & !(ALIGNMENT - 1)) - WORD;

    let cursor = if offset == self.region.len() {
      old_terminal
    } else {
      self.counters.gaps += 1;
      crate::align!(offset).max(old_terminal + MIN_BLOCK - WORD) + WORD
    };

    self.region.extend(terminal + WORD - self.region.len());
    self.region.set_header(terminal, 0, true);

    let avail = terminal.saturating_sub(cursor);
    if cursor != old_terminal {
      let end = if avail < MIN_BLOCK { terminal } else { cursor };
      self.region.set_filler(old_terminal, end - old_terminal);
      debug!("bridged gap before {offset:#x} with a filler at {old_terminal:#x}");
      if avail < MIN_BLOCK {
        return None;
      }
    }

    if avail < reqsz {
      self.region.set(cursor, avail, false);
      free_list::insert_front(&mut self.region, cursor);
      self.raise_threshold(avail);
      return None;
    }

    let rest = avail - reqsz;
    if rest >= MIN_BLOCK {
      self.region.set(cursor, reqsz, true);
      self.region.set(cursor + reqsz, rest, false);
      free_list::insert_front(&mut self.region, cursor + reqsz);
      self.raise_threshold(rest);
    } else {
      self.region.set(cursor, avail, true);
    }

    Some(cursor)
  }

  fn raise_threshold(
    &mut self,
    merged: usize,
  ) {
    if let Some(threshold) = self.threshold() {
      if merged >= threshold {
        debug!("free block of {merged} bytes, threshold raised to {}", merged + ALIGNMENT);
        self.set_threshold(Some(merged + ALIGNMENT));
      }
    }
  }

  fn set_threshold(
    &mut self,
    threshold: Option<usize>,
  ) {
    self
      .region
      .write(THRESHOLD_SLOT, threshold.unwrap_or(0) as u64);
  }
}

/// Block size needed for a `size`-byte request.
fn request_size(size: usize) -> Option<usize> {
  let size = checked_align(size)?.checked_add(OVERHEAD)?;
  Some(size.max(MIN_BLOCK))
}

/// Iterator returned by [`Allocator::blocks`].
pub struct Blocks<'a> {
  region: &'a Region,
  offset: usize,
}

impl Iterator for Blocks<'_> {
  type Item = BlockInfo;

  fn next(&mut self) -> Option<BlockInfo> {
    if self.offset + WORD > self.region.len() {
      return None;
    }

    let tag = self.region.tag(self.offset);
    if tag.size() == 0 {
      return None;
    }

    let info = BlockInfo {
      offset: self.offset,
      size: tag.size(),
      allocated: tag.is_allocated(),
      filler: tag.is_filler(),
    };
    self.offset += tag.size();
    Some(info)
  }
}
