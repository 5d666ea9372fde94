use std::alloc::{self, Layout};
use std::ptr::NonNull;

#[cfg(unix)]
use libc::{c_void, intptr_t, sbrk};

use crate::align::{ALIGNMENT, is_aligned};
use crate::error::{AllocError, Result};

/// Default capacity of an [`ArenaGrower`]: 20 MiB.
pub const DEFAULT_ARENA_CAPACITY: usize = 20 * (1 << 20);

/// Source of fresh memory for the heap.
///
/// `grow` extends the managed region by `size` bytes and returns the start
/// of the new space, or `None` if the region cannot grow. The first grow
/// must start at `heap_base`. A later grow that starts past the end of the
/// heap leaves a gap the allocator bridges; one that starts below it fails.
pub trait HeapGrower {
  fn heap_base(&self) -> NonNull<u8>;

  fn grow(
    &mut self,
    size: usize,
  ) -> Option<NonNull<u8>>;
}

/// Grows the heap by moving the program break with `sbrk(2)`.
///
/// Only one of these should exist per process. Anything else moving the
/// break in between leaves gaps in the heap that are never reused.
#[cfg(unix)]
pub struct SbrkGrower {
  base: NonNull<u8>,
}

#[cfg(unix)]
impl SbrkGrower {
  /// Aligns the current program break to 8 bytes and takes it as the heap
  /// base.
  pub fn new() -> Result<Self> {
    let brk = unsafe { sbrk(0) };
    if brk == usize::MAX as *mut c_void {
      return Err(AllocError::InitFailed { requested: 0 });
    }

    let pad = crate::align!(brk.addr()) - brk.addr();
    if pad > 0 && unsafe { sbrk(pad as intptr_t) } == usize::MAX as *mut c_void {
      return Err(AllocError::InitFailed { requested: pad });
    }

    let base = NonNull::new(brk.cast::<u8>().wrapping_add(pad))
      .ok_or(AllocError::InitFailed { requested: pad })?;
    log::debug!("sbrk heap base at {:?}", base);

    Ok(Self { base })
  }

  /// The current program break.
  pub fn program_break(&self) -> *mut u8 {
    unsafe { sbrk(0) }.cast()
  }
}

#[cfg(unix)]
impl HeapGrower for SbrkGrower {
  fn heap_base(&self) -> NonNull<u8> {
    self.base
  }

  fn grow(
    &mut self,
    size: usize,
  ) -> Option<NonNull<u8>> {
    let increment = intptr_t::try_from(size).ok()?;
    let address = unsafe { sbrk(increment) };

    if address == usize::MAX as *mut c_void {
      return None;
    }

    NonNull::new(address.cast())
  }
}

/// A fixed-capacity owned buffer with a simulated break.
///
/// Each arena is an independent heap, which is what tests use.
pub struct ArenaGrower {
  base: NonNull<u8>,
  layout: Layout,
  brk: usize,
}

impl ArenaGrower {
  pub fn new() -> Result<Self> {
    Self::with_capacity(DEFAULT_ARENA_CAPACITY)
  }

  pub fn with_capacity(capacity: usize) -> Result<Self> {
    let failed = AllocError::InitFailed { requested: capacity };
    if capacity == 0 {
      return Err(failed);
    }

    let layout = Layout::from_size_align(capacity, ALIGNMENT).map_err(|_| failed.clone())?;
    // SAFETY: layout has a non-zero size.
    let base = NonNull::new(unsafe { alloc::alloc_zeroed(layout) }).ok_or(failed)?;
    debug_assert!(is_aligned(base.as_ptr().addr()));

    Ok(Self { base, layout, brk: 0 })
  }

  pub fn capacity(&self) -> usize {
    self.layout.size()
  }

  /// Bytes handed out so far.
  pub fn used(&self) -> usize {
    self.brk
  }
}

impl HeapGrower for ArenaGrower {
  fn heap_base(&self) -> NonNull<u8> {
    self.base
  }

  fn grow(
    &mut self,
    size: usize,
  ) -> Option<NonNull<u8>> {
    let new_brk = self.brk.checked_add(size)?;
    if new_brk > self.capacity() {
      log::debug!("arena exhausted: {} + {} > {}", self.brk, size, self.capacity());
      return None;
    }

    // SAFETY: brk <= capacity, so the result stays within the allocation.
    let start = unsafe { self.base.add(self.brk) };
    self.brk = new_brk;
    Some(start)
  }
}

impl Drop for ArenaGrower {
  fn drop(&mut self) {
    // SAFETY: allocated in `with_capacity` with this same layout.
    unsafe { alloc::dealloc(self.base.as_ptr(), self.layout) }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_arena_grows_contiguously() {
    let mut arena = ArenaGrower::with_capacity(64).unwrap();
    let base = arena.heap_base();

    let first = arena.grow(24).unwrap();
    let second = arena.grow(40).unwrap();

    assert_eq!(first, base);
    assert_eq!(second.as_ptr().addr(), base.as_ptr().addr() + 24);
    assert_eq!(arena.used(), 64);
  }

  #[test]
  fn test_arena_exhaustion() {
    let mut arena = ArenaGrower::with_capacity(64).unwrap();

    assert!(arena.grow(65).is_none());
    assert!(arena.grow(usize::MAX).is_none());
    assert_eq!(arena.used(), 0);

    assert!(arena.grow(64).is_some());
    assert!(arena.grow(8).is_none());
  }

  #[test]
  fn test_arena_zero_capacity() {
    assert_eq!(
      ArenaGrower::with_capacity(0).err(),
      Some(AllocError::InitFailed { requested: 0 })
    );
  }

  #[test]
  fn test_arena_base_is_aligned() {
    let arena = ArenaGrower::new().unwrap();
    assert!(is_aligned(arena.heap_base().as_ptr().addr()));
    assert_eq!(arena.capacity(), DEFAULT_ARENA_CAPACITY);
  }

  #[cfg(unix)]
  #[test]
  fn test_sbrk_base_is_aligned() {
    let grower = SbrkGrower::new().unwrap();
    let base = grower.heap_base().as_ptr().addr();

    assert!(is_aligned(base));
    assert!(!grower.program_break().is_null());
  }

  // Moves the real program break, which the test harness's own malloc may
  // share. Run alone with `--ignored --test-threads=1`.
  #[cfg(unix)]
  #[test]
  #[ignore]
  fn test_sbrk_heap() {
    use crate::allocator::Allocator;

    let mut heap = Allocator::init(SbrkGrower::new().unwrap()).unwrap();
    let base = heap.grower().heap_base().as_ptr().addr();

    let a = heap.allocate(64).unwrap();
    let b = heap.allocate(4096).unwrap();
    assert!(a.as_ptr().addr() > base);
    assert!(heap.grower().program_break().addr() >= b.as_ptr().addr() + 4096);

    unsafe {
      a.as_ptr().write_bytes(0xA5, 64);
      heap.deallocate(a).unwrap();
      heap.deallocate(b).unwrap();
    }
    heap.check().unwrap();
    heap.shutdown();
  }
}
