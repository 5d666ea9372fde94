use std::ptr::NonNull;

/// Size of one metadata word (header, footer, free-list link).
pub const WORD: usize = 8;

/// Header + footer.
pub const OVERHEAD: usize = 2 * WORD;

/// Smallest block that can be free: header, prev, next and footer.
pub const MIN_BLOCK: usize = 4 * WORD;

const ALLOC_BIT: u64 = 0x1;
const FILLER_BIT: u64 = 0x2;
const SIZE_MASK: u64 = !0x7;

/// A boundary tag: block size with the allocation flag packed into bit 0.
///
/// Sizes are multiples of 8, so the low three bits are free. Bit 0 holds the
/// allocation flag. Bit 1 marks a filler: a permanently allocated block
/// covering address space the heap does not own. Bit 2 is reserved and
/// always written as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag(u64);

impl Tag {
  pub fn new(
    size: usize,
    allocated: bool,
  ) -> Self {
    Self((size as u64 & SIZE_MASK) | if allocated { ALLOC_BIT } else { 0 })
  }

  pub fn filler(size: usize) -> Self {
    Self((size as u64 & SIZE_MASK) | ALLOC_BIT | FILLER_BIT)
  }

  pub fn from_raw(raw: u64) -> Self {
    Self(raw)
  }

  pub fn raw(self) -> u64 {
    self.0
  }

  pub fn size(self) -> usize {
    (self.0 & SIZE_MASK) as usize
  }

  pub fn is_allocated(self) -> bool {
    self.0 & ALLOC_BIT != 0
  }

  pub fn is_filler(self) -> bool {
    self.0 & FILLER_BIT != 0
  }
}

/// The managed region, addressed by byte offset from `base`.
///
/// Every metadata access goes through [`Region::read`] / [`Region::write`],
/// which refuse offsets outside `[0, len)`.
#[derive(Debug, Clone, Copy)]
pub struct Region {
  base: NonNull<u8>,
  len: usize,
}

impl Region {
  pub fn new(base: NonNull<u8>) -> Self {
    Self { base, len: 0 }
  }

  pub fn base(&self) -> NonNull<u8> {
    self.base
  }

  pub fn len(&self) -> usize {
    self.len
  }

  pub fn extend(
    &mut self,
    by: usize,
  ) {
    self.len += by;
  }

  /// Address of the byte at `offset`.
  pub fn address(
    &self,
    offset: usize,
  ) -> NonNull<u8> {
    assert!(offset <= self.len, "offset {offset:#x} past end of region ({:#x})", self.len);
    // SAFETY: offset is within the region handed out by the grower.
    unsafe { self.base.add(offset) }
  }

  /// Offset of `addr` from the region base, if it lies inside the region.
  pub fn offset_of(
    &self,
    addr: NonNull<u8>,
  ) -> Option<usize> {
    let offset = addr.as_ptr().addr().checked_sub(self.base.as_ptr().addr())?;
    (offset < self.len).then_some(offset)
  }

  pub fn read(
    &self,
    offset: usize,
  ) -> u64 {
    self.check(offset);
    // SAFETY: bounds checked above, offsets are always multiples of WORD and
    // the base is 8-byte aligned.
    unsafe { self.base.as_ptr().add(offset).cast::<u64>().read() }
  }

  pub fn write(
    &mut self,
    offset: usize,
    value: u64,
  ) {
    self.check(offset);
    // SAFETY: see `read`.
    unsafe { self.base.as_ptr().add(offset).cast::<u64>().write(value) }
  }

  fn check(
    &self,
    offset: usize,
  ) {
    assert!(
      offset % WORD == 0 && offset + WORD <= self.len,
      "metadata access at {offset:#x} outside region of {:#x} bytes",
      self.len
    );
  }

  pub fn tag(
    &self,
    offset: usize,
  ) -> Tag {
    Tag::from_raw(self.read(offset))
  }

  /// Writes matching header and footer for the block at `offset`.
  pub fn set(
    &mut self,
    offset: usize,
    size: usize,
    allocated: bool,
  ) {
    let tag = Tag::new(size, allocated).raw();
    self.write(offset, tag);
    self.write(footer_of(offset, size), tag);
  }

  /// Writes header and footer of a filler block. Only those two words are
  /// touched; the bytes in between may not belong to the heap.
  pub fn set_filler(
    &mut self,
    offset: usize,
    size: usize,
  ) {
    let tag = Tag::filler(size).raw();
    self.write(offset, tag);
    self.write(footer_of(offset, size), tag);
  }

  /// Writes a lone header with no footer (the terminal marker).
  pub fn set_header(
    &mut self,
    offset: usize,
    size: usize,
    allocated: bool,
  ) {
    self.write(offset, Tag::new(size, allocated).raw());
  }

  pub fn size_of(
    &self,
    offset: usize,
  ) -> usize {
    self.tag(offset).size()
  }

  pub fn is_allocated(
    &self,
    offset: usize,
  ) -> bool {
    self.tag(offset).is_allocated()
  }

  /// Tag of the block ending right before `offset`, read from its footer.
  pub fn left_tag(
    &self,
    offset: usize,
  ) -> Tag {
    self.tag(offset - WORD)
  }
}

pub fn footer_of(
  offset: usize,
  size: usize,
) -> usize {
  offset + size - WORD
}

pub fn payload_of(offset: usize) -> usize {
  offset + WORD
}

pub fn block_of(payload: usize) -> usize {
  payload - WORD
}
