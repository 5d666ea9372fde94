/// Size of the alignment unit. Every block size and every payload address is
/// a multiple of it.
pub const ALIGNMENT: usize = 8;

/// Rounds the given byte count up to the alignment unit.
///
/// # Examples
///
/// ```rust
/// use tagalloc::align;
///
/// assert_eq!(align!(13), 16);
/// assert_eq!(align!(16), 16);
/// assert_eq!(align!(1), 8);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + $crate::align::ALIGNMENT - 1) & !($crate::align::ALIGNMENT - 1)
  };
}

/// Like [`align!`] but returns `None` instead of wrapping on overflow.
pub fn checked_align(value: usize) -> Option<usize> {
  Some(value.checked_add(ALIGNMENT - 1)? & !(ALIGNMENT - 1))
}

pub fn is_aligned(value: usize) -> bool {
  value & (ALIGNMENT - 1) == 0
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_align() {
    let mut alignments = Vec::new();

    for i in 0..10 {
      let sizes = (ALIGNMENT * i + 1)..=(ALIGNMENT * (i + 1));

      let expected_alignment = ALIGNMENT * (i + 1);

      alignments.push((sizes, expected_alignment));
    }

    for (sizes, expected) in alignments {
      for size in sizes {
        assert_eq!(expected, align!(size));
        assert_eq!(Some(expected), checked_align(size));
        assert!(is_aligned(align!(size)));
      }
    }
  }

  #[test]
  fn test_checked_align_overflow() {
    assert_eq!(checked_align(usize::MAX), None);
    assert_eq!(checked_align(usize::MAX - 7), Some(usize::MAX - 7));
    assert_eq!(checked_align(0), Some(0));
  }
}
