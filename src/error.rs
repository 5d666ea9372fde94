use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocError {
  #[error("out of memory (requested {requested} bytes)")]
  OutOfMemory { requested: usize },

  #[error("heap bootstrap failed: could not obtain {requested} bytes")]
  InitFailed { requested: usize },

  #[error("double free detected at address {addr:#x}")]
  DoubleFree { addr: usize },

  #[error("address {addr:#x} was not returned by this allocator")]
  InvalidPointer { addr: usize },

  #[error("resizing an allocation is not supported")]
  Unsupported,

  #[error("heap grew non-contiguously (expected {expected:#x}, got {got:#x})")]
  NonContiguous { expected: usize, got: usize },

  #[error("heap corrupted at offset {offset:#x}: {reason}")]
  Corrupted { offset: usize, reason: &'static str },
}

pub type Result<T> = std::result::Result<T, AllocError>;
