use thiserror::Error;

/// Result type of every allocator entry point.
pub type MemResult<T> = Result<T, MemError>;

/// Broad class of a [`MemError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  /// Bad sizes, counts or size arithmetic. Detected before the registry is touched.
  Argument,
  /// Stale, foreign or corrupted handle, or broken bookkeeping.
  Integrity,
  /// Memory limit, block count or the native heap ran out.
  Exhaustion,
}

/// Allocator failures. `func` names the entry point that detected the problem.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemError {
  #[error("{func}: {name} = {value}; invalid parameter")]
  InvalidParameter {
    func: &'static str,
    name: &'static str,
    value: usize,
  },

  #[error("{func}: n = {n}, size = {size}; array too large")]
  ArrayTooLarge {
    func: &'static str,
    n: usize,
    size: usize,
  },

  #[error("{func}: size too large")]
  SizeTooLarge { func: &'static str, size: usize },

  #[error("{func}: invalid pointer")]
  InvalidPointer { func: &'static str },

  #[error("{func}: memory allocation error")]
  Accounting { func: &'static str },

  #[error("{func}: offset {offset} + {len} bytes exceeds block of {capacity} bytes")]
  OutOfBounds {
    func: &'static str,
    offset: usize,
    len: usize,
    capacity: usize,
  },

  #[error("{func}: memory allocation limit exceeded")]
  LimitExceeded {
    func: &'static str,
    requested: usize,
    total: usize,
    limit: usize,
  },

  #[error("{func}: too many memory blocks allocated")]
  TooManyBlocks { func: &'static str, count: usize },

  #[error("{func}: no memory available")]
  NoMemory { func: &'static str, size: usize },
}

impl MemError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      MemError::InvalidParameter { .. }
      | MemError::ArrayTooLarge { .. }
      | MemError::SizeTooLarge { .. } => ErrorKind::Argument,
      MemError::InvalidPointer { .. }
      | MemError::Accounting { .. }
      | MemError::OutOfBounds { .. } => ErrorKind::Integrity,
      MemError::LimitExceeded { .. }
      | MemError::TooManyBlocks { .. }
      | MemError::NoMemory { .. } => ErrorKind::Exhaustion,
    }
  }

  /// Name of the entry point that reported the error.
  pub fn func(&self) -> &'static str {
    match self {
      MemError::InvalidParameter { func, .. }
      | MemError::ArrayTooLarge { func, .. }
      | MemError::SizeTooLarge { func, .. }
      | MemError::InvalidPointer { func }
      | MemError::Accounting { func }
      | MemError::OutOfBounds { func, .. }
      | MemError::LimitExceeded { func, .. }
      | MemError::TooManyBlocks { func, .. }
      | MemError::NoMemory { func, .. } => *func,
    }
  }
}
