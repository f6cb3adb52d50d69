use std::{mem, ptr::NonNull};

use crate::align;

/// Sentinel stored in the tag of every live descriptor.
pub const MEM_MAGIC: u32 = 0x4D45_4D31;

/// Per-block overhead charged against the memory limit.
pub const MEM_DESC_SIZE: usize = align!(mem::size_of::<Descriptor>());

/// Bookkeeping record of one live block.
///
/// Descriptors live in the context's slot table rather than in front of the
/// payload, so a bad handle can never make the allocator read foreign memory.
#[derive(Debug)]
pub(crate) struct Descriptor {
  pub tag: u32,
  pub generation: u32,
  /// Payload size plus [`MEM_DESC_SIZE`].
  pub size: usize,
  pub prev: Option<usize>,
  pub next: Option<usize>,
  pub payload: Option<NonNull<u8>>,
}

impl Descriptor {
  pub fn vacant() -> Self {
    Self {
      tag: 0,
      generation: 0,
      size: 0,
      prev: None,
      next: None,
      payload: None,
    }
  }

  pub fn is_live(&self) -> bool {
    self.tag == MEM_MAGIC
  }

  pub fn payload_len(&self) -> usize {
    self.size - MEM_DESC_SIZE
  }
}

/// Handle to a block obtained from a [`MemEnv`](crate::MemEnv).
///
/// A handle is only valid until its block is freed or reallocated; using it
/// afterwards is reported as an invalid pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Block {
  pub(crate) env: u32,
  pub(crate) slot: u32,
  pub(crate) generation: u32,
}

impl Block {
  pub(crate) fn new(
    env: u32,
    slot: usize,
    generation: u32,
  ) -> Self {
    Self {
      env,
      slot: slot as u32,
      generation,
    }
  }

  pub(crate) fn slot(&self) -> usize {
    self.slot as usize
  }
}

/// A live block as seen while walking the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  pub block: Block,
  /// Bytes charged for the block, descriptor overhead included.
  pub size: usize,
}
