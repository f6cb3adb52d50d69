use std::sync::atomic::{AtomicU32, Ordering};

use tracing::{error, trace, warn};

use crate::{
  block::{Block, BlockInfo, Descriptor, MEM_DESC_SIZE, MEM_MAGIC},
  config::MemConfig,
  error::{MemError, MemResult},
  heap::{LibcHeap, NativeHeap},
};

static NEXT_ENV_ID: AtomicU32 = AtomicU32::new(1);

/// Allocation context: the live-block registry plus usage statistics.
///
/// ```text
///   head
///    │
///    ▼
///   ┌──────────┐ next ┌──────────┐ next ┌──────────┐
///   │ slot 2   │─────▶│ slot 0   │─────▶│ slot 1   │──▶ None
///   │ tag,size │◀─────│ tag,size │◀─────│ tag,size │
///   └────┬─────┘ prev └────┬─────┘ prev └────┬─────┘
///        ▼                 ▼                 ▼
///     payload           payload           payload      (native heap)
/// ```
///
/// Newest blocks sit at the head. Descriptors are kept in a slot table; a
/// [`Block`] handle names a slot and the generation it was issued for.
///
/// A context is single-threaded: it is neither `Send` nor `Sync`, and every
/// mutation goes through `&mut self`.
pub struct MemEnv<H: NativeHeap = LibcHeap> {
  id: u32,
  pub(crate) heap: H,
  slots: Vec<Descriptor>,
  vacant: Vec<usize>,
  head: Option<usize>,
  pub(crate) count: usize,
  pub(crate) count_peak: usize,
  pub(crate) total: usize,
  pub(crate) total_peak: usize,
  pub(crate) limit: usize,
  max_blocks: usize,
}

impl MemEnv {
  pub fn new() -> Self {
    Self::with_heap(LibcHeap)
  }

  pub fn with_config(config: MemConfig) -> MemResult<Self> {
    Self::with_heap_and_config(LibcHeap, config)
  }
}

impl Default for MemEnv {
  fn default() -> Self {
    Self::new()
  }
}

impl<H: NativeHeap> MemEnv<H> {
  pub fn with_heap(heap: H) -> Self {
    Self {
      id: NEXT_ENV_ID.fetch_add(1, Ordering::Relaxed),
      heap,
      slots: Vec::new(),
      vacant: Vec::new(),
      head: None,
      count: 0,
      count_peak: 0,
      total: 0,
      total_peak: 0,
      limit: usize::MAX,
      max_blocks: MemConfig::DEFAULT_MAX_BLOCKS,
    }
  }

  pub fn with_heap_and_config(
    heap: H,
    config: MemConfig,
  ) -> MemResult<Self> {
    if config.max_blocks < 1 {
      return Err(MemError::InvalidParameter {
        func: "with_config",
        name: "max_blocks",
        value: config.max_blocks,
      });
    }

    let mut env = Self::with_heap(heap);
    // Handles address slots with 32 bits.
    env.max_blocks = config.max_blocks.min(u32::MAX as usize);

    if let Some(limit_mb) = config.limit_mb {
      env.mem_limit(limit_mb)?;
    }

    Ok(env)
  }

  pub fn heap(&self) -> &H {
    &self.heap
  }

  /// Live blocks, newest first.
  pub fn blocks(&self) -> Blocks<'_, H> {
    Blocks {
      env: self,
      cursor: self.head,
    }
  }

  /// Walks the registry and checks it against the counters.
  pub fn check_integrity(&self) -> MemResult<()> {
    let func = "check_integrity";
    let mut count = 0usize;
    let mut total = 0usize;
    let mut prev = None;
    let mut cursor = self.head;

    while let Some(slot) = cursor {
      let desc = &self.slots[slot];

      // A walk longer than the slot table means the list loops.
      if count == self.slots.len() || !desc.is_live() || desc.prev != prev {
        error!(func, slot, "registry links are corrupted");
        return Err(MemError::Accounting { func });
      }

      count += 1;
      total = total.checked_add(desc.size).ok_or(MemError::Accounting { func })?;
      prev = Some(slot);
      cursor = desc.next;
    }

    let counters_match = count == self.count && total == self.total;
    let peaks_hold = self.count_peak >= self.count && self.total_peak >= self.total;

    if !counters_match || !peaks_hold {
      error!(
        func,
        walked_count = count,
        walked_total = total,
        count = self.count,
        total = self.total,
        "registry does not match usage counters"
      );
      return Err(MemError::Accounting { func });
    }

    Ok(())
  }

  /// Maps a handle to its slot, rejecting foreign, stale and released handles.
  pub(crate) fn resolve(
    &self,
    func: &'static str,
    block: Block,
  ) -> MemResult<usize> {
    let slot = block.slot();
    let valid = block.env == self.id
      && self
        .slots
        .get(slot)
        .is_some_and(|desc| desc.is_live() && desc.generation == block.generation);

    if !valid {
      error!(func, ?block, "invalid pointer");
      return Err(MemError::InvalidPointer { func });
    }

    Ok(slot)
  }

  pub(crate) fn descriptor(
    &self,
    slot: usize,
  ) -> &Descriptor {
    &self.slots[slot]
  }

  /// Unified allocate / reallocate / free.
  ///
  /// With no block this allocates `size` bytes. With a block and a zero size
  /// the block is freed and `None` returned; otherwise the block is resized
  /// and a fresh handle returned, invalidating the old one.
  ///
  /// Every check runs before the registry is touched, so a failure leaves
  /// the context exactly as it was.
  pub(crate) fn dma(
    &mut self,
    func: &'static str,
    block: Option<Block>,
    size: usize,
  ) -> MemResult<Option<Block>> {
    let old = match block {
      None => None,
      Some(block) => {
        let slot = self.resolve(func, block)?;
        let old_size = self.slots[slot].size;

        if !(self.count >= 1 && self.total >= old_size) {
          error!(
            func,
            count = self.count,
            total = self.total,
            old_size,
            "usage counters corrupted"
          );
          return Err(MemError::Accounting { func });
        }

        Some((slot, old_size))
      }
    };

    if let (Some((slot, _)), 0) = (old, size) {
      self.release(func, slot);
      return Ok(None);
    }

    if size > usize::MAX - MEM_DESC_SIZE {
      return Err(MemError::SizeTooLarge { func, size });
    }
    let payload_len = size;
    let size = size + MEM_DESC_SIZE;

    let (live_count, live_total) = match old {
      Some((_, old_size)) => (self.count - 1, self.total - old_size),
      None => (self.count, self.total),
    };

    if size > self.limit.saturating_sub(live_total) {
      warn!(func, size, total = live_total, limit = self.limit, "memory allocation limit exceeded");
      return Err(MemError::LimitExceeded {
        func,
        requested: size,
        total: live_total,
        limit: self.limit,
      });
    }

    if live_count >= self.max_blocks {
      warn!(func, count = live_count, "too many memory blocks allocated");
      return Err(MemError::TooManyBlocks { func, count: live_count });
    }

    // malloc(0) may legitimately return null.
    let native_len = payload_len.max(1);
    let payload = match old {
      None => self.heap.allocate(native_len),
      Some((slot, _)) => match self.slots[slot].payload {
        Some(ptr) => unsafe { self.heap.reallocate(ptr, native_len) },
        None => return Err(MemError::Accounting { func }),
      },
    };
    let Some(payload) = payload else {
      warn!(func, size, "no memory available");
      return Err(MemError::NoMemory { func, size });
    };

    let slot = match old {
      Some((slot, old_size)) => {
        self.unlink(slot);
        self.count -= 1;
        self.total -= old_size;

        if self.slots[slot].generation == u32::MAX {
          self.retire(slot);
          self.vacant_slot()
        } else {
          slot
        }
      }
      None => self.vacant_slot(),
    };

    let generation = {
      let desc = &mut self.slots[slot];
      desc.generation += 1;
      desc.tag = MEM_MAGIC;
      desc.size = size;
      desc.payload = Some(payload);
      desc.generation
    };
    self.link(slot);

    self.count += 1;
    if self.count_peak < self.count {
      self.count_peak = self.count;
    }
    self.total += size;
    if self.total_peak < self.total {
      self.total_peak = self.total;
    }

    trace!(func, slot, size, count = self.count, total = self.total, "block allocated");

    Ok(Some(Block::new(self.id, slot, generation)))
  }

  fn release(
    &mut self,
    func: &'static str,
    slot: usize,
  ) {
    self.unlink(slot);

    let desc = &mut self.slots[slot];
    let size = desc.size;
    let payload = desc.payload.take();
    desc.tag = 0;
    desc.size = 0;
    desc.generation = desc.generation.saturating_add(1);

    self.count -= 1;
    self.total -= size;

    if let Some(ptr) = payload {
      unsafe { self.heap.release(ptr) };
    }

    // A slot whose generation is exhausted is never handed out again, so no
    // old handle can match a later block.
    if self.slots[slot].generation < u32::MAX {
      self.vacant.push(slot);
    }

    trace!(func, slot, size, count = self.count, total = self.total, "block freed");
  }

  fn release_all(&mut self) {
    while let Some(slot) = self.head {
      self.release("drop", slot);
    }
  }

  /// Takes an unlinked slot out of service for good.
  fn retire(
    &mut self,
    slot: usize,
  ) {
    let desc = &mut self.slots[slot];
    desc.tag = 0;
    desc.size = 0;
    desc.payload = None;
    trace!(slot, "slot retired");
  }

  fn vacant_slot(&mut self) -> usize {
    match self.vacant.pop() {
      Some(slot) => slot,
      None => {
        self.slots.push(Descriptor::vacant());
        self.slots.len() - 1
      }
    }
  }

  fn link(
    &mut self,
    slot: usize,
  ) {
    let next = self.head;

    let desc = &mut self.slots[slot];
    desc.prev = None;
    desc.next = next;

    if let Some(next) = next {
      self.slots[next].prev = Some(slot);
    }
    self.head = Some(slot);
  }

  fn unlink(
    &mut self,
    slot: usize,
  ) {
    let desc = &mut self.slots[slot];
    let (prev, next) = (desc.prev.take(), desc.next.take());

    match prev {
      None => self.head = next,
      Some(prev) => self.slots[prev].next = next,
    }
    if let Some(next) = next {
      self.slots[next].prev = prev;
    }
  }
}

impl<H: NativeHeap> Drop for MemEnv<H> {
  fn drop(&mut self) {
    if self.count > 0 {
      warn!(count = self.count, total = self.total, "releasing blocks still allocated");
    }
    self.release_all();
  }
}

/// Iterator returned by [`MemEnv::blocks`].
pub struct Blocks<'a, H: NativeHeap> {
  env: &'a MemEnv<H>,
  cursor: Option<usize>,
}

impl<H: NativeHeap> Iterator for Blocks<'_, H> {
  type Item = BlockInfo;

  fn next(&mut self) -> Option<BlockInfo> {
    let slot = self.cursor?;
    let desc = &self.env.slots[slot];
    self.cursor = desc.next;

    Some(BlockInfo {
      block: Block::new(self.env.id, slot, desc.generation),
      size: desc.size,
    })
  }
}
