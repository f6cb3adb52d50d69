use std::ptr::{self, NonNull};

use crate::{
  block::Block,
  env::MemEnv,
  error::{MemError, MemResult},
  heap::NativeHeap,
  stats::MemUsage,
};

/// Validates `n * size` the way the array entry points need it, without
/// performing the multiplication that could overflow.
fn array_size(
  func: &'static str,
  n: usize,
  size: usize,
) -> MemResult<usize> {
  if n < 1 {
    return Err(MemError::InvalidParameter {
      func,
      name: "n",
      value: n,
    });
  }
  if size < 1 {
    return Err(MemError::InvalidParameter {
      func,
      name: "size",
      value: size,
    });
  }
  if n > usize::MAX / size {
    return Err(MemError::ArrayTooLarge { func, n, size });
  }
  Ok(n * size)
}

impl<H: NativeHeap> MemEnv<H> {
  /// Allocates a block of `size` bytes.
  ///
  /// The block contains arbitrary data, not binary zeros.
  pub fn malloc(
    &mut self,
    size: usize,
  ) -> MemResult<Block> {
    if size < 1 {
      return Err(MemError::InvalidParameter {
        func: "malloc",
        name: "size",
        value: size,
      });
    }
    self.allocate("malloc", None, size)
  }

  /// Allocates a block of `n * size` bytes.
  ///
  /// Like [`MemEnv::malloc`], the block is *not* zero-filled.
  pub fn calloc(
    &mut self,
    n: usize,
    size: usize,
  ) -> MemResult<Block> {
    let size = array_size("calloc", n, size)?;
    self.allocate("calloc", None, size)
  }

  /// Resizes `block` to `n * size` bytes, keeping its contents up to the
  /// smaller of the two sizes.
  ///
  /// Returns a new handle; `block` is invalid afterwards.
  pub fn realloc(
    &mut self,
    block: Block,
    n: usize,
    size: usize,
  ) -> MemResult<Block> {
    let size = array_size("realloc", n, size)?;
    self.allocate("realloc", Some(block), size)
  }

  pub fn free(
    &mut self,
    block: Block,
  ) -> MemResult<()> {
    self.dma("free", Some(block), 0).map(|_| ())
  }

  fn allocate(
    &mut self,
    func: &'static str,
    block: Option<Block>,
    size: usize,
  ) -> MemResult<Block> {
    self.dma(func, block, size)?.ok_or(MemError::Accounting { func })
  }

  /// Limits the memory available to this context to `megabytes` MiB,
  /// descriptor overhead included.
  ///
  /// Blocks already allocated are kept even if they exceed the new limit;
  /// only later allocations are refused.
  pub fn mem_limit(
    &mut self,
    megabytes: usize,
  ) -> MemResult<()> {
    if megabytes < 1 {
      return Err(MemError::InvalidParameter {
        func: "mem_limit",
        name: "limit",
        value: megabytes,
      });
    }

    self.limit = if megabytes <= usize::MAX >> 20 {
      megabytes << 20
    } else {
      usize::MAX
    };

    Ok(())
  }

  /// Current limit in bytes.
  pub fn limit(&self) -> usize {
    self.limit
  }

  /// Writes the usage counters into whichever slots are given.
  pub fn mem_usage(
    &self,
    count: Option<&mut usize>,
    count_peak: Option<&mut usize>,
    total: Option<&mut usize>,
    total_peak: Option<&mut usize>,
  ) {
    let usage = self.usage();

    if let Some(count) = count {
      *count = usage.count;
    }
    if let Some(count_peak) = count_peak {
      *count_peak = usage.count_peak;
    }
    if let Some(total) = total {
      *total = usage.total;
    }
    if let Some(total_peak) = total_peak {
      *total_peak = usage.total_peak;
    }
  }

  pub fn usage(&self) -> MemUsage {
    MemUsage {
      count: self.count,
      count_peak: self.count_peak,
      total: self.total,
      total_peak: self.total_peak,
    }
  }

  /// Pointer to the payload of `block`.
  ///
  /// The pointer is valid until the block is freed or reallocated.
  pub fn as_ptr(
    &self,
    block: Block,
  ) -> MemResult<NonNull<u8>> {
    let slot = self.resolve("as_ptr", block)?;
    self.descriptor(slot).payload.ok_or(MemError::Accounting { func: "as_ptr" })
  }

  /// Requested payload size of `block`.
  pub fn payload_len(
    &self,
    block: Block,
  ) -> MemResult<usize> {
    let slot = self.resolve("payload_len", block)?;
    Ok(self.descriptor(slot).payload_len())
  }

  /// Copies `bytes` into the payload of `block` starting at `offset`.
  pub fn write_at(
    &mut self,
    block: Block,
    offset: usize,
    bytes: &[u8],
  ) -> MemResult<()> {
    let dst = self.payload_range("write_at", block, offset, bytes.len())?;
    unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), dst.as_ptr(), bytes.len()) };
    Ok(())
  }

  /// Sets every payload byte of `block` to `byte`.
  pub fn fill(
    &mut self,
    block: Block,
    byte: u8,
  ) -> MemResult<()> {
    let len = self.payload_len(block)?;
    let dst = self.payload_range("fill", block, 0, len)?;
    unsafe { ptr::write_bytes(dst.as_ptr(), byte, len) };
    Ok(())
  }

  fn payload_range(
    &self,
    func: &'static str,
    block: Block,
    offset: usize,
    len: usize,
  ) -> MemResult<NonNull<u8>> {
    let slot = self.resolve(func, block)?;
    let desc = self.descriptor(slot);
    let capacity = desc.payload_len();

    if offset.checked_add(len).is_none_or(|end| end > capacity) {
      return Err(MemError::OutOfBounds {
        func,
        offset,
        len,
        capacity,
      });
    }

    let payload = desc.payload.ok_or(MemError::Accounting { func })?;
    Ok(unsafe { payload.add(offset) })
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;
  use proptest::prelude::*;

  use super::*;
  use crate::{
    block::MEM_DESC_SIZE,
    config::MemConfig,
    error::ErrorKind,
    heap::testing::CountingHeap,
  };

  #[test]
  fn test_argument_errors() {
    let mut env = MemEnv::with_heap(CountingHeap::default());

    assert_eq!(
      env.malloc(0),
      Err(MemError::InvalidParameter {
        func: "malloc",
        name: "size",
        value: 0
      })
    );
    assert_eq!(
      env.calloc(0, 8),
      Err(MemError::InvalidParameter {
        func: "calloc",
        name: "n",
        value: 0
      })
    );
    assert_eq!(
      env.calloc(8, 0),
      Err(MemError::InvalidParameter {
        func: "calloc",
        name: "size",
        value: 0
      })
    );

    let block = env.malloc(4).unwrap();
    assert_eq!(
      env.realloc(block, 0, 1),
      Err(MemError::InvalidParameter {
        func: "realloc",
        name: "n",
        value: 0
      })
    );
    assert_eq!(
      env.realloc(block, 1, 0),
      Err(MemError::InvalidParameter {
        func: "realloc",
        name: "size",
        value: 0
      })
    );
    assert_eq!(
      env.mem_limit(0),
      Err(MemError::InvalidParameter {
        func: "mem_limit",
        name: "limit",
        value: 0
      })
    );

    // The block survives every rejected call.
    assert_eq!(env.payload_len(block), Ok(4));
    assert_eq!(env.heap().allocations(), 1);
  }

  #[test]
  fn test_calloc_overflow_skips_native_heap() {
    let mut env = MemEnv::with_heap(CountingHeap::default());

    let err = env.calloc(usize::MAX / 2 + 1, 2).unwrap_err();
    assert_eq!(
      err,
      MemError::ArrayTooLarge {
        func: "calloc",
        n: usize::MAX / 2 + 1,
        size: 2
      }
    );
    assert_eq!(err.kind(), ErrorKind::Argument);

    let block = env.malloc(1).unwrap();
    assert!(matches!(
      env.realloc(block, usize::MAX, usize::MAX),
      Err(MemError::ArrayTooLarge { func: "realloc", .. })
    ));

    // Fits in usize but not once the descriptor is added.
    assert!(matches!(
      env.calloc(usize::MAX, 1),
      Err(MemError::SizeTooLarge { func: "calloc", .. })
    ));

    assert_eq!(env.heap().allocations(), 1);
    assert_eq!(env.heap().reallocations(), 0);
  }

  #[test]
  fn test_double_free_is_detected() {
    let mut env = MemEnv::new();

    let block = env.malloc(100).unwrap();
    env.free(block).unwrap();

    let err = env.free(block).unwrap_err();
    assert_eq!(err, MemError::InvalidPointer { func: "free" });
    assert_eq!(err.kind(), ErrorKind::Integrity);
    assert_eq!(env.usage().count, 0);
    env.check_integrity().unwrap();
  }

  #[test]
  fn test_stale_handle_after_realloc() {
    let mut env = MemEnv::new();

    let block = env.calloc(4, 8).unwrap();
    let moved = env.realloc(block, 8, 8).unwrap();

    assert_eq!(env.realloc(block, 1, 1), Err(MemError::InvalidPointer { func: "realloc" }));
    assert_eq!(env.as_ptr(block), Err(MemError::InvalidPointer { func: "as_ptr" }));
    assert_eq!(env.payload_len(moved), Ok(64));

    env.free(moved).unwrap();
  }

  #[test]
  fn test_limit_scenario() {
    let mut env = MemEnv::new();
    env.mem_limit(1).unwrap();
    assert_eq!(env.limit(), 1 << 20);

    let first = env.malloc(600_000).unwrap();
    assert_eq!(env.usage().total, 600_000 + MEM_DESC_SIZE);

    let before = env.usage();
    let err = env.malloc(600_000).unwrap_err();
    assert_eq!(
      err,
      MemError::LimitExceeded {
        func: "malloc",
        requested: 600_000 + MEM_DESC_SIZE,
        total: 600_000 + MEM_DESC_SIZE,
        limit: 1 << 20
      }
    );
    assert_eq!(err.kind(), ErrorKind::Exhaustion);
    assert_eq!(env.usage(), before);
    assert_eq!(env.blocks().count(), 1);

    env.free(first).unwrap();
    let second = env.malloc(600_000).unwrap();

    assert_eq!(
      env.usage(),
      MemUsage {
        count: 1,
        count_peak: 1,
        total: 600_000 + MEM_DESC_SIZE,
        total_peak: 600_000 + MEM_DESC_SIZE,
      }
    );
    env.free(second).unwrap();
  }

  #[test]
  fn test_realloc_growth_counts_against_limit() {
    let mut env = MemEnv::with_config(MemConfig::default().with_limit_mb(1)).unwrap();

    let block = env.malloc(700_000).unwrap();
    // The old block is credited back, so growing in place fits.
    let block = env.realloc(block, 1, 900_000).unwrap();

    assert!(matches!(
      env.realloc(block, 1, 2 << 20),
      Err(MemError::LimitExceeded { func: "realloc", .. })
    ));
    assert_eq!(env.payload_len(block), Ok(900_000));
    env.check_integrity().unwrap();
  }

  #[test]
  fn test_lower_limit_is_not_retroactive() {
    let mut env = MemEnv::new();

    let big = env.malloc(3 << 20).unwrap();
    env.mem_limit(1).unwrap();

    assert_eq!(env.payload_len(big), Ok(3 << 20));
    assert!(matches!(env.malloc(1), Err(MemError::LimitExceeded { .. })));

    // Shrinking below the limit is still allowed.
    let small = env.realloc(big, 1, 1024).unwrap();
    env.free(small).unwrap();
  }

  #[test]
  fn test_huge_limit_is_clamped() {
    let mut env = MemEnv::new();

    env.mem_limit(usize::MAX).unwrap();
    assert_eq!(env.limit(), usize::MAX);

    env.mem_limit(usize::MAX >> 20).unwrap();
    assert_eq!(env.limit(), (usize::MAX >> 20) << 20);
  }

  #[test]
  fn test_mem_usage_writes_only_requested_slots() {
    let mut env = MemEnv::new();

    let a = env.malloc(10).unwrap();
    let b = env.malloc(20).unwrap();
    env.free(a).unwrap();

    let mut count = usize::MAX;
    let mut total_peak = usize::MAX;
    let mut untouched = 7;

    env.mem_usage(Some(&mut count), None, None, Some(&mut total_peak));
    assert_eq!(count, 1);
    assert_eq!(total_peak, 30 + 2 * MEM_DESC_SIZE);
    assert_eq!(untouched, 7);

    env.mem_usage(None, Some(&mut untouched), None, None);
    assert_eq!(untouched, 2);

    env.free(b).unwrap();
  }

  #[test]
  fn test_payload_contents_survive_realloc() {
    let mut env = MemEnv::new();

    let block = env.malloc(6).unwrap();
    env.write_at(block, 0, b"tracked").unwrap_err();
    env.write_at(block, 0, b"memory").unwrap();

    let block = env.realloc(block, 64, 1).unwrap();
    env.write_at(block, 6, b" block").unwrap();

    unsafe {
      let ptr = env.as_ptr(block).unwrap();
      let bytes = std::slice::from_raw_parts(ptr.as_ptr(), 12);
      assert_eq!(bytes, b"memory block");
    }

    env.free(block).unwrap();
  }

  #[test]
  fn test_fill_and_bounds() {
    let mut env = MemEnv::new();

    let block = env.calloc(3, 4).unwrap();
    env.fill(block, 0xAB).unwrap();

    unsafe {
      let ptr = env.as_ptr(block).unwrap().as_ptr();
      for i in 0..12 {
        assert_eq!(*ptr.add(i), 0xAB);
      }
    }

    assert_eq!(
      env.write_at(block, 10, &[1, 2, 3]),
      Err(MemError::OutOfBounds {
        func: "write_at",
        offset: 10,
        len: 3,
        capacity: 12
      })
    );
    assert!(env.write_at(block, usize::MAX, &[1]).is_err());

    env.free(block).unwrap();
  }

  #[derive(Debug, Clone)]
  enum Op {
    Alloc(usize),
    Realloc(prop::sample::Index, usize),
    Free(prop::sample::Index),
  }

  fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
      (1usize..4096).prop_map(Op::Alloc),
      (any::<prop::sample::Index>(), 1usize..4096).prop_map(|(i, size)| Op::Realloc(i, size)),
      any::<prop::sample::Index>().prop_map(Op::Free),
    ]
  }

  proptest! {
    #[test]
    fn test_accounting_matches_live_blocks(ops in prop::collection::vec(op(), 1..64)) {
      let mut env = MemEnv::new();
      let mut live: Vec<(Block, usize)> = Vec::new();
      let mut last = env.usage();

      for op in ops {
        match op {
          Op::Alloc(size) => live.push((env.malloc(size).unwrap(), size)),
          Op::Realloc(i, size) if !live.is_empty() => {
            let i = i.index(live.len());
            live[i] = (env.realloc(live[i].0, 1, size).unwrap(), size);
          }
          Op::Free(i) if !live.is_empty() => {
            let (block, _) = live.swap_remove(i.index(live.len()));
            env.free(block).unwrap();
          }
          _ => {}
        }

        let usage = env.usage();
        prop_assert_eq!(usage.count, live.len());
        let expected_total: usize = live.iter().map(|(_, size)| size + MEM_DESC_SIZE).sum();
        prop_assert_eq!(usage.total, expected_total);
        prop_assert!(usage.count_peak >= last.count_peak && usage.count_peak >= usage.count);
        prop_assert!(usage.total_peak >= last.total_peak && usage.total_peak >= usage.total);
        prop_assert!(env.check_integrity().is_ok());
        last = usage;
      }

      for (block, _) in live.drain(..) {
        env.free(block).unwrap();
      }

      let usage = env.usage();
      prop_assert_eq!((usage.count, usage.total), (0, 0));
      prop_assert_eq!(usage.count_peak, last.count_peak);
      prop_assert_eq!(usage.total_peak, last.total_peak);
    }
  }
}
