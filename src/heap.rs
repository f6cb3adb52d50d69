use std::ptr::NonNull;

use libc::c_void;

/// The native allocator underneath a [`MemEnv`](crate::MemEnv).
///
/// # Safety
///
/// Implementations must return pointers valid for reads and writes of the
/// requested size until they are passed to [`NativeHeap::release`] or
/// [`NativeHeap::reallocate`]. A `None` from `reallocate` must leave the
/// original block untouched.
pub unsafe trait NativeHeap {
  fn allocate(
    &mut self,
    size: usize,
  ) -> Option<NonNull<u8>>;

  /// # Safety
  ///
  /// `ptr` must come from this heap and not have been released.
  unsafe fn reallocate(
    &mut self,
    ptr: NonNull<u8>,
    size: usize,
  ) -> Option<NonNull<u8>>;

  /// # Safety
  ///
  /// `ptr` must come from this heap and not have been released.
  unsafe fn release(
    &mut self,
    ptr: NonNull<u8>,
  );
}

/// `malloc(3)`, `realloc(3)` and `free(3)` from the C library.
#[derive(Debug, Default, Clone, Copy)]
pub struct LibcHeap;

unsafe impl NativeHeap for LibcHeap {
  fn allocate(
    &mut self,
    size: usize,
  ) -> Option<NonNull<u8>> {
    NonNull::new(unsafe { libc::malloc(size) } as *mut u8)
  }

  unsafe fn reallocate(
    &mut self,
    ptr: NonNull<u8>,
    size: usize,
  ) -> Option<NonNull<u8>> {
    NonNull::new(unsafe { libc::realloc(ptr.as_ptr() as *mut c_void, size) } as *mut u8)
  }

  unsafe fn release(
    &mut self,
    ptr: NonNull<u8>,
  ) {
    unsafe { libc::free(ptr.as_ptr() as *mut c_void) }
  }
}
