use tracing::error;

use crate::error::MemError;

/// Turns allocator errors into process termination for hosts that want
/// the fail-fast contract.
///
/// ```rust,no_run
/// use tallocator::{MemEnv, OrAbort};
///
/// let mut env = MemEnv::new();
/// let block = env.malloc(128).or_abort();
/// env.free(block).or_abort();
/// ```
pub trait OrAbort<T> {
  fn or_abort(self) -> T;
}

impl<T> OrAbort<T> for Result<T, MemError> {
  fn or_abort(self) -> T {
    match self {
      Ok(value) => value,
      Err(err) => report(&err),
    }
  }
}

/// Logs the error and aborts.
///
/// Without a global subscriber the event would be dropped, so the message
/// goes to stderr instead.
pub fn report(err: &MemError) -> ! {
  if stderr_fallback() {
    eprintln!("{err}");
  } else {
    error!(func = err.func(), kind = ?err.kind(), "{err}");
  }
  std::process::abort()
}

fn stderr_fallback() -> bool {
  !tracing::dispatcher::has_been_set()
}
