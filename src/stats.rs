use serde::Serialize;

/// Snapshot of a context's memory usage.
///
/// Byte totals include the descriptor overhead of every block.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemUsage {
  /// Blocks currently allocated.
  pub count: usize,
  /// Highest `count` since the context was created.
  pub count_peak: usize,
  /// Bytes currently allocated.
  pub total: usize,
  /// Highest `total` since the context was created.
  pub total_peak: usize,
}
