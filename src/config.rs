use serde::{Deserialize, Serialize};

/// Settings applied when a [`MemEnv`](crate::MemEnv) is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemConfig {
  /// Memory ceiling in megabytes, descriptor overhead included. `None` is unbounded.
  pub limit_mb: Option<usize>,
  /// Maximum number of simultaneously live blocks.
  pub max_blocks: usize,
}

impl MemConfig {
  pub const DEFAULT_MAX_BLOCKS: usize = i32::MAX as usize;

  pub fn with_limit_mb(
    mut self,
    limit_mb: usize,
  ) -> Self {
    self.limit_mb = Some(limit_mb);
    self
  }

  pub fn with_max_blocks(
    mut self,
    max_blocks: usize,
  ) -> Self {
    self.max_blocks = max_blocks;
    self
  }
}

impl Default for MemConfig {
  fn default() -> Self {
    Self {
      limit_mb: None,
      max_blocks: Self::DEFAULT_MAX_BLOCKS,
    }
  }
}
