//! # tallocator - A Tracked Memory Allocator
//!
//! This crate wraps the C library heap (`malloc`, `realloc`, `free`) with
//! bookkeeping: every block gets a descriptor, live blocks are kept in a
//! registry, a memory ceiling is enforced, and usage statistics with peaks
//! are reported.
//!
//! ## Overview
//!
//! ```text
//!   Allocation path:
//!
//!   malloc / calloc / realloc / free        argument checks
//!                  │
//!                  ▼
//!              MemEnv::dma                   handle, limit, block count
//!                  │
//!                  ▼
//!             NativeHeap                     libc malloc / realloc / free
//!                  │
//!                  ▼
//!          registry + counters               link at head, update peaks
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   tallocator
//!   ├── align      - Alignment macros (align!, align_to!)
//!   ├── api        - malloc, calloc, realloc, free, mem_limit, mem_usage
//!   ├── block      - Descriptor and Block handle
//!   ├── config     - MemConfig
//!   ├── env        - MemEnv: registry and allocation engine
//!   ├── error      - MemError, ErrorKind
//!   ├── fatal      - OrAbort for fail-fast hosts
//!   ├── heap       - NativeHeap trait, LibcHeap
//!   └── stats      - MemUsage snapshot
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use tallocator::{MemEnv, MemError};
//!
//! let mut env = MemEnv::new();
//! env.mem_limit(1).unwrap();
//!
//! let block = env.malloc(600_000).unwrap();
//! env.write_at(block, 0, b"hello").unwrap();
//!
//! assert!(matches!(env.malloc(600_000), Err(MemError::LimitExceeded { .. })));
//!
//! env.free(block).unwrap();
//! assert_eq!(env.usage().count, 0);
//! ```
//!
//! ## Block Accounting
//!
//! ```text
//!   One block:
//!   ┌─────────────────────────┐      ┌──────────────────────────────┐
//!   │ Descriptor (slot table) │      │   Payload (native heap)      │
//!   │  tag: MEM_MAGIC         │─────▶│                              │
//!   │  size: N + DESC         │      │      N bytes usable          │
//!   │  prev / next            │      │                              │
//!   │  generation             │      └──────────────────────────────┘
//!   └─────────────────────────┘
//!           ▲
//!           └── Block { slot, generation } returned to the user
//! ```
//!
//! The limit and the totals count `N + MEM_DESC_SIZE` per block.
//!
//! ## Errors
//!
//! Nothing here terminates the process. Every entry point returns a
//! [`MemResult`]; hosts that want the abort-on-error contract call
//! [`OrAbort::or_abort`].
//!
//! ## Limitations
//!
//! - **Single-threaded only**: a `MemEnv` is neither `Send` nor `Sync`
//! - **No zero-fill**: `calloc` does not clear memory
//! - **Native alignment only**: payloads are aligned as `malloc` aligns them

pub mod align;
mod api;
mod block;
mod config;
mod env;
mod error;
mod fatal;
mod heap;
mod stats;

pub use block::{Block, BlockInfo, MEM_DESC_SIZE, MEM_MAGIC};
pub use config::MemConfig;
pub use env::{Blocks, MemEnv};
pub use error::{ErrorKind, MemError, MemResult};
pub use fatal::{OrAbort, report};
pub use heap::{LibcHeap, NativeHeap};
pub use stats::MemUsage;
