use tallocator::{MemEnv, MemError, MemResult, MemUsage};
use tracing_subscriber::EnvFilter;

/// Prints the usage counters of the context.
fn print_usage(
  label: &str,
  usage: MemUsage,
) {
  println!(
    "[{}] blocks = {} (peak {}), bytes = {} (peak {})",
    label, usage.count, usage.count_peak, usage.total, usage.total_peak,
  );
}

fn main() -> MemResult<()> {
  // RUST_LOG=tallocator=trace shows every allocation.
  tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

  let mut env = MemEnv::new();
  env.mem_limit(1)?;
  print_usage("start", env.usage());

  // --------------------------------------------------------------------
  // 1) Take a little over half of the 1 MiB limit.
  // --------------------------------------------------------------------
  let first = env.malloc(600_000)?;
  env.fill(first, 0xAB)?;
  println!("\n[1] Allocate 600000 bytes at {:?}", env.as_ptr(first)?);
  print_usage("1", env.usage());

  // --------------------------------------------------------------------
  // 2) A second block of the same size does not fit.
  // --------------------------------------------------------------------
  match env.malloc(600_000) {
    Err(err @ MemError::LimitExceeded { .. }) => println!("\n[2] Refused: {err}"),
    other => println!("\n[2] Unexpected result: {other:?}"),
  }
  print_usage("2", env.usage());

  // --------------------------------------------------------------------
  // 3) Free the first block; the same request now succeeds.
  // --------------------------------------------------------------------
  env.free(first)?;
  let second = env.calloc(1000, 600)?;
  println!("\n[3] Allocate 1000 x 600 bytes at {:?}", env.as_ptr(second)?);
  print_usage("3", env.usage());

  // --------------------------------------------------------------------
  // 4) Using a freed handle is caught instead of corrupting the heap.
  // --------------------------------------------------------------------
  if let Err(err) = env.free(first) {
    println!("\n[4] Double free detected: {err} ({:?})", err.kind());
  }

  // --------------------------------------------------------------------
  // 5) Shrink, then walk the registry.
  // --------------------------------------------------------------------
  let second = env.realloc(second, 1, 4096)?;
  let extra = env.malloc(128)?;
  println!("\n[5] Live blocks:");
  for info in env.blocks() {
    println!("    {:?} -> {} bytes", info.block, info.size);
  }

  env.free(extra)?;
  env.free(second)?;
  print_usage("end", env.usage());

  Ok(())
}
