use ring_pool::{allocate_id, PoolConfig, PoolError, ThreadPoolManager};
use std::thread;
use std::time::Duration;
use tracing::info;

fn square(n: u64) {
  let delay_ms = 100 + (n % 3) * 150;
  info!("Task for {} starting, will sleep for {}ms", n, delay_ms);
  thread::sleep(Duration::from_millis(delay_ms));
  info!("The square of {} is {}", n, n * n);
}

fn main() -> Result<(), PoolError> {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false) // Disable module paths for cleaner example output
    .init();

  info!("--- Basic Usage Example ---");

  let pool = ThreadPoolManager::with_config(
    PoolConfig::new(
      4,  // Worker threads
      64, // Queue capacity
    )
    .name("basic_pool"),
  )?;

  let mut submitted = 0;
  for n in 0..15u64 {
    let task_id = allocate_id();
    match pool.submit(task_id, square, n) {
      Ok(()) => {
        info!("Submitted task {} for input {}", task_id, n);
        submitted += 1;
      }
      Err(e) => tracing::error!("Failed to submit task {}: {}", task_id, e),
    }
  }

  info!("All tasks submitted. Polling for completions...");

  let mut retrieved = 0;
  while retrieved < submitted {
    let records = pool.poll_timeout(10, Duration::from_millis(50));
    if !records.is_empty() {
      let ids: Vec<_> = records.iter().map(|r| r.task_id).collect();
      info!("{} task(s) completed: {:?}", records.len(), ids);
      retrieved += records.len();
    }
  }

  info!("All completions retrieved. Destroying pool.");
  pool.destroy()?;
  info!("Pool destroyed.");
  info!("--- Basic Usage Example End ---");
  Ok(())
}
