use std::time::{Duration, Instant};

use anyhow::Result;

/// Polls `check` until it yields a value. Intended for state that a spawned
/// task updates in the background.
pub async fn wait_until<T, F>(description: &str, timeout: Duration, mut check: F) -> Result<T>
where
    F: FnMut() -> Option<T>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(value) = check() {
            return Ok(value);
        }
        if Instant::now() >= deadline {
            anyhow::bail!("timeout waiting for {description}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
