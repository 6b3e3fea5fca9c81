use log::warn;
use tokio::time::{sleep, Duration};

use crate::error::Result;

/// Runs `f` until it succeeds, fails with a non-transient error, or `retries`
/// attempts have been made
///
/// The delay grows linearly with the attempt number.
pub async fn with_retry<F, Fut, T>(f: F, retries: u32, delay: Duration) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempts = 0;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                attempts += 1;
                if !e.is_transient() || attempts >= retries.max(1) {
                    return Err(e);
                }
                warn!("Transient failure (attempt {}/{}): {}", attempts, retries, e);
                sleep(delay * attempts).await;
            }
        }
    }
}
