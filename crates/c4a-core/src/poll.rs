use std::future::Future;

use serde::Serialize;
use tokio::time::{Instant, sleep};

use crate::error::{CloudError, ErrorDetails};
use crate::job::WaitOptions;

/// Re-read a server-side snapshot until `is_terminal` holds.
///
/// On an expired deadline the error message carries `describe(last)` and the
/// error's `response` carries the last snapshot itself.
pub(crate) async fn poll_until_terminal<T, F, Fut>(
    what: &str,
    id: &str,
    options: &WaitOptions,
    mut fetch: F,
    is_terminal: impl Fn(&T) -> bool,
    describe: impl Fn(&T) -> String,
) -> Result<T, CloudError>
where
    T: Serialize,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CloudError>>,
{
    let started = Instant::now();
    let deadline = options.deadline();
    let mut polls: u32 = 0;

    loop {
        let snapshot = fetch().await?;
        polls += 1;

        if is_terminal(&snapshot) {
            tracing::info!(%id, polls, "{} reached terminal state: {}", what, describe(&snapshot));
            return Ok(snapshot);
        }

        if let Some(limit) = deadline
            && started.elapsed() >= limit
        {
            let message = format!(
                "Timeout waiting for {} {} after {}s. {}",
                what,
                id,
                limit.as_secs_f64(),
                describe(&snapshot)
            );
            let last = serde_json::to_value(&snapshot).unwrap_or_default();
            return Err(CloudError::Timeout(
                ErrorDetails::new(message).with_response(last),
            ));
        }

        tracing::debug!(%id, polls, "{} still in progress: {}", what, describe(&snapshot));
        sleep(options.poll_interval).await;
    }
}
