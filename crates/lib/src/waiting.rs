//! Run a slow primary operation while refreshing a progress indicator.
//!
//! The tick runs on its own task, immediately and then every interval, until the primary
//! settles. It is then cancelled and awaited, so nothing from it outlives the call. If the
//! call unwinds or is dropped early, the tick task is cancelled and aborted instead. Tick
//! failures and panics are logged and never reach the caller.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;

/// Await `primary` while calling `on_tick` periodically; return the primary's result unchanged.
pub async fn run_with_progress<T, E, P, F, Fut, TE>(
    primary: P,
    on_tick: F,
    tick_interval: Duration,
) -> Result<T, E>
where
    P: Future<Output = Result<T, E>>,
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), TE>> + Send + 'static,
    TE: Display + Send + 'static,
{
    let cancel = CancellationToken::new();
    let _cancel_on_unwind = cancel.clone().drop_guard();
    let ticker = AbortOnDropHandle::new(tokio::spawn(tick_until_cancelled(
        on_tick,
        tick_interval,
        cancel.clone(),
    )));

    let result = primary.await;

    cancel.cancel();
    if let Err(e) = ticker.await {
        if e.is_panic() {
            log::warn!("progress: tick task panicked: {}", e);
        }
    }
    result
}

async fn tick_until_cancelled<F, Fut, TE>(mut on_tick: F, interval: Duration, cancel: CancellationToken)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), TE>>,
    TE: Display,
{
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            res = on_tick() => {
                if let Err(e) = res {
                    log::debug!("progress: tick failed: {}", e);
                }
            }
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}
