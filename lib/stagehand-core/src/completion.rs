//! Helpers for waiting on groups of fallible futures.
//!
//! Both helpers drive every future they are given to completion, even after one of them has failed. Dropping a sibling
//! mid-flight would cancel whatever it was doing, and nothing in the service tree is prepared to be cancelled halfway
//! through a start or stop.

use std::{fmt, future::Future};

use futures::stream::{FuturesUnordered, StreamExt as _};
use tracing::debug;

/// Waits for all of the given futures, failing with the first error observed.
///
/// On success, the outputs are returned in the same order as the input futures. If any future fails, the error of the
/// first future to fail (by completion order, not input order) is returned. Any further failures are consumed and
/// logged at debug level, but are otherwise discarded: callers cannot tell whether one or several futures failed.
pub async fn gather_results<I, F, T, E>(futures: I) -> Result<Vec<T>, E>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let mut pending = futures
        .into_iter()
        .enumerate()
        .map(|(idx, fut)| async move { (idx, fut.await) })
        .collect::<FuturesUnordered<_>>();

    let mut outputs = std::iter::repeat_with(|| None).take(pending.len()).collect::<Vec<_>>();
    let mut first_failure = None;

    while let Some((idx, result)) = pending.next().await {
        match result {
            Ok(output) => outputs[idx] = Some(output),
            Err(e) => {
                if first_failure.is_none() {
                    first_failure = Some(e);
                } else {
                    debug!(index = idx, error = %e, "Discarding failure observed after the first failure.");
                }
            }
        }
    }

    match first_failure {
        Some(e) => Err(e),
        None => Ok(outputs.into_iter().flatten().collect()),
    }
}

/// Waits for all of the given futures, returning every outcome.
///
/// Outcomes are returned in the same order as the input futures, regardless of the order in which they completed.
pub async fn settle_all<I, F, T, E>(futures: I) -> Vec<Result<T, E>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>>,
{
    let mut pending = futures
        .into_iter()
        .enumerate()
        .map(|(idx, fut)| async move { (idx, fut.await) })
        .collect::<FuturesUnordered<_>>();

    let mut outcomes = std::iter::repeat_with(|| None).take(pending.len()).collect::<Vec<_>>();
    while let Some((idx, result)) = pending.next().await {
        outcomes[idx] = Some(result);
    }

    outcomes.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use std::{
        pin::Pin,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
    };

    use tokio::sync::oneshot;
    use tokio_test::{assert_pending, assert_ready, task::spawn};

    use super::*;

    type BoxedResult<T> = Pin<Box<dyn Future<Output = Result<T, &'static str>> + Send>>;

    #[tokio::test]
    async fn gather_results_preserves_input_order() {
        let (tx_first, rx_first) = oneshot::channel::<u32>();
        let (tx_second, rx_second) = oneshot::channel::<u32>();

        let futures: Vec<BoxedResult<u32>> = vec![
            Box::pin(async move { rx_first.await.map_err(|_| "dropped") }),
            Box::pin(async move { rx_second.await.map_err(|_| "dropped") }),
        ];
        let mut gathered = spawn(gather_results(futures));
        assert_pending!(gathered.poll());

        // Complete the second future first.
        tx_second.send(2).unwrap();
        assert_pending!(gathered.poll());

        tx_first.send(1).unwrap();
        let outputs = assert_ready!(gathered.poll());
        assert_eq!(outputs, Ok(vec![1, 2]));
    }

    #[tokio::test]
    async fn gather_results_empty_succeeds() {
        let futures: Vec<std::future::Ready<Result<(), &'static str>>> = Vec::new();
        assert_eq!(gather_results(futures).await, Ok(Vec::new()));
    }

    #[tokio::test]
    async fn gather_results_returns_first_failure_by_completion_order() {
        let (tx_early, rx_early) = oneshot::channel::<()>();
        let (tx_late, rx_late) = oneshot::channel::<()>();

        let futures: Vec<BoxedResult<()>> = vec![
            Box::pin(async move {
                let _ = rx_late.await;
                Err("registered first, failed last")
            }),
            Box::pin(async move {
                let _ = rx_early.await;
                Err("registered last, failed first")
            }),
        ];
        let mut gathered = spawn(gather_results(futures));
        assert_pending!(gathered.poll());

        tx_early.send(()).unwrap();
        assert_pending!(gathered.poll());

        tx_late.send(()).unwrap();
        let result = assert_ready!(gathered.poll());
        assert_eq!(result, Err("registered last, failed first"));
    }

    #[tokio::test]
    async fn gather_results_drives_all_futures_after_failure() {
        let completed = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = oneshot::channel::<()>();

        let slow_completed = Arc::clone(&completed);
        let futures: Vec<BoxedResult<()>> = vec![
            Box::pin(async { Err("fails immediately") }),
            Box::pin(async move {
                let _ = rx.await;
                slow_completed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        ];
        let mut gathered = spawn(gather_results(futures));

        // The failure is already known, but the slow sibling has not finished yet.
        assert_pending!(gathered.poll());
        assert_eq!(completed.load(Ordering::SeqCst), 0);

        tx.send(()).unwrap();
        let result = assert_ready!(gathered.poll());
        assert_eq!(result, Err("fails immediately"));
        assert_eq!(completed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn settle_all_reports_every_outcome() {
        let outcomes = settle_all(vec![
            futures::future::ready(Ok(1)),
            futures::future::ready(Err("second")),
            futures::future::ready(Ok(3)),
            futures::future::ready(Err("fourth")),
        ])
        .await;

        assert_eq!(outcomes, vec![Ok(1), Err("second"), Ok(3), Err("fourth")]);
    }
}
