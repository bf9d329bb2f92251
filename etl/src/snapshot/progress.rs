//! Observation of a running bulk load through the warehouse query history.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tracing::{debug, warn};

use crate::concurrency::signal::{SignalRx, SignalTx, create_signal};
use crate::destination::Warehouse;
use crate::error::ErrorKind;
use crate::etl_error;
use crate::schema::sql::quote_string;

/// Receives the cumulative number of rows produced by a load.
pub type ProgressCallback = Arc<dyn Fn(u64) + Send + Sync>;

/// Interval between two progress queries.
pub const PROGRESS_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Returns the query history lookup of the load tagged with `load_id` that ended after `horizon`.
pub fn progress_query(horizon: &str, load_id: &str) -> String {
    format!(
        "SELECT SUM(ROWS_PRODUCED) FROM TABLE(INFORMATION_SCHEMA.QUERY_HISTORY_BY_USER(\
         END_TIME_RANGE_START => {}::TIMESTAMP_LTZ, RESULT_LIMIT => 10000)) \
         WHERE QUERY_TYPE = 'COPY' AND CONTAINS(QUERY_TEXT, {})",
        quote_string(horizon),
        quote_string(load_id)
    )
}

/// Background task reporting the progress of one load.
///
/// The poller lives exactly as long as the load it observes: it is started right before the load
/// statement is issued and [`ProgressPoller::stop`] is awaited as soon as the statement returns.
/// Failed observations are logged and never reach the load.
#[derive(Debug)]
pub struct ProgressPoller {
    stop_tx: SignalTx,
    handle: Option<JoinHandle<()>>,
}

impl ProgressPoller {
    /// Starts polling every `interval`. Without a callback no task is spawned.
    pub fn start<W>(
        warehouse: W,
        horizon: &str,
        load_id: &str,
        interval: Duration,
        callback: Option<ProgressCallback>,
    ) -> ProgressPoller
    where
        W: Warehouse + Send + Sync + 'static,
    {
        let (stop_tx, stop_rx) = create_signal();
        let handle = callback.map(|callback| {
            let query = progress_query(horizon, load_id);
            tokio::spawn(poll_progress(warehouse, query, interval, callback, stop_rx))
        });

        Self { stop_tx, handle }
    }

    /// Stops the poller and waits for it to finish. No query runs after this returns.
    pub async fn stop(mut self) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.take()
            && let Err(err) = handle.await
        {
            warn!(error = %err, "progress poller ended abnormally");
        }
    }
}

impl Drop for ProgressPoller {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn poll_progress<W>(
    warehouse: W,
    query: String,
    interval: Duration,
    callback: ProgressCallback,
    mut stop_rx: SignalRx,
) where
    W: Warehouse + Send + Sync + 'static,
{
    let mut ticker = interval_at(Instant::now() + interval, interval);

    loop {
        tokio::select! {
            biased;
            _ = stop_rx.changed() => return,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            biased;
            _ = stop_rx.changed() => return,
            result = warehouse.execute(&query) => result,
        };

        match result {
            Ok(result) => match result.scalar().map(str::parse::<u64>) {
                Some(Ok(rows)) => {
                    debug!(rows, "observed load progress");
                    callback(rows);
                }
                Some(Err(err)) => {
                    let err = etl_error!(
                        ErrorKind::ProgressObservationFailed,
                        "Load progress is not a row count",
                        source: err
                    );
                    warn!(error = %err, "failed to observe load progress");
                }
                // The load has not shown up in the query history yet.
                None => {}
            },
            Err(err) => {
                let err = etl_error!(
                    ErrorKind::ProgressObservationFailed,
                    "Failed to query load progress",
                    source: err
                );
                warn!(error = %err, "failed to observe load progress");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::destination::QueryResult;
    use crate::destination::memory::MemoryWarehouse;

    fn recorder() -> (ProgressCallback, Arc<Mutex<Vec<u64>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: ProgressCallback = Arc::new(move |rows| sink.lock().unwrap().push(rows));
        (callback, seen)
    }

    #[test]
    fn query_filters_by_horizon_and_load_id() {
        let query = progress_query("2026-01-01T00:00:00.000000000+00:00", "load-id=42");

        assert!(query.contains("END_TIME_RANGE_START => '2026-01-01T00:00:00.000000000+00:00'::TIMESTAMP_LTZ"));
        assert!(query.ends_with("CONTAINS(QUERY_TEXT, 'load-id=42')"));
    }

    #[tokio::test(start_paused = true)]
    async fn reports_until_stopped() {
        let warehouse = MemoryWarehouse::new();
        warehouse
            .respond(
                "QUERY_HISTORY_BY_USER",
                QueryResult::new(vec!["SUM".into()], vec![vec![Some("120".into())]]),
            )
            .await;
        let (callback, seen) = recorder();

        let poller = ProgressPoller::start(
            warehouse.clone(),
            "2026-01-01T00:00:00Z",
            "load-id=1",
            Duration::from_secs(10),
            Some(callback),
        );
        tokio::time::sleep(Duration::from_secs(25)).await;
        poller.stop().await;
        let polls = warehouse.statements().await.len();
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(*seen.lock().unwrap(), vec![120, 120]);
        assert_eq!(warehouse.statements().await.len(), polls);
    }

    #[tokio::test(start_paused = true)]
    async fn observation_errors_are_absorbed() {
        let warehouse = MemoryWarehouse::new();
        warehouse
            .fail_on(
                "QUERY_HISTORY_BY_USER",
                etl_error!(ErrorKind::DestinationQueryFailed, "history unavailable"),
            )
            .await;
        let (callback, seen) = recorder();

        let poller = ProgressPoller::start(
            warehouse.clone(),
            "h",
            "l",
            Duration::from_secs(10),
            Some(callback),
        );
        tokio::time::sleep(Duration::from_secs(35)).await;
        poller.stop().await;

        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(warehouse.statements().await.len(), 3);
    }

    #[tokio::test]
    async fn without_callback_nothing_runs() {
        let warehouse = MemoryWarehouse::new();

        let poller = ProgressPoller::start(warehouse.clone(), "h", "l", Duration::from_millis(1), None);
        tokio::time::sleep(Duration::from_millis(20)).await;
        poller.stop().await;

        assert!(warehouse.statements().await.is_empty());
    }
}
