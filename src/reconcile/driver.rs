//! Scan-then-query reconciliation: every purchase event in the window is
//! paired with the listing its seller held one block before the sale.

use futures::StreamExt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::decoding::PurchaseEvent;
use crate::historical::{
    query_sale_moment_at_height, sale_moment_script, scan_purchase_events, QueryError, ScanError,
};
use crate::output::{RowSink, SinkError};
use crate::reconcile::ReconciledRow;
use crate::rpc::{LedgerClient, RpcError};
use crate::types::config::{ExporterConfig, MissingRowPolicy};
use crate::types::flow::FlowAddress;

#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub window_size: u64,
    pub event_type: String,
    /// Rendered listing script.
    pub script: String,
    pub player_name_attribute: String,
    pub missing_rows: MissingRowPolicy,
    pub query_concurrency: usize,
}

impl ExportSettings {
    pub fn from_config(config: &ExporterConfig) -> Self {
        Self {
            window_size: config.window_size,
            event_type: config.event_type.clone(),
            script: sale_moment_script(&config.contracts),
            player_name_attribute: config.player_name_attribute.clone(),
            missing_rows: config.missing_rows,
            query_concurrency: config.query_concurrency.max(1),
        }
    }
}

/// Inclusive block height range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeightRange {
    pub start: u64,
    pub end: u64,
}

impl std::fmt::Display for HeightRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// `[latest - window, latest]`, clamped at genesis.
pub fn scan_range(latest: u64, window: u64) -> HeightRange {
    HeightRange {
        start: latest.saturating_sub(window),
        end: latest,
    }
}

/// A sale whose listing could not be recovered.
#[derive(Debug, Clone)]
pub struct RowFailure {
    pub asset_id: u64,
    pub block_height: u64,
    pub seller: FlowAddress,
    pub transaction_id: String,
    pub error: QueryError,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub range: HeightRange,
    pub scanned: usize,
    pub written: usize,
    /// Rows written with placeholder markers; included in `written`.
    pub placeholders: usize,
    pub failures: Vec<RowFailure>,
    pub cancelled: bool,
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to read latest sealed height: {0}")]
    Setup(#[source] RpcError),

    #[error("event scan failed: {0}")]
    Scan(#[from] ScanError),

    #[error("output sink failed: {0}")]
    Sink(#[from] SinkError),
}

/// Runs one export over the window ending at the current sealed height.
///
/// Per-sale query failures are collected in the report and never abort the
/// run. Rows reach the sink in scan order regardless of `query_concurrency`.
pub async fn run<C, S>(
    client: &C,
    settings: &ExportSettings,
    sink: &mut S,
    cancel: &CancellationToken,
) -> Result<RunReport, RunError>
where
    C: LedgerClient + ?Sized,
    S: RowSink + ?Sized,
{
    let latest = client
        .get_latest_block_height()
        .await
        .map_err(RunError::Setup)?;
    let range = scan_range(latest, settings.window_size);
    tracing::info!("Current sealed height {}, scanning blocks {}", latest, range);

    let mut report = RunReport {
        range,
        scanned: 0,
        written: 0,
        placeholders: 0,
        failures: Vec::new(),
        cancelled: false,
    };

    // Nothing reaches the sink until the scan has completed.
    let events = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::warn!("Export cancelled while scanning {}", range);
            report.cancelled = true;
            return Ok(report);
        }
        events = scan_purchase_events(client, &settings.event_type, range.start, range.end) => events?,
    };
    tracing::info!("Found {} purchase events in {}", events.len(), range);
    report.scanned = events.len();

    let outcomes = futures::stream::iter(events.iter())
        .map(move |event| async move {
            let height = event.block_height.saturating_sub(1);
            let outcome = query_sale_moment_at_height(
                client,
                &settings.script,
                height,
                event.seller,
                event.asset_id,
            )
            .await;
            (event, outcome)
        })
        .buffered(settings.query_concurrency.max(1));
    let mut outcomes = std::pin::pin!(outcomes);

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                report.cancelled = true;
                break;
            }
            next = outcomes.next() => next,
        };
        let Some((event, outcome)) = next else {
            break;
        };

        match outcome {
            Ok(moment) => {
                let row = ReconciledRow::from_sale(event, &moment, &settings.player_name_attribute);
                sink.write_row(&row)?;
                report.written += 1;
            }
            Err(error) => {
                record_failure(&mut report, event, error);
                if settings.missing_rows == MissingRowPolicy::Placeholder {
                    sink.write_row(&ReconciledRow::unreconciled(event))?;
                    report.written += 1;
                    report.placeholders += 1;
                }
            }
        }
    }

    sink.flush()?;

    if report.cancelled {
        let processed = report.written - report.placeholders + report.failures.len();
        tracing::warn!(
            "Export cancelled after {} of {} sales",
            processed,
            report.scanned
        );
    }

    Ok(report)
}

fn record_failure(report: &mut RunReport, event: &PurchaseEvent, error: QueryError) {
    tracing::warn!(
        "Skipping sale of moment {} at height {} (tx {}): {}",
        event.asset_id,
        event.block_height,
        event.transaction_id,
        error
    );
    report.failures.push(RowFailure {
        asset_id: event.asset_id,
        block_height: event.block_height,
        seller: event.seller,
        transaction_id: event.transaction_id.clone(),
        error,
    });
}
