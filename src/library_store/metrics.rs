use super::models::{MetricSummary, PerformanceMetric};
use super::now_millis;
use super::store::SqliteLibraryStore;
use crate::error::Result;
use rusqlite::params;
use tracing::debug;

impl SqliteLibraryStore {
    pub fn record_metric(
        &self,
        operation: &str,
        duration_ms: i64,
        metadata: Option<&serde_json::Value>,
    ) -> Result<()> {
        let metadata = metadata.map(serde_json::to_string).transpose()?;
        self.with_write(|conn| {
            conn.execute(
                "INSERT INTO performance_metrics (operation, duration_ms, created_at, metadata)
                 VALUES (?1, ?2, ?3, ?4)",
                params![operation, duration_ms, now_millis(), metadata],
            )?;
            Ok(())
        })
    }

    /// Newest first, optionally restricted to one operation.
    pub fn get_metrics(&self, operation: Option<&str>, limit: usize) -> Result<Vec<PerformanceMetric>> {
        let rows: Vec<(i64, String, i64, i64, Option<String>)> = self.with_read(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT rowid, operation, duration_ms, created_at, metadata FROM performance_metrics
                 WHERE ?1 IS NULL OR operation = ?1
                 ORDER BY created_at DESC, rowid DESC LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![operation, limit as i64], |r| {
                    Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;
        rows.into_iter()
            .map(|(id, operation, duration_ms, created_at, metadata)| {
                Ok(PerformanceMetric {
                    id,
                    operation,
                    duration_ms,
                    created_at,
                    metadata: metadata
                        .as_deref()
                        .map(serde_json::from_str::<serde_json::Value>)
                        .transpose()?,
                })
            })
            .collect()
    }

    pub fn get_metric_summaries(&self) -> Result<Vec<MetricSummary>> {
        self.with_read(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT operation, COUNT(*), AVG(duration_ms), MAX(duration_ms)
                 FROM performance_metrics GROUP BY operation ORDER BY operation",
            )?;
            let summaries = stmt
                .query_map([], |r| {
                    Ok(MetricSummary {
                        operation: r.get(0)?,
                        count: r.get(1)?,
                        avg_duration_ms: r.get(2)?,
                        max_duration_ms: r.get(3)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(summaries)
        })
    }

    /// Delete metrics recorded before `cutoff_ms`.
    pub fn prune_metrics_older_than(&self, cutoff_ms: i64) -> Result<usize> {
        let removed = self.with_write(|conn| {
            Ok(conn.execute(
                "DELETE FROM performance_metrics WHERE created_at < ?1",
                params![cutoff_ms],
            )?)
        })?;
        debug!("Pruned {} performance metrics", removed);
        Ok(removed)
    }
}
