//! Per-engine metric collection.
//!
//! One collector owns one engine's connection and report files. A cycle
//! fetches every configured category in order; failures are contained to
//! the smallest scope that can absorb them (a row, a category, a cycle)
//! and never cross engine boundaries.

use crate::application::report::ReportWriter;
use crate::domain::errors::{CollectError, SourceError};
use crate::domain::filter::EntityFilter;
use crate::domain::ports::{AttributeSource, SourceConnector};
use crate::domain::types::{attribute_token, AttributeMap, EngineEndpoint, MetricCategory};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Collects all configured metric categories for one engine.
pub struct Collector {
    endpoint: EngineEndpoint,
    categories: Vec<MetricCategory>,
    filter: Arc<EntityFilter>,
    connector: Arc<dyn SourceConnector>,
    source: Option<Box<dyn AttributeSource>>,
    writer: ReportWriter,
}

impl Collector {
    pub fn new(
        endpoint: EngineEndpoint,
        categories: Vec<MetricCategory>,
        filter: Arc<EntityFilter>,
        connector: Arc<dyn SourceConnector>,
        report_folder: Option<PathBuf>,
    ) -> Self {
        let writer = ReportWriter::new(&endpoint, report_folder);
        Self {
            endpoint,
            categories,
            filter,
            connector,
            source: None,
            writer,
        }
    }

    pub fn endpoint(&self) -> &EngineEndpoint {
        &self.endpoint
    }

    /// Open the connection if it is not already open. Idempotent: an open
    /// connection performs no network operation. On failure no half-open
    /// state is left behind.
    async fn ensure_connected(&mut self) -> Result<(), SourceError> {
        if self.source.is_some() {
            return Ok(());
        }
        match self.connector.connect(&self.endpoint).await {
            Ok(source) => {
                self.source = Some(source);
                Ok(())
            }
            Err(e) => {
                self.source = None;
                Err(e)
            }
        }
    }

    /// Run one full collection cycle with the tick's shared timestamp.
    ///
    /// A connect failure aborts the whole cycle for this engine; it is
    /// retried on the next tick. A failed category is retried once with a
    /// fresh writer, then skipped for this cycle. Query failures mark the
    /// connection suspect, and it is dropped after the cycle so the next
    /// tick reconnects lazily.
    pub async fn collect_all(&mut self, timestamp: &str) {
        if let Err(e) = self.ensure_connected().await {
            warn!(
                "Failed to connect to engine {}: {}",
                self.endpoint, e
            );
            return;
        }

        let mut connection_suspect = false;
        for category in self.categories.clone() {
            if let Err(first) = self.collect_one(category, timestamp).await {
                warn!(
                    "Failed to collect {} from {}: {}",
                    category, self.endpoint, first
                );
                // Close the writer and try the whole category once more.
                self.writer.close(category);
                if let Err(second) = self.collect_one(category, timestamp).await {
                    error!(
                        "Giving up on {} for {} this cycle: {}",
                        category, self.endpoint, second
                    );
                    self.writer.close(category);
                    if matches!(second, CollectError::Query(_)) {
                        connection_suspect = true;
                    }
                }
            }
        }

        if connection_suspect {
            info!(
                "Dropping suspect connection to {}; reconnecting next cycle",
                self.endpoint
            );
            self.source = None;
        }
    }

    /// Collect one category: query the identifier set, then fetch, filter,
    /// and append one row per included entity.
    async fn collect_one(
        &mut self,
        category: MetricCategory,
        timestamp: &str,
    ) -> Result<(), CollectError> {
        let Some(source) = self.source.as_deref() else {
            return Err(CollectError::Query(SourceError::Connection {
                reason: "not connected".to_string(),
            }));
        };

        let ids = source
            .list_identifiers(category.query_pattern())
            .await
            .map_err(CollectError::Query)?;

        if ids.is_empty() {
            // Not an error: record the empty set and move on.
            self.writer
                .write_row(category, &format!("Entity list for {} is empty", category))?;
            self.writer.flush(category)?;
            return Ok(());
        }

        for id in &ids {
            let label = category.entity_label(id);
            let mut attrs: AttributeMap = match source.get_attributes(id).await {
                Ok(attrs) => attrs,
                Err(e) => {
                    // Row-level diagnostic; the rest of the category proceeds.
                    self.writer.write_row(
                        category,
                        &format!("Failed to get attributes for entity {}: {}", label, e),
                    )?;
                    continue;
                }
            };
            attrs.insert(
                "DateTime".to_string(),
                Value::String(timestamp.to_string()),
            );

            let Some(display_name) = category.display_name(id, &attrs) else {
                debug!("Skipping {} object without a usable name: {}", category, id);
                continue;
            };
            if self.filter.is_included(&display_name, category) {
                let row = render_row(category, &display_name, &attrs);
                self.writer.write_row(category, &row)?;
            }

            // Delta categories are reset after every successful read so the
            // next cycle reports a fresh window. A failed reset does not
            // invalidate the sample already written.
            if category.is_delta() {
                if let Err(e) = source.invoke_reset(id).await {
                    warn!(
                        "Failed to reset {} stats on {}: {}",
                        category, self.endpoint, e
                    );
                }
            }
        }

        self.writer.flush(category)?;

        // A file removed out-of-band is closed now and recreated by the
        // next write attempt.
        if let Err(e) = self.writer.check_health(category) {
            warn!(
                "Report for {} on {} went stale: {}",
                category, self.endpoint, e
            );
            self.writer.close(category);
        }
        Ok(())
    }

    /// Drop the connection and close every report file. Called during
    /// shutdown; the collector can be reused afterwards, everything is
    /// reopened lazily.
    pub fn release(&mut self) {
        self.source = None;
        self.writer.close_all();
    }
}

/// Serialize one entity's sample into a delimited row: display name first,
/// then each schema column in fixed order. For categories whose identifier
/// column is part of the schema, the first column is skipped in the value
/// list since the display name already covers it.
fn render_row(category: MetricCategory, name: &str, attrs: &AttributeMap) -> String {
    let columns = category.columns();
    let values = if category.has_object_column() {
        columns
    } else {
        &columns[1..]
    };

    let mut row = String::from(name);
    for column in values {
        row.push(',');
        row.push_str(&attribute_token(attrs.get(*column)));
    }
    row
}
