//! Rolling report files for one engine.
//!
//! One file per metric category per calendar day, named from the engine
//! identity, the category, and the current month/day. Rotation is lazy:
//! each write recomputes today's filename and closes the open writer when
//! it no longer matches.

use crate::domain::types::{EngineEndpoint, MetricCategory};
use chrono::{Local, NaiveDate};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use tracing::info;

struct OpenReport {
    writer: BufWriter<File>,
    filename: String,
    path: PathBuf,
}

/// Owns the rotating report files of one engine, one per category.
/// At most one writer is open per category at any time.
pub struct ReportWriter {
    file_stem: String,
    folder: Option<PathBuf>,
    reports: HashMap<MetricCategory, OpenReport>,
}

impl ReportWriter {
    pub fn new(endpoint: &EngineEndpoint, folder: Option<PathBuf>) -> Self {
        Self {
            file_stem: endpoint.file_stem(),
            folder,
            reports: HashMap::new(),
        }
    }

    /// Append one line to the category's report for today, rotating and
    /// writing the header when a new file is created. The caller batches
    /// one [`flush`](Self::flush) per category per cycle.
    pub fn write_row(&mut self, category: MetricCategory, row: &str) -> io::Result<()> {
        self.write_row_on(category, row, Local::now().date_naive())
    }

    fn write_row_on(
        &mut self,
        category: MetricCategory,
        row: &str,
        today: NaiveDate,
    ) -> io::Result<()> {
        let report = self.ensure_report(category, today)?;
        report.writer.write_all(row.as_bytes())?;
        report.writer.write_all(b"\n")?;
        Ok(())
    }

    pub fn flush(&mut self, category: MetricCategory) -> io::Result<()> {
        if let Some(report) = self.reports.get_mut(&category) {
            report.writer.flush()?;
        }
        Ok(())
    }

    /// Verify the on-disk file still exists and remains writable. The OS
    /// keeps accepting writes on a deleted file as long as we hold it
    /// open, so an out-of-band removal is only visible by re-checking the
    /// path.
    pub fn check_health(&self, category: MetricCategory) -> io::Result<()> {
        let Some(report) = self.reports.get(&category) else {
            return Ok(());
        };
        match fs::metadata(&report.path) {
            Ok(meta) if !meta.permissions().readonly() => Ok(()),
            Ok(_) => Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("File {} is no longer writable", report.path.display()),
            )),
            Err(_) => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("File {} no longer exists", report.path.display()),
            )),
        }
    }

    /// Close the category's writer, if open. Idempotent; close-time errors
    /// are swallowed, the writer is dropped either way.
    pub fn close(&mut self, category: MetricCategory) {
        if let Some(mut report) = self.reports.remove(&category) {
            info!(
                "Close report {} for {}",
                report.filename, self.file_stem
            );
            let _ = report.writer.flush();
        }
    }

    /// Close every open writer. Used during shutdown.
    pub fn close_all(&mut self) {
        let open: Vec<MetricCategory> = self.reports.keys().copied().collect();
        for category in open {
            self.close(category);
        }
    }

    fn filename(&self, category: MetricCategory, date: NaiveDate) -> String {
        format!(
            "{}_{}_{}.csv",
            self.file_stem,
            category,
            date.format("%m_%d")
        )
    }

    fn ensure_report(
        &mut self,
        category: MetricCategory,
        today: NaiveDate,
    ) -> io::Result<&mut OpenReport> {
        let filename = self.filename(category, today);

        // A new day: close yesterday's file before opening today's.
        let rotated = self
            .reports
            .get(&category)
            .is_some_and(|report| report.filename != filename);
        if rotated {
            self.close(category);
        }

        if !self.reports.contains_key(&category) {
            let report = self.create_report(category, filename)?;
            self.reports.insert(category, report);
        }
        Ok(self.reports.get_mut(&category).expect("report just inserted"))
    }

    fn create_report(
        &self,
        category: MetricCategory,
        filename: String,
    ) -> io::Result<OpenReport> {
        let path = match &self.folder {
            Some(folder) => {
                fs::create_dir_all(folder)?;
                folder.join(&filename)
            }
            None => PathBuf::from(&filename),
        };

        let is_new = !path.exists();
        let file = OpenOptions::new().append(true).create(true).open(&path)?;
        let mut writer = BufWriter::new(file);
        if is_new {
            writer.write_all(category.header().as_bytes())?;
            writer.write_all(b"\n")?;
        }

        Ok(OpenReport {
            writer,
            filename,
            path,
        })
    }
}
