//! Scan and action reports for the terminal and for scripts.
//!
//! # JSON schema
//!
//! ```json
//! {
//!   "duplicates": [
//!     {
//!       "group": 1,
//!       "digest": "9f86d0...",
//!       "size": 1024,
//!       "keep": "/photos/a.jpg",
//!       "delete": ["/backup/photos/a.jpg"]
//!     }
//!   ],
//!   "summary": { "files_scanned": 100, "duplicate_groups": 1, "...": "..." },
//!   "statistics": { "total": { "files": 100, "bytes": 1048576 }, "...": "..." },
//!   "exit_code": 0,
//!   "exit_code_name": "DS000"
//! }
//! ```

use std::io::{self, Write};

use bytesize::ByteSize;
use serde::Serialize;
use yansi::{Paint, Style};

use crate::actions::BatchResult;
use crate::duplicates::{DuplicateGroup, ScanSummary};
use crate::error::ExitCode;
use crate::registry::{Bucket, Statistics};

/// One duplicate group in the JSON report.
#[derive(Debug, Clone, Serialize)]
pub struct JsonGroup {
    /// Group id.
    pub group: u64,
    /// Hex digest shared by the group.
    pub digest: Option<String>,
    /// Size of each member in bytes.
    pub size: u64,
    /// The copy that stays.
    pub keep: Option<String>,
    /// Redundant copies.
    pub delete: Vec<String>,
}

impl From<&DuplicateGroup> for JsonGroup {
    fn from(group: &DuplicateGroup) -> Self {
        Self {
            group: group.id,
            digest: group.digest.clone(),
            size: group.size,
            keep: group.keep.as_ref().map(|p| p.display().to_string()),
            delete: group
                .delete
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
        }
    }
}

/// Complete machine-readable scan report.
#[derive(Debug, Clone, Serialize)]
pub struct JsonReport {
    /// Every duplicate group, by id.
    pub duplicates: Vec<JsonGroup>,
    /// Pipeline counters.
    pub summary: ScanSummary,
    /// Registry buckets.
    pub statistics: Statistics,
    /// Process exit status.
    pub exit_code: i32,
    /// Machine-readable exit code.
    pub exit_code_name: String,
}

impl JsonReport {
    /// Assemble a report.
    #[must_use]
    pub fn new(
        groups: &[DuplicateGroup],
        summary: &ScanSummary,
        statistics: Statistics,
        exit_code: ExitCode,
    ) -> Self {
        Self {
            duplicates: groups.iter().map(JsonGroup::from).collect(),
            summary: summary.clone(),
            statistics,
            exit_code: exit_code.as_i32(),
            exit_code_name: exit_code.code_prefix().to_string(),
        }
    }

    /// Pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Write pretty JSON plus a newline to `writer`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let json = self.to_json_pretty().map_err(io::Error::other)?;
        writeln!(writer, "{json}")
    }
}

fn bucket_line(label: &str, bucket: &Bucket, total: &Bucket) -> String {
    format!(
        "  {:<18} {:>8} files ({:>5.1}%)  {:>10} ({:>5.1}%)",
        label,
        bucket.files,
        bucket.files_percent_of(total),
        ByteSize::b(bucket.bytes).to_string(),
        bucket.bytes_percent_of(total)
    )
}

fn styled(text: &str, style: Style, color: bool) -> String {
    if color {
        text.paint(style).to_string()
    } else {
        text.to_string()
    }
}

/// Human-readable scan report. Group listings are colored when `color` is set.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_text_report<W: Write>(
    writer: &mut W,
    groups: &[DuplicateGroup],
    summary: &ScanSummary,
    statistics: &Statistics,
    color: bool,
) -> io::Result<()> {
    let keep_label = styled("keep  ", Style::new().green(), color);
    let delete_label = styled("delete", Style::new().red(), color);
    for group in groups {
        let header = format!(
            "Group {} ({} x {}):",
            group.id,
            group.len(),
            ByteSize::b(group.size)
        );
        writeln!(writer, "{}", styled(&header, Style::new().bold(), color))?;
        if let Some(keep) = &group.keep {
            writeln!(writer, "  {}  {}", keep_label, keep.display())?;
        }
        for path in &group.delete {
            writeln!(writer, "  {}  {}", delete_label, path.display())?;
        }
    }
    if !groups.is_empty() {
        writeln!(writer)?;
    }


    writeln!(
        writer,
        "Scanned {} files ({}) in {:.2}s",
        summary.files_scanned,
        summary.scanned_display(),
        summary.duration.as_secs_f64()
    )?;
    writeln!(
        writer,
        "{} duplicate groups, {} redundant files, {} reclaimable ({:.1}%)",
        summary.duplicate_groups,
        summary.duplicate_files,
        summary.reclaimable_display(),
        summary.wasted_percentage()
    )?;
    if summary.scan_errors + summary.hash_errors > 0 {
        writeln!(
            writer,
            "{} files could not be read ({} during enumeration, {} during hashing)",
            summary.scan_errors + summary.hash_errors,
            summary.scan_errors,
            summary.hash_errors
        )?;
    }
    if summary.digest_collisions > 0 {
        writeln!(
            writer,
            "{} digest collisions resolved by byte comparison",
            summary.digest_collisions
        )?;
    }

    let total = &statistics.total;
    writeln!(writer, "Statistics:")?;
    writeln!(writer, "{}", bucket_line("total", total, total))?;
    writeln!(writer, "{}", bucket_line("unique", &statistics.unique, total))?;
    writeln!(writer, "{}", bucket_line("keep", &statistics.keep, total))?;
    writeln!(writer, "{}", bucket_line("delete", &statistics.delete, total))?;
    writeln!(
        writer,
        "{}",
        bucket_line("after delete", &statistics.remaining_after_delete, total)
    )?;
    if statistics.errors.files > 0 {
        writeln!(writer, "{}", bucket_line("errors", &statistics.errors, total))?;
    }
    Ok(())
}

/// Human-readable result of a delete or copy batch.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_batch_report<W: Write>(
    writer: &mut W,
    verb: &str,
    batch: &BatchResult,
) -> io::Result<()> {
    writeln!(writer, "{verb}: {}", batch.summary())?;
    for (path, message) in &batch.failures {
        writeln!(writer, "  failed  {}: {}", path.display(), message)?;
    }
    Ok(())
}
