//! Output rendering for the command line.
//!
//! Every report is rendered either as human-readable text or as a single
//! line of JSON. Rendering returns a `String`; printing is left to the caller.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::definition::CollectorInfo;
use crate::pipeline::RunSummary;

/// Hint printed below the timers table.
pub const TIMERS_HINT: &str = "Hint: Run 'gather info COLLECTOR' to show more details.";

/// Output format selected with `--format`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Tables and sentences.
    #[default]
    Human,
    /// Compact JSON.
    Json,
}

/// One row of the timers report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimerRow {
    pub id: String,
    /// Last successful collection, `None` if the collector never ran.
    pub last: Option<DateTime<Utc>>,
    /// Next scheduled run. Scheduling is delegated to systemd and not tracked.
    pub next: Option<DateTime<Utc>>,
}

impl TimerRow {
    /// Row without a next run.
    pub fn new(id: impl Into<String>, last: Option<DateTime<Utc>>) -> Self {
        Self {
            id: id.into(),
            last,
            next: None,
        }
    }
}

/// Render `info COLLECTOR`.
pub fn render_info(info: &CollectorInfo, format: OutputFormat) -> serde_json::Result<String> {
    if format == OutputFormat::Json {
        return serde_json::to_string(info);
    }

    let optional = |v: Option<u32>| v.map_or_else(|| "-".to_string(), |v| v.to_string());
    let text = |v: &str| if v.is_empty() { "-".to_string() } else { v.to_string() };
    let fields = [
        ("ID", info.id.clone()),
        ("Name", text(&info.name)),
        ("Feature", text(&info.feature)),
        ("Command", info.command.clone()),
        ("Content type", text(&info.content_type)),
        ("UID", optional(info.uid)),
        ("GID", optional(info.gid)),
        ("Definition", info.path.display().to_string()),
        ("Systemd service", text(info.systemd_service.as_deref().unwrap_or_default())),
        ("Systemd timer", text(info.systemd_timer.as_deref().unwrap_or_default())),
    ];

    let width = fields.iter().map(|(k, _)| k.len()).max().unwrap_or(0) + 1;
    let mut out = String::new();
    for (key, value) in fields {
        out.push_str(&format!("{:<width$} {}\n", format!("{}:", key), value));
    }
    Ok(out)
}

/// Render `list`.
pub fn render_list(collectors: &[CollectorInfo], format: OutputFormat) -> serde_json::Result<String> {
    if format == OutputFormat::Json {
        return serde_json::to_string(collectors);
    }
    let rows = collectors
        .iter()
        .map(|c| vec![c.id.clone(), c.name.clone()])
        .collect::<Vec<_>>();
    Ok(table(&["ID", "NAME"], &rows))
}

/// Render `timers`.
pub fn render_timers(rows: &[TimerRow], format: OutputFormat) -> serde_json::Result<String> {
    if format == OutputFormat::Json {
        return serde_json::to_string(rows);
    }
    let stamp = |t: &Option<DateTime<Utc>>| match t {
        Some(t) => t.to_rfc3339_opts(SecondsFormat::Secs, true),
        None => "-".to_string(),
    };
    let cells = rows
        .iter()
        .map(|r| {
            let next = r.next.map(|_| stamp(&r.next)).unwrap_or_default();
            vec![r.id.clone(), stamp(&r.last), next]
        })
        .collect::<Vec<_>>();

    let mut out = table(&["ID", "LAST", "NEXT"], &cells);
    out.push('\n');
    out.push_str(TIMERS_HINT);
    out.push('\n');
    Ok(out)
}

/// Render the summary of `run COLLECTOR`.
pub fn render_run(summary: &RunSummary, format: OutputFormat) -> serde_json::Result<String> {
    if format == OutputFormat::Json {
        return serde_json::to_string(summary);
    }

    let name = if summary.collector.name.is_empty() {
        &summary.collector.id
    } else {
        &summary.collector.name
    };

    let mut out = match summary.failed_stage {
        Some(stage) => format!("Collection for {} failed while {}.\n", name, stage),
        None => format!("Finished running collection for {}.\n", name),
    };

    out.push_str(&format!(
        "Collection took {:.6} s",
        summary.collect_duration.as_secs_f64()
    ));
    match &summary.kept_path {
        Some(path) if summary.kept => {
            out.push_str(&format!(" and has been kept in {}.\n", path.display()))
        }
        _ => out.push_str(".\n"),
    }

    match summary.upload_duration {
        Some(_) if summary.uploaded => {
            out.push_str(&format!("Uploading took {:.6} s.\n", summary.upload_secs()))
        }
        Some(_) => out.push_str(&format!(
            "Uploading failed after {:.6} s.\n",
            summary.upload_secs()
        )),
        None => out.push_str("Data have not been uploaded.\n"),
    }

    for warning in &summary.cleanup_warnings {
        out.push_str(&format!("Warning: {}\n", warning));
    }
    Ok(out)
}

/// Left-aligned table with columns separated by three spaces.
fn table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }

    let line = |cells: Vec<&str>| {
        let mut line = String::new();
        for (i, cell) in cells.iter().enumerate() {
            if i + 1 == cells.len() {
                line.push_str(cell);
            } else {
                line.push_str(&format!("{:<width$}   ", cell, width = widths[i]));
            }
        }
        line.trim_end().to_string() + "\n"
    };

    let mut out = line(headers.to_vec());
    for row in rows {
        out.push_str(&line(row.iter().map(String::as_str).collect()));
    }
    out
}
