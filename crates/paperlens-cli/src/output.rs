use std::io::Write;
use std::path::Path;

use owo_colors::OwoColorize;
use paperlens_core::{BatchProgress, BatchReport, RunRecord};

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

fn summary_target(record: &RunRecord) -> &str {
    if record.summary_path.is_empty() {
        "(in-memory)"
    } else {
        &record.summary_path
    }
}

/// Print a per-paper batch progress line.
pub fn print_progress(
    w: &mut dyn Write,
    event: &BatchProgress,
    color: ColorMode,
) -> std::io::Result<()> {
    match event {
        BatchProgress::Started {
            index,
            total,
            arxiv_id,
        } => {
            if color.enabled() {
                writeln!(
                    w,
                    "{} summarizing {} ...",
                    format!("[{index}/{total}]").dimmed(),
                    arxiv_id.bold()
                )?;
            } else {
                writeln!(w, "[{index}/{total}] summarizing {arxiv_id} ...")?;
            }
        }
        BatchProgress::Finished { record, .. } => {
            if record.is_success() {
                let target = summary_target(record);
                if color.enabled() {
                    writeln!(w, "  {} -> {}", "success".green(), target)?;
                } else {
                    writeln!(w, "  success -> {target}")?;
                }
            } else if color.enabled() {
                writeln!(w, "  {}  -> {}", "failed".red(), record.error)?;
            } else {
                writeln!(w, "  failed  -> {}", record.error)?;
            }
        }
        BatchProgress::DigestWritten { path } => {
            writeln!(w, "daily report -> {}", path.display())?;
        }
    }
    Ok(())
}

/// Final markdown between the markers downstream tooling scrapes for.
pub fn print_final(w: &mut dyn Write, markdown: &str) -> std::io::Result<()> {
    writeln!(w, "[FINAL_BEGIN]")?;
    writeln!(w, "{markdown}")?;
    writeln!(w, "[FINAL_END]")
}

/// Index and run-records locations, or a note that nothing was written.
pub fn print_artifacts(
    w: &mut dyn Write,
    report: &BatchReport,
    color: ColorMode,
) -> std::io::Result<()> {
    let line = |w: &mut dyn Write, label: &str, path: &Path| {
        if color.enabled() {
            writeln!(w, "{} -> {}", label.cyan(), path.display())
        } else {
            writeln!(w, "{label} -> {}", path.display())
        }
    };
    match (&report.index_path, &report.records_path) {
        (Some(index), Some(records)) => {
            line(w, "summary index", index)?;
            line(w, "records", records)?;
        }
        _ => writeln!(w, "save disabled -> no files written")?,
    }
    Ok(())
}

/// Closing line of a single-paper run.
pub fn print_single_result(
    w: &mut dyn Write,
    record: &RunRecord,
    color: ColorMode,
) -> std::io::Result<()> {
    match (record.is_success(), color.enabled()) {
        (true, true) => writeln!(w, "{} -> {}", "success".green().bold(), summary_target(record)),
        (true, false) => writeln!(w, "success -> {}", summary_target(record)),
        (false, true) => writeln!(w, "{} -> {}", "failed".red().bold(), record.error),
        (false, false) => writeln!(w, "failed -> {}", record.error),
    }
}
