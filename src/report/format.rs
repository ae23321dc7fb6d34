//! Terminal output for the CLI.
//!
//! We keep formatting code in one place so:
//! - the pipeline components stay free of presentation concerns
//! - output changes are localized

use std::path::PathBuf;

use crate::cli::picker::entry_name;
use crate::domain::{CatalogKind, DatasetHandle, Payload};
use crate::form::{ComputeResult, ParameterSet};
use crate::source::UploadReport;

/// Numbered catalog listing.
pub fn format_catalog(kind: CatalogKind, entries: &[PathBuf]) -> String {
    let mut out = format!("{} catalog: {} file(s)\n", kind.display_name(), entries.len());
    for (idx, path) in entries.iter().enumerate() {
        out.push_str(&format!("{:>3}) {}\n", idx + 1, entry_name(path)));
    }
    out
}

pub fn format_upload_report(report: &UploadReport) -> String {
    let mut out = String::new();
    for path in &report.stored {
        out.push_str(&format!("uploaded  {}\n", entry_name(path)));
    }
    for (name, err) in &report.rejected {
        out.push_str(&format!("rejected  {name}: {}\n", err.report()));
    }
    out
}

/// Dataset header plus the first `head` rows.
pub fn format_dataset_summary(dataset: &DatasetHandle, head: usize) -> String {
    let mut out = String::new();
    out.push_str(&format!("Dataset: {}\n", dataset.source_path.display()));
    out.push_str(&format!(
        "Format: {} | rows={} cols={}\n",
        dataset.format_tag.display_name(),
        dataset.payload.n_rows(),
        dataset.payload.n_cols()
    ));

    let rows = dataset.payload.head(head);
    if !rows.is_empty() {
        if let Payload::Table(t) = &dataset.payload {
            let header: Vec<String> = t.headers().iter().map(|h| format!("{:>14}", truncate(h, 14))).collect();
            out.push_str(header.join(" ").trim_end());
            out.push('\n');
        }
        for row in rows {
            let cells: Vec<String> = row.iter().map(|v| format!("{v:>14.6}")).collect();
            out.push_str(cells.join(" ").trim_end());
            out.push('\n');
        }
    }
    out
}

/// Parameters used and the shape of every named output.
pub fn format_result_summary(params: &ParameterSet, result: &ComputeResult) -> String {
    let mut out = String::new();

    out.push_str(&format!("=== alps - {} fit ===\n", params.method().display_name()));
    for c in params.controls() {
        let value = if c.key.is_integer() {
            format!("{}", c.value as i64)
        } else {
            format!("{:.4}", c.value)
        };
        out.push_str(&format!("{:<24} {value}\n", c.key.label()));
    }

    out.push_str("\nOutputs:\n");
    out.push_str(format!("{:<14} {:<8} {:>6} {:>12} {:>12}\n", "output", "field", "len", "first", "last").trim_end());
    out.push('\n');
    out.push_str(format!("{:-<14} {:-<8} {:-<6} {:-<12} {:-<12}\n", "", "", "", "", "").trim_end());
    out.push('\n');
    for output in result.artifact_data.outputs() {
        for (field, values) in &output.fields {
            out.push_str(
                format!(
                    "{:<14} {:<8} {:>6} {:>12} {:>12}\n",
                    truncate(&output.name, 14),
                    truncate(field, 8),
                    values.len(),
                    fmt_opt(values.first()),
                    fmt_opt(values.last()),
                )
                .trim_end(),
            );
            out.push('\n');
        }
    }

    out
}

fn fmt_opt(v: Option<&f64>) -> String {
    v.map(|v| format!("{v:.4}")).unwrap_or_else(|| "-".to_string())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DataTable, FitMethod, FormatTag};
    use crate::error::PipelineError;
    use crate::fit::{ArtifactData, NamedOutput};
    use crate::plot::Figure;

    #[test]
    fn catalog_is_numbered_from_one() {
        let text = format_catalog(CatalogKind::Sample, &[PathBuf::from("data/a.csv")]);
        assert_eq!(text, "Sample catalog: 1 file(s)\n  1) a.csv\n");
    }

    #[test]
    fn dataset_summary_shows_headers_and_head() {
        let table = DataTable::new(
            vec!["time".into(), "thickness_change".into()],
            vec![vec![0.0, 1.0, 2.0], vec![0.5, 0.25, 0.125]],
        )
        .unwrap();
        let dataset = DatasetHandle {
            source_path: PathBuf::from("data/s.csv"),
            format_tag: FormatTag::DelimitedTable,
            payload: Payload::Table(table),
        };
        let text = format_dataset_summary(&dataset, 2);
        assert!(text.contains("rows=3 cols=2"));
        assert!(text.contains("thickness_cha."));
        assert_eq!(text.lines().count(), 5);
    }

    #[test]
    fn result_summary_lists_every_field() {
        let result = ComputeResult {
            artifact_data: ArtifactData::new()
                .with(NamedOutput::new("gcv").with_field("xpred", vec![0.0, 1.0]))
                .with(NamedOutput::flat("freq_low", vec![])),
            renderable: Figure::default(),
        };
        let text = format_result_summary(&ParameterSet::preset(FitMethod::Gcv), &result);
        assert!(text.contains("Degree of bases          4"));
        assert!(text.contains("gcv            xpred         2       0.0000       1.0000"));
        assert!(text.contains("freq_low                     0            -            -"));
    }

    #[test]
    fn upload_report_lists_rejections_with_reason() {
        let report = UploadReport {
            stored: vec![PathBuf::from("temp/a.csv")],
            rejected: vec![(
                "b.xlsx".to_string(),
                PipelineError::UnsupportedFormat {
                    extension: "xlsx".to_string(),
                },
            )],
        };
        let text = format_upload_report(&report);
        assert_eq!(text, "uploaded  a.csv\nrejected  b.xlsx: Unsupported format: '.xlsx'\n");
    }
}
