/*!
 * Rendering of validation reports as HTML and JSON
 */

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::info;

use crate::{BpaError, ExportFormat, Result};
use crate::validator::ValidationReport;

const REPORT_STYLE: &str = r#"
    body { font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif; margin: 20px; line-height: 1.6; color: #333; }
    .container { max-width: 900px; margin: auto; background: #fff; padding: 20px; box-shadow: 0 0 15px rgba(0,0,0,0.1); border-radius: 8px; }
    h1 { color: #2c3e50; border-bottom: 2px solid #3498db; padding-bottom: 10px; text-align: center; }
    h2 { color: #3498db; margin-top: 30px; border-bottom: 1px solid #eee; padding-bottom: 5px; }
    .summary-table { width: 100%; border-collapse: collapse; margin-bottom: 20px; }
    .summary-table td { padding: 10px; border: 1px solid #ddd; }
    .summary-table td:first-child { font-weight: bold; background-color: #f9f9f9; width: 40%; }
    .status-box { padding: 15px; margin-top: 20px; border-radius: 5px; text-align: center; font-size: 1.1em; font-weight: bold; }
    .success { background-color: #e8f5e9; color: #2e7d32; border: 1px solid #a5d6a7; }
    .error { background-color: #ffebee; color: #c62828; border: 1px solid #ef9a9a; }
    .errors-list { list-style-type: none; padding-left: 0; }
    .errors-list li { background-color: #fff9f9; border-left: 3px solid #e57373; padding: 8px; margin-bottom: 5px; font-size: 0.95em; }
    footer { text-align: center; margin-top: 30px; font-size: 0.9em; color: #777; }
"#;

/// Default HTML report path: `<input stem>_validation.html` next to the input
pub fn default_report_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "bpa".to_string());
    input.with_file_name(format!("{}_validation.html", stem))
}

/// Escape text for inclusion in HTML
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn or_na<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| escape_html(&v.to_string()))
}

/// Render the report as a standalone HTML page
pub fn render_html(report: &ValidationReport, generated_at: DateTime<Local>) -> String {
    let file_name = report
        .source
        .as_deref()
        .map(|source| {
            Path::new(source)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| source.to_string())
        })
        .unwrap_or_else(|| "N/A".to_string());

    let stats = &report.stats;
    let summary_rows = [
        ("Competence (header)", or_na(stats.competence.as_deref())),
        ("Declared lines (header)", or_na(stats.declared_lines)),
        ("Declared pages (header)", or_na(stats.declared_pages)),
        ("Lines read", stats.lines_read.to_string()),
        ("Detail records found", stats.detail_records.to_string()),
        ("Valid detail records", stats.valid_details.to_string()),
        ("Invalid detail records", stats.invalid_details.to_string()),
    ]
    .iter()
    .map(|(label, value)| format!("<tr><td>{}:</td><td>{}</td></tr>", label, value))
    .collect::<Vec<_>>()
    .join("\n");

    let (status_class, status_message) = if report.is_conformant() {
        ("success", "The file conforms to the BPA-I layout.")
    } else {
        ("error", "The file contains errors. Fix them and validate again.")
    };

    let errors_section = if report.issues.is_empty() {
        String::new()
    } else {
        let items: String = report
            .issues
            .iter()
            .map(|issue| format!("<li>{}</li>", escape_html(&issue.to_string())))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "<h2>Errors found ({})</h2>\n<ul class=\"errors-list\">\n{}\n</ul>",
            report.issues.len(),
            items
        )
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>BPA-I Validation Report</title>
<style>{style}</style>
</head>
<body>
<div class="container">
<h1>BPA-I Validation Report</h1>
<p><strong>File:</strong> {file}</p>
<p><strong>Validated at:</strong> {when}</p>
<h2>Summary</h2>
<table class="summary-table">
{rows}
</table>
<div class="status-box {status_class}">{status_message}</div>
{errors}
<footer>Report generated by bpa-validate {version}.</footer>
</div>
</body>
</html>
"#,
        style = REPORT_STYLE,
        file = escape_html(&file_name),
        when = generated_at.format("%d/%m/%Y %H:%M:%S"),
        rows = summary_rows,
        status_class = status_class,
        status_message = status_message,
        errors = errors_section,
        version = env!("CARGO_PKG_VERSION"),
    )
}

/// Write the HTML report to `path`
pub fn write_html(report: &ValidationReport, path: &Path) -> Result<()> {
    let html = render_html(report, Local::now());
    let file = File::create(path).map_err(|e| BpaError::io_at(e, path))?;
    let mut writer = BufWriter::new(file);
    writer
        .write_all(html.as_bytes())
        .and_then(|_| writer.flush())
        .map_err(|e| BpaError::Export {
            message: format!("Failed to write report to {}: {}", path.display(), e),
            format: ExportFormat::Html,
            suggestion: Some("Check that the output directory is writable".to_string()),
        })?;

    info!(path = %path.display(), "wrote HTML validation report");
    Ok(())
}

/// Serialize the report as JSON
pub fn to_json(report: &ValidationReport, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(report)?
    } else {
        serde_json::to_string(report)?
    };
    Ok(json)
}
