use readout_types::reading::ExtractionReport;

/// Render the series as a two-column table followed by the dropped slots.
pub fn render(report: &ExtractionReport, value_label: &str) -> String {
    let mut out = String::new();
    if report.no_digits_recognized() {
        out.push_str("Warning: no digits recognized.\n");
    } else {
        let width = value_label.len().max(5);
        out.push_str(&format!("{:>13}  {:>width$}\n", "Timestamp (s)", value_label));
        for obs in &report.series {
            out.push_str(&format!("{:>13}  {:>width$}\n", obs.timestamp, obs.value));
        }
    }

    if !report.diagnostics.is_empty() {
        out.push_str(&format!("\nSkipped {} slot(s):\n", report.diagnostics.len()));
        for diagnostic in &report.diagnostics {
            out.push_str(&format!("  {diagnostic}\n"));
        }
    }
    if report.cancelled {
        out.push_str(&format!(
            "\nCancelled: {} of {} slot(s) never sampled.\n",
            report.abandoned.len(),
            report.requested_slots
        ));
    }
    out
}

pub fn print(report: &ExtractionReport, value_label: &str) {
    print!("{}", render(report, value_label));
}
