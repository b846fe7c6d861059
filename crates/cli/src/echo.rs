use std::time::Duration;

use docify_core::{DocumentRecord, Status, ValidationResult};
use owo_colors::OwoColorize;

use crate::VERSION;

/// Print a styled banner for verbose mode
pub fn print_banner() {
    eprintln!("\n{} {} {}", "Docify".bold().bright_blue(), "v".dimmed(), VERSION.dimmed());
    eprintln!("{}", "Turn documentation into analysis blocks\n".dimmed());
}

/// Print a styled step message
pub fn print_step(step: usize, total: usize, message: &str) {
    eprintln!("{} {}", format!("[{}/{}]", step, total).dimmed(), message.bright_cyan());
}

/// Print a success message
pub fn print_success(message: &str) {
    eprintln!("{} {}", "✓".green(), message.bright_green());
}

/// Print an info message
pub fn print_info(message: &str) {
    eprintln!("{} {}", "ℹ".blue(), message.bright_blue());
}

/// Print a warning message
pub fn print_warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow(), message.bright_yellow());
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message.bright_red());
}

/// Print a labelled detail line
pub fn print_detail(label: &str, value: impl std::fmt::Display) {
    eprintln!("  {} {}", format!("{}:", label).dimmed(), value.to_string().bright_white());
}

/// Print timing information with color coding
pub fn print_timing(label: &str, duration: Duration) {
    let ms = duration.as_secs_f64() * 1000.0;
    let label = format!("{}:", label);

    if ms < 500.0 {
        eprintln!("  {} {:>8.2}ms ({})", label.dimmed(), ms, "fast".dimmed());
    } else if ms < 3000.0 {
        eprintln!("  {} {:>8.2}ms ({})", label.dimmed(), ms, "moderate".bright_yellow());
    } else {
        eprintln!("  {} {:>8.2}ms ({})", label.dimmed(), ms, "slow".bright_red());
    }
}

/// Print timing summary
pub fn print_timing_summary(total: Duration, timings: &[(&str, Duration)]) {
    eprintln!("{}", "═".repeat(60).dimmed());
    eprintln!("{}", "Timing Summary".bold().cyan());
    eprintln!("{}", "═".repeat(60).dimmed());

    for (label, duration) in timings {
        print_timing(label, *duration);
    }

    eprintln!("  {} {:>8.2}ms\n", "Total:".bold().dimmed(), total.as_secs_f64() * 1000.0);
}

/// Plain-text validation report, written to the command output
pub fn validation_report(result: &ValidationResult, threshold: f64) -> String {
    let verdict = match result.gate(threshold) {
        Ok(()) => "passes".to_string(),
        Err(kind) => format!("refused ({})", kind),
    };

    let mut report = format!(
        "Confidence: {:.2} ({} the {:.2} gate)\nStructure: {:.2}\nReadability: {:.2}\nCompleteness: {:.2}\n",
        result.confidence,
        verdict,
        threshold,
        result.subscores.structure,
        result.subscores.readability,
        result.subscores.completeness,
    );
    if result.issues.is_empty() {
        report.push_str("Issues: none\n");
    } else {
        report.push_str("Issues:\n");
        for issue in &result.issues {
            report.push_str(&format!("  - {}\n", issue));
        }
    }
    report
}

/// Print the outcome of a pipeline run
pub fn print_record_summary(record: &DocumentRecord) {
    eprintln!("\n{}", "═".repeat(60).dimmed());
    eprintln!("{}", "Pipeline Result".bold().cyan());
    eprintln!("{}", "═".repeat(60).dimmed());

    let status = record.status.as_str();
    match record.status {
        Status::Completed => print_detail("Status", status.bright_green()),
        _ => print_detail("Status", status.bright_red()),
    }
    if let Some(title) = &record.title {
        print_detail("Title", title);
    }
    if let Some(method) = &record.metadata.fetch_method {
        print_detail("Fetched with", method);
    }
    print_detail("Words", record.word_count);
    if let Some(validation) = &record.metadata.validation {
        print_detail("Confidence", format!("{:.2}", validation.confidence));
    }
    if record.metadata.synthesis_attempts > 0 {
        print_detail("Synthesis attempts", record.metadata.synthesis_attempts);
    }
    for block in &record.analysis_blocks {
        eprintln!("  {} {} {}", format!("[{}]", block.size).dimmed(), block.block_type.bright_blue(), block.title);
    }
    eprintln!();
}

/// Format file size for display
pub fn format_size(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = 1024 * KB;

    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
