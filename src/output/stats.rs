//! Final scan statistics for the terminal

use crate::output::traits::{ExtractedForm, FingerprintRecord};
use crate::state::{CrawlStats, ScanStatus};
use std::collections::BTreeMap;
use std::fmt::Write;

/// Renders the end-of-scan summary
pub fn format_statistics(stats: &CrawlStats, status: ScanStatus) -> String {
    let mut out = String::new();
    let elapsed = stats.elapsed().num_milliseconds() as f64 / 1000.0;

    // Writing to a String cannot fail
    let _ = writeln!(out, "=== Scan Statistics ===\n");
    let _ = writeln!(out, "Status: {}", status);
    let _ = writeln!(out, "Duration: {:.1}s", elapsed);
    let _ = writeln!(out);
    let _ = writeln!(out, "Overview:");
    let _ = writeln!(out, "  URLs discovered: {}", stats.urls_discovered);
    let _ = writeln!(out, "  URLs crawled: {}", stats.urls_crawled);
    let _ = writeln!(out, "  Forms found: {}", stats.forms_found);
    let _ = writeln!(out, "  Technologies detected: {}", stats.technologies_detected);
    let _ = writeln!(out, "  Errors: {}", stats.errors);
    let _ = writeln!(out, "  Rate: {:.2} pages/sec", stats.pages_per_second());

    let attempted = stats.urls_crawled + stats.errors;
    let success_rate = if attempted > 0 {
        (stats.urls_crawled as f64 / attempted as f64) * 100.0
    } else {
        0.0
    };
    let _ = writeln!(
        out,
        "\nSuccess Rate: {:.1}% ({} / {} fetches succeeded)",
        success_rate, stats.urls_crawled, attempted
    );

    out
}

/// Prints the end-of-scan summary to stdout
pub fn print_statistics(stats: &CrawlStats, status: ScanStatus) {
    print!("{}", format_statistics(stats, status));
}

/// Technology names with the number of pages they were seen on
pub fn technology_counts(fingerprints: &[FingerprintRecord]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for record in fingerprints {
        let names = record
            .server_software
            .iter()
            .chain(record.programming_language.iter())
            .chain(record.framework.iter())
            .chain(record.cms.iter())
            .cloned()
            .chain(
                record
                    .javascript_libraries
                    .as_array()
                    .into_iter()
                    .flatten()
                    .filter_map(|v| v.as_str().map(str::to_string)),
            );
        for name in names {
            *counts.entry(name).or_insert(0) += 1;
        }
    }
    counts
}

/// Prints detected technologies and login forms found by a scan
pub fn print_findings(fingerprints: &[FingerprintRecord], forms: &[ExtractedForm]) {
    let counts = technology_counts(fingerprints);
    if !counts.is_empty() {
        println!("\nTechnologies:");
        let mut sorted: Vec<_> = counts.into_iter().collect();
        sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        for (name, pages) in sorted {
            println!("  {} ({} pages)", name, pages);
        }
    }

    let login_forms: Vec<_> = forms.iter().filter(|f| f.authentication_required).collect();
    if !login_forms.is_empty() {
        println!("\nLogin Forms ({}):", login_forms.len());
        for form in login_forms {
            println!("  - {} {} (on {})", form.method.to_uppercase(), form.action, form.url_ref);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn test_format_statistics() {
        let mut stats = CrawlStats::new();
        stats.urls_discovered = 12;
        stats.urls_crawled = 9;
        stats.errors = 1;
        stats.end_time = Some(stats.start_time + Duration::seconds(3));

        let text = format_statistics(&stats, ScanStatus::Completed);
        assert!(text.contains("Status: completed"));
        assert!(text.contains("URLs discovered: 12"));
        assert!(text.contains("Success Rate: 90.0% (9 / 10 fetches succeeded)"));
    }

    #[test]
    fn test_technology_counts() {
        let record = |server: &str| FingerprintRecord {
            url_ref: "https://e.com/".to_string(),
            server_software: Some(server.to_string()),
            programming_language: Some("PHP".to_string()),
            framework: None,
            cms: None,
            javascript_libraries: json!(["jQuery"]),
            security_headers: json!({}),
        };

        let counts = technology_counts(&[record("nginx"), record("Apache")]);
        assert_eq!(counts["PHP"], 2);
        assert_eq!(counts["jQuery"], 2);
        assert_eq!(counts["nginx"], 1);
    }
}
