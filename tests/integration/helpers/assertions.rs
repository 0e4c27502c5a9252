//! Custom assertion helpers for integration tests.

#![allow(dead_code)]

use std::path::Path;

use wikifan_lib::pipeline::PipelineReport;

use super::test_consumers::Seen;

/// Asserts that a consumer saw exactly `expected`, in order.
pub fn assert_seen(seen: &Seen, expected: &[&str]) {
    let seen = seen.lock();
    let seen: Vec<&str> = seen.iter().map(String::as_str).collect();
    assert_eq!(seen, expected, "unexpected deliveries");
}

/// Asserts that every allocated record is back in the pool.
pub fn assert_all_records_returned(report: &PipelineReport) {
    assert_eq!(
        report.pooled as u64, report.allocated,
        "{} records allocated but only {} back in the pool",
        report.allocated, report.pooled
    );
}

/// Reads a TSV file into rows of fields, header included. Quoted fields are unquoted.
pub fn read_tsv(path: &Path) -> Vec<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .expect("Failed to open TSV");
    reader
        .records()
        .map(|row| row.expect("Failed to read TSV row").iter().map(str::to_string).collect())
        .collect()
}
