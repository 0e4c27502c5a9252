//! Integration tests for the `ingest` command.
#![allow(clippy::zombie_processes)]

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use rstest::rstest;
use tempfile::TempDir;

use crate::helpers::{DumpCompression, numbered_pages, paris_pages, read_tsv, write_dump};

const PARIS_BODY: &str = "Capital of [[France]]. See [[Eiffel Tower|the tower]].";

fn wikifan(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_wikifan"))
        .args(args)
        .output()
        .expect("Failed to run wikifan")
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}

/// Dump, title index and links paths inside `dir`.
fn paths(dir: &TempDir, dump_name: &str) -> (PathBuf, PathBuf, PathBuf) {
    (dir.path().join(dump_name), dir.path().join("titles.tsv"), dir.path().join("links.tsv"))
}

fn assert_paris_outputs(titles: &Path, links: &Path) {
    let rows = read_tsv(titles);
    assert_eq!(
        rows,
        vec![
            vec!["identifier", "title", "body_length"],
            vec!["urn:wiki:Paris", "Paris", PARIS_BODY.len().to_string().as_str()],
        ]
    );

    let rows = read_tsv(links);
    assert_eq!(
        rows,
        vec![
            vec!["source", "predicate", "target"],
            vec!["Paris", "links_to", "France"],
            vec!["Paris", "links_to", "Eiffel_Tower"],
        ]
    );
}

#[rstest]
#[case::plain(DumpCompression::Plain, "dump.xml")]
#[case::gzip(DumpCompression::Gzip, "dump.xml.gz")]
#[case::bzip2(DumpCompression::Bzip2, "dump.xml.bz2")]
fn test_ingest_writes_titles_and_links(
    #[case] compression: DumpCompression,
    #[case] dump_name: &str,
) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let (dump, titles, links) = paths(&temp_dir, dump_name);
    write_dump(&dump, &paris_pages(), compression);

    let output = wikifan(&[
        "ingest",
        "--input",
        path_str(&dump),
        "--output",
        path_str(&titles),
        "--links",
        path_str(&links),
        "--warmup-secs",
        "0",
    ]);
    assert!(output.status.success(), "ingest failed: {}", String::from_utf8_lossy(&output.stderr));
    assert_paris_outputs(&titles, &links);
}

/// Compression is sniffed from content, not from the file name.
#[test]
fn test_ingest_sniffs_compression_without_extension() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let (dump, titles, links) = paths(&temp_dir, "dump.data");
    write_dump(&dump, &paris_pages(), DumpCompression::Bzip2);

    let output = wikifan(&[
        "ingest",
        "-i",
        path_str(&dump),
        "-o",
        path_str(&titles),
        "-l",
        path_str(&links),
        "--warmup-secs",
        "0",
    ]);
    assert!(output.status.success(), "ingest failed: {}", String::from_utf8_lossy(&output.stderr));
    assert_paris_outputs(&titles, &links);
}

#[test]
fn test_ingest_from_stdin() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let (dump, titles, links) = paths(&temp_dir, "dump.xml.gz");
    write_dump(&dump, &paris_pages(), DumpCompression::Gzip);

    let status = Command::new(env!("CARGO_BIN_EXE_wikifan"))
        .args([
            "ingest",
            "--input",
            "-",
            "--output",
            path_str(&titles),
            "--links",
            path_str(&links),
            "--warmup-secs",
            "0",
        ])
        .stdin(Stdio::from(File::open(&dump).expect("Failed to open dump")))
        .status()
        .expect("Failed to run wikifan with stdin input");
    assert!(status.success(), "ingest from stdin failed");
    assert_paris_outputs(&titles, &links);
}

#[test]
fn test_ingest_custom_namespace_and_encoding() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let (dump, titles, _) = paths(&temp_dir, "dump.xml");
    let pages = vec![
        wikifan_lib::decoder::RawRecord::content("Café au lait", "Coffee [[Milk]]"),
        wikifan_lib::decoder::RawRecord::content("AT&T", ""),
    ];
    write_dump(&dump, &pages, DumpCompression::Plain);

    let output = wikifan(&[
        "ingest",
        "-i",
        path_str(&dump),
        "-o",
        path_str(&titles),
        "-n",
        "http://en.wikipedia.org/wiki/",
        "--warmup-secs",
        "0",
    ]);
    assert!(output.status.success(), "ingest failed: {}", String::from_utf8_lossy(&output.stderr));

    let rows = read_tsv(&titles);
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[1][0], "http://en.wikipedia.org/wiki/Caf%C3%A9_au_lait");
    assert_eq!(rows[1][1], "Café_au_lait");
    assert_eq!(rows[1][2], "15");
    assert_eq!(rows[2][0], "http://en.wikipedia.org/wiki/AT%26T");
    assert_eq!(rows[2][2], "0");
}

/// Tabs and newlines from decoded titles and link targets are quoted, not split into extra fields.
#[test]
fn test_ingest_quotes_control_characters() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let (dump, titles, links) = paths(&temp_dir, "dump.xml");
    let pages = vec![wikifan_lib::decoder::RawRecord::content("A B", "[[Foo\nBar]] and [[a\tb]]")];
    let xml = crate::helpers::dump_xml(&pages)
        .replace("<title>A B</title>", "<title>A&#9;B</title>");
    fs::write(&dump, xml).unwrap();

    let output = wikifan(&[
        "ingest",
        "-i",
        path_str(&dump),
        "-o",
        path_str(&titles),
        "-l",
        path_str(&links),
        "--warmup-secs",
        "0",
    ]);
    assert!(output.status.success(), "ingest failed: {}", String::from_utf8_lossy(&output.stderr));

    let rows = read_tsv(&titles);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1], vec!["urn:wiki:A%09B", "A\tB", "23"]);

    let rows = read_tsv(&links);
    assert_eq!(
        rows,
        vec![
            vec!["source", "predicate", "target"],
            vec!["A\tB", "links_to", "Foo\nBar"],
            vec!["A\tB", "links_to", "a\tb"],
        ]
    );
}

#[test]
fn test_ingest_writes_metrics() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let (dump, titles, links) = paths(&temp_dir, "dump.xml");
    let metrics = temp_dir.path().join("metrics.tsv");
    write_dump(&dump, &numbered_pages(250), DumpCompression::Plain);

    let output = wikifan(&[
        "ingest",
        "-i",
        path_str(&dump),
        "-o",
        path_str(&titles),
        "-l",
        path_str(&links),
        "--metrics",
        path_str(&metrics),
        "--max-queue-len",
        "8",
        "--report-interval",
        "100",
        "--warmup-secs",
        "0",
    ]);
    assert!(output.status.success(), "ingest failed: {}", String::from_utf8_lossy(&output.stderr));

    let rows = read_tsv(&metrics);
    assert_eq!(rows.len(), 2);
    let field = |name: &str| {
        let column = rows[0].iter().position(|h| h == name).unwrap();
        rows[1][column].clone()
    };
    assert_eq!(field("input"), path_str(&dump));
    assert_eq!(field("consumers"), "2");
    assert_eq!(field("content_records"), "250");
    assert_eq!(field("redirects"), "0");
    assert_eq!(field("files"), "0");
    assert_eq!(field("aborted"), "false");
    assert_eq!(field("complete"), "true");
    assert!(field("peak_queue_len").parse::<usize>().unwrap() <= 8);

    assert_eq!(read_tsv(&titles).len(), 251);
    assert_eq!(read_tsv(&links).len(), 251);

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("imported [Page_0]"), "missing throughput line in: {stderr}");
    assert!(stderr.contains("imported [Page_100]"), "missing throughput line in: {stderr}");
}

#[test]
fn test_ingest_fails_on_truncated_dump() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let (dump, titles, _) = paths(&temp_dir, "dump.xml");
    let xml = crate::helpers::dump_xml(&numbered_pages(5));
    let cut = xml.rfind("<page>").unwrap() + "<page>\n    <title>Pa".len();
    fs::write(&dump, &xml[..cut]).unwrap();

    let output = wikifan(&[
        "ingest",
        "-i",
        path_str(&dump),
        "-o",
        path_str(&titles),
        "--warmup-secs",
        "0",
    ]);
    assert!(!output.status.success(), "truncated dump should fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Ingestion incomplete"), "unexpected error: {stderr}");

    // Pages decoded before the truncation are still delivered
    assert_eq!(read_tsv(&titles).len(), 5);
}

#[test]
fn test_ingest_fails_on_missing_input() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let (dump, titles, _) = paths(&temp_dir, "missing.xml");

    let output = wikifan(&["ingest", "-i", path_str(&dump), "-o", path_str(&titles)]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("does not exist"));
    assert!(!titles.exists());
}

#[test]
fn test_ingest_requires_an_output() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let (dump, _, _) = paths(&temp_dir, "dump.xml");
    write_dump(&dump, &paris_pages(), DumpCompression::Plain);

    let output = wikifan(&["ingest", "-i", path_str(&dump)]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("--output or --links"));
}

#[test]
fn test_ingest_rejects_duplicate_outputs() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let (dump, titles, _) = paths(&temp_dir, "dump.xml");
    write_dump(&dump, &paris_pages(), DumpCompression::Plain);

    let output =
        wikifan(&["ingest", "-i", path_str(&dump), "-o", path_str(&titles), "-l", path_str(&titles)]);
    assert!(!output.status.success());
}

#[rstest]
#[case::report_interval(&["--report-interval", "0"])]
#[case::warmup(&["--warmup-secs", "-1"])]
#[case::namespace(&["--namespace", "urn:my wiki:"])]
#[case::policy(&["--on-consumer-error", "retry"])]
fn test_ingest_rejects_bad_options(#[case] extra: &[&str]) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let (dump, titles, _) = paths(&temp_dir, "dump.xml");
    write_dump(&dump, &paris_pages(), DumpCompression::Plain);

    let mut args = vec!["ingest", "-i", path_str(&dump), "-o", path_str(&titles)];
    args.extend_from_slice(extra);
    let output = wikifan(&args);
    assert!(!output.status.success(), "options {extra:?} should be rejected");
}
