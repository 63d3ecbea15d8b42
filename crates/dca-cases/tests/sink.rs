use std::path::{Path, PathBuf};

use dca_cases::dca_crawler::{Sink, SinkReport};
use dca_cases::{
    merge_csv, read_cases, CaseRecord, CsvSink, CsvSinkConfig, CsvWriterConfig, CASE_HEADERS,
};

fn case(title: &str, outlet: Option<&str>) -> CaseRecord {
    CaseRecord {
        title: Some(title.into()),
        outlet: outlet.map(String::from),
        date_of_publication: Some("14.03.2023".into()),
        summary: Some("Quoted \"claim\", with a comma".into()),
        ..Default::default()
    }
}

fn config(dir: &Path) -> CsvSinkConfig {
    CsvSinkConfig {
        output_dir: dir.to_path_buf(),
        ..Default::default()
    }
}

fn written(report: SinkReport) -> (PathBuf, usize, usize) {
    match report {
        SinkReport::Written {
            path,
            rows,
            duplicates,
        } => (path, rows, duplicates),
        SinkReport::Empty => panic!("nothing written"),
    }
}

#[test]
fn flush_writes_unique_rows_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut sink = CsvSink::open(&config(dir.path())).unwrap();

    for record in [
        case("b", Some("x.org")),
        case("a", None),
        case("b", Some("x.org")),
        case("b", Some("y.org")),
    ] {
        sink.append(&record).unwrap();
    }
    let (path, rows, duplicates) = written(sink.flush().unwrap());

    assert_eq!(rows, 3);
    assert_eq!(duplicates, 1);

    let bytes = std::fs::read(&path).unwrap();
    assert!(bytes.starts_with(b"\xEF\xBB\xBF"));
    let text = String::from_utf8(bytes[3..].to_vec()).unwrap();
    assert_eq!(text.lines().next().unwrap(), CASE_HEADERS.join(","));

    let cases = read_cases(&path, &Default::default()).unwrap();
    assert_eq!(
        cases,
        vec![case("b", Some("x.org")), case("a", None), case("b", Some("y.org"))]
    );
}

#[test]
fn empty_flush_creates_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut sink: CsvSink<CaseRecord> = CsvSink::open(&config(dir.path())).unwrap();

    assert_eq!(sink.flush().unwrap(), SinkReport::Empty);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn file_names_never_collide() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());

    let mut paths = vec![];
    for _ in 0..3 {
        let mut sink = CsvSink::new(config.clone());
        sink.push(case("a", None));
        let (path, _, _) = written(sink.flush().unwrap());
        paths.push(path);
    }
    paths.sort();
    paths.dedup();

    assert_eq!(paths.len(), 3);
    for path in &paths {
        let name = path.file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("euvsdisinfo_"), "{name}");
        assert!(name.ends_with(".csv"), "{name}");
    }
}

#[test]
fn write_error_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, "").unwrap();

    let mut sink = CsvSink::new(config(&blocker));
    sink.push(case("a", None));

    assert!(sink.flush().is_err());
}

#[test]
fn merge_deduplicates_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    let first_dir = dir.path().join("first");
    let second_dir = dir.path().join("second");

    let mut first = CsvSink::new(config(&first_dir));
    first.push(case("a", None));
    first.push(case("b", Some("x.org")));
    let (first_path, _, _) = written(first.flush().unwrap());

    let mut second = CsvSink::new(config(&second_dir));
    second.push(case("b", Some("x.org")));
    second.push(case("c", None));
    let (second_path, _, _) = written(second.flush().unwrap());

    let merged_config = CsvSinkConfig {
        file_prefix: "merged".into(),
        ..config(dir.path())
    };
    let (merged, rows, duplicates) =
        written(merge_csv(&[first_path, second_path], &merged_config).unwrap());

    assert_eq!((rows, duplicates), (3, 1));
    let titles: Vec<_> = read_cases(&merged, &Default::default())
        .unwrap()
        .into_iter()
        .filter_map(|c| c.title)
        .collect();
    assert_eq!(titles, vec!["a", "b", "c"]);
}

#[test]
fn merge_reads_back_escaped_files() {
    let dir = tempfile::tempdir().unwrap();
    let config = CsvSinkConfig {
        writer: CsvWriterConfig {
            escape: Some('\\'),
            ..Default::default()
        },
        ..config(&dir.path().join("runs"))
    };

    let mut sink = CsvSink::new(config.clone());
    sink.push(case("a", Some("x.org")));
    let (path, _, _) = written(sink.flush().unwrap());
    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(raw.contains(r#"\"claim\""#), "{raw}");

    let merged_config = CsvSinkConfig {
        output_dir: dir.path().to_path_buf(),
        file_prefix: "merged".into(),
        ..config
    };
    let (merged, rows, _) = written(merge_csv(&[path], &merged_config).unwrap());

    assert_eq!(rows, 1);
    assert_eq!(
        read_cases(&merged, &merged_config.writer).unwrap(),
        vec![case("a", Some("x.org"))]
    );
}
