use dca_cases::{FilterCatalog, FilterKind, FilterTable};

#[test]
fn unreadable_files_disable_their_category() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("countryregion_codes.json"),
        r#"{"Ukraine": "71", "Germany": "22", "Lithuania": "35"}"#,
    )
    .unwrap();
    std::fs::write(dir.path().join("language_codes.json"), "{ not json").unwrap();

    let catalog = FilterCatalog::load(dir.path());

    let countries = catalog.table(FilterKind::Countries).unwrap();
    assert_eq!(
        countries.labels().collect::<Vec<_>>(),
        vec!["Germany", "Lithuania", "Ukraine"]
    );
    assert!(catalog.table(FilterKind::Languages).is_none());
    assert!(catalog.table(FilterKind::Tags).is_none());

    let selection = catalog.selection(&["Ukraine", "Atlantis", "Germany"], &["Russian"], &[]);
    assert_eq!(selection.countries, vec!["71", "22"]);
    assert!(selection.languages.is_empty());
    assert!(selection.tags.is_empty());
}

#[test]
fn missing_directory_loads_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = FilterCatalog::load(&dir.path().join("absent"));

    for kind in FilterKind::ALL {
        assert!(catalog.table(kind).is_none(), "{kind}");
    }
}

#[test]
fn table_from_file_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tag_codes.json");
    std::fs::write(&path, "[1, 2]").unwrap();

    let err = FilterTable::from_path(&path).unwrap_err();
    assert!(err.to_string().contains("tag_codes.json"));
}
