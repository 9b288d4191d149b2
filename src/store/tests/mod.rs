use super::*;
use crate::error::RowErrorKind;
use crate::record::{TIMESTAMP_FORMAT, now};
use crate::types::{ConvertFlag, Dsorg, RecordFormat, RetrieveFlag, Volume};
use chrono::NaiveDateTime;
use std::time::Duration;
use tempfile::TempDir;

const HEADER: &str = "DSN,COPYBOOK,RECFM,LRECL,BLKSIZE,DSORG,VOLSER,VSAM,KEYOFF,KEYLEN,MAXLRECL,\
AVGLRECL,CISIZE,IGNORE,FTP,FTPDATE,FTPDURATION,DSMIGIN,DSMIGINDATE,DSMIGINDURATION,NOTES\n";

fn row(dsn: &str, ignore: &str, ftp: &str, ftp_date: &str, dsmigin: &str, note: &str) -> String {
    format!("{dsn},,FB,80,27920,PS,VOL001,,,,,,,{ignore},{ftp},{ftp_date},,{dsmigin},,,{note}\n")
}

fn write_control(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("datasets.csv");
    std::fs::write(&path, content).unwrap();
    path
}

fn at(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).unwrap()
}

#[test]
fn test_load_reads_records_in_file_order() {
    let dir = TempDir::new().unwrap();
    let content = format!(
        "{HEADER}{}{}",
        row("A.DATA", "N", "Y", "", "Y", "first"),
        row("B.DATA", "", "N", "2024-01-02 03:04:05", "C", "")
    );
    let control = ControlFile::load(write_control(&dir, &content), b',').unwrap();

    let records: Vec<&Record> = control.records().map(|(_, r)| r).collect();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].dataset, "A.DATA");
    assert_eq!(records[0].layout.recfm, Some(RecordFormat::Fb));
    assert_eq!(records[0].layout.lrecl, Some(80));
    assert_eq!(records[0].layout.dsorg, Some(Dsorg::Ps));
    assert_eq!(
        records[0].layout.volume,
        Some(Volume::Serial("VOL001".into()))
    );
    assert_eq!(records[0].retrieve, RetrieveFlag::Yes);
    assert!(!records[0].retrieval.is_complete());

    assert_eq!(records[1].retrieve, RetrieveFlag::No);
    assert_eq!(records[1].convert, ConvertFlag::ConvertOnly);
    assert!(!records[1].ignore);
    assert_eq!(
        records[1].retrieval.completed_at,
        Some(at("2024-01-02 03:04:05"))
    );
    assert_eq!(control.rejected().count(), 0);
}

#[test]
fn test_round_trip_without_changes_is_byte_identical() {
    let dir = TempDir::new().unwrap();
    // CRLF endings, quoted cells, a rejected row and no final newline
    let content = format!(
        "{}{}{}{}",
        HEADER.replace('\n', "\r\n"),
        row("\"A.DATA\"", "N", "Y", "", "Y", "\"a, b\"").replace('\n', "\r\n"),
        row("B.DATA", "N", "maybe", "", "Y", "").replace('\n', "\r\n"),
        row("C.DATA", "Y", "F", "2024-01-02 03:04:05", "N", "last").trim_end()
    );
    let path = write_control(&dir, &content);

    let mut control = ControlFile::load(&path, b',').unwrap();
    assert_eq!(control.to_bytes().unwrap(), content.as_bytes());

    control.save().unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), content);
}

#[test]
fn test_missing_required_column_is_format_error() {
    let dir = TempDir::new().unwrap();
    let path = write_control(&dir, "DSN,COPYBOOK,FTP\nA.DATA,,Y\n");

    let err = ControlFile::load(&path, b',').unwrap_err();
    match err {
        Error::Format { reason, .. } => {
            assert!(reason.contains("RECFM"), "{reason}");
            assert!(!reason.contains("CATALOG"), "CATALOG is optional: {reason}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_duplicate_required_header_is_format_error() {
    let dir = TempDir::new().unwrap();
    let header = HEADER.replace("NOTES", "ftp");
    let path = write_control(&dir, &header);

    let err = ControlFile::load(&path, b',').unwrap_err();
    assert!(matches!(err, Error::Format { ref reason, .. } if reason.contains("FTP")));
}

#[test]
fn test_empty_file_is_format_error() {
    let dir = TempDir::new().unwrap();
    let path = write_control(&dir, "");
    assert!(matches!(
        ControlFile::load(&path, b',').unwrap_err(),
        Error::Format { .. }
    ));
}

#[test]
fn test_headers_match_trimmed_and_case_insensitive() {
    let dir = TempDir::new().unwrap();
    let header = HEADER.replace("DSN,", " dsn ,").replace("FTPDATE", "FtpDate");
    let content = format!("{header}{}", row("A.DATA", "N", "Y", "", "Y", ""));
    let control = ControlFile::load(write_control(&dir, &content), b',').unwrap();
    assert!(control.find("A.DATA").is_some());
}

#[test]
fn test_bad_cell_rejects_only_that_row() {
    let dir = TempDir::new().unwrap();
    let content = format!(
        "{HEADER}{}{}{}",
        row("A.DATA", "N", "Y", "", "Y", ""),
        row("B.DATA", "N", "X", "", "Y", ""),
        row("C.DATA", "N", "Y", "not a date", "Y", "")
    );
    let control = ControlFile::load(write_control(&dir, &content), b',').unwrap();

    assert_eq!(control.records().count(), 1);
    let rejected: Vec<&RowError> = control.rejected().collect();
    assert_eq!(rejected.len(), 2);
    assert_eq!(rejected[0].line, 3);
    assert_eq!(rejected[0].dataset.as_deref(), Some("B.DATA"));
    assert!(matches!(
        &rejected[0].kind,
        RowErrorKind::InvalidValue { column, value, .. } if column == "FTP" && value == "X"
    ));
    assert!(matches!(
        &rejected[1].kind,
        RowErrorKind::InvalidValue { column, .. } if column == "FTPDATE"
    ));
}

#[test]
fn test_blank_dataset_is_rejected() {
    let dir = TempDir::new().unwrap();
    let content = format!("{HEADER}{}", row("  ", "N", "Y", "", "Y", ""));
    let control = ControlFile::load(write_control(&dir, &content), b',').unwrap();

    let rejected: Vec<&RowError> = control.rejected().collect();
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].kind, RowErrorKind::MissingDataset);
}

#[test]
fn test_duplicate_dataset_first_occurrence_wins() {
    let dir = TempDir::new().unwrap();
    let content = format!(
        "{HEADER}{}{}{}",
        row("A.DATA", "N", "Y", "", "Y", "keep"),
        row("B.DATA", "N", "Y", "", "Y", ""),
        row("A.DATA", "N", "F", "", "Y", "drop")
    );
    let control = ControlFile::load(write_control(&dir, &content), b',').unwrap();

    assert_eq!(control.records().count(), 2);
    assert_eq!(control.find("A.DATA").unwrap().retrieve, RetrieveFlag::Yes);

    let rejected: Vec<&RowError> = control.rejected().collect();
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].line, 4);
    assert_eq!(rejected[0].kind, RowErrorKind::Duplicate { first_line: 2 });
    assert_eq!(rejected[0].error_code(), "duplicate_key");
}

#[test]
fn test_changed_row_rerenders_only_changed_cells() {
    let dir = TempDir::new().unwrap();
    let content = format!(
        "{HEADER}{}{}",
        row("A.DATA", "N", "", "", "Y", "\"x, y\""),
        row("B.DATA", "N", "N", "", "Y", "untouched")
    );
    let path = write_control(&dir, &content);
    let mut control = ControlFile::load(&path, b',').unwrap();

    let (index, _) = control.records().next().unwrap();
    {
        let mut selected = control.select_mut(&[index]);
        selected[0]
            .retrieval
            .complete(at("2024-05-01 10:00:00"), Duration::from_millis(12_500));
    }
    control.save().unwrap();

    let saved = std::fs::read_to_string(&path).unwrap();
    let expected = format!(
        "{HEADER}{}{}",
        // The blank FTP cell still reads as Yes and stays blank
        "A.DATA,,FB,80,27920,PS,VOL001,,,,,,,N,,2024-05-01 10:00:00,12.5000,Y,,,\"x, y\"\n",
        row("B.DATA", "N", "N", "", "Y", "untouched")
    );
    assert_eq!(saved, expected);

    let reloaded = ControlFile::load(&path, b',').unwrap();
    let record = reloaded.find("A.DATA").unwrap();
    assert_eq!(record.retrieval.elapsed, Some(Duration::from_millis(12_500)));
}

#[test]
fn test_short_row_is_padded_when_state_changes() {
    let dir = TempDir::new().unwrap();
    let content = format!("{HEADER}B.DATA,,FB,80,27920,PS,VOL001\n");
    let path = write_control(&dir, &content);
    let mut control = ControlFile::load(&path, b',').unwrap();

    let completed = now();
    control.select_mut(&[0])[0]
        .conversion
        .complete(completed, Duration::from_secs(2));
    control.save().unwrap();

    let reloaded = ControlFile::load(&path, b',').unwrap();
    let record = reloaded.find("B.DATA").unwrap();
    assert_eq!(record.conversion.completed_at, Some(completed));
    assert_eq!(reloaded.rows()[0].cells().len(), 20);
}

#[test]
fn test_select_mut_yields_records_in_file_order_skipping_rejected() {
    let dir = TempDir::new().unwrap();
    let content = format!(
        "{HEADER}{}{}{}",
        row("A.DATA", "N", "Y", "", "Y", ""),
        row("B.DATA", "N", "?", "", "Y", ""),
        row("C.DATA", "N", "Y", "", "Y", "")
    );
    let mut control = ControlFile::load(write_control(&dir, &content), b',').unwrap();

    let selected = control.select_mut(&[2, 1, 0, 42]);
    let names: Vec<&str> = selected.iter().map(|r| r.dataset.as_str()).collect();
    assert_eq!(names, vec!["A.DATA", "C.DATA"]);
}

#[test]
fn test_second_save_after_checkpoint_is_stable() {
    let dir = TempDir::new().unwrap();
    let content = format!("{HEADER}{}", row("A.DATA", "N", "Y", "", "Y", ""));
    let path = write_control(&dir, &content);
    let mut control = ControlFile::load(&path, b',').unwrap();

    control.select_mut(&[0])[0]
        .retrieval
        .complete(at("2024-05-01 10:00:00"), Duration::from_secs(1));
    control.save().unwrap();
    let first = std::fs::read(&path).unwrap();

    control.save().unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), first);
}

#[test]
fn test_checkpoint_keeps_earlier_changes_when_another_field_changes() {
    let dir = TempDir::new().unwrap();
    let content = format!("{HEADER}{}", row("A.DATA", "N", "Y", "", "Y", "note"));
    let path = write_control(&dir, &content);
    let mut control = ControlFile::load(&path, b',').unwrap();

    control.select_mut(&[0])[0]
        .retrieval
        .complete(at("2024-05-01 10:00:00"), Duration::from_secs(3));
    control.save().unwrap();
    control.select_mut(&[0])[0]
        .conversion
        .complete(at("2024-05-01 11:00:00"), Duration::from_secs(4));
    control.save().unwrap();

    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        format!(
            "{HEADER}A.DATA,,FB,80,27920,PS,VOL001,,,,,,,N,Y,2024-05-01 10:00:00,3.0000,Y,\
             2024-05-01 11:00:00,4.0000,note\n"
        )
    );
    let reloaded = ControlFile::load(&path, b',').unwrap();
    let record = reloaded.find("A.DATA").unwrap();
    assert!(record.retrieval.is_complete());
    assert!(record.conversion.is_complete());
}

#[test]
fn test_crlf_row_change_touches_only_the_changed_cell() {
    let dir = TempDir::new().unwrap();
    let content = format!(
        "{}{}{}",
        HEADER.replace('\n', "\r\n"),
        row("A.DATA", "N", "Y", "", "Y", "first").replace('\n', "\r\n"),
        row("B.DATA", "N", "Y", "", "Y", "second").replace('\n', "\r\n")
    );
    let path = write_control(&dir, &content);
    let mut control = ControlFile::load(&path, b',').unwrap();

    control.select_mut(&[1])[0]
        .retrieval
        .complete(at("2024-05-01 10:00:00"), Duration::from_secs(1));
    control.save().unwrap();

    let expected = content.replace(
        "B.DATA,,FB,80,27920,PS,VOL001,,,,,,,N,Y,,,",
        "B.DATA,,FB,80,27920,PS,VOL001,,,,,,,N,Y,2024-05-01 10:00:00,1.0000,",
    );
    assert_eq!(std::fs::read_to_string(&path).unwrap(), expected);
}

#[test]
fn test_invalid_dataset_names_are_rejected_rows() {
    let dir = TempDir::new().unwrap();
    let content = format!(
        "{HEADER}{}{}{}",
        row("..", "N", "Y", "", "C", ""),
        row("\"HLQ.A\n!sh\"", "N", "Y", "", "Y", ""),
        row("HLQ.GOOD", "N", "Y", "", "Y", "")
    );
    let path = write_control(&dir, &content);
    let mut control = ControlFile::load(&path, b',').unwrap();

    let rejected: Vec<&RowError> = control.rejected().collect();
    assert_eq!(rejected.len(), 2);
    assert!(
        rejected
            .iter()
            .all(|e| matches!(e.kind, RowErrorKind::InvalidDataset { .. }))
    );
    let names: Vec<&str> = control.records().map(|(_, r)| r.dataset.as_str()).collect();
    assert_eq!(names, vec!["HLQ.GOOD"]);

    control.save().unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), content);
}

#[test]
fn test_save_into_vanished_directory_is_persistence_error() {
    let dir = TempDir::new().unwrap();
    let sub = dir.path().join("work");
    std::fs::create_dir(&sub).unwrap();
    let path = sub.join("datasets.csv");
    std::fs::write(&path, HEADER).unwrap();

    let mut control = ControlFile::load(&path, b',').unwrap();
    std::fs::remove_dir_all(&sub).unwrap();

    let err = control.save().unwrap_err();
    assert!(matches!(err, Error::Persistence { .. }));
    assert!(err.is_fatal());
}

#[test]
fn test_semicolon_delimiter() {
    let dir = TempDir::new().unwrap();
    let content = format!(
        "{}{}",
        HEADER.replace(',', ";"),
        row("A.DATA", "N", "Y", "", "Y", "").replace(',', ";")
    );
    let path = write_control(&dir, &content);
    let control = ControlFile::load(&path, b';').unwrap();
    assert_eq!(control.find("A.DATA").unwrap().layout.blksize, Some(27920));
}

#[test]
fn test_create_writes_canonical_header_once() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("new.csv");

    let control = ControlFile::create(&path, b',').unwrap();
    assert_eq!(control.rows().len(), 0);
    let written = std::fs::read_to_string(&path).unwrap();
    assert!(written.starts_with("DSN,COPYBOOK,RECFM,"));
    assert!(written.ends_with("DSMIGINDURATION\n"));

    assert!(matches!(
        ControlFile::create(&path, b',').unwrap_err(),
        Error::Persistence { .. }
    ));
}

#[test]
fn test_append_dataset_adds_blank_row_and_rejects_duplicates() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("new.csv");
    let mut control = ControlFile::create(&path, b',').unwrap();

    control.append_dataset("HLQ.NEW.ONE").unwrap();
    control.append_dataset(" HLQ.NEW.TWO ").unwrap();
    assert!(matches!(
        control.append_dataset("HLQ.NEW.ONE").unwrap_err(),
        Error::DuplicateKey { .. }
    ));
    for bad in ["..", "HLQ.A\nquit", "hlq.lower"] {
        assert!(matches!(
            control.append_dataset(bad).unwrap_err(),
            Error::InvalidDataset { .. }
        ));
    }
    control.save().unwrap();

    let written = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = written.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[1], format!("HLQ.NEW.ONE{}", ",".repeat(20)));

    let reloaded = ControlFile::load(&path, b',').unwrap();
    let record = reloaded.find("HLQ.NEW.TWO").unwrap();
    assert_eq!(record.retrieve, RetrieveFlag::Yes);
    assert_eq!(record.convert, ConvertFlag::Yes);
}

#[test]
fn test_append_after_unterminated_last_line_starts_new_line() {
    let dir = TempDir::new().unwrap();
    let content = format!("{HEADER}{}", row("A.DATA", "N", "Y", "", "Y", "").trim_end());
    let path = write_control(&dir, &content);
    let mut control = ControlFile::load(&path, b',').unwrap();

    control.append_dataset("B.DATA").unwrap();
    control.save().unwrap();

    let reloaded = ControlFile::load(&path, b',').unwrap();
    assert_eq!(reloaded.records().count(), 2);
    assert!(reloaded.find("B.DATA").is_some());
}

#[test]
fn test_backup_copies_file_with_tag() {
    let dir = TempDir::new().unwrap();
    let content = format!("{HEADER}{}", row("A.DATA", "N", "Y", "", "Y", ""));
    let path = write_control(&dir, &content);
    let control = ControlFile::load(&path, b',').unwrap();

    let backups = dir.path().join("backups");
    let copy = control.backup(&backups, Some("wave1")).unwrap();

    let name = copy.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("datasets_wave1_"), "{name}");
    assert!(name.ends_with(".csv"));
    assert_eq!(std::fs::read_to_string(&copy).unwrap(), content);
}
