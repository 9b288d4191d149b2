//! Control file fixtures

use dsmig::Config;
use dsmig::config::WorkspaceConfig;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Canonical header without the optional CATALOG column, plus an unknown NOTES column
pub const HEADER: &str = "DSN,COPYBOOK,RECFM,LRECL,BLKSIZE,DSORG,VOLSER,VSAM,KEYOFF,KEYLEN,\
MAXLRECL,AVGLRECL,CISIZE,IGNORE,FTP,FTPDATE,FTPDURATION,DSMIGIN,DSMIGINDATE,\
DSMIGINDURATION,NOTES\n";

/// Zero-based position of FTPDATE in [`HEADER`]
pub const FTPDATE: usize = 15;
/// Zero-based position of DSMIGINDATE in [`HEADER`]
pub const DSMIGINDATE: usize = 18;

/// A sequential dataset row
pub fn row(
    dsn: &str,
    ignore: &str,
    ftp: &str,
    ftp_date: &str,
    dsmigin: &str,
    dsmigin_date: &str,
) -> String {
    format!(
        "{dsn},,FB,80,27920,PS,VOL001,,,,,,,{ignore},{ftp},{ftp_date},,\
         {dsmigin},{dsmigin_date},,note for {dsn}\n"
    )
}

/// Write `content` as the control file of a fresh working directory
pub fn workspace(content: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("datasets.csv");
    std::fs::write(&path, content).unwrap();
    (dir, path)
}

/// Configuration rooted in `dir`, without backups
pub fn config_in(dir: &Path) -> Config {
    let mut config = Config {
        workspace: WorkspaceConfig {
            working_dir: dir.to_path_buf(),
            copybook_dir: None,
        },
        ..Default::default()
    };
    config.control.backup = false;
    config
}

/// Cell `column` of data line `line` (1-based, header is line 0)
pub fn cell(path: &Path, line: usize, column: usize) -> String {
    let text = std::fs::read_to_string(path).unwrap();
    let line = text.lines().nth(line).unwrap();
    line.split(',').nth(column).unwrap_or_default().to_string()
}
