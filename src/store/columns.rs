//! Recognized control file columns and their cell codecs

use crate::record::{self, Record};
use crate::types::{self, ParseValueError};
use std::collections::HashMap;

/// A control file column the scheduler understands
///
/// Any other header is carried through untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Column {
    /// Dataset name
    Dsn,
    /// Copybook reference
    Copybook,
    /// Record format
    Recfm,
    /// Logical record length
    Lrecl,
    /// Block size
    Blksize,
    /// Dataset organization
    Dsorg,
    /// Volume serial
    Volser,
    /// Owning catalog
    Catalog,
    /// VSAM subtype
    Vsam,
    /// Key offset
    KeyOff,
    /// Key length
    KeyLen,
    /// Maximum record length
    MaxLrecl,
    /// Average record length
    AvgLrecl,
    /// Control interval size
    CiSize,
    /// Ignore flag
    Ignore,
    /// Retrieval flag
    Ftp,
    /// Retrieval completion timestamp
    FtpDate,
    /// Retrieval elapsed seconds
    FtpDuration,
    /// Conversion flag
    Dsmigin,
    /// Conversion completion timestamp
    DsmiginDate,
    /// Conversion elapsed seconds
    DsmiginDuration,
}

impl Column {
    /// Every recognized column, in canonical header order
    pub const ALL: [Column; 21] = [
        Column::Dsn,
        Column::Copybook,
        Column::Recfm,
        Column::Lrecl,
        Column::Blksize,
        Column::Dsorg,
        Column::Volser,
        Column::Catalog,
        Column::Vsam,
        Column::KeyOff,
        Column::KeyLen,
        Column::MaxLrecl,
        Column::AvgLrecl,
        Column::CiSize,
        Column::Ignore,
        Column::Ftp,
        Column::FtpDate,
        Column::FtpDuration,
        Column::Dsmigin,
        Column::DsmiginDate,
        Column::DsmiginDuration,
    ];

    /// Header text
    pub fn header(&self) -> &'static str {
        match self {
            Column::Dsn => "DSN",
            Column::Copybook => "COPYBOOK",
            Column::Recfm => "RECFM",
            Column::Lrecl => "LRECL",
            Column::Blksize => "BLKSIZE",
            Column::Dsorg => "DSORG",
            Column::Volser => "VOLSER",
            Column::Catalog => "CATALOG",
            Column::Vsam => "VSAM",
            Column::KeyOff => "KEYOFF",
            Column::KeyLen => "KEYLEN",
            Column::MaxLrecl => "MAXLRECL",
            Column::AvgLrecl => "AVGLRECL",
            Column::CiSize => "CISIZE",
            Column::Ignore => "IGNORE",
            Column::Ftp => "FTP",
            Column::FtpDate => "FTPDATE",
            Column::FtpDuration => "FTPDURATION",
            Column::Dsmigin => "DSMIGIN",
            Column::DsmiginDate => "DSMIGINDATE",
            Column::DsmiginDuration => "DSMIGINDURATION",
        }
    }

    /// Whether a control file must carry this column
    pub fn is_required(&self) -> bool {
        !matches!(self, Column::Catalog)
    }

    /// Look up a header, trimmed and case-insensitive
    pub fn from_header(header: &str) -> Option<Column> {
        let wanted = header.trim().trim_start_matches('\u{feff}');
        Column::ALL
            .into_iter()
            .find(|column| column.header().eq_ignore_ascii_case(wanted))
    }

    /// Coerce a cell into the record field this column feeds
    ///
    /// `Dsn` is handled by the loader and ignored here.
    pub fn apply(&self, record: &mut Record, cell: &str) -> Result<(), ParseValueError> {
        let layout = &mut record.layout;
        match self {
            Column::Dsn => {}
            Column::Copybook => layout.copybook = optional_text(cell),
            Column::Recfm => layout.recfm = optional(cell)?,
            Column::Lrecl => layout.lrecl = types::parse_optional_u32(cell)?,
            Column::Blksize => layout.blksize = types::parse_optional_u32(cell)?,
            Column::Dsorg => layout.dsorg = optional(cell)?,
            Column::Volser => layout.volume = optional(cell)?,
            Column::Catalog => layout.catalog = optional_text(cell),
            Column::Vsam => layout.vsam = cell.parse()?,
            Column::KeyOff => layout.key_offset = types::parse_optional_u32(cell)?,
            Column::KeyLen => layout.key_length = types::parse_optional_u32(cell)?,
            Column::MaxLrecl => layout.max_lrecl = types::parse_optional_u32(cell)?,
            Column::AvgLrecl => layout.avg_lrecl = types::parse_optional_u32(cell)?,
            Column::CiSize => layout.ci_size = types::parse_optional_u32(cell)?,
            Column::Ignore => record.ignore = types::parse_ignore(cell)?,
            Column::Ftp => record.retrieve = cell.parse()?,
            Column::FtpDate => {
                record.retrieval.completed_at = record::parse_timestamp(cell).map_err(reason)?
            }
            Column::FtpDuration => {
                record.retrieval.elapsed = record::parse_duration(cell).map_err(reason)?
            }
            Column::Dsmigin => record.convert = cell.parse()?,
            Column::DsmiginDate => {
                record.conversion.completed_at = record::parse_timestamp(cell).map_err(reason)?
            }
            Column::DsmiginDuration => {
                record.conversion.elapsed = record::parse_duration(cell).map_err(reason)?
            }
        }
        Ok(())
    }

    /// Canonical cell text for this column's field
    pub fn render(&self, record: &Record) -> String {
        let layout = &record.layout;
        match self {
            Column::Dsn => record.dataset.clone(),
            Column::Copybook => layout.copybook.clone().unwrap_or_default(),
            Column::Recfm => code_or_blank(layout.recfm.map(|r| r.code())),
            Column::Lrecl => number(layout.lrecl),
            Column::Blksize => number(layout.blksize),
            Column::Dsorg => code_or_blank(layout.dsorg.map(|d| d.code())),
            Column::Volser => code_or_blank(layout.volume.as_ref().map(|v| v.code())),
            Column::Catalog => layout.catalog.clone().unwrap_or_default(),
            Column::Vsam => layout.vsam.code().to_string(),
            Column::KeyOff => number(layout.key_offset),
            Column::KeyLen => number(layout.key_length),
            Column::MaxLrecl => number(layout.max_lrecl),
            Column::AvgLrecl => number(layout.avg_lrecl),
            Column::CiSize => number(layout.ci_size),
            Column::Ignore => types::ignore_code(record.ignore).to_string(),
            Column::Ftp => record.retrieve.code().to_string(),
            Column::FtpDate => timestamp(&record.retrieval.completed_at),
            Column::FtpDuration => duration(&record.retrieval.elapsed),
            Column::Dsmigin => record.convert.code().to_string(),
            Column::DsmiginDate => timestamp(&record.conversion.completed_at),
            Column::DsmiginDuration => duration(&record.conversion.elapsed),
        }
    }
}

/// Header positions of the recognized columns
#[derive(Clone, Debug, Default)]
pub struct ColumnMap {
    positions: HashMap<Column, usize>,
}

impl ColumnMap {
    /// Map a header row, rejecting missing or repeated recognized columns
    pub fn from_headers<S: AsRef<str>>(headers: &[S]) -> Result<Self, String> {
        let mut positions = HashMap::new();
        for (index, header) in headers.iter().enumerate() {
            if let Some(column) = Column::from_header(header.as_ref())
                && positions.insert(column, index).is_some()
            {
                return Err(format!("column {} appears more than once", column.header()));
            }
        }

        let missing: Vec<&str> = Column::ALL
            .iter()
            .filter(|column| column.is_required() && !positions.contains_key(column))
            .map(|column| column.header())
            .collect();
        if !missing.is_empty() {
            return Err(format!("missing required columns: {}", missing.join(", ")));
        }

        Ok(Self { positions })
    }

    /// Position of a column in the header, if present
    pub fn position(&self, column: Column) -> Option<usize> {
        self.positions.get(&column).copied()
    }

    /// Recognized columns present in this file with their positions
    pub fn iter(&self) -> impl Iterator<Item = (Column, usize)> + '_ {
        self.positions.iter().map(|(column, index)| (*column, *index))
    }
}

/// Header row written by `--init`
pub fn canonical_headers() -> Vec<&'static str> {
    Column::ALL.iter().map(|column| column.header()).collect()
}

fn optional<T: std::str::FromStr<Err = ParseValueError>>(
    cell: &str,
) -> Result<Option<T>, ParseValueError> {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        Ok(None)
    } else {
        trimmed.parse().map(Some)
    }
}

fn optional_text(cell: &str) -> Option<String> {
    let trimmed = cell.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn reason(reason: String) -> ParseValueError {
    ParseValueError { reason }
}

fn code_or_blank(code: Option<&str>) -> String {
    code.unwrap_or_default().to_string()
}

fn number(value: Option<u32>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn timestamp(at: &Option<chrono::NaiveDateTime>) -> String {
    at.as_ref().map(record::format_timestamp).unwrap_or_default()
}

fn duration(elapsed: &Option<std::time::Duration>) -> String {
    elapsed.as_ref().map(record::format_duration).unwrap_or_default()
}
