//! Core types for dsmig
//!
//! Every control file vocabulary (flags, organizations, record formats, VSAM subtypes) is a
//! closed enum with a `FromStr` that reports the accepted spellings and a `code()` that
//! renders the canonical cell text.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error returned when a cell does not belong to a column's vocabulary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseValueError {
    /// Human-readable reason, used in row rejection messages
    pub reason: String,
}

impl fmt::Display for ParseValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

impl std::error::Error for ParseValueError {}

fn expected(accepted: &str) -> ParseValueError {
    ParseValueError {
        reason: format!("expected one of {accepted}"),
    }
}

/// Retrieval flag (`FTP` column)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrieveFlag {
    /// Retrieve once; skip when already retrieved (`Y`, or blank)
    #[default]
    Yes,
    /// Never retrieve (`N`)
    No,
    /// Always retrieve, replacing prior completion state (`F`)
    Force,
}

impl RetrieveFlag {
    /// Canonical cell text
    pub fn code(&self) -> &'static str {
        match self {
            RetrieveFlag::Yes => "Y",
            RetrieveFlag::No => "N",
            RetrieveFlag::Force => "F",
        }
    }
}

impl FromStr for RetrieveFlag {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "" | "Y" => Ok(RetrieveFlag::Yes),
            "N" => Ok(RetrieveFlag::No),
            "F" => Ok(RetrieveFlag::Force),
            _ => Err(expected("Y, N, F")),
        }
    }
}

/// Conversion flag (`DSMIGIN` column)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvertFlag {
    /// Convert once; skip when already converted (`Y`, or blank)
    #[default]
    Yes,
    /// Never convert (`N`)
    No,
    /// Always convert, replacing prior completion state (`F`)
    Force,
    /// Convert as a dry run, never recording completion (`C`)
    ConvertOnly,
}

impl ConvertFlag {
    /// Canonical cell text
    pub fn code(&self) -> &'static str {
        match self {
            ConvertFlag::Yes => "Y",
            ConvertFlag::No => "N",
            ConvertFlag::Force => "F",
            ConvertFlag::ConvertOnly => "C",
        }
    }
}

impl FromStr for ConvertFlag {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "" | "Y" => Ok(ConvertFlag::Yes),
            "N" => Ok(ConvertFlag::No),
            "F" => Ok(ConvertFlag::Force),
            "C" => Ok(ConvertFlag::ConvertOnly),
            _ => Err(expected("Y, N, F, C")),
        }
    }
}

/// Parse the `IGNORE` column: `Y` ignores the row, `N` or blank keeps it
pub fn parse_ignore(s: &str) -> Result<bool, ParseValueError> {
    match s.trim().to_ascii_uppercase().as_str() {
        "Y" => Ok(true),
        "" | "N" => Ok(false),
        _ => Err(expected("Y, N")),
    }
}

/// Canonical `IGNORE` cell text
pub fn ignore_code(ignore: bool) -> &'static str {
    if ignore { "Y" } else { "N" }
}

/// Dataset organization (`DSORG` column)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Dsorg {
    /// Physical sequential
    Ps,
    /// Partitioned (library of members)
    Po,
    /// VSAM cluster, retrieved from its unloaded flat file
    Vsam,
    /// Generation data group base
    Gdg,
}

impl Dsorg {
    /// Canonical cell text
    pub fn code(&self) -> &'static str {
        match self {
            Dsorg::Ps => "PS",
            Dsorg::Po => "PO",
            Dsorg::Vsam => "VSAM",
            Dsorg::Gdg => "GDG",
        }
    }
}

impl FromStr for Dsorg {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PS" => Ok(Dsorg::Ps),
            "PO" => Ok(Dsorg::Po),
            "VSAM" => Ok(Dsorg::Vsam),
            "GDG" => Ok(Dsorg::Gdg),
            _ => Err(expected("PS, PO, VSAM, GDG")),
        }
    }
}

impl fmt::Display for Dsorg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Record format (`RECFM` column)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordFormat {
    /// Fixed
    F,
    /// Fixed blocked
    Fb,
    /// Fixed blocked with ASA control characters
    Fba,
    /// Fixed blocked with machine control characters
    Fbm,
    /// Variable
    V,
    /// Variable blocked
    Vb,
    /// Variable blocked with ASA control characters
    Vba,
    /// Variable blocked with machine control characters
    Vbm,
    /// Undefined
    U,
}

impl RecordFormat {
    /// Canonical cell text
    pub fn code(&self) -> &'static str {
        match self {
            RecordFormat::F => "F",
            RecordFormat::Fb => "FB",
            RecordFormat::Fba => "FBA",
            RecordFormat::Fbm => "FBM",
            RecordFormat::V => "V",
            RecordFormat::Vb => "VB",
            RecordFormat::Vba => "VBA",
            RecordFormat::Vbm => "VBM",
            RecordFormat::U => "U",
        }
    }

    /// Whether records carry a record descriptor word (variable-length formats)
    pub fn is_variable(&self) -> bool {
        matches!(
            self,
            RecordFormat::V | RecordFormat::Vb | RecordFormat::Vba | RecordFormat::Vbm
        )
    }

    /// Whether records have a fixed length
    pub fn is_fixed(&self) -> bool {
        matches!(
            self,
            RecordFormat::F | RecordFormat::Fb | RecordFormat::Fba | RecordFormat::Fbm
        )
    }
}

impl FromStr for RecordFormat {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "F" => Ok(RecordFormat::F),
            "FB" => Ok(RecordFormat::Fb),
            "FBA" => Ok(RecordFormat::Fba),
            "FBM" => Ok(RecordFormat::Fbm),
            "V" => Ok(RecordFormat::V),
            "VB" => Ok(RecordFormat::Vb),
            "VBA" => Ok(RecordFormat::Vba),
            "VBM" => Ok(RecordFormat::Vbm),
            "U" => Ok(RecordFormat::U),
            _ => Err(expected("F, FB, FBA, FBM, V, VB, VBA, VBM, U")),
        }
    }
}

impl fmt::Display for RecordFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// VSAM cluster subtype (`VSAM` column)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VsamType {
    /// Key-sequenced (`KS`)
    Ksds,
    /// Entry-sequenced (`ES`)
    Esds,
    /// Relative record (`RR`)
    Rrds,
    /// Linear (`LS`)
    Lds,
    /// Not a VSAM dataset (blank cell)
    #[default]
    NotApplicable,
}

impl VsamType {
    /// Canonical cell text
    pub fn code(&self) -> &'static str {
        match self {
            VsamType::Ksds => "KS",
            VsamType::Esds => "ES",
            VsamType::Rrds => "RR",
            VsamType::Lds => "LS",
            VsamType::NotApplicable => "",
        }
    }
}

impl FromStr for VsamType {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "" | "NA" | "N/A" => Ok(VsamType::NotApplicable),
            "KS" | "KSDS" => Ok(VsamType::Ksds),
            "ES" | "ESDS" => Ok(VsamType::Esds),
            "RR" | "RRDS" => Ok(VsamType::Rrds),
            "LS" | "LDS" => Ok(VsamType::Lds),
            _ => Err(expected("KS, ES, RR, LS or blank")),
        }
    }
}

/// Volume serial (`VOLSER` column)
///
/// A handful of pseudo-volumes returned by the catalog have their own meaning for retrieval.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Volume {
    /// A regular DASD volume serial
    Serial(String),
    /// Dataset lives on tape
    Tape,
    /// Catalog entry without a real volume (aliases, pseudo datasets)
    Pseudo,
    /// Dataset has been migrated by HSM and must be recalled first
    Migrated,
}

impl Volume {
    /// Canonical cell text
    pub fn code(&self) -> &str {
        match self {
            Volume::Serial(serial) => serial,
            Volume::Tape => "Tape",
            Volume::Pseudo => "Pseudo",
            Volume::Migrated => "Migrated",
        }
    }
}

impl FromStr for Volume {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "tape" => Ok(Volume::Tape),
            "pseudo" => Ok(Volume::Pseudo),
            "migrated" => Ok(Volume::Migrated),
            _ if is_volume_serial(trimmed) => Ok(Volume::Serial(trimmed.to_ascii_uppercase())),
            _ => Err(ParseValueError {
                reason: "expected a volume serial of at most 6 characters, Tape, Pseudo or \
                         Migrated"
                    .to_string(),
            }),
        }
    }
}

fn is_volume_serial(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 6
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '@' | '#' | '$'))
}

/// Check a dataset name: 1 to 44 characters of dot-separated qualifiers, each 1 to 8
/// characters, starting with a letter or `@#$` and continuing with letters, digits, `@#$-`
pub fn check_dataset_name(s: &str) -> Result<(), ParseValueError> {
    let invalid = |reason: &str| ParseValueError {
        reason: reason.to_string(),
    };
    if s.is_empty() || s.len() > 44 {
        return Err(invalid("dataset name must be 1 to 44 characters"));
    }
    for qualifier in s.split('.') {
        let mut chars = qualifier.chars();
        let Some(first) = chars.next() else {
            return Err(invalid("dataset name has an empty qualifier"));
        };
        if qualifier.len() > 8 {
            return Err(invalid("dataset name qualifier longer than 8 characters"));
        }
        if !(first.is_ascii_uppercase() || matches!(first, '@' | '#' | '$'))
            || !chars.all(|c| {
                c.is_ascii_uppercase() || c.is_ascii_digit() || matches!(c, '@' | '#' | '$' | '-')
            })
        {
            return Err(invalid("dataset name qualifier has invalid characters"));
        }
    }
    Ok(())
}

/// Parse an optional unsigned layout number; blank is "not set"
pub fn parse_optional_u32(s: &str) -> Result<Option<u32>, ParseValueError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed.parse::<u32>().map(Some).map_err(|_| ParseValueError {
        reason: "not an unsigned integer".to_string(),
    })
}

/// One of the two per-row phases
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Transfer from the remote host
    Retrieval,
    /// Decode and load into the target environment
    Conversion,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Retrieval => f.write_str("retrieval"),
            Phase::Conversion => f.write_str("conversion"),
        }
    }
}

/// Which phases a run executes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseSet {
    /// Run the retrieval phase
    pub retrieval: bool,
    /// Run the conversion phase
    pub conversion: bool,
}

impl PhaseSet {
    /// Both phases
    pub fn both() -> Self {
        Self {
            retrieval: true,
            conversion: true,
        }
    }

    /// Retrieval only
    pub fn retrieval() -> Self {
        Self {
            retrieval: true,
            conversion: false,
        }
    }

    /// Conversion only
    pub fn conversion() -> Self {
        Self {
            retrieval: false,
            conversion: true,
        }
    }

    /// Whether no phase was requested
    pub fn is_empty(&self) -> bool {
        !self.retrieval && !self.conversion
    }
}
