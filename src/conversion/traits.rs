//! Traits and types for dataset conversion

use crate::error::{Error, Result};
use crate::record::Layout;
use crate::types::{Dsorg, VsamType};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Extension a copybook must carry
pub const COPYBOOK_EXTENSION: &str = "cpy";

/// Whether a conversion writes into the target environment
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvertMode {
    /// Decode and load into the target catalog
    Load,
    /// Decode into a scratch directory and discard the result
    DryRun,
}

/// Layout columns of a dataset plus its resolved copybook
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayoutDescription {
    /// Copybook file in the copybook directory
    pub copybook: PathBuf,
    /// Layout columns as read from the control file
    pub layout: Layout,
}

impl LayoutDescription {
    /// Resolve the copybook reference; a blank reference means `<DSN>.cpy`
    pub fn resolve(dataset: &str, layout: &Layout, copybook_dir: &Path) -> Self {
        let file = match &layout.copybook {
            Some(copybook) => copybook.clone(),
            None => format!("{dataset}.{COPYBOOK_EXTENSION}"),
        };
        Self {
            copybook: copybook_dir.join(file),
            layout: layout.clone(),
        }
    }

    /// Schema file `cobgensch` generates next to the copybook
    pub fn schema(&self) -> PathBuf {
        self.copybook.with_extension("conv")
    }

    /// Check that the layout carries what the organization needs and the copybook exists
    pub fn validate(&self, dataset: &str) -> Result<()> {
        let missing = |what: &str| Error::Conversion {
            dataset: dataset.to_string(),
            reason: format!("{what} is blank"),
        };
        let layout = &self.layout;

        match layout.dsorg {
            Some(Dsorg::Ps) | Some(Dsorg::Po) => {
                layout.recfm.ok_or_else(|| missing("RECFM"))?;
                layout.lrecl.ok_or_else(|| missing("LRECL"))?;
                layout.blksize.ok_or_else(|| missing("BLKSIZE"))?;
            }
            Some(Dsorg::Vsam) => {
                layout.recfm.ok_or_else(|| missing("RECFM"))?;
                if layout.vsam == VsamType::NotApplicable {
                    return Err(missing("VSAM"));
                }
                layout.key_offset.ok_or_else(|| missing("KEYOFF"))?;
                layout.key_length.ok_or_else(|| missing("KEYLEN"))?;
                layout.max_lrecl.ok_or_else(|| missing("MAXLRECL"))?;
                layout.avg_lrecl.ok_or_else(|| missing("AVGLRECL"))?;
            }
            Some(other) => {
                return Err(Error::NotSupported(format!(
                    "{dataset}: conversion of {other} datasets"
                )));
            }
            None => return Err(missing("DSORG")),
        }

        let has_extension = self
            .copybook
            .extension()
            .is_some_and(|ext| ext == COPYBOOK_EXTENSION);
        if !has_extension {
            return Err(Error::Conversion {
                dataset: dataset.to_string(),
                reason: format!(
                    "copybook {} must have the .{COPYBOOK_EXTENSION} extension",
                    self.copybook.display()
                ),
            });
        }
        if !self.copybook.is_file() {
            return Err(Error::Conversion {
                dataset: dataset.to_string(),
                reason: format!("copybook {} not found", self.copybook.display()),
            });
        }
        Ok(())
    }
}

/// Result of a successful conversion
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertReport {
    /// Where the data was loaded (catalog name, or scratch path for a dry run)
    pub target: String,
    /// Members converted, for partitioned datasets
    pub members: Option<usize>,
}

/// Trait for decoding a retrieved dataset and loading it into the target environment
///
/// An `Err` is reported as a failed conversion for that row.
#[async_trait]
pub trait Converter: Send + Sync {
    /// Convert the retrieved copy of `dataset` found at `source`
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The layout is incomplete or the copybook is missing
    /// - A tool exits with a failure status
    /// - The organization is not supported
    async fn convert(
        &self,
        dataset: &str,
        layout: &LayoutDescription,
        source: &Path,
        mode: ConvertMode,
    ) -> crate::Result<ConvertReport>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
