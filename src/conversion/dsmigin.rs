//! Conversion through the OpenFrame dataset tools

use super::traits::{ConvertMode, ConvertReport, Converter, LayoutDescription};
use crate::config::{ConversionConfig, WorkspaceConfig};
use crate::error::{Error, Result};
use crate::record::{Layout, validate_dataset_name};
use crate::types::{Dsorg, RecordFormat, Volume};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Converter driving `cobgensch`, `dsmigin` and `idcams`
///
/// Per dataset:
///
/// 1. `cobgensch <copybook>` generates the `.conv` schema
/// 2. Load mode only: the target is recreated (`dsdelete`, `dscreate` for libraries,
///    `idcams delete` and `idcams define` for VSAM clusters)
/// 3. `dsmigin` decodes the retrieved bytes, member by member for libraries
///
/// A dry run passes `-C` so `dsmigin` writes under the conversion directory instead of the
/// catalog; that output is removed afterwards.
pub struct DsmiginConverter {
    tools: Tools,
    encoding_code: String,
    default_catalog: String,
    default_volume: String,
    conversion_dir: PathBuf,
}

/// Resolved tool binaries
#[derive(Debug, Clone)]
struct Tools {
    dsmigin: PathBuf,
    cobgensch: PathBuf,
    idcams: PathBuf,
    dsdelete: PathBuf,
    dscreate: PathBuf,
}

impl DsmiginConverter {
    /// Build from configuration, locating tools in PATH unless configured
    pub fn from_config(config: &ConversionConfig, workspace: &WorkspaceConfig) -> Result<Self> {
        let dsmigin = locate(config.dsmigin_path.as_ref(), "dsmigin", None)?;
        let sibling_dir = dsmigin.parent().map(Path::to_path_buf);
        let siblings = sibling_dir.as_deref();
        let tools = Tools {
            cobgensch: locate(config.cobgensch_path.as_ref(), "cobgensch", siblings)?,
            idcams: locate(config.idcams_path.as_ref(), "idcams", siblings)?,
            dsdelete: locate(None, "dsdelete", siblings)?,
            dscreate: locate(None, "dscreate", siblings)?,
            dsmigin,
        };
        Ok(Self {
            tools,
            encoding_code: config.encoding_code.clone(),
            default_catalog: config.default_catalog.clone(),
            default_volume: config.default_volume.clone(),
            conversion_dir: workspace.conversion_dir(),
        })
    }

    async fn convert_sequential(
        &self,
        dataset: &str,
        desc: &LayoutDescription,
        source: &Path,
        mode: ConvertMode,
    ) -> Result<ConvertReport> {
        let target = self.target(dataset, mode);
        if mode == ConvertMode::Load {
            self.run_tolerated(&self.tools.dsdelete, &[dataset.to_string()], dataset)
                .await;
        }
        let args = dsmigin_args(
            desc,
            &source.to_string_lossy(),
            &target,
            &self.encoding_code,
            mode,
            None,
        );
        run_tool(&self.tools.dsmigin, &args, dataset).await?;
        Ok(ConvertReport {
            target,
            members: None,
        })
    }

    async fn convert_members(
        &self,
        dataset: &str,
        desc: &LayoutDescription,
        source: &Path,
        mode: ConvertMode,
    ) -> Result<ConvertReport> {
        let members = list_members(source).await?;
        let target = self.target(dataset, mode);

        match mode {
            ConvertMode::DryRun => tokio::fs::create_dir_all(&target).await?,
            ConvertMode::Load => {
                self.run_tolerated(&self.tools.dsdelete, &[dataset.to_string()], dataset)
                    .await;
                run_tool(&self.tools.dscreate, &dscreate_args(dataset, &desc.layout), dataset)
                    .await?;
            }
        }

        for member in &members {
            let src = source.join(member);
            let dst = match mode {
                ConvertMode::DryRun => Path::new(&target)
                    .join(member)
                    .to_string_lossy()
                    .into_owned(),
                ConvertMode::Load => dataset.to_string(),
            };
            let args = dsmigin_args(
                desc,
                &src.to_string_lossy(),
                &dst,
                &self.encoding_code,
                mode,
                Some(member),
            );
            run_tool(&self.tools.dsmigin, &args, dataset).await?;
        }

        Ok(ConvertReport {
            target,
            members: Some(members.len()),
        })
    }

    async fn convert_vsam(
        &self,
        dataset: &str,
        desc: &LayoutDescription,
        source: &Path,
        mode: ConvertMode,
    ) -> Result<ConvertReport> {
        let target = self.target(dataset, mode);
        if mode == ConvertMode::Load {
            let delete = vec![
                "delete".to_string(),
                "-t".to_string(),
                "CL".to_string(),
                "-n".to_string(),
                dataset.to_string(),
            ];
            self.run_tolerated(&self.tools.idcams, &delete, dataset).await;
            let define = idcams_define_args(
                dataset,
                &desc.layout,
                &self.default_catalog,
                &self.default_volume,
            );
            run_tool(&self.tools.idcams, &define, dataset).await?;
        }
        let args = dsmigin_args(
            desc,
            &source.to_string_lossy(),
            &target,
            &self.encoding_code,
            mode,
            None,
        );
        run_tool(&self.tools.dsmigin, &args, dataset).await?;
        Ok(ConvertReport {
            target,
            members: None,
        })
    }

    /// Catalog name for a load, scratch path for a dry run
    fn target(&self, dataset: &str, mode: ConvertMode) -> String {
        match mode {
            ConvertMode::Load => dataset.to_string(),
            ConvertMode::DryRun => self
                .conversion_dir
                .join(dataset)
                .to_string_lossy()
                .into_owned(),
        }
    }

    /// Run a cleanup step whose failure (usually "does not exist") is not an error
    async fn run_tolerated(&self, binary: &Path, args: &[String], dataset: &str) {
        if let Err(e) = run_tool(binary, args, dataset).await {
            tracing::debug!(dataset, error = %e, "cleanup step failed, continuing");
        }
    }

    async fn discard_dry_run_output(&self, dataset: &str) {
        let output = self.conversion_dir.join(dataset);
        let removed = match tokio::fs::metadata(&output).await {
            Ok(metadata) if metadata.is_dir() => tokio::fs::remove_dir_all(&output).await,
            Ok(_) => tokio::fs::remove_file(&output).await,
            Err(_) => Ok(()),
        };
        if let Err(e) = removed {
            tracing::warn!(dataset, error = %e, "failed to remove dry-run output");
        }
    }
}

#[async_trait]
impl Converter for DsmiginConverter {
    async fn convert(
        &self,
        dataset: &str,
        layout: &LayoutDescription,
        source: &Path,
        mode: ConvertMode,
    ) -> Result<ConvertReport> {
        validate_dataset_name(dataset)?;
        layout.validate(dataset)?;
        if !tokio::fs::try_exists(source).await.unwrap_or(false) {
            return Err(Error::Conversion {
                dataset: dataset.to_string(),
                reason: format!("retrieved copy {} not found", source.display()),
            });
        }

        let copybook = layout.copybook.to_string_lossy().into_owned();
        run_tool(&self.tools.cobgensch, &[copybook], dataset).await?;

        if mode == ConvertMode::DryRun {
            tokio::fs::create_dir_all(&self.conversion_dir).await?;
        }

        let result = match layout.layout.dsorg {
            Some(Dsorg::Po) => self.convert_members(dataset, layout, source, mode).await,
            Some(Dsorg::Vsam) => self.convert_vsam(dataset, layout, source, mode).await,
            _ => self.convert_sequential(dataset, layout, source, mode).await,
        };

        if mode == ConvertMode::DryRun {
            self.discard_dry_run_output(dataset).await;
        }
        result
    }

    fn name(&self) -> &'static str {
        "dsmigin"
    }
}

fn locate(
    configured: Option<&PathBuf>,
    name: &str,
    sibling_dir: Option<&Path>,
) -> Result<PathBuf> {
    if let Some(path) = configured {
        return Ok(path.clone());
    }
    if let Ok(path) = which::which(name) {
        return Ok(path);
    }
    sibling_dir
        .map(|dir| dir.join(name))
        .filter(|path| path.is_file())
        .ok_or_else(|| Error::NotSupported(format!("{name} not found in PATH")))
}

/// Run a tool to completion, turning a failure status into a conversion error
async fn run_tool(binary: &Path, args: &[String], dataset: &str) -> Result<()> {
    let tool = binary
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| binary.display().to_string());
    tracing::debug!(dataset, command = %format!("{} {}", tool, args.join(" ")), "running tool");

    let output = Command::new(binary)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| Error::ExternalTool(format!("Failed to execute {}: {}", tool, e)))?;

    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    let detail = stderr
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .map(|line| format!(": {}", line.trim()))
        .unwrap_or_default();
    Err(Error::Conversion {
        dataset: dataset.to_string(),
        reason: format!("{} exited with {}{}", tool, output.status, detail),
    })
}

/// Sorted member file names of a retrieved library
async fn list_members(dir: &Path) -> Result<Vec<String>> {
    let mut members = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            members.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    members.sort();
    Ok(members)
}

/// `-f` value; dsmigin has no machine-control variant of VB
fn dsmigin_recfm(recfm: Option<RecordFormat>) -> &'static str {
    match recfm {
        Some(RecordFormat::Vbm) => RecordFormat::Vb.code(),
        Some(recfm) => recfm.code(),
        None => "",
    }
}

fn number(value: Option<u32>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

pub(crate) fn dsmigin_args(
    desc: &LayoutDescription,
    src: &str,
    dst: &str,
    encoding_code: &str,
    mode: ConvertMode,
    member: Option<&str>,
) -> Vec<String> {
    let layout = &desc.layout;
    let mut args = vec![
        src.to_string(),
        dst.to_string(),
        "-e".to_string(),
        encoding_code.to_string(),
    ];
    if mode == ConvertMode::DryRun {
        args.push("-C".to_string());
    }
    args.extend(["-sosi", "6", "-z"].map(String::from));
    args.push("-s".to_string());
    args.push(desc.schema().to_string_lossy().into_owned());
    args.push("-f".to_string());
    args.push(dsmigin_recfm(layout.recfm).to_string());

    match layout.dsorg {
        Some(Dsorg::Po) => {
            args.extend(["-o", "PS", "-m"].map(String::from));
            args.push(member.unwrap_or_default().to_string());
        }
        Some(Dsorg::Ps) => args.extend(["-o", "PS"].map(String::from)),
        _ => {}
    }

    if layout.dsorg == Some(Dsorg::Vsam) {
        args.push("-l".to_string());
        args.push(number(layout.max_lrecl));
        args.push("-R".to_string());
    } else {
        args.push("-l".to_string());
        args.push(number(layout.lrecl));
        args.push("-b".to_string());
        args.push(number(layout.blksize));
    }
    args
}

pub(crate) fn dscreate_args(dataset: &str, layout: &Layout) -> Vec<String> {
    vec![
        "-o".to_string(),
        layout.dsorg.map(|d| d.code()).unwrap_or_default().to_string(),
        "-b".to_string(),
        number(layout.blksize),
        "-l".to_string(),
        number(layout.lrecl),
        "-f".to_string(),
        layout.recfm.map(|r| r.code()).unwrap_or_default().to_string(),
        dataset.to_string(),
    ]
}

pub(crate) fn idcams_define_args(
    dataset: &str,
    layout: &Layout,
    default_catalog: &str,
    default_volume: &str,
) -> Vec<String> {
    let catalog = layout
        .catalog
        .clone()
        .unwrap_or_else(|| default_catalog.to_string());
    // Tape and pseudo volumes have no DASD serial to define on
    let volume = match &layout.volume {
        Some(Volume::Serial(serial)) => serial.clone(),
        _ => default_volume.to_string(),
    };
    vec![
        "define".to_string(),
        "-n".to_string(),
        dataset.to_string(),
        "-o".to_string(),
        layout.vsam.code().to_string(),
        "-l".to_string(),
        format!("{},{}", number(layout.avg_lrecl), number(layout.max_lrecl)),
        "-k".to_string(),
        format!("{},{}", number(layout.key_length), number(layout.key_offset)),
        "-t".to_string(),
        "CL".to_string(),
        "-c".to_string(),
        catalog,
        "-v".to_string(),
        volume,
    ]
}
