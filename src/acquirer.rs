//! Acquisition of the two ipa-healthcheck reports.
//!
//! The live report comes from running the tool on every scrape. The logged
//! report is the file left behind by the periodic background runs of the
//! tool (`ipa-healthcheck.timer` on a stock FreeIPA server).

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempPath;
use tracing::{debug, error, info, warn};

use crate::check::{parse_report, CheckRecord};
use crate::config::ExporterConfig;
use crate::error::ExporterError;

/// Arguments restricting the live run to the service checks.
pub const LIVE_SOURCE_ARGS: &[&str] = &["--source", "ipahealthcheck.meta.services"];

const REPORT_PREFIX: &str = "ipa-healthcheck.out";

/// Runs the tool and reads the reports, as configured.
#[derive(Debug, Clone)]
pub struct Acquirer {
    ipahealthcheck_path: PathBuf,
    ipahealthcheck_log_path: PathBuf,
    temp_dir: PathBuf,
    sudo: bool,
}

impl Acquirer {
    /// Creates an acquirer from the resolved configuration.
    ///
    /// # Arguments
    ///
    /// * `config` - Supplies the tool path, log path, temp directory and sudo setting
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use ipa_healthcheck_exporter::{Acquirer, Config};
    /// let config = Config::default().resolve()?;
    /// let acquirer = Acquirer::new(&config);
    /// let checks = acquirer.live_report()?;
    /// println!("{} service checks", checks.len());
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn new(config: &ExporterConfig) -> Self {
        Acquirer {
            ipahealthcheck_path: config.ipahealthcheck_path.clone(),
            ipahealthcheck_log_path: config.ipahealthcheck_log_path.clone(),
            temp_dir: config.temp_dir.clone(),
            sudo: config.sudo,
        }
    }

    pub fn tool_path(&self) -> &Path {
        &self.ipahealthcheck_path
    }

    /// Runs the service checks and returns their results.
    pub fn live_report(&self) -> Result<Vec<CheckRecord>, ExporterError> {
        fetch_live_report(
            &self.ipahealthcheck_path,
            LIVE_SOURCE_ARGS,
            self.sudo,
            &self.temp_dir,
        )
    }

    /// Reads the logged report, falling back to no checks at all.
    pub fn logged_report_or_empty(&self) -> Vec<CheckRecord> {
        match fetch_logged_report(&self.ipahealthcheck_log_path) {
            Ok(checks) => checks,
            Err(err) => {
                error!("{}", err);
                Vec::new()
            }
        }
    }
}

/// Runs `tool` with `extra_args`, writing its report to a fresh file in
/// `temp_dir`, and decodes that report.
///
/// A non-zero exit of the tool is only logged: the tool fails whenever one
/// of its checks fails, and the report still holds every result. The report
/// file is removed before returning, whatever the outcome.
///
/// # Arguments
///
/// * `tool` - Path to the ipa-healthcheck executable
/// * `extra_args` - Arguments placed before `--output-file`, e.g. [`LIVE_SOURCE_ARGS`]
/// * `sudo` - Run the tool (and remove its report) through sudo
/// * `temp_dir` - Directory in which the uniquely named report file is created
///
/// # Returns
///
/// * `Ok(Vec<CheckRecord>)` - The decoded report
/// * `Err(ExporterError::ReportIo)` - Report file could not be created or read
/// * `Err(ExporterError::ReportParse)` - Report is not a JSON array of checks
pub fn fetch_live_report<S: AsRef<OsStr>>(
    tool: &Path,
    extra_args: &[S],
    sudo: bool,
    temp_dir: &Path,
) -> Result<Vec<CheckRecord>, ExporterError> {
    let report = ReportFile::create(temp_dir, sudo)?;

    let mut command = if sudo {
        let mut command = Command::new("sudo");
        command.arg(tool);
        command
    } else {
        Command::new(tool)
    };
    command
        .args(extra_args)
        .arg("--output-file")
        .arg(report.path());

    debug!(command = ?command, "running ipa-healthcheck");
    let outcome = match command.output() {
        Ok(output) if output.status.success() => None,
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stderr.trim().is_empty() {
                debug!(stderr = %stderr.trim(), "ipa-healthcheck stderr");
            }
            Some(format!("exited with {}", output.status))
        }
        Err(err) => Some(format!("could not be started: {}", err)),
    };
    if let Some(reason) = outcome {
        let err = ExporterError::ToolExecution {
            tool: tool.to_path_buf(),
            reason,
        };
        info!("ipa-healthcheck tool returned errors: {}", err);
    }

    read_report(report.path())
}

/// Reads the report maintained by the background runs of the tool.
///
/// The file is never modified or removed.
///
/// # Returns
///
/// * `Ok(Vec<CheckRecord>)` - The decoded report
/// * `Err(ExporterError::ReportIo)` - File is missing or unreadable
/// * `Err(ExporterError::ReportParse)` - File is not a JSON array of checks
pub fn fetch_logged_report(log_path: &Path) -> Result<Vec<CheckRecord>, ExporterError> {
    read_report(log_path)
}

fn read_report(path: &Path) -> Result<Vec<CheckRecord>, ExporterError> {
    let content = fs::read_to_string(path).map_err(|source| ExporterError::ReportIo {
        path: path.to_path_buf(),
        source,
    })?;
    let checks = parse_report(&content).map_err(|source| ExporterError::ReportParse {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), checks = checks.len(), "read ipa-healthcheck report");
    Ok(checks)
}

/// Per-scrape report file, removed when dropped.
///
/// When the tool ran through sudo the file is removed through sudo as well,
/// since the tool may have replaced it with a root-owned one.
struct ReportFile {
    path: TempPath,
    sudo: bool,
}

impl ReportFile {
    fn create(dir: &Path, sudo: bool) -> Result<Self, ExporterError> {
        let path = tempfile::Builder::new()
            .prefix(REPORT_PREFIX)
            .tempfile_in(dir)
            .map_err(|source| ExporterError::ReportIo {
                path: dir.to_path_buf(),
                source,
            })?
            .into_temp_path();
        Ok(ReportFile { path, sudo })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ReportFile {
    fn drop(&mut self) {
        if !self.sudo {
            return;
        }
        // TempPath removes whatever is left once this returns.
        match Command::new("sudo")
            .arg("rm")
            .arg("-f")
            .arg(self.path())
            .status()
        {
            Ok(status) if status.success() => {}
            Ok(status) => warn!(
                path = %self.path().display(),
                "sudo rm of report file exited with {}", status
            ),
            Err(err) => warn!(
                path = %self.path().display(),
                "cannot remove report file with sudo: {}", err
            ),
        }
    }
}
