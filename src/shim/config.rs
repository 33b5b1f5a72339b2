//! Capture-time configuration.

use std::{ffi::OsString, path::PathBuf};

use crate::{Error, Result};

/// Environment variable naming the real JIT library to wrap
pub const ENV_JIT_PATH: &str = "SuperPMIShimPath";
/// Environment variable naming the directory `.mc` files are written to
pub const ENV_OUTPUT_DIR: &str = "SuperPMIShimLogPath";
/// Environment variable naming an optional log file for the host's logger
pub const ENV_LOG_FILE: &str = "SuperPMIShimLogFilePath";

/// Where a capture session reads from and writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Path of the real JIT library. Only informational once a compiler has been installed.
    pub jit_path: Option<PathBuf>,
    /// Directory receiving captured method contexts
    pub output_dir: PathBuf,
    /// Log file requested for the hosting process
    pub log_file: Option<PathBuf>,
}

impl CaptureConfig {
    /// Configuration writing into `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        CaptureConfig {
            jit_path: None,
            output_dir: output_dir.into(),
            log_file: None,
        }
    }

    /// Sets the real JIT path
    #[must_use]
    pub fn jit_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.jit_path = Some(path.into());
        self
    }

    /// Sets the log file path
    #[must_use]
    pub fn log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if the output directory is not set.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| std::env::var_os(name))
    }

    /// Reads the configuration through `lookup`. Empty values count as unset.
    ///
    /// ```rust
    /// use std::ffi::OsString;
    /// use superpmi::shim::CaptureConfig;
    ///
    /// let config = CaptureConfig::from_vars(|name| match name {
    ///     "SuperPMIShimLogPath" => Some(OsString::from("/tmp/mc")),
    ///     _ => None,
    /// })?;
    /// assert_eq!(config.output_dir, std::path::PathBuf::from("/tmp/mc"));
    /// assert!(config.jit_path.is_none());
    /// # Ok::<(), superpmi::Error>(())
    /// ```
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if the output directory is not set.
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let read = |name: &str| lookup(name).filter(|value| !value.is_empty()).map(PathBuf::from);

        let Some(output_dir) = read(ENV_OUTPUT_DIR) else {
            return Err(Error::InvalidArgument(format!(
                "{ENV_OUTPUT_DIR} must name the directory captured method contexts are written to"
            )));
        };

        let config = CaptureConfig {
            jit_path: read(ENV_JIT_PATH),
            output_dir,
            log_file: read(ENV_LOG_FILE),
        };

        log::info!(
            "Capturing method contexts into {}",
            config.output_dir.display()
        );
        if let Some(log_file) = &config.log_file {
            log::info!("Shim log file requested at {}", log_file.display());
        }
        Ok(config)
    }
}
