//! Where the launcher keeps its own files.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};

use crate::errors::{ExecError, ExecResult};

/// Cache-directory override honored before the platform default.
pub const CACHE_DIR_VAR: &str = "ZEROINSTALL_CACHE_DIR";
/// Run-environment template override, mostly for tests and relocated
/// installs.
pub const RUNENV_TEMPLATE_VAR: &str = "ZEROINSTALL_RUNENV_TEMPLATE";

/// Resolved directories the execution core writes into.
#[derive(Debug, Clone)]
pub struct Locations {
    cache_dir: Utf8PathBuf,
    runenv_template: Option<Utf8PathBuf>,
}

impl Locations {
    /// Resolves locations from the environment, falling back to the
    /// platform cache directory.
    pub fn from_env() -> ExecResult<Self> {
        let cache_dir = match std::env::var_os(CACHE_DIR_VAR) {
            Some(dir) => utf8(dir.into())?,
            None => {
                let dirs = directories::ProjectDirs::from("net", "zero-install", "zinject")
                    .ok_or_else(|| {
                        io::Error::other("cannot determine a cache directory for this user")
                    })?;
                utf8(dirs.cache_dir().to_path_buf())?
            }
        };
        let runenv_template = match std::env::var_os(RUNENV_TEMPLATE_VAR) {
            Some(path) => Some(utf8(path.into())?),
            None => None,
        };
        Ok(Self {
            cache_dir,
            runenv_template,
        })
    }

    /// Locations rooted at an explicit cache directory.
    pub fn with_cache_dir(cache_dir: Utf8PathBuf) -> Self {
        Self {
            cache_dir,
            runenv_template: None,
        }
    }

    /// Overrides where the run-environment template is found.
    pub fn set_runenv_template(&mut self, path: Utf8PathBuf) {
        self.runenv_template = Some(path);
    }

    /// The cache directory everything below lives under.
    pub fn cache_dir(&self) -> &Utf8Path {
        &self.cache_dir
    }

    /// The deploy directory for one named run-environment executable.
    pub fn executables_dir(&self, name: &str) -> Utf8PathBuf {
        self.cache_dir.join("injector").join("executables").join(name)
    }

    /// The per-OS trampoline template to deploy. Without an override this
    /// is the `runenv` helper installed next to the running binary.
    pub fn runenv_template(&self) -> ExecResult<Utf8PathBuf> {
        if let Some(template) = &self.runenv_template {
            return Ok(template.clone());
        }
        let current = utf8(std::env::current_exe()?)?;
        let directory = current
            .parent()
            .ok_or_else(|| io::Error::other("running binary has no parent directory"))?;
        let candidate = directory.join(format!("runenv{}", std::env::consts::EXE_SUFFIX));
        if candidate.is_file() {
            Ok(candidate)
        } else {
            Err(ExecError::RunEnvTemplateMissing { path: candidate })
        }
    }
}

fn utf8(path: std::path::PathBuf) -> ExecResult<Utf8PathBuf> {
    Utf8PathBuf::from_path_buf(path).map_err(|path| {
        ExecError::Io(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("path is not UTF-8: {}", path.display()),
        ))
    })
}
