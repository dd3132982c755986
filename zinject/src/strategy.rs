//! Pluggable execution strategies.
//!
//! The environment builder is parameterized over a small capability set so
//! the same traversal can target native execution or a sandboxed namespace
//! (a container, Wine, WSL). Only [`NativeStrategy`] ships here; the trait
//! is the extension point.

use std::io;
use std::process::Child;

use axoprocess::{AxoprocessError, Cmd};
use camino::{Utf8Path, Utf8PathBuf};

use crate::context::{ExecutionContext, StartInfo};
use crate::errors::{ExecError, ExecResult};

/// The capabilities a launch target must provide.
pub trait ExecutionStrategy {
    /// Seeds a fresh context, usually from the host environment.
    fn create_context(&self) -> ExecutionContext {
        ExecutionContext::from_host()
    }

    /// Translates a host path into the namespace the launched process will
    /// see. The native strategy is the identity.
    fn map_path(&self, path: &Utf8Path) -> Utf8PathBuf {
        path.to_owned()
    }

    /// Launches a finalized descriptor.
    fn start(&self, info: &StartInfo) -> ExecResult<Child>;
}

/// Direct child-process execution with 1:1 paths.
#[derive(Debug, Default)]
pub struct NativeStrategy;

impl ExecutionStrategy for NativeStrategy {
    fn start(&self, info: &StartInfo) -> ExecResult<Child> {
        let mut cmd = Cmd::new(&info.file_name, "launch the selected implementation");
        for argument in &info.arguments {
            cmd.arg(argument);
        }
        // the descriptor's environment is complete, not a delta
        cmd.env_clear();
        for (name, value) in info.environment.iter() {
            cmd.env(name, value);
        }
        if let Some(working_dir) = &info.working_dir {
            cmd.current_dir(working_dir);
        }

        match cmd.spawn() {
            Ok(child) => Ok(child),
            Err(AxoprocessError::Exec { cause, .. })
                if cause.kind() == io::ErrorKind::NotFound =>
            {
                Err(ExecError::LaunchFileMissing {
                    file_name: info.file_name.clone(),
                    cause,
                })
            }
            Err(error) => Err(error.into()),
        }
    }
}
