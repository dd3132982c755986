//! Applying bindings: how one implementation is exposed to another.

use camino::{Utf8Path, Utf8PathBuf};
use zinject_selections::{Binding, EnvironmentMode, ImplementationSelection};

use crate::builder::EnvironmentBuilder;
use crate::context::EnvMap;
use crate::errors::{ExecError, ExecResult};
use crate::runenv;

impl<'a> EnvironmentBuilder<'a> {
    /// Applies one binding, with `implementation` as the implementation
    /// being exposed.
    pub(crate) fn apply_binding(
        &mut self,
        binding: &Binding,
        implementation: &ImplementationSelection,
    ) -> ExecResult<()> {
        match binding {
            Binding::Environment {
                name,
                value,
                insert,
                mode,
                separator,
                default,
            } => {
                // natively packaged implementations have no store path to
                // expose; their environment bindings are skipped entirely
                if implementation.is_package() {
                    return Ok(());
                }
                if name.is_empty() {
                    return Err(ExecError::InvalidBindingName { name: name.clone() });
                }
                let new_value = match (value, insert) {
                    (Some(_), Some(_)) => {
                        return Err(ExecError::ConflictingEnvironmentBinding {
                            name: name.clone(),
                        })
                    }
                    (Some(value), None) => value.clone(),
                    (None, insert) => {
                        let root = self.implementation_path(implementation)?;
                        let inserted = match insert.as_deref() {
                            None | Some("") => root,
                            Some(relative) => root.join(to_native(relative)),
                        };
                        self.strategy.map_path(&inserted).into_string()
                    }
                };
                apply_environment_value(
                    &mut self.context.env,
                    name,
                    &new_value,
                    *mode,
                    separator.as_deref(),
                    default.as_deref(),
                );
            }
            Binding::ExecutableInVar { name, command } => {
                runenv::validate_name(name)?;
                let executable = self.deploy_executable(name)?;
                self.record_run_environment(name, implementation, command.as_deref())?;
                self.context.env.set(name, executable.as_str());
            }
            Binding::ExecutableInPath { name, command } => {
                runenv::validate_name(name)?;
                let executable = self.deploy_executable(name)?;
                self.record_run_environment(name, implementation, command.as_deref())?;
                let directory = executable
                    .parent()
                    .unwrap_or(Utf8Path::new("."))
                    .to_owned();
                apply_environment_value(
                    &mut self.context.env,
                    "PATH",
                    directory.as_str(),
                    EnvironmentMode::Prepend,
                    None,
                    None,
                );
            }
            Binding::WorkingDir { source } => {
                self.apply_working_dir(implementation, source)?;
            }
        }
        Ok(())
    }

    /// Deploys (or reuses) the trampoline for `name`.
    fn deploy_executable(&mut self, name: &str) -> ExecResult<Utf8PathBuf> {
        if let Some(deployed) = self.deployed.get(name) {
            return Ok(deployed.clone());
        }
        let deployed = runenv::deploy(self.locations, name)?;
        let mapped = self.strategy.map_path(&deployed);
        self.deployed.insert(name.to_owned(), mapped.clone());
        Ok(mapped)
    }

    /// Switches the working directory into the implementation. At most one
    /// binding may do this, and only with a safe relative source.
    pub(crate) fn apply_working_dir(
        &mut self,
        implementation: &ImplementationSelection,
        source: &str,
    ) -> ExecResult<()> {
        if self.context.working_dir.is_some() {
            return Err(ExecError::WorkingDirAlreadySet);
        }
        if !is_safe_relative(source) {
            return Err(ExecError::UnsafeWorkingDir {
                dir: source.to_owned(),
            });
        }
        let root = self.implementation_path(implementation)?;
        let directory = match source {
            "" | "." => root,
            source => root.join(to_native(source)),
        };
        self.context.working_dir = Some(self.strategy.map_path(&directory));
        Ok(())
    }

    /// Where an implementation lives on this host.
    pub(crate) fn implementation_path(
        &self,
        implementation: &ImplementationSelection,
    ) -> ExecResult<Utf8PathBuf> {
        if let Some(local) = &implementation.local_path {
            return Ok(local.clone());
        }
        let digest = implementation
            .digest()
            .ok_or_else(|| ExecError::UnknownIdFormat {
                id: implementation.id.clone(),
            })?;
        self.store
            .path_for(&digest)
            .ok_or_else(|| ExecError::NotInStore {
                id: implementation.id.clone(),
            })
    }

    /// Resolves a command's `path` attribute into a launchable string.
    pub(crate) fn resolve_command_path(
        &self,
        implementation: &ImplementationSelection,
        path: &str,
    ) -> ExecResult<String> {
        if implementation.is_package() {
            // the native package manager already placed it on this host
            return Ok(path.to_owned());
        }
        let root = self.implementation_path(implementation)?;
        Ok(self
            .strategy
            .map_path(&root.join(to_native(path)))
            .into_string())
    }

    /// Resolves an `override_main` value: absolute paths are taken as-is,
    /// anything else is relative to the implementation root.
    pub(crate) fn resolve_override_path(
        &self,
        implementation: &ImplementationSelection,
        path: &str,
    ) -> ExecResult<String> {
        if Utf8Path::new(path).is_absolute() {
            return Ok(path.to_owned());
        }
        self.resolve_command_path(implementation, path)
    }
}

/// The environment combination rule: seed unset variables with `default`,
/// then replace/prepend/append with the platform (or declared) separator.
fn apply_environment_value(
    env: &mut EnvMap,
    name: &str,
    new_value: &str,
    mode: EnvironmentMode,
    separator: Option<&str>,
    default: Option<&str>,
) {
    if env.get(name).is_none() {
        if let Some(default) = default {
            env.set(name, default);
        }
    }
    let separator = separator.unwrap_or_else(|| EnvMap::path_list_separator());
    let previous = env.get(name).unwrap_or_default().to_owned();
    let combined = match mode {
        _ if previous.is_empty() => new_value.to_owned(),
        EnvironmentMode::Replace => new_value.to_owned(),
        EnvironmentMode::Prepend => format!("{new_value}{separator}{previous}"),
        EnvironmentMode::Append => format!("{previous}{separator}{new_value}"),
    };
    env.set(name, combined);
}

/// Feed-declared paths use `/`; turn them into host form.
pub(crate) fn to_native(path: &str) -> String {
    if cfg!(windows) {
        path.replace('/', "\\")
    } else {
        path.to_owned()
    }
}

/// A working-dir source must stay inside the implementation: not rooted,
/// no `..` segments, no drive letters.
fn is_safe_relative(source: &str) -> bool {
    if source.starts_with('/') || source.starts_with('\\') || source.contains(':') {
        return false;
    }
    !source
        .split(['/', '\\'])
        .any(|segment| segment == "..")
}
