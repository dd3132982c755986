//! The mutable process descriptor the environment builder fills in.

use camino::Utf8PathBuf;

use crate::SortedMap;

/// The environment map of a process being assembled.
///
/// Names are case-sensitive everywhere except `PATH` on Windows, where any
/// case variant is folded onto the conventional `Path` spelling; every other
/// variable keeps exact-case semantics even there.
#[derive(Debug, Clone, Default)]
pub struct EnvMap {
    vars: SortedMap<String, String>,
}

impl EnvMap {
    /// An empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// A map seeded from the host process environment. Variables with
    /// non-UTF-8 content are carried lossily rather than dropped.
    pub fn from_host() -> Self {
        let mut map = Self::new();
        for (name, value) in std::env::vars_os() {
            map.set(
                &name.to_string_lossy(),
                value.to_string_lossy().into_owned(),
            );
        }
        map
    }

    fn canonical(name: &str) -> String {
        if cfg!(windows) && name.eq_ignore_ascii_case("PATH") {
            "Path".to_owned()
        } else {
            name.to_owned()
        }
    }

    /// Reads a variable.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(&Self::canonical(name)).map(String::as_str)
    }

    /// Writes a variable, replacing any previous value.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.vars.insert(Self::canonical(name), value.into());
    }

    /// Deletes a variable.
    pub fn remove(&mut self, name: &str) {
        self.vars.remove(&Self::canonical(name));
    }

    /// Iterates over all variables in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Number of variables.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// The platform's separator for path-list variables.
    pub fn path_list_separator() -> &'static str {
        if cfg!(windows) {
            ";"
        } else {
            ":"
        }
    }
}

/// The process being assembled: environment plus working directory. Argv
/// lives in the builder until finalization because it expands against this
/// environment.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    /// Environment variables the process will see.
    pub env: EnvMap,
    /// Working directory, if any binding set one.
    pub working_dir: Option<Utf8PathBuf>,
}

impl ExecutionContext {
    /// An empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context seeded from the host environment.
    pub fn from_host() -> Self {
        Self {
            env: EnvMap::from_host(),
            working_dir: None,
        }
    }
}

/// A frozen, ready-to-launch process descriptor.
#[derive(Debug, Clone)]
pub struct StartInfo {
    /// The executable to launch.
    pub file_name: Utf8PathBuf,
    /// Arguments, fully expanded.
    pub arguments: Vec<String>,
    /// The complete environment (not a delta).
    pub environment: EnvMap,
    /// Working directory, when a binding set one.
    pub working_dir: Option<Utf8PathBuf>,
}
