#![deny(missing_docs)]

//! # zinject-selections
//!
//! The data model for Zero Install *selections documents*: the output of a
//! solver, naming exactly one implementation per interface URI together with
//! the commands, dependencies and bindings the launcher needs to start the
//! program. The execution core in the `zinject` crate consumes this model;
//! this crate only describes and parses it.
//!
//! The root type is [`Selections`]. Documents are usually produced by
//! deserializing the XML format via [`Selections::from_xml`].

use std::collections::BTreeMap;
use std::fmt;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

pub mod errors;
mod parse;

/// XML namespace of feeds and selections documents.
pub const XML_NAMESPACE: &str = "http://zero-install.sourceforge.net/2004/injector/interface";

/// Prefix of implementation ids that are managed by the native package
/// manager rather than the implementation store.
pub const PACKAGE_PREFIX: &str = "package:";

/// Stable identity for "the thing a program depends on", independent of
/// version: an absolute URI or a local feed path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InterfaceUri(String);

impl InterfaceUri {
    /// Wraps a URI string. No validation happens here; the solver that
    /// produced the document already resolved it.
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    /// The URI as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InterfaceUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for InterfaceUri {
    fn from(uri: &str) -> Self {
        Self::new(uri)
    }
}

impl From<String> for InterfaceUri {
    fn from(uri: String) -> Self {
        Self(uri)
    }
}

/// Algorithm-tagged content digests of one implementation.
///
/// Store directories are named after these, e.g. `sha256new_ABC…` or
/// `sha256=0123…`. The fields hold only the value part; [`ManifestDigest::best`]
/// yields the full directory name for the strongest digest present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestDigest {
    /// Legacy sha1 digest over the new-style manifest format.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha1new: Option<String>,
    /// sha256 digest, hex-encoded.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    /// sha256 digest, base32-encoded (the current default).
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256new: Option<String>,
}

impl ManifestDigest {
    /// Parses a digest from a store directory name or selection id, e.g.
    /// `sha256new_LDP…` or `sha1new=b1b1…`. Returns `None` for anything else
    /// (notably `package:` ids).
    pub fn parse(id: &str) -> Option<Self> {
        let mut digest = Self::default();
        if let Some(value) = id.strip_prefix("sha256new_") {
            digest.sha256new = Some(value.to_owned());
        } else if let Some(value) = id.strip_prefix("sha256=") {
            digest.sha256 = Some(value.to_owned());
        } else if let Some(value) = id.strip_prefix("sha1new=") {
            digest.sha1new = Some(value.to_owned());
        } else {
            return None;
        }
        Some(digest)
    }

    /// The highest-ranked non-empty digest, formatted as a store directory
    /// name.
    pub fn best(&self) -> Option<String> {
        self.names().into_iter().next()
    }

    /// All present digests as store directory names, best first.
    pub fn names(&self) -> Vec<String> {
        let mut names = Vec::new();
        if let Some(value) = &self.sha256new {
            names.push(format!("sha256new_{value}"));
        }
        if let Some(value) = &self.sha256 {
            names.push(format!("sha256={value}"));
        }
        if let Some(value) = &self.sha1new {
            names.push(format!("sha1new={value}"));
        }
        names
    }
}

/// Attributes and child elements from a newer schema version that this
/// parser does not understand, preserved so forward-compatible handling
/// keeps working.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extensions {
    /// Unknown attributes, name to raw value.
    #[serde(default)]
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    /// Names of unknown child elements, in document order.
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub elements: Vec<String>,
}

impl Extensions {
    /// Whether anything unknown was captured.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.elements.is_empty()
    }
}

/// How an environment binding combines the new value with an existing one.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnvironmentMode {
    /// New value first, existing value after the separator (the default).
    #[default]
    Prepend,
    /// Existing value first, new value after the separator.
    Append,
    /// Discard any existing value.
    Replace,
}

/// A declarative rule for exposing an implementation to a consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Binding {
    /// Expose an implementation through an environment variable.
    Environment {
        /// Name of the variable to modify.
        name: String,
        /// Literal value; mutually exclusive with `insert`.
        value: Option<String>,
        /// Path inside the implementation; empty means the implementation
        /// root. Mutually exclusive with `value`.
        insert: Option<String>,
        /// Combination mode.
        mode: EnvironmentMode,
        /// Separator between old and new value; defaults to the platform
        /// path-list separator.
        separator: Option<String>,
        /// Seed for a variable that is unset on the host. May be empty.
        default: Option<String>,
    },
    /// Point a variable at a deployed run-environment executable for one of
    /// the implementation's commands.
    ExecutableInVar {
        /// Name of the variable, also the name of the deployed executable.
        name: String,
        /// Command to expose; defaults to `run`.
        command: Option<String>,
    },
    /// Put a deployed run-environment executable onto the search path.
    ExecutableInPath {
        /// Name the executable will be callable as.
        name: String,
        /// Command to expose; defaults to `run`.
        command: Option<String>,
    },
    /// Switch the process working directory into the implementation.
    WorkingDir {
        /// Relative path inside the implementation; rooted or `..`-containing
        /// sources are invalid.
        source: String,
    },
}

/// One element of a declared command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Arg {
    /// A single argument, subject to `$var` substitution at launch.
    Literal(String),
    /// A macro emitting a copy of `args` for every item in a list variable,
    /// with `item` bound during each copy.
    ForEach {
        /// Variable holding the list to iterate over.
        item_from: String,
        /// List separator; defaults to the platform path-list separator.
        separator: Option<String>,
        /// Arguments emitted per iteration.
        args: Vec<String>,
    },
}

/// Whether a dependency must be satisfied for the program to work.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Importance {
    /// The dependency must have a selection (the default).
    #[default]
    Essential,
    /// The dependency is used only if a selection is present.
    Recommended,
}

/// A required or recommended interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
    /// Interface this dependency resolves to.
    pub interface: InterfaceUri,
    /// Whether the dependency is essential or recommended.
    #[serde(default)]
    pub importance: Importance,
    /// Bindings exposing the dependency to its consumer.
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bindings: Vec<Binding>,
}

/// A version constraint on another interface. Only carried for diagnostics;
/// range evaluation is the solver's job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Restriction {
    /// Interface the constraint applies to.
    pub interface: InterfaceUri,
    /// Raw version range expression, if any.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Declares that a command must be launched under another implementation's
/// command, e.g. a script under its interpreter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Runner {
    /// Interface of the implementation to run under.
    pub interface: InterfaceUri,
    /// Command of that implementation; defaults to `run`.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Extra arguments inserted between the runner's command line and the
    /// target's path.
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Arg>,
    /// Bindings exposing the runner to its consumer (a runner is
    /// dependency-like).
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bindings: Vec<Binding>,
    /// Unknown attributes/elements.
    #[serde(default)]
    #[serde(skip_serializing_if = "Extensions::is_empty")]
    pub extensions: Extensions,
}

impl Runner {
    /// The command name to invoke on the runner implementation.
    pub fn command_name(&self) -> &str {
        self.command.as_deref().unwrap_or(Command::NAME_RUN)
    }
}

/// An entry point of an implementation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Name the command is referenced by.
    pub name: String,
    /// Executable path relative to the implementation root. May be absent
    /// for commands that consist only of a runner.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Declared arguments, in order.
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Arg>,
    /// The implementation to launch this command under, if any.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runner: Option<Runner>,
    /// Working directory source (relative path inside the implementation).
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    /// The command's own bindings.
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bindings: Vec<Binding>,
    /// The command's own dependencies.
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Dependency>,
    /// Unknown attributes/elements.
    #[serde(default)]
    #[serde(skip_serializing_if = "Extensions::is_empty")]
    pub extensions: Extensions,
}

impl Command {
    /// The conventional name of the default command.
    pub const NAME_RUN: &'static str = "run";
}

/// The implementation a solver chose for one interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImplementationSelection {
    /// Interface this selection satisfies.
    pub interface: InterfaceUri,
    /// Implementation id: a manifest digest for store implementations, a
    /// `package:` id for native packages, or an arbitrary id for local
    /// implementations.
    pub id: String,
    /// Version string, for display and diagnostics.
    pub version: String,
    /// Architecture the implementation was built for, if restricted.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
    /// Feed the implementation came from, when not the interface itself.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_feed: Option<InterfaceUri>,
    /// Directory of an implementation living outside the store (e.g. a
    /// development checkout).
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_path: Option<Utf8PathBuf>,
    /// Entry points, in document order.
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<Command>,
    /// The implementation's own bindings (how it finds its own resources).
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bindings: Vec<Binding>,
    /// Dependencies, in document order.
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Dependency>,
    /// Version restrictions on other interfaces.
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub restrictions: Vec<Restriction>,
    /// Unknown attributes/elements.
    #[serde(default)]
    #[serde(skip_serializing_if = "Extensions::is_empty")]
    pub extensions: Extensions,
}

impl ImplementationSelection {
    /// Looks up a command by name.
    pub fn command(&self, name: &str) -> Option<&Command> {
        self.commands.iter().find(|command| command.name == name)
    }

    /// Whether this implementation is managed by the native package manager.
    pub fn is_package(&self) -> bool {
        self.id.starts_with(PACKAGE_PREFIX)
    }

    /// The manifest digest encoded in the selection id, if the id has
    /// digest form.
    pub fn digest(&self) -> Option<ManifestDigest> {
        ManifestDigest::parse(&self.id)
    }
}

/// A solver's output: one implementation per interface URI plus the command
/// to invoke on the main implementation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selections {
    /// Interface of the program the user asked for.
    pub interface: InterfaceUri,
    /// Name of the command to run on the main implementation.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Chosen implementations, in document order.
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub implementations: Vec<ImplementationSelection>,
    /// Unknown attributes/elements.
    #[serde(default)]
    #[serde(skip_serializing_if = "Extensions::is_empty")]
    pub extensions: Extensions,
}

impl Selections {
    /// Parses a selections document from its XML form.
    pub fn from_xml(xml: &str) -> errors::Result<Self> {
        parse::parse_selections(xml)
    }

    /// Looks up the selection for an interface.
    pub fn find(&self, interface: &InterfaceUri) -> Option<&ImplementationSelection> {
        self.implementations
            .iter()
            .find(|selection| &selection.interface == interface)
    }

    /// The selection for the main interface.
    pub fn main_implementation(&self) -> Option<&ImplementationSelection> {
        self.find(&self.interface)
    }
}
