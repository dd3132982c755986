//! Errors!

use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;
use zinject_selections::InterfaceUri;

/// Gotta love a newtyped Result
pub type ExecResult<T> = std::result::Result<T, ExecError>;

/// An error from preparing or launching a selections document
#[derive(Debug, Error, Diagnostic)]
pub enum ExecError {
    /// Selections name no command to run
    #[error("the selections document does not specify a command to run")]
    #[diagnostic(help("was this solved for a library rather than a program?"))]
    MissingCommandName,

    /// Selections list nothing at all
    #[error("the selections document contains no implementations")]
    NoImplementations,

    /// A dependency (or the main interface) has no matching selection
    #[error("no implementation was selected for {interface}")]
    MissingSelection {
        /// The interface nothing satisfies
        interface: InterfaceUri,
    },

    /// A command was referenced by a name its implementation doesn't have
    #[error("implementation {id} has no command named {name:?}")]
    UnknownCommand {
        /// Id of the implementation missing the command
        id: String,
        /// The command name that was requested
        name: String,
    },

    /// An environment binding sets both of its mutually exclusive fields
    #[error("environment binding {name} specifies both value and insert")]
    ConflictingEnvironmentBinding {
        /// Name of the variable the binding targets
        name: String,
    },

    /// A binding carries a name we refuse to put in the filesystem or
    /// environment
    #[error("{name:?} is not usable as a binding name")]
    InvalidBindingName {
        /// The offending name
        name: String,
    },

    /// Two bindings fought over the working directory
    #[error("more than one binding tried to set the working directory")]
    WorkingDirAlreadySet,

    /// A working-dir source was rooted or tried to climb out
    #[error("{dir:?} is not a safe working directory source")]
    UnsafeWorkingDir {
        /// The offending source
        dir: String,
    },

    /// Runner declarations form a loop
    #[error("runner chain loops back to {interface}")]
    CyclicRunnerChain {
        /// Interface at which the loop closed
        interface: InterfaceUri,
    },

    /// A selection id is neither a digest nor a package sentinel
    #[error("implementation id {id:?} is not a recognized manifest digest")]
    UnknownIdFormat {
        /// The unrecognized id
        id: String,
    },

    /// The store has no directory for a digest
    #[error("implementation {id} is not available in the store")]
    #[diagnostic(help("fetch the implementation before launching"))]
    NotInStore {
        /// Id of the missing implementation
        id: String,
    },

    /// Everything expanded to nothing
    #[error("the assembled command line is empty")]
    EmptyCommandLine,

    /// A wrapper string did not parse as a command line
    #[error("wrapper {wrapper:?} is not a valid command line")]
    WrapperUnparseable {
        /// The wrapper as given
        wrapper: String,
    },

    /// The run-environment template executable is not where it should be
    #[error("run-environment template not found at {path}")]
    #[diagnostic(help("the `runenv` helper ships next to the launcher binary"))]
    RunEnvTemplateMissing {
        /// Where we looked
        path: Utf8PathBuf,
    },

    /// The program we assembled a command line for does not exist
    #[error("failed to launch {file_name}: file not found")]
    LaunchFileMissing {
        /// The missing executable
        file_name: Utf8PathBuf,
        /// The launch error
        #[source]
        cause: std::io::Error,
    },

    /// A process-level failure from the launch layer
    #[error(transparent)]
    #[diagnostic(transparent)]
    Cmd(#[from] axoprocess::AxoprocessError),

    /// Plain filesystem failure
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ExecError {
    /// The host exit code this error maps to.
    pub fn exit_code(&self) -> i32 {
        match self {
            ExecError::MissingCommandName
            | ExecError::NoImplementations
            | ExecError::MissingSelection { .. }
            | ExecError::UnknownCommand { .. }
            | ExecError::ConflictingEnvironmentBinding { .. }
            | ExecError::InvalidBindingName { .. }
            | ExecError::WorkingDirAlreadySet
            | ExecError::UnsafeWorkingDir { .. }
            | ExecError::CyclicRunnerChain { .. }
            | ExecError::UnknownIdFormat { .. }
            | ExecError::EmptyCommandLine
            | ExecError::WrapperUnparseable { .. } => 25,
            ExecError::NotInStore { .. }
            | ExecError::RunEnvTemplateMissing { .. }
            | ExecError::LaunchFileMissing { .. }
            | ExecError::Cmd(_)
            | ExecError::Io(_) => 12,
        }
    }
}
