//! The environment builder: the traversal that turns a selections document
//! into a ready-to-launch process descriptor.

use std::any::TypeId;
use std::collections::HashSet;
use std::process::Child;

use camino::Utf8PathBuf;
use zinject_selections::{
    Command, Dependency, Importance, ImplementationSelection, Selections,
};

use crate::context::{ExecutionContext, StartInfo};
use crate::errors::{ExecError, ExecResult};
use crate::expand::{expand_command_line, CommandLineItem};
use crate::locations::Locations;
use crate::runenv;
use crate::store::ImplementationStore;
use crate::strategy::ExecutionStrategy;
use crate::SortedMap;

/// Tracks which binding containers have been applied, so a container shared
/// between graph walks is applied exactly once per pass. Keyed by object
/// identity (address + type), not value, because distinct dependencies may
/// declare equal bindings.
#[derive(Default)]
pub(crate) struct AppliedSet(HashSet<(usize, TypeId)>);

impl AppliedSet {
    /// Marks a container; true when it had not been seen in this pass.
    fn mark<T: 'static>(&mut self, container: &T) -> bool {
        self.0.insert((container as *const T as usize, TypeId::of::<T>()))
    }

    fn clear(&mut self) {
        self.0.clear();
    }
}

/// Builds the environment, command line and working directory a selections
/// document asks for, then launches (or hands out) the result.
///
/// Construction *is* the `inject` operation: validation and the whole
/// binding traversal happen up front, so a builder that exists is one whose
/// selections were coherent. The late-bound parts (`$var` references,
/// `for-each` macros, run-environment variables) are resolved by
/// [`EnvironmentBuilder::to_start_info`].
pub struct EnvironmentBuilder<'a> {
    pub(crate) selections: &'a Selections,
    pub(crate) store: &'a dyn ImplementationStore,
    pub(crate) strategy: &'a dyn ExecutionStrategy,
    pub(crate) locations: &'a Locations,
    pub(crate) context: ExecutionContext,
    pub(crate) applied: AppliedSet,
    command_line: Vec<CommandLineItem>,
    user_arguments: Vec<String>,
    wrapper: Option<Vec<String>>,
    pub(crate) pending_runenv: SortedMap<String, Vec<CommandLineItem>>,
    pub(crate) deployed: SortedMap<String, Utf8PathBuf>,
}

impl std::fmt::Debug for EnvironmentBuilder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentBuilder").finish_non_exhaustive()
    }
}

impl<'a> EnvironmentBuilder<'a> {
    /// Validates the selections and runs the binding traversal.
    ///
    /// `override_main` replaces the main command's executable path (relative
    /// to the main implementation unless absolute) while keeping its runner
    /// and arguments.
    pub(crate) fn inject(
        selections: &'a Selections,
        store: &'a dyn ImplementationStore,
        strategy: &'a dyn ExecutionStrategy,
        locations: &'a Locations,
        override_main: Option<&str>,
    ) -> ExecResult<Self> {
        if selections.implementations.is_empty() {
            return Err(ExecError::NoImplementations);
        }
        let command_name = selections
            .command
            .as_deref()
            .ok_or(ExecError::MissingCommandName)?;
        let main = selections
            .main_implementation()
            .ok_or_else(|| ExecError::MissingSelection {
                interface: selections.interface.clone(),
            })?;
        validate(selections)?;

        let mut builder = EnvironmentBuilder {
            selections,
            store,
            strategy,
            locations,
            context: strategy.create_context(),
            applied: AppliedSet::default(),
            command_line: Vec::new(),
            user_arguments: Vec::new(),
            wrapper: None,
            pending_runenv: SortedMap::new(),
            deployed: SortedMap::new(),
        };

        builder.apply_bindings_pass()?;
        // a runner chain may legitimately re-apply containers the pass above
        // already handled, with the chain's own semantics
        builder.applied.clear();

        let mut chain = Vec::new();
        builder.command_line =
            builder.build_command_line(main, command_name, override_main, &mut chain)?;
        Ok(builder)
    }

    /// Prepends a wrapper command line; its first word becomes the
    /// executable and the program's own argv is appended after it.
    pub fn add_wrapper(&mut self, wrapper: &str) -> ExecResult<()> {
        let words = shell_words::split(wrapper).map_err(|_| ExecError::WrapperUnparseable {
            wrapper: wrapper.to_owned(),
        })?;
        if words.is_empty() {
            return Err(ExecError::WrapperUnparseable {
                wrapper: wrapper.to_owned(),
            });
        }
        self.wrapper = Some(words);
        Ok(())
    }

    /// Appends user arguments after every declared runner/command argument.
    /// They are passed through verbatim, without variable expansion.
    pub fn add_arguments<I, S>(&mut self, arguments: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.user_arguments
            .extend(arguments.into_iter().map(Into::into));
    }

    /// Overrides an environment variable; last writer wins, including over
    /// anything bindings did.
    pub fn set_environment_variable(&mut self, name: &str, value: &str) {
        self.context.env.set(name, value);
    }

    /// Finalizes pending run-environment entries, expands the argv, and
    /// freezes the descriptor. Calling it again without mutators in between
    /// returns the same descriptor.
    pub fn to_start_info(&mut self) -> ExecResult<StartInfo> {
        let pending: Vec<(String, Vec<CommandLineItem>)> = self
            .pending_runenv
            .iter()
            .map(|(name, line)| (name.clone(), line.clone()))
            .collect();
        for (name, line) in pending {
            let argv = expand_command_line(&line, &mut self.context.env);
            if argv.is_empty() {
                return Err(ExecError::EmptyCommandLine);
            }
            runenv::set_variables(&mut self.context.env, &name, &argv);
        }

        let declared = self.command_line.clone();
        let mut argv = expand_command_line(&declared, &mut self.context.env);
        argv.extend(self.user_arguments.iter().cloned());
        if let Some(wrapper) = &self.wrapper {
            let mut wrapped = wrapper.clone();
            wrapped.extend(argv);
            argv = wrapped;
        }
        if argv.is_empty() {
            return Err(ExecError::EmptyCommandLine);
        }

        let file_name = Utf8PathBuf::from(argv.remove(0));
        Ok(StartInfo {
            file_name,
            arguments: argv,
            environment: self.context.env.clone(),
            working_dir: self.context.working_dir.clone(),
        })
    }

    /// Finalizes and launches.
    pub fn start(&mut self) -> ExecResult<Child> {
        let info = self.to_start_info()?;
        tracing::info!("launching {}", info.file_name);
        self.strategy.start(&info)
    }

    /// The pre-command binding pass: every implementation's own bindings,
    /// then its dependencies' bindings, in document order.
    fn apply_bindings_pass(&mut self) -> ExecResult<()> {
        let selections = self.selections;
        for implementation in &selections.implementations {
            if self.applied.mark(implementation) {
                for binding in &implementation.bindings {
                    self.apply_binding(binding, implementation)?;
                }
            }
            for dependency in &implementation.dependencies {
                self.apply_dependency_bindings(dependency)?;
            }
        }
        Ok(())
    }

    pub(crate) fn apply_dependency_bindings(
        &mut self,
        dependency: &Dependency,
    ) -> ExecResult<()> {
        let selections = self.selections;
        let Some(target) = selections.find(&dependency.interface) else {
            // essential targets were validated at inject; a recommended
            // dependency without a selection simply contributes nothing
            return if dependency.importance == Importance::Essential {
                Err(ExecError::MissingSelection {
                    interface: dependency.interface.clone(),
                })
            } else {
                Ok(())
            };
        };
        if self.applied.mark(dependency) {
            for binding in &dependency.bindings {
                self.apply_binding(binding, target)?;
            }
        }
        Ok(())
    }

    /// Recursively assembles the symbolic command line for one command,
    /// expanding runner chains and applying command-level bindings on the
    /// way.
    pub(crate) fn build_command_line(
        &mut self,
        implementation: &ImplementationSelection,
        command_name: &str,
        override_path: Option<&str>,
        chain: &mut Vec<(String, String)>,
    ) -> ExecResult<Vec<CommandLineItem>> {
        let link = (
            implementation.interface.to_string(),
            command_name.to_owned(),
        );
        if chain.contains(&link) {
            return Err(ExecError::CyclicRunnerChain {
                interface: implementation.interface.clone(),
            });
        }
        chain.push(link);

        let command =
            implementation
                .command(command_name)
                .ok_or_else(|| ExecError::UnknownCommand {
                    id: implementation.id.clone(),
                    name: command_name.to_owned(),
                })?;

        if self.applied.mark(command) {
            for binding in &command.bindings {
                self.apply_binding(binding, implementation)?;
            }
        }
        for dependency in &command.dependencies {
            self.apply_dependency_bindings(dependency)?;
        }
        if let Some(source) = &command.working_dir {
            self.apply_working_dir(implementation, source)?;
        }

        let mut line = Vec::new();
        if let Some(runner) = &command.runner {
            let selections = self.selections;
            let target =
                selections
                    .find(&runner.interface)
                    .ok_or_else(|| ExecError::MissingSelection {
                        interface: runner.interface.clone(),
                    })?;
            if self.applied.mark(runner) {
                for binding in &runner.bindings {
                    self.apply_binding(binding, target)?;
                }
            }
            line.extend(self.build_command_line(target, runner.command_name(), None, chain)?);
            line.extend(runner.args.iter().map(CommandLineItem::from));
        }

        match override_path {
            Some(path) => {
                line.push(CommandLineItem::Literal(
                    self.resolve_override_path(implementation, path)?,
                ));
            }
            None => {
                if let Some(path) = &command.path {
                    line.push(CommandLineItem::Literal(
                        self.resolve_command_path(implementation, path)?,
                    ));
                }
            }
        }
        line.extend(command.args.iter().map(CommandLineItem::from));

        chain.pop();
        Ok(line)
    }

    /// Computes and records the command line a run-environment trampoline
    /// will exec.
    pub(crate) fn record_run_environment(
        &mut self,
        name: &str,
        implementation: &ImplementationSelection,
        command_name: Option<&str>,
    ) -> ExecResult<()> {
        let command_name = command_name.unwrap_or(Command::NAME_RUN);
        let mut chain = Vec::new();
        let line = self.build_command_line(implementation, command_name, None, &mut chain)?;
        self.pending_runenv.insert(name.to_owned(), line);
        Ok(())
    }
}

/// Structural validation: the invariants the solver promises.
fn validate(selections: &Selections) -> ExecResult<()> {
    let missing = |interface: &zinject_selections::InterfaceUri| ExecError::MissingSelection {
        interface: interface.clone(),
    };
    for implementation in &selections.implementations {
        let commands = implementation.commands.iter();
        let dependencies = implementation
            .dependencies
            .iter()
            .chain(commands.clone().flat_map(|command| command.dependencies.iter()));
        for dependency in dependencies {
            if dependency.importance == Importance::Essential
                && selections.find(&dependency.interface).is_none()
            {
                return Err(missing(&dependency.interface));
            }
        }
        for restriction in &implementation.restrictions {
            if selections.find(&restriction.interface).is_none() {
                return Err(missing(&restriction.interface));
            }
        }
        for command in commands {
            if let Some(runner) = &command.runner {
                if selections.find(&runner.interface).is_none() {
                    return Err(missing(&runner.interface));
                }
            }
        }
    }
    Ok(())
}
