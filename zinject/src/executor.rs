//! The thin façade most callers go through.

use std::process::Child;

use zinject_selections::Selections;

use crate::builder::EnvironmentBuilder;
use crate::errors::ExecResult;
use crate::locations::Locations;
use crate::store::ImplementationStore;
use crate::strategy::{ExecutionStrategy, NativeStrategy};

/// Launches selections documents against one store with one strategy.
///
/// The strategy is fixed for the executor's lifetime; swapping strategies
/// mid-build is not a thing.
pub struct Executor<S> {
    store: S,
    strategy: Box<dyn ExecutionStrategy>,
    locations: Locations,
}

impl<S: ImplementationStore> Executor<S> {
    /// An executor with the native strategy and environment-derived
    /// locations.
    pub fn new(store: S) -> ExecResult<Self> {
        Ok(Self {
            store,
            strategy: Box::new(NativeStrategy),
            locations: Locations::from_env()?,
        })
    }

    /// Full control over strategy and locations.
    pub fn with_strategy(
        store: S,
        strategy: Box<dyn ExecutionStrategy>,
        locations: Locations,
    ) -> Self {
        Self {
            store,
            strategy,
            locations,
        }
    }

    /// Prepares a launch: validates the selections, applies every binding,
    /// assembles the command line. The returned builder accepts wrappers,
    /// user arguments and environment overrides before starting.
    pub fn inject<'a>(
        &'a self,
        selections: &'a Selections,
        override_main: Option<&str>,
    ) -> ExecResult<EnvironmentBuilder<'a>> {
        EnvironmentBuilder::inject(
            selections,
            &self.store,
            self.strategy.as_ref(),
            &self.locations,
            override_main,
        )
    }

    /// Prepares and immediately launches.
    pub fn start(&self, selections: &Selections) -> ExecResult<Child> {
        self.inject(selections, None)?.start()
    }
}
