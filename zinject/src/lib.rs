#![deny(missing_docs)]

//! # zinject
//!
//! The execution core of a decentralized package manager: give it a
//! selections document (a solver's choice of one implementation per
//! interface) and an implementation store, and it walks the dependency
//! graph, applies every declared binding, expands runner chains into a
//! command line, and launches the result.
//!
//! ```no_run
//! # fn main() -> Result<(), zinject::errors::ExecError> {
//! use zinject::{DirectoryStore, Executor};
//! use zinject_selections::Selections;
//!
//! let xml = std::fs::read_to_string("app.selections.xml")?;
//! let selections = Selections::from_xml(&xml).expect("solver output parses");
//!
//! let store = DirectoryStore::new(vec!["/var/cache/implementations".into()]);
//! let executor = Executor::new(store)?;
//! let mut builder = executor.inject(&selections, None)?;
//! builder.add_arguments(["--help"]);
//! builder.start()?;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;

mod bindings;
mod builder;
mod context;
pub mod errors;
mod executor;
mod expand;
mod locations;
mod runenv;
mod store;
mod strategy;

pub use builder::EnvironmentBuilder;
pub use context::{EnvMap, ExecutionContext, StartInfo};
pub use executor::Executor;
pub use locations::{Locations, CACHE_DIR_VAR, RUNENV_TEMPLATE_VAR};
pub use store::{DirectoryStore, ImplementationStore};
pub use strategy::{ExecutionStrategy, NativeStrategy};

/// Alias for a BTreeMap, the deterministic map this crate defaults to.
pub type SortedMap<K, V> = BTreeMap<K, V>;
