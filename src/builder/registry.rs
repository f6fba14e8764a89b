//! Name-indexed catalogue of builders with run filtering and build state.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::builder::Builder;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("builder `{0}` is already registered")]
    DuplicateName(String),

    #[error("no builder named `{0}`")]
    Unknown(String),

    #[error("a builder filter is already configured; --build, --skip and --skip-build are mutually exclusive")]
    FilterAlreadySet,

    #[error("unknown builder(s) in filter: {}", .0.join(", "))]
    UnknownInFilter(Vec<String>),

    #[error("builder `{name}` cannot start from state {state}")]
    Reentered { name: String, state: BuildState },
}

/// Lifecycle of one builder within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Unbuilt,
    Configuring,
    Compiling,
    Installing,
    Built,
    Failed,
}

impl BuildState {
    fn is_running(self) -> bool {
        matches!(
            self,
            BuildState::Configuring | BuildState::Compiling | BuildState::Installing
        )
    }
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BuildState::Unbuilt => "unbuilt",
            BuildState::Configuring => "configuring",
            BuildState::Compiling => "compiling",
            BuildState::Installing => "installing",
            BuildState::Built => "built",
            BuildState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Which builders run.
pub enum BuildFilter {
    /// Build everything.
    All,
    /// Build only the named builders.
    Only(BTreeSet<String>),
    /// Build everything except the named builders.
    Skip(BTreeSet<String>),
    /// Build the builders the predicate accepts.
    Predicate(Box<dyn Fn(&str) -> bool + Send + Sync>),
}

impl BuildFilter {
    fn allows(&self, name: &str) -> bool {
        match self {
            BuildFilter::All => true,
            BuildFilter::Only(names) => names.contains(name),
            BuildFilter::Skip(names) => !names.contains(name),
            BuildFilter::Predicate(f) => f(name),
        }
    }
}

impl fmt::Debug for BuildFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildFilter::All => f.write_str("All"),
            BuildFilter::Only(names) => f.debug_tuple("Only").field(names).finish(),
            BuildFilter::Skip(names) => f.debug_tuple("Skip").field(names).finish(),
            BuildFilter::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Registered builders, in registration order.
#[derive(Default)]
pub struct BuilderRegistry {
    builders: BTreeMap<String, Arc<dyn Builder>>,
    order: Vec<String>,
    states: BTreeMap<String, BuildState>,
    filter: Option<BuildFilter>,
}

impl BuilderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a builder. Names must be unique.
    pub fn register(&mut self, builder: Arc<dyn Builder>) -> Result<(), RegistryError> {
        let name = builder.name().to_string();
        if self.builders.contains_key(&name) {
            return Err(RegistryError::DuplicateName(name));
        }
        tracing::trace!("registered builder {}", name);
        self.order.push(name.clone());
        self.states.insert(name.clone(), BuildState::Unbuilt);
        self.builders.insert(name, builder);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Builder>, RegistryError> {
        self.builders
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::Unknown(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.builders.contains_key(name)
    }

    /// Builder names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Build only `names`.
    pub fn add_include_filter<I, S>(&mut self, names: I) -> Result<(), RegistryError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_filter(BuildFilter::Only(names.into_iter().map(Into::into).collect()))
    }

    /// Build everything except `names`.
    pub fn add_exclude_filter<I, S>(&mut self, names: I) -> Result<(), RegistryError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_filter(BuildFilter::Skip(names.into_iter().map(Into::into).collect()))
    }

    /// Build whatever `predicate` accepts.
    pub fn add_predicate_filter(
        &mut self,
        predicate: impl Fn(&str) -> bool + Send + Sync + 'static,
    ) -> Result<(), RegistryError> {
        self.set_filter(BuildFilter::Predicate(Box::new(predicate)))
    }

    fn set_filter(&mut self, filter: BuildFilter) -> Result<(), RegistryError> {
        if self.filter.is_some() {
            return Err(RegistryError::FilterAlreadySet);
        }
        tracing::debug!("builder filter: {:?}", filter);
        self.filter = Some(filter);
        Ok(())
    }

    /// Check that name-based filters only name registered builders.
    pub fn validate_filter(&self) -> Result<(), RegistryError> {
        let names = match &self.filter {
            Some(BuildFilter::Only(names)) | Some(BuildFilter::Skip(names)) => names,
            _ => return Ok(()),
        };
        let unknown: Vec<String> = names
            .iter()
            .filter(|n| !self.builders.contains_key(n.as_str()))
            .cloned()
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(RegistryError::UnknownInFilter(unknown))
        }
    }

    /// Whether the active filter lets `name` run. No filter builds everything.
    pub fn should_build(&self, name: &str) -> bool {
        self.filter.as_ref().map_or(true, |f| f.allows(name))
    }

    pub fn state(&self, name: &str) -> Option<BuildState> {
        self.states.get(name).copied()
    }

    /// Move `name` from `Unbuilt` into `Configuring`. Builders never re-enter.
    pub fn begin(&mut self, name: &str) -> Result<(), RegistryError> {
        let state = self.state_mut(name)?;
        if *state != BuildState::Unbuilt {
            return Err(RegistryError::Reentered {
                name: name.to_string(),
                state: *state,
            });
        }
        *state = BuildState::Configuring;
        Ok(())
    }

    /// Record progress within a running builder.
    pub fn transition(&mut self, name: &str, next: BuildState) -> Result<(), RegistryError> {
        let state = self.state_mut(name)?;
        if !state.is_running() {
            return Err(RegistryError::Reentered {
                name: name.to_string(),
                state: *state,
            });
        }
        *state = next;
        Ok(())
    }

    /// Record the final state of a builder run.
    pub fn complete(&mut self, name: &str, last: BuildState) -> Result<(), RegistryError> {
        *self.state_mut(name)? = last;
        Ok(())
    }

    fn state_mut(&mut self, name: &str) -> Result<&mut BuildState, RegistryError> {
        self.states
            .get_mut(name)
            .ok_or_else(|| RegistryError::Unknown(name.to_string()))
    }
}

impl fmt::Debug for BuilderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuilderRegistry")
            .field("builders", &self.order)
            .field("states", &self.states)
            .field("filter", &self.filter)
            .finish()
    }
}
