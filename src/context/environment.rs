//! Pluggable name environments and the resolution cache over them.
//!
//! An [`Environment`] contributes named, typed, priority-ranked bindings
//! (field-like or method-like). Each context level owns an
//! [`EnvironmentCache`] that indexes the bindings of the environments
//! registered at that level; resolution filters candidates by
//! applicability, host scope and result type, then picks by priority.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use log::warn;

use crate::expression::core::ExprBox;
use crate::expression::error::EvalResult;
use crate::types::{TypeFilter, TypeInfo};

/// Relative rank used to order competing resolution candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Lowest,
    Low,
    Standard,
    High,
    Highest,
}

/// Field-like (zero-argument) or method-like binding shape.
#[derive(Debug, Clone)]
pub enum BindingKind {
    Field,
    Method { arg_types: Vec<TypeFilter> },
}

/// Arguments handed to an entry when it is instantiated into a node.
pub struct Invocation {
    pub target: Option<ExprBox>,
    pub args: Vec<ExprBox>,
}

pub type Instantiator = Arc<dyn Fn(Invocation) -> EvalResult<ExprBox> + Send + Sync>;

/// A single named binding contributed by an environment.
///
/// Immutable once registered.
#[derive(Clone)]
pub struct EnvironmentEntry {
    name: String,
    aliases: Vec<String>,
    kind: BindingKind,
    value_type: TypeInfo,
    priority: Priority,
    instantiate: Instantiator,
}

impl EnvironmentEntry {
    pub fn field(
        name: impl Into<String>,
        value_type: TypeInfo,
        instantiate: impl Fn(Invocation) -> EvalResult<ExprBox> + Send + Sync + 'static,
    ) -> EnvironmentEntry {
        EnvironmentEntry {
            name: name.into(),
            aliases: Vec::new(),
            kind: BindingKind::Field,
            value_type,
            priority: Priority::Standard,
            instantiate: Arc::new(instantiate),
        }
    }

    pub fn method(
        name: impl Into<String>,
        arg_types: Vec<TypeFilter>,
        value_type: TypeInfo,
        instantiate: impl Fn(Invocation) -> EvalResult<ExprBox> + Send + Sync + 'static,
    ) -> EnvironmentEntry {
        EnvironmentEntry {
            name: name.into(),
            aliases: Vec::new(),
            kind: BindingKind::Method { arg_types },
            value_type,
            priority: Priority::Standard,
            instantiate: Arc::new(instantiate),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> EnvironmentEntry {
        self.aliases.push(alias.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> EnvironmentEntry {
        self.priority = priority;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value_type(&self) -> &TypeInfo {
        &self.value_type
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn instantiate(&self, invocation: Invocation) -> EvalResult<ExprBox> {
        (self.instantiate.as_ref())(invocation)
    }

    fn applicable(&self, arg_types: &[TypeInfo], filter: &TypeFilter) -> bool {
        if !filter.accepts(&self.value_type) {
            return false;
        }
        match &self.kind {
            BindingKind::Field => arg_types.is_empty(),
            BindingKind::Method { arg_types: params } => {
                params.len() == arg_types.len()
                    && params
                        .iter()
                        .zip(arg_types.iter())
                        .all(|(param, arg)| param.accepts(arg))
            }
        }
    }
}

impl std::fmt::Debug for EnvironmentEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentEntry")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("kind", &self.kind)
            .field("value_type", &self.value_type)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// A pluggable source of named bindings.
pub trait Environment: Send + Sync {
    /// Host type this environment's entries are scoped to, if any.
    /// Unscoped environments answer bare names; scoped ones require a
    /// target of a compatible type.
    fn host_type(&self) -> Option<TypeInfo> {
        None
    }

    fn entries(&self) -> Vec<EnvironmentEntry>;
}

#[derive(Clone)]
struct CachedEntry {
    host: Option<TypeInfo>,
    entry: EnvironmentEntry,
}

impl CachedEntry {
    fn host_compatible(&self, target_type: Option<&TypeInfo>) -> bool {
        match (&self.host, target_type) {
            (None, None) => true,
            (Some(host), Some(target)) => host == target || host.is_generic(),
            _ => false,
        }
    }
}

/// Per-context index of environment bindings, keyed by lowercased name.
///
/// Reads are lock-free; disposal is permanent and idempotent.
pub struct EnvironmentCache {
    index: DashMap<String, Vec<CachedEntry>>,
    disposed: AtomicBool,
}

impl EnvironmentCache {
    pub fn new(environments: &[Arc<dyn Environment>]) -> EnvironmentCache {
        let index: DashMap<String, Vec<CachedEntry>> = DashMap::new();
        for environment in environments {
            let host = environment.host_type();
            for entry in environment.entries() {
                let cached = CachedEntry {
                    host: host.clone(),
                    entry,
                };
                index
                    .entry(cached.entry.name.to_lowercase())
                    .or_default()
                    .push(cached.clone());
                for alias in &cached.entry.aliases {
                    index
                        .entry(alias.to_lowercase())
                        .or_default()
                        .push(cached.clone());
                }
            }
        }
        EnvironmentCache {
            index,
            disposed: AtomicBool::new(false),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.disposed.load(Ordering::Acquire) || self.index.is_empty()
    }

    /// Find the binding for `name`, or `None` if this level cannot answer.
    ///
    /// More than one applicable candidate is reported once per lookup and
    /// resolved in favor of the highest priority.
    pub fn resolve(
        &self,
        name: &str,
        target_type: Option<&TypeInfo>,
        arg_types: &[TypeInfo],
        filter: &TypeFilter,
    ) -> Option<EnvironmentEntry> {
        if self.disposed.load(Ordering::Acquire) {
            return None;
        }
        let candidates = self.index.get(&name.to_lowercase())?;
        let mut matches: Vec<&CachedEntry> = candidates
            .iter()
            .filter(|cached| {
                cached.host_compatible(target_type) && cached.entry.applicable(arg_types, filter)
            })
            .collect();
        if matches.is_empty() {
            return None;
        }
        matches.sort_by(|a, b| b.entry.priority.cmp(&a.entry.priority));
        if matches.len() > 1 {
            warn!(
                "ambiguous resolution for '{}': {} candidates, picking priority {:?}",
                name,
                matches.len(),
                matches[0].entry.priority
            );
        }
        Some(matches[0].entry.clone())
    }

    /// Permanently empty this cache. Idempotent.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
        self.index.clear();
    }
}
