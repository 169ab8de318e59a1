//! Evaluation contexts and per-worker evaluation state.
//!
//! A context chain binds a query compilation session to a corpus: the Root
//! scope owns the corpus handle, switches, properties and the lazily grown
//! variable/member registries; a Lane scope binds one sequence-typed layer;
//! Element scopes (which may nest) bind one member description each. The
//! chain is built once through builders, shared behind `Arc`, and disposed
//! explicitly when the session ends.
//!
//! Mutable evaluation input never lives in the context itself. Each worker
//! thread creates one [`EvalState`] from the root and owns it outright;
//! expressions reach their current item, container, variable and member
//! values through slot indices assigned at context build time.

pub mod environment;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::corpus::{AnnotationInfo, Container, CorpusSource, ElementInfo, Item, LayerRef};
use crate::expression::core::{ExprBox, Expression};
use crate::expression::error::{EvalError, EvalResult};
use crate::expression::strings::StringMode;
use crate::expression::value::Value;
use crate::types::{MemberKind, TypeFilter, TypeInfo};

pub use environment::{
    BindingKind, Environment, EnvironmentCache, EnvironmentEntry, Invocation, Priority,
};

/// Per-session behavior switches resolved by the parser/factory layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuerySwitch {
    /// Compare text by unicode code points instead of raw UTF-16 units.
    UnicodeStrings,
    /// Case-insensitive text comparison.
    CaseInsensitive,
    /// Permit automatic casts when combining mixed operand types.
    Autocast,
    /// Short-circuit logical conjunction/disjunction.
    PredicateEarlyExit,
}

#[derive(Debug, Clone)]
enum ContextKind {
    Root,
    Lane {
        lane: LayerRef,
        container_slot: usize,
    },
    Element {
        element: ElementInfo,
        item_slot: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct MemberBinding {
    layer: LayerRef,
    slot: usize,
}

struct SharedState {
    corpus: Arc<dyn CorpusSource>,
    switches: HashSet<QuerySwitch>,
    properties: HashMap<String, String>,
    variables: RwLock<HashMap<String, usize>>,
    members: RwLock<HashMap<String, MemberBinding>>,
    item_slots: AtomicUsize,
    container_slots: AtomicUsize,
    setup_lock: Mutex<()>,
    disposed: AtomicBool,
}

/// One scope in the Root → Lane → Element* chain.
pub struct EvaluationContext {
    kind: ContextKind,
    parent: Option<Arc<EvaluationContext>>,
    shared: Arc<SharedState>,
    env_cache: EnvironmentCache,
}

impl EvaluationContext {
    pub fn builder() -> RootBuilder {
        RootBuilder::default()
    }

    pub fn is_root(&self) -> bool {
        matches!(self.kind, ContextKind::Root)
    }

    pub fn parent(&self) -> Option<&Arc<EvaluationContext>> {
        self.parent.as_ref()
    }

    pub fn corpus(&self) -> &Arc<dyn CorpusSource> {
        &self.shared.corpus
    }

    pub fn is_switch_set(&self, switch: QuerySwitch) -> bool {
        self.shared.switches.contains(&switch)
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.shared.properties.get(key).map(String::as_str)
    }

    /// Text comparison mode derived from the session switches.
    pub fn string_mode(&self) -> StringMode {
        StringMode {
            unicode: self.is_switch_set(QuerySwitch::UnicodeStrings),
            case_insensitive: self.is_switch_set(QuerySwitch::CaseInsensitive),
        }
    }

    pub fn early_exit(&self) -> bool {
        self.is_switch_set(QuerySwitch::PredicateEarlyExit)
    }

    pub fn autocast(&self) -> bool {
        self.is_switch_set(QuerySwitch::Autocast)
    }

    /// Advisory lock for client code that serializes optimization and
    /// duplication setup across threads. Nothing in the engine itself
    /// takes it.
    pub fn setup_lock(&self) -> &Mutex<()> {
        &self.shared.setup_lock
    }

    /// The lane this scope (or the nearest enclosing scope) is bound to.
    pub fn lane(&self) -> Option<&LayerRef> {
        let mut current = Some(self);
        while let Some(ctx) = current {
            if let ContextKind::Lane { lane, .. } = &ctx.kind {
                return Some(lane);
            }
            current = ctx.parent.as_deref();
        }
        None
    }

    /// The element description of this scope or the nearest enclosing
    /// element scope.
    pub fn element(&self) -> Option<&ElementInfo> {
        let mut current = Some(self);
        while let Some(ctx) = current {
            if let ContextKind::Element { element, .. } = &ctx.kind {
                return Some(element);
            }
            current = ctx.parent.as_deref();
        }
        None
    }

    /// Slot of the current item in the nearest element scope.
    pub fn item_slot(&self) -> Option<usize> {
        let mut current = Some(self);
        while let Some(ctx) = current {
            if let ContextKind::Element { item_slot, .. } = &ctx.kind {
                return Some(*item_slot);
            }
            current = ctx.parent.as_deref();
        }
        None
    }

    /// Slot of the current container in the nearest lane scope.
    pub fn container_slot(&self) -> Option<usize> {
        let mut current = Some(self);
        while let Some(ctx) = current {
            if let ContextKind::Lane { container_slot, .. } = &ctx.kind {
                return Some(*container_slot);
            }
            current = ctx.parent.as_deref();
        }
        None
    }

    /// Resolve a qualified annotation key through the corpus.
    pub fn annotation(&self, qualified_key: &str) -> EvalResult<AnnotationInfo> {
        self.shared
            .corpus
            .resolve_annotation(qualified_key)
            .ok_or_else(|| EvalError::UnknownIdentifier(qualified_key.to_string()))
    }

    /// Slot of the named variable, created on first access.
    pub fn variable_slot(&self, name: &str) -> usize {
        if let Some(&slot) = self.shared.variables.read().get(name) {
            return slot;
        }
        let mut variables = self.shared.variables.write();
        let next = variables.len();
        *variables.entry(name.to_string()).or_insert(next)
    }

    /// Reference expression for the named variable.
    pub fn variable(&self, name: &str) -> VariableRef {
        VariableRef {
            name: Arc::from(name),
            slot: self.variable_slot(name),
        }
    }

    /// Bind a member name to a layer, creating its slot on first access.
    /// Rebinding an existing member to a different layer is an error.
    pub fn bind_member(&self, name: &str, layer: LayerRef) -> EvalResult<usize> {
        let mut members = self.shared.members.write();
        if let Some(binding) = members.get(name) {
            if binding.layer != layer {
                return Err(EvalError::incorrect_use(format!(
                    "member '{}' already bound to layer '{}'",
                    name,
                    binding.layer.name()
                )));
            }
            return Ok(binding.slot);
        }
        let slot = members.len();
        members.insert(name.to_string(), MemberBinding { layer, slot });
        Ok(slot)
    }

    /// Reference expression for a previously bound member.
    pub fn member(&self, name: &str) -> EvalResult<MemberRef> {
        let members = self.shared.members.read();
        let binding = members
            .get(name)
            .ok_or_else(|| EvalError::UnknownIdentifier(name.to_string()))?;
        Ok(MemberRef {
            name: Arc::from(name),
            slot: binding.slot,
        })
    }

    /// Reference expression for the current item of the nearest element
    /// scope.
    pub fn current_item(&self) -> EvalResult<ItemRef> {
        let mut current = Some(self);
        while let Some(ctx) = current {
            if let ContextKind::Element { element, item_slot } = &ctx.kind {
                return Ok(ItemRef {
                    slot: *item_slot,
                    kind: element.member_kind(),
                });
            }
            current = ctx.parent.as_deref();
        }
        Err(EvalError::incorrect_use(
            "no element scope in the context chain",
        ))
    }

    /// Reference expression for the current container of the nearest lane
    /// scope.
    pub fn current_container(&self) -> EvalResult<ContainerRef> {
        self.container_slot()
            .map(|slot| ContainerRef { slot })
            .ok_or_else(|| EvalError::incorrect_use("no lane scope in the context chain"))
    }

    /// Resolve a bare name or method call against the environments along
    /// the context chain, innermost level first.
    pub fn resolve(
        &self,
        name: &str,
        target: Option<ExprBox>,
        args: Vec<ExprBox>,
        filter: &TypeFilter,
    ) -> EvalResult<ExprBox> {
        let target_type = target.as_ref().map(|t| t.result_type());
        let arg_types: Vec<TypeInfo> = args.iter().map(|a| a.result_type()).collect();
        let mut current = Some(self);
        while let Some(ctx) = current {
            if let Some(entry) =
                ctx.env_cache
                    .resolve(name, target_type.as_ref(), &arg_types, filter)
            {
                return entry.instantiate(Invocation { target, args });
            }
            current = ctx.parent.as_deref();
        }
        Err(EvalError::UnknownIdentifier(name.to_string()))
    }

    /// Resolve a zero-argument (field-like) name.
    pub fn resolve_name(&self, name: &str, filter: &TypeFilter) -> EvalResult<ExprBox> {
        self.resolve(name, None, Vec::new(), filter)
    }

    /// Resolve a method-like call.
    pub fn resolve_method(
        &self,
        name: &str,
        args: Vec<ExprBox>,
        filter: &TypeFilter,
    ) -> EvalResult<ExprBox> {
        self.resolve(name, None, args, filter)
    }

    /// Create the evaluation state for one worker thread.
    pub fn new_state(&self) -> EvalResult<EvalState> {
        if self.shared.disposed.load(Ordering::Acquire) {
            return Err(EvalError::incorrect_use(
                "evaluation context has been disposed",
            ));
        }
        Ok(EvalState {
            variables: vec![None; self.shared.variables.read().len()],
            members: vec![None; self.shared.members.read().len()],
            items: vec![None; self.shared.item_slots.load(Ordering::SeqCst)],
            containers: vec![None; self.shared.container_slots.load(Ordering::SeqCst)],
        })
    }

    /// End the session for this scope: the environment cache becomes
    /// permanently empty, and disposing the root additionally invalidates
    /// state creation. Idempotent.
    pub fn dispose(&self) {
        self.env_cache.dispose();
        if self.is_root() {
            self.shared.disposed.store(true, Ordering::Release);
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::Acquire)
    }

    pub fn lane_builder(self: &Arc<Self>) -> LaneBuilder {
        LaneBuilder {
            parent: Arc::clone(self),
            lane: None,
            lane_name: None,
            environments: Vec::new(),
        }
    }

    pub fn element_builder(self: &Arc<Self>) -> ElementBuilder {
        ElementBuilder {
            parent: Arc::clone(self),
            element: None,
            environments: Vec::new(),
        }
    }
}

impl std::fmt::Debug for EvaluationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluationContext")
            .field("kind", &self.kind)
            .field("has_parent", &self.parent.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for the root scope.
#[derive(Default)]
pub struct RootBuilder {
    corpus: Option<Arc<dyn CorpusSource>>,
    switches: HashSet<QuerySwitch>,
    properties: HashMap<String, String>,
    environments: Vec<Arc<dyn Environment>>,
}

impl RootBuilder {
    pub fn corpus(mut self, corpus: Arc<dyn CorpusSource>) -> Self {
        self.corpus = Some(corpus);
        self
    }

    pub fn switch(mut self, switch: QuerySwitch) -> Self {
        self.switches.insert(switch);
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn environment(mut self, environment: Arc<dyn Environment>) -> Self {
        self.environments.push(environment);
        self
    }

    pub fn build(self) -> EvalResult<Arc<EvaluationContext>> {
        let corpus = self
            .corpus
            .ok_or_else(|| EvalError::incorrect_use("root context requires a corpus"))?;
        Ok(Arc::new(EvaluationContext {
            kind: ContextKind::Root,
            parent: None,
            shared: Arc::new(SharedState {
                corpus,
                switches: self.switches,
                properties: self.properties,
                variables: RwLock::new(HashMap::new()),
                members: RwLock::new(HashMap::new()),
                item_slots: AtomicUsize::new(0),
                container_slots: AtomicUsize::new(0),
                setup_lock: Mutex::new(()),
                disposed: AtomicBool::new(false),
            }),
            env_cache: EnvironmentCache::new(&self.environments),
        }))
    }
}

/// Builder for a lane scope under the root.
pub struct LaneBuilder {
    parent: Arc<EvaluationContext>,
    lane: Option<LayerRef>,
    lane_name: Option<String>,
    environments: Vec<Arc<dyn Environment>>,
}

impl LaneBuilder {
    pub fn lane(mut self, lane: LayerRef) -> Self {
        self.lane = Some(lane);
        self
    }

    pub fn lane_named(mut self, name: impl Into<String>) -> Self {
        self.lane_name = Some(name.into());
        self
    }

    pub fn environment(mut self, environment: Arc<dyn Environment>) -> Self {
        self.environments.push(environment);
        self
    }

    pub fn build(self) -> EvalResult<Arc<EvaluationContext>> {
        if !self.parent.is_root() {
            return Err(EvalError::incorrect_use(
                "lane context requires the root context as parent",
            ));
        }
        let lane = match (self.lane, self.lane_name) {
            (Some(lane), _) => lane,
            (None, Some(name)) => self
                .parent
                .corpus()
                .resolve_layer(&name)
                .ok_or(EvalError::UnknownIdentifier(name))?,
            (None, None) => return Err(EvalError::incorrect_use("lane must be set")),
        };
        let shared = Arc::clone(&self.parent.shared);
        let container_slot = shared.container_slots.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(EvaluationContext {
            kind: ContextKind::Lane {
                lane,
                container_slot,
            },
            parent: Some(self.parent),
            shared,
            env_cache: EnvironmentCache::new(&self.environments),
        }))
    }
}

/// Builder for an element scope under a lane or another element.
pub struct ElementBuilder {
    parent: Arc<EvaluationContext>,
    element: Option<ElementInfo>,
    environments: Vec<Arc<dyn Environment>>,
}

impl ElementBuilder {
    pub fn element(mut self, element: ElementInfo) -> Self {
        self.element = Some(element);
        self
    }

    pub fn environment(mut self, environment: Arc<dyn Environment>) -> Self {
        self.environments.push(environment);
        self
    }

    pub fn build(self) -> EvalResult<Arc<EvaluationContext>> {
        if !matches!(
            self.parent.kind,
            ContextKind::Lane { .. } | ContextKind::Element { .. }
        ) {
            return Err(EvalError::incorrect_use(
                "element context requires a lane or element parent",
            ));
        }
        let element = self
            .element
            .ok_or_else(|| EvalError::incorrect_use("element must be set"))?;
        let shared = Arc::clone(&self.parent.shared);
        let item_slot = shared.item_slots.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(EvaluationContext {
            kind: ContextKind::Element { element, item_slot },
            parent: Some(self.parent),
            shared,
            env_cache: EnvironmentCache::new(&self.environments),
        }))
    }
}

/// Mutable per-worker evaluation state.
///
/// One instance per worker thread; the driver writes the current item,
/// container, member and variable values between evaluations and every
/// `compute*` call reads from exactly one instance.
#[derive(Debug, Clone, Default)]
pub struct EvalState {
    variables: Vec<Option<Value>>,
    members: Vec<Option<Item>>,
    items: Vec<Option<Item>>,
    containers: Vec<Option<Container>>,
}

impl EvalState {
    /// Detached state with no slots, used for constant evaluation.
    pub fn empty() -> EvalState {
        EvalState::default()
    }

    pub fn set_variable(&mut self, slot: usize, value: Value) {
        if slot >= self.variables.len() {
            self.variables.resize(slot + 1, None);
        }
        self.variables[slot] = Some(value);
    }

    pub fn variable(&self, slot: usize) -> Option<&Value> {
        self.variables.get(slot).and_then(Option::as_ref)
    }

    pub fn set_member(&mut self, slot: usize, item: Item) {
        if slot >= self.members.len() {
            self.members.resize(slot + 1, None);
        }
        self.members[slot] = Some(item);
    }

    pub fn member(&self, slot: usize) -> Option<&Item> {
        self.members.get(slot).and_then(Option::as_ref)
    }

    pub fn set_item(&mut self, slot: usize, item: Item) {
        if slot >= self.items.len() {
            self.items.resize(slot + 1, None);
        }
        self.items[slot] = Some(item);
    }

    pub fn item(&self, slot: usize) -> Option<&Item> {
        self.items.get(slot).and_then(Option::as_ref)
    }

    pub fn set_container(&mut self, slot: usize, container: Container) {
        if slot >= self.containers.len() {
            self.containers.resize(slot + 1, None);
        }
        self.containers[slot] = Some(container);
    }

    pub fn container(&self, slot: usize) -> Option<&Container> {
        self.containers.get(slot).and_then(Option::as_ref)
    }

    /// Clear all assignable slots, as done between evaluations.
    pub fn reset(&mut self) {
        self.variables.iter_mut().for_each(|v| *v = None);
        self.members.iter_mut().for_each(|v| *v = None);
        self.items.iter_mut().for_each(|v| *v = None);
        self.containers.iter_mut().for_each(|v| *v = None);
    }
}

/// Reads the named variable slot of the current worker state.
#[derive(Debug, Clone)]
pub struct VariableRef {
    name: Arc<str>,
    slot: usize,
}

impl VariableRef {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn slot(&self) -> usize {
        self.slot
    }
}

impl Expression for VariableRef {
    fn result_type(&self) -> TypeInfo {
        TypeInfo::Generic
    }

    fn compute(&mut self, state: &mut EvalState) -> EvalResult<Value> {
        state.variable(self.slot).cloned().ok_or_else(|| {
            EvalError::incorrect_use(format!("variable '{}' read before assignment", self.name))
        })
    }

    fn optimize(self: Box<Self>, _ctx: &EvaluationContext) -> EvalResult<ExprBox> {
        Ok(self)
    }

    fn duplicate(&self, _ctx: &EvaluationContext) -> EvalResult<ExprBox> {
        Ok(Box::new(self.clone()))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn std::any::Any> {
        self
    }
}

/// Reads the item bound to a named member slot.
#[derive(Debug, Clone)]
pub struct MemberRef {
    name: Arc<str>,
    slot: usize,
}

impl MemberRef {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Expression for MemberRef {
    fn result_type(&self) -> TypeInfo {
        TypeInfo::Member(MemberKind::Item)
    }

    fn compute(&mut self, state: &mut EvalState) -> EvalResult<Value> {
        state
            .member(self.slot)
            .cloned()
            .map(Value::Item)
            .ok_or_else(|| {
                EvalError::incorrect_use(format!("member '{}' not bound for this match", self.name))
            })
    }

    fn accesses_backend(&self) -> bool {
        true
    }

    fn optimize(self: Box<Self>, _ctx: &EvaluationContext) -> EvalResult<ExprBox> {
        Ok(self)
    }

    fn duplicate(&self, _ctx: &EvaluationContext) -> EvalResult<ExprBox> {
        Ok(Box::new(self.clone()))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn std::any::Any> {
        self
    }
}

/// Reads the current item of an element scope.
#[derive(Debug, Clone)]
pub struct ItemRef {
    slot: usize,
    kind: MemberKind,
}

impl Expression for ItemRef {
    fn result_type(&self) -> TypeInfo {
        TypeInfo::Member(self.kind)
    }

    fn compute(&mut self, state: &mut EvalState) -> EvalResult<Value> {
        state
            .item(self.slot)
            .cloned()
            .map(Value::Item)
            .ok_or_else(|| EvalError::incorrect_use("no current item in this scope"))
    }

    fn accesses_backend(&self) -> bool {
        true
    }

    fn optimize(self: Box<Self>, _ctx: &EvaluationContext) -> EvalResult<ExprBox> {
        Ok(self)
    }

    fn duplicate(&self, _ctx: &EvaluationContext) -> EvalResult<ExprBox> {
        Ok(Box::new(self.clone()))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn std::any::Any> {
        self
    }
}

/// Reads the current container of a lane scope.
#[derive(Debug, Clone)]
pub struct ContainerRef {
    slot: usize,
}

impl Expression for ContainerRef {
    fn result_type(&self) -> TypeInfo {
        TypeInfo::Member(MemberKind::Container)
    }

    fn compute(&mut self, state: &mut EvalState) -> EvalResult<Value> {
        state
            .container(self.slot)
            .cloned()
            .map(Value::Container)
            .ok_or_else(|| EvalError::incorrect_use("no current container in this scope"))
    }

    fn accesses_backend(&self) -> bool {
        true
    }

    fn optimize(self: Box<Self>, _ctx: &EvaluationContext) -> EvalResult<ExprBox> {
        Ok(self)
    }

    fn duplicate(&self, _ctx: &EvaluationContext) -> EvalResult<ExprBox> {
        Ok(Box::new(self.clone()))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn std::any::Any> {
        self
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::corpus::SimpleCorpus;

    /// Bare root context over an empty corpus.
    pub(crate) fn test_context() -> Arc<EvaluationContext> {
        EvaluationContext::builder()
            .corpus(Arc::new(SimpleCorpus::new()))
            .build()
            .expect("building a bare root context cannot fail")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::SimpleCorpus;

    fn corpus() -> Arc<dyn CorpusSource> {
        Arc::new(SimpleCorpus::new().with_layer("tokens"))
    }

    fn root() -> Arc<EvaluationContext> {
        EvaluationContext::builder().corpus(corpus()).build().unwrap()
    }

    #[test]
    fn test_root_requires_corpus() {
        assert!(matches!(
            EvaluationContext::builder().build(),
            Err(EvalError::IncorrectUse(_))
        ));
    }

    #[test]
    fn test_switches_and_properties() {
        let ctx = EvaluationContext::builder()
            .corpus(corpus())
            .switch(QuerySwitch::CaseInsensitive)
            .property("limit", "100")
            .build()
            .unwrap();
        assert!(ctx.is_switch_set(QuerySwitch::CaseInsensitive));
        assert!(!ctx.is_switch_set(QuerySwitch::Autocast));
        assert_eq!(ctx.property("limit"), Some("100"));
        assert_eq!(ctx.property("missing"), None);
        assert!(ctx.string_mode().case_insensitive);
        assert!(!ctx.string_mode().unicode);
    }

    #[test]
    fn test_lane_must_be_set() {
        let root = root();
        assert!(matches!(
            root.lane_builder().build(),
            Err(EvalError::IncorrectUse(_))
        ));
        assert!(matches!(
            root.lane_builder().lane_named("missing").build(),
            Err(EvalError::UnknownIdentifier(_))
        ));
        assert!(root.lane_builder().lane_named("tokens").build().is_ok());
    }

    #[test]
    fn test_chain_structure() {
        let root = root();
        let lane = root.lane_builder().lane_named("tokens").build().unwrap();
        let element = lane
            .element_builder()
            .element(ElementInfo::new(MemberKind::Item, vec![]))
            .build()
            .unwrap();
        let nested = element
            .element_builder()
            .element(ElementInfo::new(MemberKind::Edge, vec![]))
            .build()
            .unwrap();

        assert!(root.is_root());
        assert!(!lane.is_root());
        assert_eq!(lane.lane().unwrap().name(), "tokens");
        assert_eq!(nested.lane().unwrap().name(), "tokens");
        assert_eq!(nested.element().unwrap().member_kind(), MemberKind::Edge);
        assert_ne!(element.item_slot(), nested.item_slot());

        // Element directly under root is rejected.
        assert!(matches!(
            root.element_builder()
                .element(ElementInfo::new(MemberKind::Item, vec![]))
                .build(),
            Err(EvalError::IncorrectUse(_))
        ));
        // Lane under lane is rejected.
        assert!(matches!(
            lane.lane_builder().lane_named("tokens").build(),
            Err(EvalError::IncorrectUse(_))
        ));
    }

    #[test]
    fn test_variable_slots_created_lazily() {
        let root = root();
        let a = root.variable_slot("x");
        let b = root.variable_slot("y");
        assert_ne!(a, b);
        assert_eq!(root.variable_slot("x"), a);

        let mut state = root.new_state().unwrap();
        let mut var = root.variable("x");
        assert!(matches!(
            var.compute(&mut state),
            Err(EvalError::IncorrectUse(_))
        ));
        state.set_variable(a, Value::Int(5));
        assert_eq!(var.compute(&mut state).unwrap(), Value::Int(5));
        state.reset();
        assert!(var.compute(&mut state).is_err());
    }

    #[test]
    fn test_member_binding() {
        let root = root();
        let layer = LayerRef::new("tokens");
        let slot = root.bind_member("head", layer.clone()).unwrap();
        assert_eq!(root.bind_member("head", layer).unwrap(), slot);
        assert!(matches!(
            root.bind_member("head", LayerRef::new("other")),
            Err(EvalError::IncorrectUse(_))
        ));
        assert!(matches!(
            root.member("tail"),
            Err(EvalError::UnknownIdentifier(_))
        ));

        let mut state = root.new_state().unwrap();
        let mut member = root.member("head").unwrap();
        let item = Item::new(7u32);
        state.set_member(slot, item.clone());
        assert_eq!(member.compute(&mut state).unwrap(), Value::Item(item));
    }

    #[test]
    fn test_current_item_and_container() {
        let root = root();
        assert!(root.current_item().is_err());
        assert!(root.current_container().is_err());

        let lane = root.lane_builder().lane_named("tokens").build().unwrap();
        let element = lane
            .element_builder()
            .element(ElementInfo::new(MemberKind::Item, vec![]))
            .build()
            .unwrap();

        let mut state = element.new_state().unwrap();
        let item = Item::new(1u8);
        state.set_item(element.item_slot().unwrap(), item.clone());
        let mut item_ref = element.current_item().unwrap();
        assert_eq!(
            item_ref.result_type(),
            TypeInfo::Member(MemberKind::Item)
        );
        assert_eq!(item_ref.compute(&mut state).unwrap(), Value::Item(item));

        let container = Container::new(2u8);
        state.set_container(element.container_slot().unwrap(), container.clone());
        let mut container_ref = element.current_container().unwrap();
        assert_eq!(
            container_ref.compute(&mut state).unwrap(),
            Value::Container(container)
        );
    }

    #[test]
    fn test_resolution_walks_chain() {
        struct CountEnv;
        impl Environment for CountEnv {
            fn entries(&self) -> Vec<EnvironmentEntry> {
                vec![EnvironmentEntry::field(
                    "answer",
                    TypeInfo::Integer,
                    |_| Ok(Box::new(crate::expression::core::Literal::int(42))),
                )]
            }
        }

        let root = EvaluationContext::builder()
            .corpus(corpus())
            .environment(Arc::new(CountEnv))
            .build()
            .unwrap();
        let lane = root.lane_builder().lane_named("tokens").build().unwrap();

        // Resolved at the root level even when asked from the lane scope.
        let mut expr = lane.resolve_name("answer", &TypeFilter::Numeric).unwrap();
        assert_eq!(
            expr.compute(&mut EvalState::empty()).unwrap(),
            Value::Int(42)
        );
        assert!(matches!(
            lane.resolve_name("missing", &TypeFilter::All),
            Err(EvalError::UnknownIdentifier(_))
        ));
    }

    #[test]
    fn test_dispose() {
        struct OneEnv;
        impl Environment for OneEnv {
            fn entries(&self) -> Vec<EnvironmentEntry> {
                vec![EnvironmentEntry::field("one", TypeInfo::Integer, |_| {
                    Ok(Box::new(crate::expression::core::Literal::int(1)))
                })]
            }
        }
        let root = EvaluationContext::builder()
            .corpus(corpus())
            .environment(Arc::new(OneEnv))
            .build()
            .unwrap();
        assert!(root.resolve_name("one", &TypeFilter::All).is_ok());

        root.dispose();
        assert!(root.is_disposed());
        assert!(matches!(
            root.resolve_name("one", &TypeFilter::All),
            Err(EvalError::UnknownIdentifier(_))
        ));
        assert!(root.new_state().is_err());
        // Disposing again is fine.
        root.dispose();
    }
}
