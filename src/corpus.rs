//! Boundary types for the corpus/data-model layer.
//!
//! The evaluation core never inspects corpus data itself: items and
//! containers travel through expression trees as opaque handles, and all
//! annotation reads go through typed accessor functions resolved up front
//! by the backing [`CorpusSource`]. A minimal in-memory implementation
//! ([`SimpleCorpus`]) is provided for hosts and demos that have no real
//! backend.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::expression::error::{EvalError, EvalResult};
use crate::expression::value::Value;
use crate::types::{MemberKind, TypeInfo};

/// Opaque handle to a single corpus item.
///
/// Handles are cheap to clone and compare by identity of the underlying
/// payload, never by content.
#[derive(Clone)]
pub struct Item {
    payload: Arc<dyn Any + Send + Sync>,
}

impl Item {
    pub fn new(payload: impl Any + Send + Sync) -> Item {
        Item {
            payload: Arc::new(payload),
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    pub fn same_item(&self, other: &Item) -> bool {
        Arc::ptr_eq(&self.payload, &other.payload)
    }
}

impl fmt::Debug for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Item@{:p}", Arc::as_ptr(&self.payload))
    }
}

/// Opaque handle to a container of items.
#[derive(Clone)]
pub struct Container {
    payload: Arc<dyn Any + Send + Sync>,
}

impl Container {
    pub fn new(payload: impl Any + Send + Sync) -> Container {
        Container {
            payload: Arc::new(payload),
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    pub fn same_container(&self, other: &Container) -> bool {
        Arc::ptr_eq(&self.payload, &other.payload)
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Container@{:p}", Arc::as_ptr(&self.payload))
    }
}

/// Reference to a named, sequence-typed corpus layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LayerRef {
    name: Arc<str>,
}

impl LayerRef {
    pub fn new(name: impl Into<Arc<str>>) -> LayerRef {
        LayerRef { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Description of the element an [`Element`](crate::context) scope binds:
/// its member kind plus the layers contributing annotations to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementInfo {
    member_kind: MemberKind,
    layers: Vec<LayerRef>,
}

impl ElementInfo {
    pub fn new(member_kind: MemberKind, layers: Vec<LayerRef>) -> ElementInfo {
        ElementInfo {
            member_kind,
            layers,
        }
    }

    pub fn member_kind(&self) -> MemberKind {
        self.member_kind
    }

    pub fn layers(&self) -> &[LayerRef] {
        &self.layers
    }
}

pub type IntFetch = Arc<dyn Fn(&Item) -> i64 + Send + Sync>;
pub type FloatFetch = Arc<dyn Fn(&Item) -> f64 + Send + Sync>;
pub type BoolFetch = Arc<dyn Fn(&Item) -> bool + Send + Sync>;
pub type ValueFetch = Arc<dyn Fn(&Item) -> Value + Send + Sync>;

/// Typed per-item accessor for one annotation key.
#[derive(Clone)]
pub enum AnnotationFetch {
    Integer(IntFetch),
    FloatingPoint(FloatFetch),
    Boolean(BoolFetch),
    Generic(ValueFetch),
}

/// Resolved metadata and accessor for one annotation key.
#[derive(Clone)]
pub struct AnnotationInfo {
    key: Arc<str>,
    value_type: TypeInfo,
    fetch: AnnotationFetch,
}

impl AnnotationInfo {
    pub fn integer(
        key: impl Into<Arc<str>>,
        fetch: impl Fn(&Item) -> i64 + Send + Sync + 'static,
    ) -> AnnotationInfo {
        AnnotationInfo {
            key: key.into(),
            value_type: TypeInfo::Integer,
            fetch: AnnotationFetch::Integer(Arc::new(fetch)),
        }
    }

    pub fn floating_point(
        key: impl Into<Arc<str>>,
        fetch: impl Fn(&Item) -> f64 + Send + Sync + 'static,
    ) -> AnnotationInfo {
        AnnotationInfo {
            key: key.into(),
            value_type: TypeInfo::FloatingPoint,
            fetch: AnnotationFetch::FloatingPoint(Arc::new(fetch)),
        }
    }

    pub fn boolean(
        key: impl Into<Arc<str>>,
        fetch: impl Fn(&Item) -> bool + Send + Sync + 'static,
    ) -> AnnotationInfo {
        AnnotationInfo {
            key: key.into(),
            value_type: TypeInfo::Boolean,
            fetch: AnnotationFetch::Boolean(Arc::new(fetch)),
        }
    }

    /// Accessor for text, member or other object-valued annotations.
    ///
    /// List types are not representable as annotation results.
    pub fn generic(
        key: impl Into<Arc<str>>,
        value_type: TypeInfo,
        fetch: impl Fn(&Item) -> Value + Send + Sync + 'static,
    ) -> EvalResult<AnnotationInfo> {
        if value_type.is_list() {
            return Err(EvalError::unsupported(format!(
                "list type {} as annotation result",
                value_type
            )));
        }
        Ok(AnnotationInfo {
            key: key.into(),
            value_type,
            fetch: AnnotationFetch::Generic(Arc::new(fetch)),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value_type(&self) -> &TypeInfo {
        &self.value_type
    }

    pub fn fetch(&self) -> &AnnotationFetch {
        &self.fetch
    }
}

impl fmt::Debug for AnnotationInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnnotationInfo")
            .field("key", &self.key)
            .field("value_type", &self.value_type)
            .finish_non_exhaustive()
    }
}

/// The resolver surface the evaluation core consumes from the corpus layer.
pub trait CorpusSource: Send + Sync {
    /// Resolve a qualified annotation identifier to a typed accessor.
    fn resolve_annotation(&self, qualified_key: &str) -> Option<AnnotationInfo>;

    /// Resolve a name to a sequence-typed layer reference.
    fn resolve_layer(&self, name: &str) -> Option<LayerRef>;
}

/// Minimal in-memory [`CorpusSource`] for hosts, demos and tests.
#[derive(Default)]
pub struct SimpleCorpus {
    annotations: HashMap<String, AnnotationInfo>,
    layers: HashMap<String, LayerRef>,
}

impl SimpleCorpus {
    pub fn new() -> SimpleCorpus {
        SimpleCorpus::default()
    }

    pub fn with_layer(mut self, name: &str) -> SimpleCorpus {
        self.layers.insert(name.to_string(), LayerRef::new(name));
        self
    }

    pub fn with_annotation(mut self, info: AnnotationInfo) -> SimpleCorpus {
        self.annotations.insert(info.key().to_string(), info);
        self
    }
}

impl CorpusSource for SimpleCorpus {
    fn resolve_annotation(&self, qualified_key: &str) -> Option<AnnotationInfo> {
        self.annotations.get(qualified_key).cloned()
    }

    fn resolve_layer(&self, name: &str) -> Option<LayerRef> {
        self.layers.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_identity() {
        let a = Item::new(1u32);
        let b = a.clone();
        let c = Item::new(1u32);
        assert!(a.same_item(&b));
        assert!(!a.same_item(&c));
        assert_eq!(a.downcast_ref::<u32>(), Some(&1));
        assert!(a.downcast_ref::<i64>().is_none());
    }

    #[test]
    fn test_annotation_info_types() {
        let info = AnnotationInfo::integer("pos", |_| 3);
        assert_eq!(info.key(), "pos");
        assert_eq!(info.value_type(), &TypeInfo::Integer);

        let info = AnnotationInfo::generic("form", TypeInfo::Text, |_| Value::text("x")).unwrap();
        assert_eq!(info.value_type(), &TypeInfo::Text);
    }

    #[test]
    fn test_list_annotation_rejected() {
        let err = AnnotationInfo::generic(
            "bad",
            TypeInfo::list_of(TypeInfo::Integer),
            |_| Value::Int(0),
        )
        .unwrap_err();
        assert!(matches!(err, EvalError::UnsupportedFeature(_)));
    }

    #[test]
    fn test_simple_corpus_resolution() {
        let corpus = SimpleCorpus::new()
            .with_layer("tokens")
            .with_annotation(AnnotationInfo::integer("pos", |_| 1));

        assert!(corpus.resolve_layer("tokens").is_some());
        assert!(corpus.resolve_layer("sentences").is_none());
        assert!(corpus.resolve_annotation("pos").is_some());
        assert!(corpus.resolve_annotation("lemma").is_none());
    }
}
