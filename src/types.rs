//! Result-type classification for expressions.
//!
//! Every expression node declares exactly one [`TypeInfo`] that stays fixed
//! for the node's lifetime. The classification is closed: pattern matching
//! over it is exhaustive, and compatibility questions are answered here
//! rather than by ad-hoc probing of runtime values.

use std::fmt;

/// Corpus member kinds an expression can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Item,
    Edge,
    Container,
    Layer,
}

impl MemberKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberKind::Item => "item",
            MemberKind::Edge => "edge",
            MemberKind::Container => "container",
            MemberKind::Layer => "layer",
        }
    }
}

/// The result kind of an expression.
///
/// Two `TypeInfo` values are equal iff their full structure matches; list
/// kinds are derived on demand via [`TypeInfo::list_of`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeInfo {
    Integer,
    FloatingPoint,
    Boolean,
    Text,
    List(Box<TypeInfo>),
    Member(MemberKind),
    Generic,
}

impl TypeInfo {
    /// Derive the list type with the given element type.
    pub fn list_of(element: TypeInfo) -> TypeInfo {
        TypeInfo::List(Box::new(element))
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, TypeInfo::Integer)
    }

    pub fn is_floating_point(&self) -> bool {
        matches!(self, TypeInfo::FloatingPoint)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, TypeInfo::Integer | TypeInfo::FloatingPoint)
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, TypeInfo::Boolean)
    }

    pub fn is_text(&self) -> bool {
        matches!(self, TypeInfo::Text)
    }

    pub fn is_list(&self) -> bool {
        matches!(self, TypeInfo::List(_))
    }

    pub fn is_member(&self) -> bool {
        matches!(self, TypeInfo::Member(_))
    }

    pub fn is_generic(&self) -> bool {
        matches!(self, TypeInfo::Generic)
    }

    /// True for the three primitive kinds that have dedicated fast paths.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            TypeInfo::Integer | TypeInfo::FloatingPoint | TypeInfo::Boolean
        )
    }

    /// Element type of a list kind, `None` for non-list kinds.
    pub fn element_type(&self) -> Option<&TypeInfo> {
        match self {
            TypeInfo::List(element) => Some(element),
            _ => None,
        }
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeInfo::Integer => write!(f, "integer"),
            TypeInfo::FloatingPoint => write!(f, "float"),
            TypeInfo::Boolean => write!(f, "boolean"),
            TypeInfo::Text => write!(f, "text"),
            TypeInfo::List(element) => write!(f, "list<{}>", element),
            TypeInfo::Member(kind) => write!(f, "member<{}>", kind.as_str()),
            TypeInfo::Generic => write!(f, "generic"),
        }
    }
}

/// Predicate over [`TypeInfo`] used when filtering resolution candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeFilter {
    All,
    Integer,
    FloatingPoint,
    Numeric,
    Boolean,
    Text,
    List,
    Member,
    Exact(TypeInfo),
}

impl TypeFilter {
    pub fn accepts(&self, ty: &TypeInfo) -> bool {
        match self {
            TypeFilter::All => true,
            TypeFilter::Integer => ty.is_integer(),
            TypeFilter::FloatingPoint => ty.is_floating_point(),
            TypeFilter::Numeric => ty.is_numeric(),
            TypeFilter::Boolean => ty.is_boolean(),
            TypeFilter::Text => ty.is_text(),
            TypeFilter::List => ty.is_list(),
            TypeFilter::Member => ty.is_member(),
            TypeFilter::Exact(expected) => expected == ty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_predicates() {
        assert!(TypeInfo::Integer.is_integer());
        assert!(TypeInfo::Integer.is_numeric());
        assert!(TypeInfo::Integer.is_primitive());
        assert!(TypeInfo::FloatingPoint.is_floating_point());
        assert!(TypeInfo::FloatingPoint.is_numeric());
        assert!(!TypeInfo::Text.is_numeric());
        assert!(TypeInfo::Boolean.is_boolean());
        assert!(TypeInfo::Member(MemberKind::Item).is_member());
        assert!(!TypeInfo::Generic.is_primitive());
    }

    #[test]
    fn test_list_types_derived_on_demand() {
        let ints = TypeInfo::list_of(TypeInfo::Integer);
        assert!(ints.is_list());
        assert_eq!(ints.element_type(), Some(&TypeInfo::Integer));
        assert_eq!(ints, TypeInfo::list_of(TypeInfo::Integer));
        assert_ne!(ints, TypeInfo::list_of(TypeInfo::Text));

        let nested = TypeInfo::list_of(TypeInfo::list_of(TypeInfo::Boolean));
        assert_eq!(
            nested.element_type(),
            Some(&TypeInfo::list_of(TypeInfo::Boolean))
        );
    }

    #[test]
    fn test_structural_equality() {
        assert_eq!(TypeInfo::Integer, TypeInfo::Integer);
        assert_ne!(TypeInfo::Integer, TypeInfo::FloatingPoint);
        assert_eq!(
            TypeInfo::Member(MemberKind::Item),
            TypeInfo::Member(MemberKind::Item)
        );
        assert_ne!(
            TypeInfo::Member(MemberKind::Item),
            TypeInfo::Member(MemberKind::Edge)
        );
    }

    #[test]
    fn test_type_filter() {
        assert!(TypeFilter::All.accepts(&TypeInfo::Generic));
        assert!(TypeFilter::Numeric.accepts(&TypeInfo::Integer));
        assert!(TypeFilter::Numeric.accepts(&TypeInfo::FloatingPoint));
        assert!(!TypeFilter::Numeric.accepts(&TypeInfo::Text));
        assert!(TypeFilter::List.accepts(&TypeInfo::list_of(TypeInfo::Integer)));
        assert!(TypeFilter::Exact(TypeInfo::Text).accepts(&TypeInfo::Text));
        assert!(!TypeFilter::Exact(TypeInfo::Text).accepts(&TypeInfo::Boolean));
    }

    #[test]
    fn test_display() {
        assert_eq!(TypeInfo::Integer.to_string(), "integer");
        assert_eq!(
            TypeInfo::list_of(TypeInfo::FloatingPoint).to_string(),
            "list<float>"
        );
        assert_eq!(
            TypeInfo::Member(MemberKind::Container).to_string(),
            "member<container>"
        );
    }
}
