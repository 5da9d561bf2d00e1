//! The signature data model.
//!
//! Type expressions form a closed vocabulary ([`TypeExpr`]) stored in a
//! [`TypeArena`] and addressed by [`TypeRef`]. Named records are declared
//! once and referenced by id, so a record used by several parameters is one
//! node referenced several times. Records may only mention earlier records,
//! which keeps the type graph acyclic.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::expr::ExprArena;
use crate::id::{ExprId, TypeRef};

/// Unconstrained primitive kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveKind {
    Int,
    Bool,
    Text,
    /// A type variable such as `T`; values are opaque to the constraint model.
    Generic(String),
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimitiveKind::Int => write!(f, "Int"),
            PrimitiveKind::Bool => write!(f, "Bool"),
            PrimitiveKind::Text => write!(f, "Text"),
            PrimitiveKind::Generic(name) => write!(f, "{name}"),
        }
    }
}

/// A record type: an ordered set of named fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordType {
    /// `None` for inline records written directly in a parameter's type.
    pub name: Option<String>,
    pub fields: IndexMap<String, TypeRef>,
}

/// The closed vocabulary of type expressions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeExpr {
    Primitive(PrimitiveKind),

    /// A natural number: an integer constrained to be `>= 0`.
    NonNegativeInt,

    /// An index strictly less than `bound` (and implicitly `>= 0`).
    BoundedIndex(ExprId),

    /// A sequence whose length is the symbolic expression `length`.
    SizedSequence { element: TypeRef, length: ExprId },

    /// Either absent or present with a value of the inner type.
    Optional(TypeRef),

    /// A value of `base` narrowed by a boolean predicate over `self`.
    Refinement { base: TypeRef, predicate: ExprId },

    Record(RecordType),
}

/// One arena entry: the type plus the verbatim text it was parsed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeNode {
    pub expr: TypeExpr,
    pub raw: String,
}

/// Arena of type nodes addressed by [`TypeRef`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeArena {
    nodes: Vec<TypeNode>,
}

impl TypeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, expr: TypeExpr, raw: impl Into<String>) -> TypeRef {
        let id = TypeRef(self.nodes.len() as u32);
        self.nodes.push(TypeNode {
            expr,
            raw: raw.into(),
        });
        id
    }

    /// # Panics
    /// If `id` was not issued by this arena.
    pub fn get(&self, id: TypeRef) -> &TypeExpr {
        &self.nodes[id.0 as usize].expr
    }

    /// Source text of a type node.
    pub fn raw(&self, id: TypeRef) -> &str {
        &self.nodes[id.0 as usize].raw
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeRef, &TypeNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (TypeRef(i as u32), node))
    }
}

/// Function visibility. Private functions get the emission profile's
/// private prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

/// Whether the function is declared total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Totality {
    #[default]
    Total,
    PossiblyPartial,
}

/// A named, typed function parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub ty: TypeRef,
}

/// A parsed function signature.
///
/// Immutable once built: every downstream artifact is recomputed from a
/// fresh `Signature` rather than patched in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub params: Vec<Parameter>,
    pub return_type: TypeRef,
    pub visibility: Visibility,
    pub totality: Totality,
    /// Named record declarations in source order.
    pub records: IndexMap<String, TypeRef>,
    pub types: TypeArena,
    pub exprs: ExprArena,
    /// The full text the signature was parsed from.
    pub source: String,
}

impl Signature {
    pub fn param(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn param_index(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p.name == name)
    }

    pub fn type_of(&self, ty: TypeRef) -> &TypeExpr {
        self.types.get(ty)
    }

    /// Renders a type back to a canonical textual form.
    pub fn render_type(&self, ty: TypeRef) -> String {
        match self.types.get(ty) {
            TypeExpr::Primitive(kind) => kind.to_string(),
            TypeExpr::NonNegativeInt => "NonNegativeInt".to_string(),
            TypeExpr::BoundedIndex(bound) => {
                format!("BoundedIndex({})", self.exprs.render(*bound))
            }
            TypeExpr::SizedSequence { element, length } => format!(
                "SizedSequence({}, {})",
                self.render_type(*element),
                self.exprs.render(*length)
            ),
            TypeExpr::Optional(inner) => format!("Optional({})", self.render_type(*inner)),
            TypeExpr::Refinement { base, predicate } => format!(
                "Refinement({}, {})",
                self.render_type(*base),
                self.exprs.render(*predicate)
            ),
            TypeExpr::Record(record) => match &record.name {
                Some(name) => name.clone(),
                None => {
                    let fields: Vec<String> = record
                        .fields
                        .iter()
                        .map(|(name, ty)| format!("{name}: {}", self.render_type(*ty)))
                        .collect();
                    format!("{{{}}}", fields.join(", "))
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{BinOp, ValueExpr};

    #[test]
    fn arena_keeps_raw_text() {
        let mut arena = TypeArena::new();
        let nat = arena.alloc(TypeExpr::NonNegativeInt, "Nat");
        assert_eq!(arena.get(nat), &TypeExpr::NonNegativeInt);
        assert_eq!(arena.raw(nat), "Nat");
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn render_type_is_canonical() {
        let mut types = TypeArena::new();
        let mut exprs = ExprArena::new();
        let n = exprs.intern(ValueExpr::Symbol("n".into()));
        let m = exprs.intern(ValueExpr::Symbol("m".into()));
        let len = exprs.binary(BinOp::Add, n, m);
        let elem = types.alloc(TypeExpr::Primitive(PrimitiveKind::Generic("T".into())), "T");
        let seq = types.alloc(
            TypeExpr::SizedSequence {
                element: elem,
                length: len,
            },
            "Vect (n+m) T",
        );
        let sig = Signature {
            name: "f".into(),
            params: vec![Parameter {
                name: "xs".into(),
                ty: seq,
            }],
            return_type: elem,
            visibility: Visibility::Public,
            totality: Totality::Total,
            records: IndexMap::new(),
            types,
            exprs,
            source: String::new(),
        };
        assert_eq!(sig.render_type(seq), "SizedSequence(T, n + m)");
        assert_eq!(sig.param_index("xs"), Some(0));
        assert!(sig.param("ys").is_none());
    }
}
