//! Value templates: the shape of a parameter's value, with every free
//! integer choice named by a generator variable.
//!
//! A template is instantiated from one integer per variable. Sequence
//! elements share their element variables, so all elements of a generated
//! sequence have the same shape.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use sigc_core::{PathStep, Place, PrimitiveKind, Signature, TypeExpr, TypeRef, ValueExpr};

use crate::eval::value::Value;
use crate::model::{ConstraintKind, ConstraintModel};

/// What a generator variable controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarRole {
    Int,
    Bool,
    /// Length of a sequence.
    Length,
    /// 1 when an optional value is present, 0 when absent.
    Presence,
    /// Length of a text value.
    TextLength,
}

/// One free integer choice of a generated input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenVar {
    pub name: String,
    pub role: VarRole,
    /// Values tried by the deterministic search, in order.
    pub domain: Vec<i64>,
    /// Inclusive sampling range for property runs.
    pub min: i64,
    pub max: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueTemplate {
    Int { var: String },
    Bool { var: String },
    Text { length: String },
    /// A value of a type variable: the element's position, counting from 1.
    Opaque,
    Seq {
        length: String,
        element: Box<ValueTemplate>,
    },
    Optional {
        presence: String,
        inner: Box<ValueTemplate>,
    },
    Record { fields: IndexMap<String, ValueTemplate> },
}

/// Integer assignment to generator variables.
pub type Assignment = IndexMap<String, i64>;

impl ValueTemplate {
    /// Builds a value, or `None` when the assignment is not an inhabitant
    /// (negative length, presence flag other than 0/1).
    pub fn instantiate(&self, assignment: &Assignment) -> Option<Value> {
        self.instantiate_at(assignment, 0)
    }

    fn instantiate_at(&self, assignment: &Assignment, position: usize) -> Option<Value> {
        let var = |name: &str| assignment.get(name).copied();
        Some(match self {
            ValueTemplate::Int { var: name } => Value::Int(var(name)?),
            ValueTemplate::Bool { var: name } => match var(name)? {
                0 => Value::Bool(false),
                1 => Value::Bool(true),
                _ => return None,
            },
            ValueTemplate::Text { length } => {
                let len = usize::try_from(var(length)?).ok()?;
                Value::Text((0..len).map(|i| (b'a' + (i % 26) as u8) as char).collect())
            }
            ValueTemplate::Opaque => Value::Int(position as i64 + 1),
            ValueTemplate::Seq { length, element } => {
                let len = usize::try_from(var(length)?).ok()?;
                let items = (0..len)
                    .map(|i| element.instantiate_at(assignment, i))
                    .collect::<Option<Vec<_>>>()?;
                Value::Seq(items)
            }
            ValueTemplate::Optional { presence, inner } => match var(presence)? {
                0 => Value::Absent,
                1 => Value::Present(Box::new(inner.instantiate_at(assignment, position)?)),
                _ => return None,
            },
            ValueTemplate::Record { fields } => {
                let mut record = IndexMap::new();
                for (name, template) in fields {
                    record.insert(name.clone(), template.instantiate_at(assignment, position)?);
                }
                Value::Record(record)
            }
        })
    }
}

/// Name of the variable holding an integer-like value at `place`.
pub fn value_var(place: &Place) -> String {
    place.to_string()
}

/// Name of the variable holding the length of the sequence at `place`.
pub fn length_var(place: &Place) -> String {
    format!("len({place})")
}

/// Name of the presence flag of the optional at `place`.
pub fn presence_var(place: &Place) -> String {
    format!("present({place})")
}

/// Templates and generator variables for a set of root values.
#[derive(Debug, Clone, Default)]
pub struct Templates {
    pub roots: IndexMap<String, ValueTemplate>,
    pub vars: Vec<GenVar>,
}

impl Templates {
    /// Templates for every parameter of a signature.
    pub fn for_params(sig: &Signature, model: &ConstraintModel) -> Self {
        let mut builder = Builder::new(sig, model);
        for param in &sig.params {
            let template = builder.template(param.ty, &Place::param(&param.name));
            builder.out.roots.insert(param.name.clone(), template);
        }
        builder.out
    }

    /// Templates for a value of a named record, bound as `self`.
    pub fn for_record(sig: &Signature, model: &ConstraintModel, record: &str) -> Self {
        let mut builder = Builder::new(sig, model);
        if let Some(ty) = sig.records.get(record) {
            let root = Place::root(sigc_core::Root::Record(record.to_string()));
            let template = builder.template(*ty, &root);
            builder.out.roots.insert("self".to_string(), template);
        }
        builder.out
    }

    pub fn var(&self, name: &str) -> Option<&GenVar> {
        self.vars.iter().find(|v| v.name == name)
    }

    /// Instantiates every root value.
    pub fn instantiate(&self, assignment: &Assignment) -> Option<IndexMap<String, Value>> {
        self.roots
            .iter()
            .map(|(name, template)| Some((name.clone(), template.instantiate(assignment)?)))
            .collect()
    }
}

struct Builder<'s> {
    sig: &'s Signature,
    int_domain: Vec<i64>,
    length_domain: Vec<i64>,
    out: Templates,
}

impl<'s> Builder<'s> {
    fn new(sig: &'s Signature, model: &ConstraintModel) -> Self {
        Builder {
            sig,
            int_domain: int_domain(model),
            length_domain: length_domain(model),
            out: Templates::default(),
        }
    }

    fn add_var(&mut self, name: String, role: VarRole) -> String {
        if self.out.var(&name).is_none() {
            let (domain, min, max) = match role {
                VarRole::Int => (self.int_domain.clone(), -3, 10),
                VarRole::Bool | VarRole::Presence => (vec![0, 1], 0, 1),
                VarRole::Length => {
                    let widest = self.length_domain.iter().copied().max().unwrap_or(0);
                    (self.length_domain.clone(), 0, widest.max(8))
                }
                VarRole::TextLength => ((0..=3).collect(), 0, 4),
            };
            self.out.vars.push(GenVar {
                name: name.clone(),
                role,
                domain,
                min,
                max,
            });
        }
        name
    }

    fn template(&mut self, ty: TypeRef, place: &Place) -> ValueTemplate {
        match self.sig.type_of(ty) {
            TypeExpr::Primitive(PrimitiveKind::Int)
            | TypeExpr::NonNegativeInt
            | TypeExpr::BoundedIndex(_) => ValueTemplate::Int {
                var: self.add_var(value_var(place), VarRole::Int),
            },
            TypeExpr::Primitive(PrimitiveKind::Bool) => ValueTemplate::Bool {
                var: self.add_var(value_var(place), VarRole::Bool),
            },
            TypeExpr::Primitive(PrimitiveKind::Text) => ValueTemplate::Text {
                length: self.add_var(length_var(place), VarRole::TextLength),
            },
            TypeExpr::Primitive(PrimitiveKind::Generic(_)) => ValueTemplate::Opaque,
            TypeExpr::SizedSequence { element, .. } => {
                let length = self.add_var(length_var(place), VarRole::Length);
                let element = self.template(*element, &place.child(PathStep::Element));
                ValueTemplate::Seq {
                    length,
                    element: Box::new(element),
                }
            }
            TypeExpr::Optional(inner) => {
                let presence = self.add_var(presence_var(place), VarRole::Presence);
                let inner = self.template(*inner, &place.child(PathStep::Present));
                ValueTemplate::Optional {
                    presence,
                    inner: Box::new(inner),
                }
            }
            TypeExpr::Refinement { base, .. } => self.template(*base, place),
            TypeExpr::Record(record) => {
                let mut fields = IndexMap::new();
                for (name, field_ty) in &record.fields {
                    let field_place = place.child(PathStep::Field(name.clone()));
                    fields.insert(name.clone(), self.template(*field_ty, &field_place));
                }
                ValueTemplate::Record { fields }
            }
        }
    }
}

/// Small integers first, then the literals the constraints mention and
/// their neighbours.
fn int_domain(model: &ConstraintModel) -> Vec<i64> {
    let mut domain = vec![0, 1, 2, -1, 3, 4, -2, 5];
    for constraint in &model.constraints {
        let Some(expr) = constraint.kind.expression() else {
            continue;
        };
        model.exprs.walk(expr, &mut |node| {
            if let ValueExpr::Int(k) = node {
                for candidate in [k.saturating_sub(1), *k, k.saturating_add(1)] {
                    if !domain.contains(&candidate) {
                        domain.push(candidate);
                    }
                }
            }
        });
    }
    domain
}

/// Short lengths first, then the literals that length constraints mention
/// and their nonnegative neighbours.
fn length_domain(model: &ConstraintModel) -> Vec<i64> {
    let mut domain: Vec<i64> = (0..=5).collect();
    for constraint in &model.constraints {
        let expr = match &constraint.kind {
            ConstraintKind::LengthEquals { length } => *length,
            ConstraintKind::LengthAtLeast { minimum } => *minimum,
            _ => continue,
        };
        model.exprs.walk(expr, &mut |node| {
            if let ValueExpr::Int(k) = node {
                for candidate in [k.saturating_sub(1), *k, k.saturating_add(1)] {
                    if candidate >= 0 && !domain.contains(&candidate) {
                        domain.push(candidate);
                    }
                }
            }
        });
    }
    domain
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract;
    use sigc_core::parse_signature;

    fn templates(source: &str) -> Templates {
        let sig = parse_signature(source).unwrap();
        let model = extract(&sig).unwrap();
        Templates::for_params(&sig, &model)
    }

    #[test]
    fn variables_follow_parameter_order() {
        let t = templates("f(n: Nat, xs: SizedSequence(Optional(Int), n), flag: Bool) -> Int");
        let names: Vec<&str> = t.vars.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["n", "len(xs)", "present(xs[*])", "xs[*]?", "flag"]);
    }

    #[test]
    fn instantiation_builds_nested_values() {
        let t = templates("f(xs: SizedSequence(T, n), o: Optional(Nat)) -> Int");
        let mut assignment = Assignment::new();
        assignment.insert("len(xs)".into(), 3);
        assignment.insert("present(o)".into(), 1);
        assignment.insert("o?".into(), 7);
        let values = t.instantiate(&assignment).unwrap();
        assert_eq!(values["xs"], Value::seq_of_ints([1, 2, 3]));
        assert_eq!(values["o"], Value::Present(Box::new(Value::Int(7))));
    }

    #[test]
    fn negative_length_is_not_an_inhabitant() {
        let t = templates("f(xs: SizedSequence(T, n)) -> Int");
        let mut assignment = Assignment::new();
        assignment.insert("len(xs)".into(), -1);
        assert!(t.instantiate(&assignment).is_none());
    }

    #[test]
    fn constraint_literals_extend_int_domain() {
        let t = templates("f(x: Refinement(Int, self < 10)) -> Int");
        let domain = &t.var("x").unwrap().domain;
        assert!(domain.contains(&9) && domain.contains(&10) && domain.contains(&11));
        assert_eq!(&domain[..3], &[0, 1, 2]);
    }

    #[test]
    fn length_literals_extend_length_domain() {
        let t = templates("f(xs: SizedSequence(Int, 10)) -> Int");
        let len = t.var("len(xs)").unwrap();
        assert_eq!(&len.domain[..6], &[0, 1, 2, 3, 4, 5]);
        assert!(len.domain.contains(&9) && len.domain.contains(&10) && len.domain.contains(&11));
        assert!(len.max >= 11);

        let short = templates("f(xs: SizedSequence(Int, 2)) -> Int");
        let len = short.var("len(xs)").unwrap();
        assert_eq!(len.domain, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!((len.min, len.max), (0, 8));
    }
}
