//! The constraint model: extracted constraints plus the arithmetic relation
//! graph that orders their runtime checks.
//!
//! A [`ConstraintModel`] is produced once per signature and never mutated
//! afterwards. Constraint ids are assigned in extraction order (parameters
//! left to right, then the return type, then named records), which makes the
//! model a deterministic function of the signature text.

use std::collections::BTreeSet;
use std::fmt;

use indexmap::IndexMap;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use sigc_core::{ConstraintId, ExprArena, ExprId, Place, TypeRef};

/// What a constraint requires of its subject(s).
///
/// All expressions are fully resolved: parameter and field references are
/// [`Place`](sigc_core::Place)s and implicit length variables have been
/// replaced by the value that binds them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintKind {
    /// `subject >= 0`.
    Nonnegative,
    /// `0 <= subject < bound`.
    IndexBound { bound: ExprId },
    /// `len(subject) == length` for every subject.
    LengthEquals { length: ExprId },
    /// `len(subject) >= minimum`. Produced when a length expression has a
    /// variable the caller does not fix.
    LengthAtLeast { minimum: ExprId },
    /// `predicate` holds, with `self` already replaced by the subject.
    PredicateHolds { predicate: ExprId },
    /// The subject is either absent or present. Constraints on the present
    /// payload name this constraint as their `parent`.
    Disjoint,
}

impl ConstraintKind {
    /// Kind name used in messages and reports.
    pub fn label(&self) -> &'static str {
        match self {
            ConstraintKind::Nonnegative => "Nonnegative",
            ConstraintKind::IndexBound { .. } => "IndexBound",
            ConstraintKind::LengthEquals { .. } => "LengthEquals",
            ConstraintKind::LengthAtLeast { .. } => "LengthAtLeast",
            ConstraintKind::PredicateHolds { .. } => "PredicateHolds",
            ConstraintKind::Disjoint => "Disjoint",
        }
    }

    /// The expression the constraint compares against, if any.
    pub fn expression(&self) -> Option<ExprId> {
        match self {
            ConstraintKind::IndexBound { bound } => Some(*bound),
            ConstraintKind::LengthEquals { length } => Some(*length),
            ConstraintKind::LengthAtLeast { minimum } => Some(*minimum),
            ConstraintKind::PredicateHolds { predicate } => Some(*predicate),
            ConstraintKind::Nonnegative | ConstraintKind::Disjoint => None,
        }
    }
}

/// Where a constraint is attached.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    Parameter(String),
    Return,
    /// A merged constraint shared by several parameters.
    CrossParameter(Vec<String>),
    /// An invariant of a named record, checked on construction.
    Record(String),
}

impl Scope {
    pub fn is_precondition(&self) -> bool {
        matches!(self, Scope::Parameter(_) | Scope::CrossParameter(_))
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Parameter(name) => write!(f, "parameter {name}"),
            Scope::Return => write!(f, "return"),
            Scope::CrossParameter(names) => write!(f, "parameters {}", names.join(", ")),
            Scope::Record(name) => write!(f, "record {name}"),
        }
    }
}

/// One extracted value-level fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub id: ConstraintId,
    pub kind: ConstraintKind,
    pub scope: Scope,
    /// The constrained values. More than one only for merged constraints.
    pub subjects: SmallVec<[Place; 2]>,
    /// The enclosing `Disjoint` when the subject sits inside an optional.
    pub parent: Option<ConstraintId>,
    /// The expression as written, with names resolved but implicit length
    /// variables kept. Used for messages.
    pub declared: Option<ExprId>,
    /// The type node the constraint was extracted from.
    pub origin: TypeRef,
}

impl Constraint {
    /// The first (for unmerged constraints, the only) subject.
    pub fn subject(&self) -> &Place {
        &self.subjects[0]
    }
}

/// How an implicit length variable obtains its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BindingKind {
    /// The whole declared length of a sequence: `xs: SizedSequence(T, n)`.
    Binder,
    /// One `+` term of an additive length: `xs: SizedSequence(T, n + m)`
    /// derives `m := len(xs) - n`.
    Derived,
}

/// The value of an implicit length variable in terms of parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LengthBinding {
    pub kind: BindingKind,
    /// The sequence whose length fixes the variable.
    pub source: Place,
    pub value: ExprId,
}

/// What extraction concluded for one visited type node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Disposition {
    /// The type carries no value-level fact (e.g. a plain `Int`).
    Unconstrained,
    /// The node binds an implicit length variable and cannot check itself.
    Binder { variable: String },
    /// The length mentions variables nobody fixes; nothing is checkable.
    Existential { variables: Vec<String> },
    Constrained(Vec<ConstraintId>),
}

/// Per-node record of extraction, so "no constraints" is an inspectable
/// outcome rather than an absence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionNote {
    pub subject: Place,
    pub origin: TypeRef,
    pub disposition: Disposition,
}

/// Node weight of the relation graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RelationNode {
    Value(Place),
    Constraint(ConstraintId),
}

/// Edge weight of the relation graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationEdge {
    /// constraint -> value it restricts
    Constrains,
    /// value -> constraint whose expression reads it
    ReferencedBy,
    /// parent `Disjoint` -> constraint on the present payload
    Encloses,
}

/// All constraints of one signature plus their dependency structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintModel {
    pub function: String,
    pub constraints: Vec<Constraint>,
    /// The signature's expression arena extended with resolved expressions.
    pub exprs: ExprArena,
    pub bindings: IndexMap<String, LengthBinding>,
    pub notes: Vec<ExtractionNote>,
    pub relations: DiGraph<RelationNode, RelationEdge>,
    /// Constraint ids in check order: every constraint comes after the
    /// constraints establishing the values it reads.
    pub order: Vec<ConstraintId>,
}

impl ConstraintModel {
    pub fn get(&self, id: ConstraintId) -> Option<&Constraint> {
        self.constraints.iter().find(|c| c.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Constraints of a given scope class, in check order.
    pub fn ordered(&self, mut keep: impl FnMut(&Constraint) -> bool) -> Vec<&Constraint> {
        self.order
            .iter()
            .filter_map(|id| self.get(*id))
            .filter(|c| keep(c))
            .collect()
    }

    pub fn preconditions(&self) -> Vec<&Constraint> {
        self.ordered(|c| c.scope.is_precondition())
    }

    pub fn postconditions(&self) -> Vec<&Constraint> {
        self.ordered(|c| c.scope == Scope::Return)
    }

    /// Invariants grouped by record name, records in declaration order.
    pub fn invariants(&self) -> IndexMap<String, Vec<&Constraint>> {
        let mut grouped: IndexMap<String, Vec<&Constraint>> = IndexMap::new();
        for constraint in self.ordered(|c| matches!(c.scope, Scope::Record(_))) {
            if let Scope::Record(name) = &constraint.scope {
                grouped.entry(name.clone()).or_default().push(constraint);
            }
        }
        grouped
    }

    /// Direct children of a `Disjoint` constraint, in check order.
    pub fn children(&self, parent: ConstraintId) -> Vec<&Constraint> {
        self.ordered(|c| c.parent == Some(parent))
    }

    /// Renders a resolved expression in source syntax.
    pub fn render(&self, expr: ExprId) -> String {
        self.exprs.render(expr)
    }

    /// Places read by a constraint's expression.
    pub fn referenced_places(&self, constraint: &Constraint) -> Vec<Place> {
        constraint
            .kind
            .expression()
            .map(|expr| self.exprs.places(expr))
            .unwrap_or_default()
    }
}

/// Builds the relation graph for a set of constraints.
pub(crate) fn build_relations(
    constraints: &[Constraint],
    exprs: &ExprArena,
) -> DiGraph<RelationNode, RelationEdge> {
    let mut graph = DiGraph::new();
    let mut values: IndexMap<Place, NodeIndex> = IndexMap::new();
    let mut nodes: IndexMap<ConstraintId, NodeIndex> = IndexMap::new();

    let mut value_node = |graph: &mut DiGraph<RelationNode, RelationEdge>, place: &Place| {
        *values
            .entry(place.clone())
            .or_insert_with(|| graph.add_node(RelationNode::Value(place.clone())))
    };

    for constraint in constraints {
        let node = graph.add_node(RelationNode::Constraint(constraint.id));
        nodes.insert(constraint.id, node);
        for subject in &constraint.subjects {
            let value = value_node(&mut graph, subject);
            graph.add_edge(node, value, RelationEdge::Constrains);
        }
        if let Some(expr) = constraint.kind.expression() {
            for place in exprs.places(expr) {
                let value = value_node(&mut graph, &place);
                graph.add_edge(value, node, RelationEdge::ReferencedBy);
            }
        }
    }
    for constraint in constraints {
        if let (Some(parent), Some(child)) = (
            constraint.parent.and_then(|p| nodes.get(&p)),
            nodes.get(&constraint.id),
        ) {
            graph.add_edge(*parent, *child, RelationEdge::Encloses);
        }
    }
    graph
}

fn related(a: &Place, b: &Place) -> bool {
    let prefix = |short: &Place, long: &Place| {
        short.root == long.root
            && short.path.len() <= long.path.len()
            && long.path[..short.path.len()] == short.path[..]
    };
    prefix(a, b) || prefix(b, a)
}

/// Topological check order over the relation graph.
///
/// `a` must precede `b` when `a` constrains a value that `b` reads, or when
/// `a` is `b`'s enclosing `Disjoint`. Ties resolve to the smaller id. If the
/// dependencies are cyclic the remaining constraints fall back to id order.
pub(crate) fn check_order(graph: &DiGraph<RelationNode, RelationEdge>) -> Vec<ConstraintId> {
    let constraint_nodes: Vec<(ConstraintId, NodeIndex)> = graph
        .node_indices()
        .filter_map(|idx| match &graph[idx] {
            RelationNode::Constraint(id) => Some((*id, idx)),
            RelationNode::Value(_) => None,
        })
        .collect();

    let constrained = |idx: NodeIndex| -> Vec<&Place> {
        graph
            .edges_directed(idx, Direction::Outgoing)
            .filter(|e| *e.weight() == RelationEdge::Constrains)
            .filter_map(|e| match &graph[e.target()] {
                RelationNode::Value(place) => Some(place),
                RelationNode::Constraint(_) => None,
            })
            .collect()
    };
    let reads = |idx: NodeIndex| -> Vec<&Place> {
        graph
            .edges_directed(idx, Direction::Incoming)
            .filter(|e| *e.weight() == RelationEdge::ReferencedBy)
            .filter_map(|e| match &graph[e.source()] {
                RelationNode::Value(place) => Some(place),
                RelationNode::Constraint(_) => None,
            })
            .collect()
    };

    // dependencies[b] = set of constraints that must run before b
    let mut dependencies: IndexMap<ConstraintId, BTreeSet<ConstraintId>> = IndexMap::new();
    for (b, b_idx) in &constraint_nodes {
        let mut before = BTreeSet::new();
        let b_reads = reads(*b_idx);
        for (a, a_idx) in &constraint_nodes {
            if a == b {
                continue;
            }
            let encloses = graph
                .edges_connecting(*a_idx, *b_idx)
                .any(|e| *e.weight() == RelationEdge::Encloses);
            let establishes = constrained(*a_idx)
                .iter()
                .any(|subject| b_reads.iter().any(|read| related(subject, read)));
            if encloses || establishes {
                before.insert(*a);
            }
        }
        dependencies.insert(*b, before);
    }

    let mut order = Vec::with_capacity(dependencies.len());
    let mut remaining: BTreeSet<ConstraintId> = dependencies.keys().copied().collect();
    while !remaining.is_empty() {
        let ready = remaining.iter().copied().find(|id| {
            dependencies
                .get(id)
                .map(|deps| deps.iter().all(|d| !remaining.contains(d)))
                .unwrap_or(true)
        });
        match ready {
            Some(id) => {
                remaining.remove(&id);
                order.push(id);
            }
            None => {
                tracing::warn!(
                    cycle = ?remaining,
                    "cyclic constraint dependencies, falling back to id order"
                );
                order.extend(remaining.iter().copied());
                break;
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigc_core::{BinOp, PathStep, ValueExpr};

    fn constraint(id: u32, kind: ConstraintKind, subject: Place) -> Constraint {
        Constraint {
            id: ConstraintId(id),
            kind,
            scope: Scope::Parameter(subject.root.name().to_string()),
            subjects: smallvec::smallvec![subject],
            parent: None,
            declared: None,
            origin: TypeRef(0),
        }
    }

    #[test]
    fn readers_run_after_the_constraint_that_establishes_their_input() {
        let mut exprs = ExprArena::new();
        let n = exprs.place(Place::param("n"));
        // C1 reads n but was extracted first; C2 establishes n.
        let constraints = vec![
            constraint(1, ConstraintKind::LengthAtLeast { minimum: n }, Place::param("xs")),
            constraint(2, ConstraintKind::Nonnegative, Place::param("n")),
        ];
        let graph = build_relations(&constraints, &exprs);
        assert_eq!(check_order(&graph), vec![ConstraintId(2), ConstraintId(1)]);
    }

    #[test]
    fn field_subjects_relate_to_whole_record_reads() {
        let mut exprs = ExprArena::new();
        let rows = exprs.place(Place::param("m").child(PathStep::Field("rows".into())));
        let constraints = vec![
            constraint(1, ConstraintKind::LengthEquals { length: rows }, Place::param("xs")),
            constraint(
                2,
                ConstraintKind::Nonnegative,
                Place::param("m").child(PathStep::Field("rows".into())),
            ),
        ];
        let graph = build_relations(&constraints, &exprs);
        assert_eq!(check_order(&graph), vec![ConstraintId(2), ConstraintId(1)]);
    }

    #[test]
    fn cycles_fall_back_to_id_order() {
        let mut exprs = ExprArena::new();
        let xs = exprs.place(Place::param("xs"));
        let ys = exprs.place(Place::param("ys"));
        let len_xs = exprs.len_of(xs);
        let len_ys = exprs.len_of(ys);
        let constraints = vec![
            constraint(1, ConstraintKind::LengthEquals { length: len_ys }, Place::param("xs")),
            constraint(2, ConstraintKind::LengthEquals { length: len_xs }, Place::param("ys")),
        ];
        let graph = build_relations(&constraints, &exprs);
        assert_eq!(check_order(&graph), vec![ConstraintId(1), ConstraintId(2)]);
    }

    #[test]
    fn independent_constraints_keep_extraction_order() {
        let mut exprs = ExprArena::new();
        let one = exprs.int(1);
        let sum = exprs.binary(BinOp::Add, one, one);
        assert!(matches!(exprs.get(sum), ValueExpr::Binary(..)));
        let constraints = vec![
            constraint(1, ConstraintKind::Nonnegative, Place::param("a")),
            constraint(2, ConstraintKind::LengthAtLeast { minimum: sum }, Place::param("b")),
        ];
        let graph = build_relations(&constraints, &exprs);
        assert_eq!(check_order(&graph), vec![ConstraintId(1), ConstraintId(2)]);
        assert_eq!(graph.node_count(), 4);
    }
}
