//! Constraint extraction: walk a [`Signature`]'s types and produce a
//! [`ConstraintModel`].
//!
//! Extraction runs in three passes over the parameters:
//!
//! 1. **Binders**: a parameter-level sequence whose whole length is an
//!    unknown symbol binds it (`xs: SizedSequence(T, n)` gives `n = len(xs)`).
//! 2. **Derivations**: a parameter-level sequence whose additive length has
//!    exactly one unknown symbol derives it (`n + m` gives `m = len(xs) - n`).
//! 3. **Constraints**: every type node of every parameter, the return type
//!    and each named record is destructured into constraints.
//!
//! Symbols resolve to sibling record fields first, then parameters, then
//! `result` (return type only), then implicit length variables.

mod length;

use std::convert::Infallible;

use indexmap::IndexMap;
use smallvec::{smallvec, SmallVec};
use tracing::debug;

use sigc_core::{
    ConstraintId, ExprArena, ExprId, PathStep, Place, Root, Signature, SignatureError, TypeExpr,
    TypeRef, ValueExpr,
};

use crate::model::{
    build_relations, check_order, BindingKind, Constraint, ConstraintKind, ConstraintModel,
    Disposition, ExtractionNote, LengthBinding, Scope,
};

use length::{is_lone_positive_term, solve_for};

/// Extracts the constraint model of a signature.
///
/// Fails with [`SignatureError::UnresolvedBound`] when a bound, length or
/// predicate mentions a symbol that nothing can supply.
pub fn extract(sig: &Signature) -> Result<ConstraintModel, SignatureError> {
    let mut extractor = Extractor::new(sig);

    extractor.collect_bindings()?;

    for param in &sig.params {
        let frame = Frame::new(
            Scope::Parameter(param.name.clone()),
            format!("parameter {}", param.name),
        );
        extractor.walk(param.ty, Place::param(&param.name), &frame)?;
    }
    extractor.merge_shared_lengths();

    let frame = Frame::new(Scope::Return, "return type".to_string()).with_result();
    extractor.walk(sig.return_type, Place::root(Root::Result), &frame)?;

    for (name, ty) in &sig.records {
        extractor.record_invariants(name, *ty)?;
    }

    Ok(extractor.finish())
}

/// A constraint before ids are assigned. `parent` indexes `drafts`.
#[derive(Debug, Clone)]
struct Draft {
    kind: ConstraintKind,
    scope: Scope,
    subjects: SmallVec<[Place; 2]>,
    parent: Option<usize>,
    declared: Option<ExprId>,
    origin: TypeRef,
}

#[derive(Debug, Clone)]
enum NoteDraft {
    Unconstrained,
    Binder(String),
    Existential(Vec<String>),
    Constrained(Vec<usize>),
}

/// Resolution context for one position in the type tree.
#[derive(Debug, Clone)]
struct Frame {
    scope: Scope,
    /// Human-readable position for error messages.
    context: String,
    /// Enclosing records, innermost last: (record place, field names).
    records: Vec<(Place, Vec<String>)>,
    parent: Option<usize>,
    params_visible: bool,
    result_visible: bool,
}

impl Frame {
    fn new(scope: Scope, context: String) -> Self {
        Frame {
            scope,
            context,
            records: Vec::new(),
            parent: None,
            params_visible: true,
            result_visible: false,
        }
    }

    fn with_result(mut self) -> Self {
        self.result_visible = true;
        self
    }
}

struct Extractor<'s> {
    sig: &'s Signature,
    exprs: ExprArena,
    bindings: IndexMap<String, LengthBinding>,
    drafts: Vec<Option<Draft>>,
    notes: Vec<(Place, TypeRef, NoteDraft)>,
}

impl<'s> Extractor<'s> {
    fn new(sig: &'s Signature) -> Self {
        Extractor {
            sig,
            exprs: sig.exprs.clone(),
            bindings: IndexMap::new(),
            drafts: Vec::new(),
            notes: Vec::new(),
        }
    }

    // Name resolution

    fn resolve(&mut self, expr: ExprId, frame: &Frame, subject: &Place) -> ExprId {
        let sig = self.sig;
        let rewritten: Result<ExprId, Infallible> =
            self.exprs.rewrite(expr, &mut |arena, node| {
                Ok(match node {
                    ValueExpr::Symbol(name) => Some(arena.intern(lookup(sig, frame, name))),
                    ValueExpr::SelfRef => Some(arena.place(subject.clone())),
                    _ => None,
                })
            });
        match rewritten {
            Ok(id) => id,
            Err(never) => match never {},
        }
    }

    /// Replaces implicit variables by their bindings. Variables in `open`
    /// become 0 instead.
    fn substitute(&mut self, expr: ExprId, open: &[String]) -> ExprId {
        let bindings = &self.bindings;
        let rewritten: Result<ExprId, Infallible> =
            self.exprs.rewrite(expr, &mut |arena, node| {
                Ok(match node {
                    ValueExpr::Implicit(name) if open.contains(name) => Some(arena.int(0)),
                    ValueExpr::Implicit(name) => bindings.get(name).map(|b| b.value),
                    _ => None,
                })
            });
        let substituted = match rewritten {
            Ok(id) => id,
            Err(never) => match never {},
        };
        self.exprs.simplify(substituted)
    }

    /// Fails if a resolved expression still contains something no binding
    /// can supply: an unbound implicit, or field access on one.
    fn require_closed(
        &self,
        resolved: ExprId,
        frame: &Frame,
        origin: TypeRef,
    ) -> Result<(), SignatureError> {
        let mut dangling: Option<String> = None;
        self.exprs.walk(resolved, &mut |node| {
            if dangling.is_some() {
                return;
            }
            match node {
                ValueExpr::Implicit(name) if !self.bindings.contains_key(name) => {
                    dangling = Some(name.clone());
                }
                ValueExpr::Field(base, field) => {
                    dangling = Some(format!("{}.{field}", self.exprs.render(*base)));
                }
                _ => {}
            }
        });
        match dangling {
            Some(symbol) => Err(self.unresolved(symbol, frame, origin)),
            None => Ok(()),
        }
    }

    fn unresolved(&self, symbol: String, frame: &Frame, origin: TypeRef) -> SignatureError {
        SignatureError::UnresolvedBound {
            symbol,
            context: frame.context.clone(),
            expression: self.sig.types.raw(origin).to_string(),
        }
    }

    // Pass 1 and 2

    /// Sequences reachable from a parameter through record fields only.
    fn parameter_level_sequences(&self) -> Vec<(Place, ExprId, TypeRef, Frame)> {
        let mut found = Vec::new();
        for param in &self.sig.params {
            let frame = Frame::new(
                Scope::Parameter(param.name.clone()),
                format!("parameter {}", param.name),
            );
            self.find_sequences(param.ty, Place::param(&param.name), frame, &mut found);
        }
        found
    }

    fn find_sequences(
        &self,
        ty: TypeRef,
        place: Place,
        frame: Frame,
        out: &mut Vec<(Place, ExprId, TypeRef, Frame)>,
    ) {
        match self.sig.type_of(ty) {
            TypeExpr::SizedSequence { length, .. } => out.push((place, *length, ty, frame)),
            TypeExpr::Refinement { base, .. } => self.find_sequences(*base, place, frame, out),
            TypeExpr::Record(record) => {
                let mut inner = frame.clone();
                inner
                    .records
                    .push((place.clone(), record.fields.keys().cloned().collect()));
                for (name, field_ty) in &record.fields {
                    let field_place = place.child(PathStep::Field(name.clone()));
                    self.find_sequences(*field_ty, field_place, inner.clone(), out);
                }
            }
            _ => {}
        }
    }

    fn collect_bindings(&mut self) -> Result<(), SignatureError> {
        let sequences = self.parameter_level_sequences();
        let mut resolved = Vec::with_capacity(sequences.len());
        for (place, length, _, frame) in &sequences {
            resolved.push((place.clone(), self.resolve(*length, frame, place)));
        }

        for (place, length) in &resolved {
            if let ValueExpr::Implicit(name) = self.exprs.get(*length).clone() {
                if !self.bindings.contains_key(&name) {
                    let source = self.exprs.place(place.clone());
                    let value = self.exprs.len_of(source);
                    debug!(variable = %name, source = %place, "length variable bound");
                    self.bindings.insert(
                        name,
                        LengthBinding {
                            kind: BindingKind::Binder,
                            source: place.clone(),
                            value,
                        },
                    );
                }
            }
        }

        for (place, length) in &resolved {
            let unbound: Vec<String> = self
                .exprs
                .implicits(*length)
                .into_iter()
                .filter(|name| !self.bindings.contains_key(name))
                .collect();
            let [name] = unbound.as_slice() else {
                continue;
            };
            if !is_lone_positive_term(&mut self.exprs, *length, name) {
                continue;
            }
            let source = self.exprs.place(place.clone());
            let len_expr = self.exprs.len_of(source);
            let solved = solve_for(&mut self.exprs, *length, name, len_expr);
            let value = self.substitute(solved, &[]);
            debug!(variable = %name, source = %place, value = %self.exprs.render(value), "length variable derived");
            self.bindings.insert(
                name.clone(),
                LengthBinding {
                    kind: BindingKind::Derived,
                    source: place.clone(),
                    value,
                },
            );
        }
        Ok(())
    }

    // Pass 3

    fn push(&mut self, draft: Draft) -> usize {
        debug!(
            kind = draft.kind.label(),
            subject = %draft.subjects[0],
            scope = %draft.scope,
            "constraint extracted"
        );
        self.drafts.push(Some(draft));
        self.drafts.len() - 1
    }

    fn draft(
        &self,
        kind: ConstraintKind,
        place: &Place,
        frame: &Frame,
        declared: Option<ExprId>,
        origin: TypeRef,
    ) -> Draft {
        Draft {
            kind,
            scope: frame.scope.clone(),
            subjects: smallvec![place.clone()],
            parent: frame.parent,
            declared,
            origin,
        }
    }

    fn note(&mut self, place: &Place, origin: TypeRef, note: NoteDraft) {
        self.notes.push((place.clone(), origin, note));
    }

    fn walk(&mut self, ty: TypeRef, place: Place, frame: &Frame) -> Result<(), SignatureError> {
        match self.sig.type_of(ty).clone() {
            TypeExpr::Primitive(_) => self.note(&place, ty, NoteDraft::Unconstrained),

            TypeExpr::NonNegativeInt => {
                let draft = self.draft(ConstraintKind::Nonnegative, &place, frame, None, ty);
                let idx = self.push(draft);
                self.note(&place, ty, NoteDraft::Constrained(vec![idx]));
            }

            TypeExpr::BoundedIndex(bound) => {
                let declared = self.resolve(bound, frame, &place);
                self.require_closed(declared, frame, ty)?;
                let bound = self.substitute(declared, &[]);
                let draft = self.draft(
                    ConstraintKind::IndexBound { bound },
                    &place,
                    frame,
                    Some(declared),
                    ty,
                );
                let idx = self.push(draft);
                self.note(&place, ty, NoteDraft::Constrained(vec![idx]));
            }

            TypeExpr::SizedSequence { element, length } => {
                self.sequence_length(length, &place, frame, ty)?;
                self.walk(element, place.child(PathStep::Element), frame)?;
            }

            TypeExpr::Optional(inner) => {
                let draft = self.draft(ConstraintKind::Disjoint, &place, frame, None, ty);
                let idx = self.push(draft);
                self.note(&place, ty, NoteDraft::Constrained(vec![idx]));
                let mut inner_frame = frame.clone();
                inner_frame.parent = Some(idx);
                self.walk(inner, place.child(PathStep::Present), &inner_frame)?;
            }

            TypeExpr::Refinement { base, predicate } => {
                self.walk(base, place.clone(), frame)?;
                let declared = self.resolve(predicate, frame, &place);
                self.require_closed(declared, frame, ty)?;
                let predicate = self.substitute(declared, &[]);
                let draft = self.draft(
                    ConstraintKind::PredicateHolds { predicate },
                    &place,
                    frame,
                    Some(declared),
                    ty,
                );
                let idx = self.push(draft);
                self.note(&place, ty, NoteDraft::Constrained(vec![idx]));
            }

            TypeExpr::Record(record) => {
                self.note(&place, ty, NoteDraft::Unconstrained);
                let mut inner = frame.clone();
                inner
                    .records
                    .push((place.clone(), record.fields.keys().cloned().collect()));
                for (name, field_ty) in &record.fields {
                    self.walk(*field_ty, place.child(PathStep::Field(name.clone())), &inner)?;
                }
            }
        }
        Ok(())
    }

    fn sequence_length(
        &mut self,
        length: ExprId,
        place: &Place,
        frame: &Frame,
        origin: TypeRef,
    ) -> Result<(), SignatureError> {
        let declared = self.resolve(length, frame, place);

        if let ValueExpr::Implicit(name) = self.exprs.get(declared) {
            let binds_here = self
                .bindings
                .get(name)
                .is_some_and(|b| b.kind == BindingKind::Binder && &b.source == place);
            if binds_here {
                let name = name.clone();
                self.note(place, origin, NoteDraft::Binder(name));
                return Ok(());
            }
        }

        let mut open = Vec::new();
        for name in self.exprs.implicits(declared) {
            let self_derived = self
                .bindings
                .get(&name)
                .is_some_and(|b| &b.source == place);
            if self_derived || !self.bindings.contains_key(&name) {
                open.push(name);
            }
        }

        if open.is_empty() {
            self.require_closed(declared, frame, origin)?;
            let length = self.substitute(declared, &[]);
            let draft = self.draft(
                ConstraintKind::LengthEquals { length },
                place,
                frame,
                Some(declared),
                origin,
            );
            let idx = self.push(draft);
            self.note(place, origin, NoteDraft::Constrained(vec![idx]));
            return Ok(());
        }

        for name in &open {
            if !is_lone_positive_term(&mut self.exprs, declared, name) {
                return Err(self.unresolved(name.clone(), frame, origin));
            }
        }
        let minimum = self.substitute(declared, &open);
        self.require_closed(minimum, frame, origin)?;
        if matches!(self.exprs.get(minimum), ValueExpr::Int(k) if *k <= 0) {
            self.note(place, origin, NoteDraft::Existential(open));
            return Ok(());
        }
        let draft = self.draft(
            ConstraintKind::LengthAtLeast { minimum },
            place,
            frame,
            Some(declared),
            origin,
        );
        let idx = self.push(draft);
        self.note(place, origin, NoteDraft::Constrained(vec![idx]));
        Ok(())
    }

    fn record_invariants(&mut self, name: &str, ty: TypeRef) -> Result<(), SignatureError> {
        // Record declarations stand alone: no parameters, no function-level
        // length bindings.
        let saved = std::mem::take(&mut self.bindings);
        let mut frame = Frame::new(Scope::Record(name.to_string()), format!("record {name}"));
        frame.params_visible = false;
        let result = self.walk(ty, Place::root(Root::Record(name.to_string())), &frame);
        self.bindings = saved;
        result
    }

    /// Merges top-level `LengthEquals` constraints of different parameters
    /// whose length expressions are the same node. When that node is the
    /// length of the sequence that binds the shared variable, the binder
    /// joins the merged constraint as its first subject.
    fn merge_shared_lengths(&mut self) {
        let mut groups: IndexMap<ExprId, Vec<usize>> = IndexMap::new();
        for (idx, draft) in self.drafts.iter().enumerate() {
            let Some(draft) = draft else { continue };
            if let (ConstraintKind::LengthEquals { length }, Scope::Parameter(_), None) =
                (&draft.kind, &draft.scope, draft.parent)
            {
                if draft.subjects[0].is_singular() {
                    groups.entry(*length).or_default().push(idx);
                }
            }
        }

        for (length, members) in groups {
            let mut roots: Vec<String> = Vec::new();
            let mut merged: Vec<usize> = Vec::new();
            let binder = self.binder_measured_by(length);
            if let Some(place) = &binder {
                roots.push(place.root.name().to_string());
            }
            for idx in &members {
                if let Some(Some(draft)) = self.drafts.get(*idx) {
                    let root = draft.subjects[0].root.name().to_string();
                    if !roots.contains(&root) {
                        roots.push(root);
                        merged.push(*idx);
                    }
                }
            }
            if roots.len() < 2 {
                continue;
            }
            let keep = merged[0];
            let mut subjects: SmallVec<[Place; 2]> = binder.into_iter().collect();
            for idx in &merged {
                if let Some(Some(draft)) = self.drafts.get(*idx) {
                    subjects.push(draft.subjects[0].clone());
                }
            }
            for idx in &merged[1..] {
                self.drafts[*idx] = None;
                for (_, _, note) in self.notes.iter_mut() {
                    if let NoteDraft::Constrained(ids) = note {
                        for id in ids.iter_mut() {
                            if id == idx {
                                *id = keep;
                            }
                        }
                    }
                }
            }
            if let Some(Some(draft)) = self.drafts.get_mut(keep) {
                debug!(parameters = ?roots, "shared length merged");
                draft.subjects = subjects;
                draft.scope = Scope::CrossParameter(roots);
            }
        }
    }

    /// The binding sequence whose length `length` is, if any.
    fn binder_measured_by(&self, length: ExprId) -> Option<Place> {
        let ValueExpr::Len(inner) = self.exprs.get(length) else {
            return None;
        };
        let ValueExpr::Place(place) = self.exprs.get(*inner) else {
            return None;
        };
        let binds = self.bindings.values().any(|b| {
            b.kind == BindingKind::Binder && &b.source == place
        });
        (binds && place.is_singular() && matches!(place.root, Root::Param(_)))
            .then(|| place.clone())
    }

    fn finish(self) -> ConstraintModel {
        let mut ids: Vec<Option<ConstraintId>> = vec![None; self.drafts.len()];
        let mut next = 1;
        for (idx, draft) in self.drafts.iter().enumerate() {
            if draft.is_some() {
                ids[idx] = Some(ConstraintId(next));
                next += 1;
            }
        }
        let id_of = |idx: usize| ids.get(idx).copied().flatten();

        let constraints: Vec<Constraint> = self
            .drafts
            .into_iter()
            .enumerate()
            .filter_map(|(idx, draft)| {
                let draft = draft?;
                Some(Constraint {
                    id: id_of(idx)?,
                    kind: draft.kind,
                    scope: draft.scope,
                    subjects: draft.subjects,
                    parent: draft.parent.and_then(id_of),
                    declared: draft.declared,
                    origin: draft.origin,
                })
            })
            .collect();

        let notes = self
            .notes
            .into_iter()
            .map(|(subject, origin, note)| ExtractionNote {
                subject,
                origin,
                disposition: match note {
                    NoteDraft::Unconstrained => Disposition::Unconstrained,
                    NoteDraft::Binder(variable) => Disposition::Binder { variable },
                    NoteDraft::Existential(variables) => Disposition::Existential { variables },
                    NoteDraft::Constrained(idxs) => {
                        let mut cids: Vec<ConstraintId> =
                            idxs.into_iter().filter_map(id_of).collect();
                        cids.dedup();
                        Disposition::Constrained(cids)
                    }
                },
            })
            .collect();

        let relations = build_relations(&constraints, &self.exprs);
        let order = check_order(&relations);
        debug!(
            function = %self.sig.name,
            constraints = constraints.len(),
            "constraint model built"
        );

        ConstraintModel {
            function: self.sig.name.clone(),
            constraints,
            exprs: self.exprs,
            bindings: self.bindings,
            notes,
            relations,
            order,
        }
    }
}

fn lookup(sig: &Signature, frame: &Frame, name: &str) -> ValueExpr {
    for (record, fields) in frame.records.iter().rev() {
        if fields.iter().any(|f| f == name) {
            return ValueExpr::Place(record.child(PathStep::Field(name.to_string())));
        }
    }
    if frame.params_visible && sig.param(name).is_some() {
        return ValueExpr::Place(Place::param(name));
    }
    if frame.result_visible && name == "result" {
        return ValueExpr::Place(Place::root(Root::Result));
    }
    ValueExpr::Implicit(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigc_core::parse_signature;

    fn model(source: &str) -> ConstraintModel {
        extract(&parse_signature(source).unwrap()).unwrap()
    }

    fn summary(model: &ConstraintModel) -> Vec<String> {
        model
            .constraints
            .iter()
            .map(|c| {
                let subjects: Vec<String> = c.subjects.iter().map(|s| s.to_string()).collect();
                match c.kind.expression() {
                    Some(expr) => format!(
                        "{} {}({}, {})",
                        c.id,
                        c.kind.label(),
                        subjects.join("+"),
                        model.render(expr)
                    ),
                    None => format!("{} {}({})", c.id, c.kind.label(), subjects.join("+")),
                }
            })
            .collect()
    }

    #[test]
    fn take_weakens_self_derived_length() {
        let m = model("take(n: Nat, xs: SizedSequence(T, n + m)) -> SizedSequence(T, n)");
        assert_eq!(
            summary(&m),
            vec![
                "C1 Nonnegative(n)",
                "C2 LengthAtLeast(xs, n)",
                "C3 LengthEquals(result, n)",
            ]
        );
        assert_eq!(m.bindings["m"].kind, BindingKind::Derived);
        assert_eq!(m.render(m.bindings["m"].value), "len(xs) - n");
        assert_eq!(m.order, vec![ConstraintId(1), ConstraintId(2), ConstraintId(3)]);
    }

    #[test]
    fn index_bound_resolves_through_binder() {
        let m = model("index(i: BoundedIndex(n), xs: SizedSequence(T, n)) -> T");
        assert_eq!(summary(&m), vec!["C1 IndexBound(i, len(xs))"]);
        let declared = m.constraints[0].declared.unwrap();
        assert_eq!(m.render(declared), "n");
        assert!(m.notes.iter().any(|n| n.subject == Place::param("xs")
            && n.disposition == Disposition::Binder { variable: "n".into() }));
    }

    #[test]
    fn tail_uses_derived_length_in_postcondition() {
        let m = model("tail(xs: SizedSequence(T, S(n))) -> SizedSequence(T, n)");
        assert_eq!(
            summary(&m),
            vec![
                "C1 LengthAtLeast(xs, 1)",
                "C2 LengthEquals(result, len(xs) - 1)",
            ]
        );
    }

    #[test]
    fn equal_lengths_merge_across_parameters() {
        let m = model(
            "dot(n: Nat, xs: SizedSequence(Int, n), ys: SizedSequence(Int, n)) -> Int",
        );
        assert_eq!(
            summary(&m),
            vec!["C1 Nonnegative(n)", "C2 LengthEquals(xs+ys, n)"]
        );
        assert_eq!(
            m.constraints[1].scope,
            Scope::CrossParameter(vec!["xs".into(), "ys".into()])
        );
        assert_eq!(
            m.notes
                .iter()
                .filter(|n| n.disposition == Disposition::Constrained(vec![ConstraintId(2)]))
                .count(),
            2
        );
    }

    #[test]
    fn zip_checks_second_length_against_first() {
        let m = model(
            "zip(xs: SizedSequence(A, n), ys: SizedSequence(B, n)) -> SizedSequence(A, n)",
        );
        assert_eq!(
            summary(&m),
            vec![
                "C1 LengthEquals(xs+ys, len(xs))",
                "C2 LengthEquals(result, len(xs))",
            ]
        );
        assert_eq!(
            m.constraints[0].scope,
            Scope::CrossParameter(vec!["xs".into(), "ys".into()])
        );
        assert!(m.notes.iter().any(|n| n.subject == Place::param("xs")
            && n.disposition == Disposition::Binder { variable: "n".into() }));
    }

    #[test]
    fn shared_binder_merges_every_sequence() {
        let m = model(
            "zip3(xs: SizedSequence(A, n), ys: SizedSequence(B, n), zs: SizedSequence(C, n)) -> Int",
        );
        assert_eq!(summary(&m), vec!["C1 LengthEquals(xs+ys+zs, len(xs))"]);
        assert_eq!(
            m.constraints[0].scope,
            Scope::CrossParameter(vec!["xs".into(), "ys".into(), "zs".into()])
        );
    }

    #[test]
    fn optional_payload_constraints_have_parent() {
        let m = model("f(x: Optional(Nat)) -> Int");
        assert_eq!(summary(&m), vec!["C1 Disjoint(x)", "C2 Nonnegative(x?)"]);
        assert_eq!(m.constraints[1].parent, Some(ConstraintId(1)));
        assert_eq!(m.children(ConstraintId(1)).len(), 1);
    }

    #[test]
    fn refinement_keeps_base_constraints_first() {
        let m = model("f(x: Refinement(Nat, self < 10)) -> Int");
        assert_eq!(
            summary(&m),
            vec!["C1 Nonnegative(x)", "C2 PredicateHolds(x, x < 10)"]
        );
    }

    #[test]
    fn record_fields_resolve_siblings_and_emit_invariants() {
        let m = model(
            "record Matrix { rows: Nat, cols: Nat, data: SizedSequence(SizedSequence(Int, cols), rows) }\n\
             get(m: Matrix, r: Fin(m.rows)) -> Int",
        );
        assert_eq!(
            summary(&m),
            vec![
                "C1 Nonnegative(m.rows)",
                "C2 Nonnegative(m.cols)",
                "C3 LengthEquals(m.data, m.rows)",
                "C4 LengthEquals(m.data[*], m.cols)",
                "C5 IndexBound(r, m.rows)",
                "C6 Nonnegative(self.rows)",
                "C7 Nonnegative(self.cols)",
                "C8 LengthEquals(self.data, self.rows)",
                "C9 LengthEquals(self.data[*], self.cols)",
            ]
        );
        assert_eq!(m.invariants()["Matrix"].len(), 4);
        assert_eq!(m.preconditions().len(), 5);
    }

    #[test]
    fn existential_result_length_has_no_constraint() {
        let m = model("filter(xs: SizedSequence(Int, n)) -> SizedSequence(Int, k)");
        assert!(m.constraints.is_empty());
        assert!(m.notes.iter().any(|n| n.subject == Place::root(Root::Result)
            && n.disposition
                == Disposition::Existential {
                    variables: vec!["k".into()]
                }));
    }

    #[test]
    fn primitive_only_signature_is_explicitly_unconstrained() {
        let m = model("add(a: Int, b: Int) -> Int");
        assert!(m.is_empty());
        assert_eq!(m.notes.len(), 3);
        assert!(m
            .notes
            .iter()
            .all(|n| n.disposition == Disposition::Unconstrained));
    }

    #[test]
    fn unbound_index_bound_is_an_error() {
        let sig = parse_signature("f(i: BoundedIndex(k)) -> Int").unwrap();
        let err = extract(&sig).unwrap_err();
        assert_eq!(
            err,
            SignatureError::UnresolvedBound {
                symbol: "k".into(),
                context: "parameter i".into(),
                expression: "BoundedIndex(k)".into(),
            }
        );
    }

    #[test]
    fn free_variable_in_product_is_an_error() {
        let sig = parse_signature("f(n: Nat) -> SizedSequence(Int, n * k)").unwrap();
        let err = extract(&sig).unwrap_err();
        assert!(matches!(err, SignatureError::UnresolvedBound { ref symbol, .. } if symbol == "k"));
    }

    #[test]
    fn extraction_is_deterministic() {
        let sig = parse_signature(
            "append(xs: SizedSequence(T, n), ys: SizedSequence(T, m)) -> SizedSequence(T, n + m)",
        )
        .unwrap();
        let a = serde_json::to_string(&extract(&sig).unwrap()).unwrap();
        let b = serde_json::to_string(&extract(&sig).unwrap()).unwrap();
        assert_eq!(a, b);
    }
}
