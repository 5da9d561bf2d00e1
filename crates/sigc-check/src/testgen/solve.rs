//! Bounded search for concrete inputs.
//!
//! Candidates are enumerated in shells: shell `k` holds every assignment
//! whose largest domain index is exactly `k`. Domains list small, common
//! values first, so earlier candidates are simpler. Every candidate is
//! checked against the synthesized contract, never against a separate
//! reading of the constraints.

use tracing::debug;

use sigc_core::ConstraintId;

use crate::contracts::check::{check_invariants, check_preconditions, Args};
use crate::contracts::{ContractCode, ContractViolation};
use crate::eval::error::EvalError;
use crate::model::{Constraint, ConstraintKind};

use super::template::{length_var, presence_var, value_var, Assignment, Templates, VarRole};
use super::{EntryPoint, Isolation};

/// An inhabitant of the generator space with its check results.
#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    pub assignment: Assignment,
    pub inputs: Args,
    /// Failed checks in check order; empty when accepted.
    pub failures: Vec<ContractViolation>,
}

impl Candidate {
    fn accepted(&self) -> bool {
        self.failures.is_empty()
    }

    fn fails(&self, id: ConstraintId) -> bool {
        self.failures.iter().any(|f| f.constraint == id)
    }

    fn fails_only(&self, id: ConstraintId) -> bool {
        self.failures.len() == 1 && self.failures[0].constraint == id
    }

    fn fails_first(&self, id: ConstraintId) -> bool {
        self.failures.first().is_some_and(|f| f.constraint == id)
    }
}

pub(crate) struct Solver<'a> {
    pub code: &'a ContractCode,
    pub entry: &'a EntryPoint,
    pub templates: &'a Templates,
    pub max_candidates: usize,
}

impl Solver<'_> {
    /// Instantiates and checks an assignment. `Ok(None)` when it is not an
    /// inhabitant or its checks cannot be evaluated.
    pub fn evaluate(&self, assignment: Assignment) -> Result<Option<Candidate>, EvalError> {
        let Some(inputs) = self.templates.instantiate(&assignment) else {
            return Ok(None);
        };
        let checked = match self.entry {
            EntryPoint::Function => check_preconditions(self.code, &inputs),
            EntryPoint::Constructor(record) => match inputs.get("self") {
                Some(value) => check_invariants(self.code, record, value),
                None => Ok(Vec::new()),
            },
        };
        match checked {
            Ok(failures) => Ok(Some(Candidate {
                assignment,
                inputs,
                failures,
            })),
            Err(err) if err.is_defect() => Err(err),
            Err(err) => {
                debug!(error = %err, "candidate discarded");
                Ok(None)
            }
        }
    }

    /// First candidate in shell order satisfying `accept`.
    pub fn find(
        &self,
        mut accept: impl FnMut(&Self, &Candidate) -> Result<bool, EvalError>,
    ) -> Result<Option<Candidate>, EvalError> {
        let vars = &self.templates.vars;
        let sizes: Vec<usize> = vars.iter().map(|v| v.domain.len()).collect();
        let mut shells = Shells::new(sizes);
        let mut visited = 0;
        while let Some(indices) = shells.next() {
            if visited == self.max_candidates {
                debug!(visited, "search budget exhausted");
                return Ok(None);
            }
            visited += 1;
            let assignment: Assignment = vars
                .iter()
                .zip(&indices)
                .map(|(var, &i)| (var.name.clone(), var.domain[i]))
                .collect();
            if let Some(candidate) = self.evaluate(assignment)? {
                if accept(self, &candidate)? {
                    return Ok(Some(candidate));
                }
            }
        }
        Ok(None)
    }

    /// `candidate` with one variable moved by `delta`.
    fn perturb(
        &self,
        candidate: &Candidate,
        var: &str,
        delta: i64,
    ) -> Result<Option<Candidate>, EvalError> {
        let mut assignment = candidate.assignment.clone();
        match assignment.get_mut(var) {
            Some(value) => *value = value.saturating_add(delta),
            None => return Ok(None),
        }
        self.evaluate(assignment)
    }

    /// The generator variable that controls a constraint's subject, if the
    /// subject is an input.
    fn subject_var(&self, constraint: &Constraint) -> Option<String> {
        let subject = constraint.subject();
        let name = match constraint.kind {
            ConstraintKind::Nonnegative
            | ConstraintKind::IndexBound { .. }
            | ConstraintKind::PredicateHolds { .. } => value_var(subject),
            ConstraintKind::LengthEquals { .. } | ConstraintKind::LengthAtLeast { .. } => {
                length_var(subject)
            }
            ConstraintKind::Disjoint => presence_var(subject),
        };
        let var = self.templates.var(&name)?;
        let numeric = match constraint.kind {
            ConstraintKind::PredicateHolds { .. } => var.role == VarRole::Int,
            _ => true,
        };
        numeric.then_some(name)
    }

    /// An accepted input at the constraint's extremal satisfying value: one
    /// step further in the constraint's direction violates it, or leaves
    /// the input space.
    pub fn boundary(&self, constraint: &Constraint) -> Result<Option<Candidate>, EvalError> {
        let var = self.subject_var(constraint);
        let directions = directions(&constraint.kind);
        self.find(|solver, candidate| {
            if !candidate.accepted() {
                return Ok(false);
            }
            let Some(var) = &var else {
                return Ok(true);
            };
            if constraint.kind == ConstraintKind::Disjoint {
                return Ok(candidate.assignment.get(var) == Some(&0));
            }
            let mut inhabited = false;
            for delta in directions {
                if let Some(moved) = solver.perturb(candidate, var, *delta)? {
                    inhabited = true;
                    if moved.fails(constraint.id) {
                        return Ok(true);
                    }
                }
            }
            Ok(!inhabited)
        })
    }

    /// An input rejected by the constraint: alone if possible, otherwise as
    /// the first reported violation.
    pub fn violation(
        &self,
        constraint: &Constraint,
        boundary: Option<&Candidate>,
    ) -> Result<Option<(Candidate, Isolation)>, EvalError> {
        let id = constraint.id;
        let mut dominant: Option<Candidate> = None;

        if let (Some(var), Some(boundary)) = (self.subject_var(constraint), boundary) {
            for delta in directions(&constraint.kind) {
                if let Some(moved) = self.perturb(boundary, &var, *delta)? {
                    if moved.fails_only(id) {
                        return Ok(Some((moved, Isolation::Exact)));
                    }
                    if dominant.is_none() && moved.fails_first(id) {
                        dominant = Some(moved);
                    }
                }
            }
        }

        let exact = self.find(|_, candidate| {
            if dominant.is_none() && candidate.fails_first(id) {
                dominant = Some(candidate.clone());
            }
            Ok(candidate.fails_only(id))
        })?;
        Ok(match exact {
            Some(candidate) => Some((candidate, Isolation::Exact)),
            None => dominant.map(|candidate| (candidate, Isolation::Dominant)),
        })
    }

    /// An index one below zero, derived from the boundary input.
    pub fn below_zero(
        &self,
        constraint: &Constraint,
        boundary: &Candidate,
    ) -> Result<Option<(Candidate, Isolation)>, EvalError> {
        let Some(var) = self.subject_var(constraint) else {
            return Ok(None);
        };
        let mut assignment = boundary.assignment.clone();
        assignment.insert(var, -1);
        Ok(self.evaluate(assignment)?.and_then(|candidate| {
            if candidate.fails_only(constraint.id) {
                Some((candidate, Isolation::Exact))
            } else if candidate.fails_first(constraint.id) {
                Some((candidate, Isolation::Dominant))
            } else {
                None
            }
        }))
    }

    /// An accepted input, preferring nonempty sequences and text and present
    /// optionals.
    pub fn happy_path(&self) -> Result<Option<Candidate>, EvalError> {
        let rich = self.find(|solver, candidate| {
            Ok(candidate.accepted()
                && solver.templates.vars.iter().all(|var| match var.role {
                    VarRole::Length | VarRole::TextLength | VarRole::Presence => {
                        candidate.assignment.get(&var.name).is_some_and(|v| *v >= 1)
                    }
                    VarRole::Int | VarRole::Bool => true,
                }))
        })?;
        match rich {
            Some(candidate) => Ok(Some(candidate)),
            None => self.find(|_, candidate| Ok(candidate.accepted())),
        }
    }
}

/// Steps that move a satisfying subject toward violation.
fn directions(kind: &ConstraintKind) -> &'static [i64] {
    match kind {
        ConstraintKind::Nonnegative | ConstraintKind::LengthAtLeast { .. } => &[-1],
        ConstraintKind::IndexBound { .. } => &[1],
        ConstraintKind::LengthEquals { .. } | ConstraintKind::PredicateHolds { .. } => &[-1, 1],
        ConstraintKind::Disjoint => &[],
    }
}

/// Enumerates index tuples shell by shell. Within shell `k`, the first
/// position holding `k` is pinned; positions before it stay below `k` and
/// positions after it stay at or below `k`, so every tuple appears once.
struct Shells {
    sizes: Vec<usize>,
    shell: usize,
    pinned: usize,
    current: Option<Vec<usize>>,
    done: bool,
}

impl Shells {
    fn new(sizes: Vec<usize>) -> Self {
        Shells {
            sizes,
            shell: 0,
            pinned: 0,
            current: None,
            done: false,
        }
    }

    fn bound(&self, position: usize) -> usize {
        let size = self.sizes[position];
        if position < self.pinned {
            size.min(self.shell)
        } else {
            size.min(self.shell + 1)
        }
    }

    /// First tuple of the current (shell, pinned) block, if it is nonempty.
    fn start(&self) -> Option<Vec<usize>> {
        if self.sizes[self.pinned] <= self.shell {
            return None;
        }
        let empty = (0..self.sizes.len()).any(|p| p != self.pinned && self.bound(p) == 0);
        if empty {
            return None;
        }
        let mut tuple = vec![0; self.sizes.len()];
        tuple[self.pinned] = self.shell;
        Some(tuple)
    }

    fn advance(&self, tuple: &mut [usize]) -> bool {
        for position in (0..tuple.len()).rev() {
            if position == self.pinned {
                continue;
            }
            tuple[position] += 1;
            if tuple[position] < self.bound(position) {
                return true;
            }
            tuple[position] = 0;
        }
        false
    }
}

impl Iterator for Shells {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        if self.done {
            return None;
        }
        if self.sizes.is_empty() {
            self.done = true;
            return Some(Vec::new());
        }
        let largest = self.sizes.iter().copied().max().unwrap_or(0);
        loop {
            if let Some(mut tuple) = self.current.take() {
                if self.advance(&mut tuple) {
                    self.current = Some(tuple.clone());
                    return Some(tuple);
                }
                self.pinned += 1;
                if self.pinned == self.sizes.len() {
                    self.pinned = 0;
                    self.shell += 1;
                }
            }
            if self.shell >= largest {
                self.done = true;
                return None;
            }
            if let Some(tuple) = self.start() {
                self.current = Some(tuple.clone());
                return Some(tuple);
            }
            self.pinned += 1;
            if self.pinned == self.sizes.len() {
                self.pinned = 0;
                self.shell += 1;
            }
        }
    }
}
