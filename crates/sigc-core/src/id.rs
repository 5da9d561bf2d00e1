//! Stable ID newtypes for arena entries and extracted constraints.
//!
//! All IDs are distinct newtype wrappers over `u32`, so a [`TypeRef`] cannot
//! be used where an [`ExprId`] is expected even though both index arenas.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Index of a node in a signature's [`TypeArena`](crate::types::TypeArena).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeRef(pub u32);

/// Index of a node in an [`ExprArena`](crate::expr::ExprArena).
///
/// The arena hash-conses its nodes, so two `ExprId`s are equal exactly when
/// the expressions they denote are structurally equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExprId(pub u32);

/// Identity of one extracted constraint, unique within a constraint model.
///
/// Constraint IDs are the traceability key shared by synthesized checks,
/// failure messages and test cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConstraintId(pub u32);

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

impl fmt::Display for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

impl fmt::Display for ConstraintId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraint_id_display() {
        assert_eq!(format!("{}", ConstraintId(7)), "C7");
    }

    #[test]
    fn arena_ids_display_with_prefix() {
        assert_eq!(format!("{}", TypeRef(3)), "t3");
        assert_eq!(format!("{}", ExprId(12)), "e12");
    }

    #[test]
    fn constraint_ids_order_by_extraction() {
        let mut ids = vec![ConstraintId(4), ConstraintId(1), ConstraintId(3)];
        ids.sort();
        assert_eq!(ids, vec![ConstraintId(1), ConstraintId(3), ConstraintId(4)]);
    }

    #[test]
    fn serde_roundtrip() {
        let id = ConstraintId(42);
        let json = serde_json::to_string(&id).unwrap();
        let back: ConstraintId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
