pub mod error;
pub mod expr;
pub mod id;
pub mod parser;
pub mod types;

// Re-export commonly used types
pub use error::SignatureError;
pub use expr::{BinOp, ExprArena, PathStep, Place, Root, UnOp, ValueExpr, ValuePath};
pub use id::{ConstraintId, ExprId, TypeRef};
pub use parser::parse_signature;
pub use types::{
    Parameter, PrimitiveKind, RecordType, Signature, Totality, TypeArena, TypeExpr, TypeNode,
    Visibility,
};
