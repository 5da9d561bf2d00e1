//! Recursive descent parser for signature text.
//!
//! ```text
//! record List { len: Nat, items: SizedSequence(Int, len) }
//! private partial take(n: Nat, xs: SizedSequence(T, n + m)) -> SizedSequence(T, n)
//! ```
//!
//! Any type name or constructor outside the supported vocabulary is refused
//! with [`SignatureError::UnsupportedType`] carrying the verbatim source
//! slice; nothing is approximated.

pub mod lexer;

use indexmap::IndexMap;

use crate::error::SignatureError;
use crate::expr::{BinOp, ExprArena, UnOp, ValueExpr};
use crate::id::{ExprId, TypeRef};
use crate::types::{
    Parameter, PrimitiveKind, RecordType, Signature, Totality, TypeArena, TypeExpr, Visibility,
};

use lexer::{tokenize, Token, TokenKind};

/// Names that cannot be used for records.
const RESERVED_TYPE_NAMES: &[&str] = &[
    "Int",
    "Integer",
    "Bool",
    "Text",
    "String",
    "Nat",
    "NonNegativeInt",
    "BoundedIndex",
    "Fin",
    "SizedSequence",
    "Optional",
    "Maybe",
    "Refinement",
];

/// Parses one signature, preceded by any record declarations it uses.
pub fn parse_signature(source: &str) -> Result<Signature, SignatureError> {
    let mut parser = Parser::new(source)?;
    parser.source_file()
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    types: TypeArena,
    exprs: ExprArena,
    records: IndexMap<String, TypeRef>,
    /// Nesting depth of refinement predicates; `self` is only valid inside.
    refinement_depth: usize,
}

/// How a constructor argument list failed to match the expected arity.
enum ArgsOutcome<T> {
    Parsed(T),
    WrongArity,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Result<Self, SignatureError> {
        Ok(Parser {
            source,
            tokens: tokenize(source)?,
            pos: 0,
            types: TypeArena::new(),
            exprs: ExprArena::new(),
            records: IndexMap::new(),
            refinement_depth: 0,
        })
    }

    // Token access

    fn current(&self) -> &Token {
        // tokenize always appends Eof and advance never moves past it
        &self.tokens[self.pos]
    }

    fn peek_kind(&self, offset: usize) -> &TokenKind {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.current().kind == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error(&self, expected: &str) -> SignatureError {
        let token = self.current();
        SignatureError::Parse {
            position: token.start,
            expected: expected.to_string(),
            found: token.kind.to_string(),
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, SignatureError> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            Err(self.error(&kind.to_string()))
        }
    }

    fn ident(&mut self, what: &str) -> Result<String, SignatureError> {
        match &self.current().kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.error(what)),
        }
    }

    fn is_ident(&self, text: &str) -> bool {
        matches!(&self.current().kind, TokenKind::Ident(name) if name == text)
    }

    /// End offset of the most recently consumed token.
    fn prev_end(&self) -> usize {
        if self.pos == 0 {
            0
        } else {
            self.tokens[self.pos - 1].end
        }
    }

    fn slice(&self, start: usize, end: usize) -> String {
        self.source[start..end].to_string()
    }

    /// Skips from an opening parenthesis at token index `open` to its match
    /// and returns the byte offset just past it.
    fn skip_balanced(&mut self, open: usize) -> usize {
        self.pos = open;
        let mut depth = 0usize;
        loop {
            let token = self.advance();
            match token.kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return token.end;
                    }
                }
                TokenKind::Eof => return token.start,
                _ => {}
            }
        }
    }

    // Declarations

    fn source_file(&mut self) -> Result<Signature, SignatureError> {
        while self.is_ident("record") && matches!(self.peek_kind(1), TokenKind::Ident(_)) {
            self.record_decl()?;
        }
        let signature = self.signature()?;
        if !self.check(&TokenKind::Eof) {
            return Err(self.error("end of input"));
        }
        Ok(signature)
    }

    fn record_decl(&mut self) -> Result<(), SignatureError> {
        let start = self.current().start;
        self.advance(); // `record`
        let name = self.ident("record name")?;
        if self.records.contains_key(&name) || RESERVED_TYPE_NAMES.contains(&name.as_str()) {
            return Err(SignatureError::DuplicateRecord { name });
        }
        let fields = self.field_block()?;
        let raw = self.slice(start, self.prev_end());
        let ty = self.types.alloc(
            TypeExpr::Record(RecordType {
                name: Some(name.clone()),
                fields,
            }),
            raw,
        );
        self.records.insert(name, ty);
        Ok(())
    }

    fn field_block(&mut self) -> Result<IndexMap<String, TypeRef>, SignatureError> {
        self.expect(TokenKind::LBrace)?;
        let mut fields = IndexMap::new();
        loop {
            let position = self.current().start;
            let name = self.ident("field name")?;
            self.expect(TokenKind::Colon)?;
            let ty = self.type_expr()?;
            if fields.insert(name.clone(), ty).is_some() {
                return Err(SignatureError::Parse {
                    position,
                    expected: "distinct field name".into(),
                    found: format!("duplicate field `{name}`"),
                });
            }
            if !self.eat(&TokenKind::Comma) || self.check(&TokenKind::RBrace) {
                break;
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(fields)
    }

    fn signature(&mut self) -> Result<Signature, SignatureError> {
        let mut visibility = Visibility::default();
        let mut totality = Totality::default();
        loop {
            // A modifier word directly followed by '(' is the function name.
            if matches!(self.peek_kind(1), TokenKind::LParen) {
                break;
            }
            if self.is_ident("public") {
                visibility = Visibility::Public;
            } else if self.is_ident("private") {
                visibility = Visibility::Private;
            } else if self.is_ident("total") {
                totality = Totality::Total;
            } else if self.is_ident("partial") {
                totality = Totality::PossiblyPartial;
            } else {
                break;
            }
            self.advance();
        }

        let name = self.ident("function name")?;
        self.expect(TokenKind::LParen)?;
        let mut params: Vec<Parameter> = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                let param_name = self.ident("parameter name")?;
                if params.iter().any(|p| p.name == param_name) {
                    return Err(SignatureError::DuplicateParameter { name: param_name });
                }
                self.expect(TokenKind::Colon)?;
                let ty = self.type_expr()?;
                params.push(Parameter {
                    name: param_name,
                    ty,
                });
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::Arrow)?;
        let return_type = self.type_expr()?;

        Ok(Signature {
            name,
            params,
            return_type,
            visibility,
            totality,
            records: std::mem::take(&mut self.records),
            types: std::mem::take(&mut self.types),
            exprs: std::mem::take(&mut self.exprs),
            source: self.source.to_string(),
        })
    }

    // Types

    fn type_expr(&mut self) -> Result<TypeRef, SignatureError> {
        let start = self.current().start;
        if self.check(&TokenKind::LBrace) {
            let fields = self.field_block()?;
            let raw = self.slice(start, self.prev_end());
            return Ok(self
                .types
                .alloc(TypeExpr::Record(RecordType { name: None, fields }), raw));
        }

        let name = self.ident("type")?;
        if self.check(&TokenKind::LParen) {
            return self.constructor(&name, start);
        }

        let expr = match name.as_str() {
            "Int" | "Integer" => TypeExpr::Primitive(PrimitiveKind::Int),
            "Bool" => TypeExpr::Primitive(PrimitiveKind::Bool),
            "Text" | "String" => TypeExpr::Primitive(PrimitiveKind::Text),
            "Nat" | "NonNegativeInt" => TypeExpr::NonNegativeInt,
            _ => {
                if let Some(record) = self.records.get(&name) {
                    return Ok(*record);
                }
                if name.len() == 1 && name.chars().all(|c| c.is_ascii_uppercase()) {
                    TypeExpr::Primitive(PrimitiveKind::Generic(name.clone()))
                } else {
                    return Err(SignatureError::UnsupportedType { raw: name });
                }
            }
        };
        Ok(self.types.alloc(expr, name))
    }

    fn constructor(&mut self, name: &str, start: usize) -> Result<TypeRef, SignatureError> {
        let open = self.pos;
        self.advance(); // '('
        let outcome = match name {
            "BoundedIndex" | "Fin" => self
                .last_arg(|p| p.expr())?
                .map(TypeExpr::BoundedIndex),
            "Optional" | "Maybe" => self.last_arg(|p| p.type_expr())?.map(TypeExpr::Optional),
            "SizedSequence" => match self.middle_arg(|p| p.type_expr())? {
                ArgsOutcome::Parsed(element) => self
                    .last_arg(|p| p.expr())?
                    .map(|length| TypeExpr::SizedSequence { element, length }),
                ArgsOutcome::WrongArity => ArgsOutcome::WrongArity,
            },
            "Refinement" => match self.middle_arg(|p| p.type_expr())? {
                ArgsOutcome::Parsed(base) => {
                    self.refinement_depth += 1;
                    let predicate = self.last_arg(|p| p.expr());
                    self.refinement_depth -= 1;
                    predicate?.map(|predicate| TypeExpr::Refinement { base, predicate })
                }
                ArgsOutcome::WrongArity => ArgsOutcome::WrongArity,
            },
            _ => ArgsOutcome::WrongArity,
        };
        match outcome {
            ArgsOutcome::Parsed(expr) => {
                let raw = self.slice(start, self.prev_end());
                Ok(self.types.alloc(expr, raw))
            }
            ArgsOutcome::WrongArity => {
                let end = self.skip_balanced(open);
                Err(SignatureError::UnsupportedType {
                    raw: self.slice(start, end),
                })
            }
        }
    }

    /// Parses an argument that must be followed by `,`.
    fn middle_arg<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, SignatureError>,
    ) -> Result<ArgsOutcome<T>, SignatureError> {
        if self.check(&TokenKind::RParen) {
            return Ok(ArgsOutcome::WrongArity);
        }
        let value = parse(self)?;
        if self.eat(&TokenKind::Comma) {
            Ok(ArgsOutcome::Parsed(value))
        } else if self.check(&TokenKind::RParen) {
            Ok(ArgsOutcome::WrongArity)
        } else {
            Err(self.error("','"))
        }
    }

    /// Parses the final argument and the closing `)`.
    fn last_arg<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, SignatureError>,
    ) -> Result<ArgsOutcome<T>, SignatureError> {
        if self.check(&TokenKind::RParen) {
            return Ok(ArgsOutcome::WrongArity);
        }
        let value = parse(self)?;
        if self.eat(&TokenKind::RParen) {
            Ok(ArgsOutcome::Parsed(value))
        } else if self.check(&TokenKind::Comma) {
            Ok(ArgsOutcome::WrongArity)
        } else {
            Err(self.error("')'"))
        }
    }

    // Expressions

    fn expr(&mut self) -> Result<ExprId, SignatureError> {
        let mut lhs = self.and_expr()?;
        while self.eat(&TokenKind::OrOr) {
            let rhs = self.and_expr()?;
            lhs = self.exprs.binary(BinOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<ExprId, SignatureError> {
        let mut lhs = self.not_expr()?;
        while self.eat(&TokenKind::AndAnd) {
            let rhs = self.not_expr()?;
            lhs = self.exprs.binary(BinOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn not_expr(&mut self) -> Result<ExprId, SignatureError> {
        if self.eat(&TokenKind::Bang) {
            let inner = self.not_expr()?;
            return Ok(self.exprs.intern(ValueExpr::Unary(UnOp::Not, inner)));
        }
        self.cmp_expr()
    }

    fn cmp_expr(&mut self) -> Result<ExprId, SignatureError> {
        let lhs = self.sum_expr()?;
        let op = match self.current().kind {
            TokenKind::Lt => BinOp::Lt,
            TokenKind::Le => BinOp::Le,
            TokenKind::Gt => BinOp::Gt,
            TokenKind::Ge => BinOp::Ge,
            TokenKind::EqEq => BinOp::Eq,
            TokenKind::Ne => BinOp::Ne,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.sum_expr()?;
        Ok(self.exprs.binary(op, lhs, rhs))
    }

    fn sum_expr(&mut self) -> Result<ExprId, SignatureError> {
        let mut lhs = self.product_expr()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.product_expr()?;
            lhs = self.exprs.binary(op, lhs, rhs);
        }
    }

    fn product_expr(&mut self) -> Result<ExprId, SignatureError> {
        let mut lhs = self.unary_expr()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Rem,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.unary_expr()?;
            lhs = self.exprs.binary(op, lhs, rhs);
        }
    }

    fn unary_expr(&mut self) -> Result<ExprId, SignatureError> {
        if self.eat(&TokenKind::Minus) {
            let inner = self.unary_expr()?;
            if let ValueExpr::Int(value) = self.exprs.get(inner) {
                let negated = value.saturating_neg();
                return Ok(self.exprs.int(negated));
            }
            return Ok(self.exprs.intern(ValueExpr::Unary(UnOp::Neg, inner)));
        }
        self.postfix_expr()
    }

    fn postfix_expr(&mut self) -> Result<ExprId, SignatureError> {
        let mut base = self.atom()?;
        while self.eat(&TokenKind::Dot) {
            let field = self.ident("field name")?;
            base = self.exprs.field(base, &field);
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<ExprId, SignatureError> {
        let start = self.current().start;
        match self.current().kind.clone() {
            TokenKind::Int(value) => {
                self.advance();
                Ok(self.exprs.int(value))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::Ident(name) => {
                self.advance();
                match name.as_str() {
                    "true" => return Ok(self.exprs.boolean(true)),
                    "false" => return Ok(self.exprs.boolean(false)),
                    "self" => {
                        if self.refinement_depth == 0 {
                            return Err(SignatureError::Parse {
                                position: start,
                                expected: "expression".into(),
                                found: "`self` outside a refinement predicate".into(),
                            });
                        }
                        return Ok(self.exprs.intern(ValueExpr::SelfRef));
                    }
                    _ => {}
                }
                if !self.check(&TokenKind::LParen) {
                    return Ok(self.exprs.intern(ValueExpr::Symbol(name)));
                }
                let open = self.pos;
                self.advance();
                let node = match name.as_str() {
                    "S" => ValueExpr::Succ(self.expr()?),
                    "len" => ValueExpr::Len(self.expr()?),
                    _ => {
                        let end = self.skip_balanced(open);
                        return Err(SignatureError::UnsupportedType {
                            raw: self.slice(start, end),
                        });
                    }
                };
                self.expect(TokenKind::RParen)?;
                Ok(self.exprs.intern(node))
            }
            _ => Err(self.error("expression")),
        }
    }
}

impl<T> ArgsOutcome<T> {
    fn map<U>(self, f: impl FnOnce(T) -> U) -> ArgsOutcome<U> {
        match self {
            ArgsOutcome::Parsed(value) => ArgsOutcome::Parsed(f(value)),
            ArgsOutcome::WrongArity => ArgsOutcome::WrongArity,
        }
    }
}
