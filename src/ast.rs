//! Contains the structures that make up the resolved declaration graph of a
//! compilation unit.
//!
//! The graph is produced by an upstream frontend which has already parsed and
//! type-checked the source text. Every identifier that declares or references
//! a package-level name arrives pre-associated with a binding id, so no name
//! lookup happens during lowering; only binding resolution does.
//!
//! Nodes are immutable once constructed. Shared ownership through `Rc` allows
//! bindings to point back at the specification that introduced them without
//! duplicating subtrees.

use crate::{symbol_table, types};

/// A byte range into the original source file, carried through from the
/// frontend for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Span {
  pub start: usize,
  pub end: usize,
}

/// A compilation unit representing a single, entire source package.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct Module {
  pub package_name: String,
  pub decls: Vec<Decl>,
}

/// An occurrence of a declared or referenced name.
///
/// The blank identifier `_` never declares anything and therefore carries no
/// binding id.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Ident {
  pub name: String,
  pub binding_id: Option<symbol_table::BindingId>,
  pub span: Span,
}

impl Ident {
  pub const BLANK: &'static str = "_";

  /// Whether the name is visible outside its compilation unit.
  ///
  /// Export visibility follows the source language's capitalization
  /// convention: a name is exported when its first character is uppercase.
  pub fn is_exported(&self) -> bool {
    self
      .name
      .chars()
      .next()
      .map(|first_char| first_char.is_uppercase())
      .unwrap_or(false)
  }

  pub fn is_blank(&self) -> bool {
    self.name == Self::BLANK
  }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Decl {
  Function(std::rc::Rc<FunctionDecl>),
  Group(std::rc::Rc<GroupDecl>),
  /// A declaration the frontend could not classify; carried through from
  /// upstream parse recovery so that lowering can report it with a position.
  Bad(Span),
}

/// The keyword that introduced a grouped declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum GroupKeyword {
  Import,
  Type,
  Const,
  Var,
}

/// A grouped declaration: one keyword followed by one or more value
/// specifications.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct GroupDecl {
  pub keyword: GroupKeyword,
  pub specs: Vec<std::rc::Rc<ValueSpec>>,
  pub span: Span,
}

/// A single `names = values` specification within a grouped declaration.
///
/// In constant groups, a specification with an empty expression list
/// implicitly repeats the nearest preceding non-empty list; which list a name
/// actually evaluates is resolved once during binding creation and recorded
/// on the binding itself.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct ValueSpec {
  pub names: Vec<Ident>,
  pub type_hint: Option<types::Type>,
  pub values: Vec<Expr>,
  pub span: Span,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct FunctionDecl {
  pub name: Ident,
  pub signature: Signature,
  pub body: Option<Block>,
  pub span: Span,
}

/// A function signature. A `None` return type denotes a function that yields
/// nothing (lowered as `void`).
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct Signature {
  pub parameters: Vec<Parameter>,
  pub return_type: Option<types::Type>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct Parameter {
  pub name: String,
  pub ty: types::Type,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct Block {
  pub statements: Vec<Statement>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub enum Statement {
  Return(Option<Expr>),
  Expr(Expr),
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Expr {
  Literal(Literal),
  /// The auto-incrementing ordinal available inside one constant declaration
  /// group.
  Iota(Span),
  Reference(Ident),
  BinaryOp(std::rc::Rc<BinaryOp>),
  ArrayLit(std::rc::Rc<ArrayLit>),
  Call(std::rc::Rc<CallSite>),
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Literal {
  Bool(bool),
  Int { value: i64, width: types::BitWidth },
  Float { value: f64, width: types::BitWidth },
  Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BinaryOperator {
  Add,
  Subtract,
  Multiply,
  Divide,
  ShiftLeft,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct BinaryOp {
  pub operator: BinaryOperator,
  pub left_operand: Expr,
  pub right_operand: Expr,
  pub span: Span,
}

/// A composite array literal with a homogeneous element type.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct ArrayLit {
  pub element_type: types::Type,
  pub elements: Vec<Expr>,
  pub span: Span,
}

/// A direct call to a named function. Indirect calls through function values
/// are the concern of full expression lowering, which this stage does not
/// own.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct CallSite {
  pub callee: Ident,
  pub arguments: Vec<Expr>,
  pub span: Span,
}
