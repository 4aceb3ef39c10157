//! The binding store associates each declared package-level name with at most
//! one resolved IR value.
//!
//! Bindings are created once, during the declare step, and materialized the
//! first time declaration lowering visits them. After materialization a
//! binding is immutable for the rest of the compilation; idempotent re-visits
//! detect the existing value and return early. Because evaluating one
//! declaration may synchronously force the evaluation of another it depends
//! on, every consumer must tolerate finding a binding already materialized.
//!
//! The content of a binding slot is an explicit tagged variant rather than an
//! untyped cell, so a consumer that requires one kind of content and finds
//! another fails with a descriptive diagnostic instead of a type assertion.

use crate::{ast, auxiliary, diagnostic};

/// A unique, exclusive identifier for declared package-level names.
///
/// Assigned by the upstream frontend during name resolution; every
/// identifier occurrence in the declaration graph that declares or
/// references a name carries one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct BindingId(pub usize);

/// The declared kind of a name.
///
/// Names whose initializers fold to inline scalar constants are re-marked as
/// `Constant` when they are bound, since no storage backs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
  Ordinary,
  Constant,
}

/// A resolved IR value, tagged with its addressing mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoundValue<'llvm> {
  /// The value itself is usable in place: folded scalar constants, and
  /// array-typed globals whose identifier already denotes the address of
  /// their storage.
  Direct(inkwell::values::BasicValueEnum<'llvm>),
  /// A memory-backed global whose identifier denotes an address; a load is
  /// required to obtain the value.
  Indirect(inkwell::values::GlobalValue<'llvm>),
  Function(inkwell::values::FunctionValue<'llvm>),
}

impl<'llvm> BoundValue<'llvm> {
  pub(crate) fn description(&self) -> &'static str {
    match self {
      BoundValue::Direct(..) => "an inline constant value",
      BoundValue::Indirect(..) => "a memory-backed global",
      BoundValue::Function(..) => "a function",
    }
  }
}

#[derive(Debug, Clone, Copy)]
pub enum BindingState<'llvm> {
  /// Declared, but not yet visited by declaration lowering.
  Unresolved,
  /// Declared inside a constant group; holds the specification ordinal used
  /// as the enumeration value until the name is materialized.
  PendingOrdinal(u64),
  Bound(BoundValue<'llvm>),
}

impl<'llvm> BindingState<'llvm> {
  pub(crate) fn description(&self) -> &'static str {
    match self {
      BindingState::Unresolved => "an unresolved slot",
      BindingState::PendingOrdinal(..) => "a pending enumeration ordinal",
      BindingState::Bound(bound_value) => bound_value.description(),
    }
  }
}

/// Where a binding's value comes from when it is forced.
///
/// For names introduced by value specifications, the expression list a name
/// borrows from (which differs from its own specification under implicit
/// repetition) is resolved once, during the declare step, and stored here
/// directly.
#[derive(Debug, Clone)]
pub enum BindingOrigin {
  Function(std::rc::Rc<ast::FunctionDecl>),
  Spec {
    spec: std::rc::Rc<ast::ValueSpec>,
    index: usize,
    is_const: bool,
  },
}

#[derive(Debug, Clone)]
pub struct Binding<'llvm> {
  pub name: String,
  pub exported: bool,
  pub kind: BindingKind,
  pub state: BindingState<'llvm>,
  pub origin: Option<BindingOrigin>,
}

#[derive(Default)]
pub struct BindingStore<'llvm> {
  bindings: std::collections::HashMap<BindingId, Binding<'llvm>>,
}

impl<'llvm> BindingStore<'llvm> {
  /// Register a fresh binding under the given id.
  ///
  /// Ids are unique per compilation unit; registering the same id twice is a
  /// redeclaration diagnostic.
  pub fn declare(&mut self, binding_id: BindingId, binding: Binding<'llvm>) -> diagnostic::Maybe {
    if self.bindings.contains_key(&binding_id) {
      return Err(vec![diagnostic::Diagnostic::Redeclaration(binding.name)]);
    }

    self.bindings.insert(binding_id, binding);

    Ok(())
  }

  pub fn get(&self, binding_id: &BindingId) -> Option<&Binding<'llvm>> {
    self.bindings.get(binding_id)
  }

  /// Store a resolved IR value into a binding slot.
  ///
  /// Bindings never silently overwrite: once a value is stored, storing
  /// another is an invariant violation.
  pub(crate) fn bind(
    &mut self,
    binding_id: BindingId,
    value: BoundValue<'llvm>,
  ) -> diagnostic::Maybe {
    let binding = self
      .bindings
      .get_mut(&binding_id)
      .expect(auxiliary::BUG_NAME_RESOLUTION);

    if let BindingState::Bound(..) = binding.state {
      return Err(vec![diagnostic::Diagnostic::BindingRebound(
        binding.name.clone(),
      )]);
    }

    binding.state = BindingState::Bound(value);

    Ok(())
  }

  /// Re-mark a binding as a plain constant; used when a name's initializer
  /// folds to an inline scalar and no storage is materialized for it.
  pub(crate) fn mark_constant(&mut self, binding_id: BindingId) {
    self
      .bindings
      .get_mut(&binding_id)
      .expect(auxiliary::BUG_NAME_RESOLUTION)
      .kind = BindingKind::Constant;
  }

  /// Read a binding that the consumer requires to already hold an IR value.
  pub fn expect_bound(&self, binding_id: &BindingId) -> diagnostic::Maybe<BoundValue<'llvm>> {
    let binding = self
      .bindings
      .get(binding_id)
      .expect(auxiliary::BUG_NAME_RESOLUTION);

    match binding.state {
      BindingState::Bound(value) => Ok(value),
      other => Err(vec![diagnostic::Diagnostic::BindingKindMismatch {
        name: binding.name.clone(),
        expected: "a resolved IR value",
        found: other.description(),
      }]),
    }
  }
}
