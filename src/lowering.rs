//! The lowering phase walks the declarations of a resolved compilation unit
//! and emits corresponding LLVM IR constructs by making use of the `inkwell`
//! crate, which is an LLVM bindings wrapper library crate for Rust.
//!
//! Function declarations become LLVM functions with populated bodies;
//! constant and variable specifications bind their names either to folded
//! scalar constants or to module-level globals, in source order, with
//! enumeration ordinals substituted per specification. Forward references
//! are supported by materializing prototypes on demand and reusing them when
//! the declaration itself is visited.
//!
//! This phase assumes that the unit has been fully parsed, resolved and
//! type-checked upstream. In the case that any of those assumptions are
//! violated, diagnostics will not be emitted, and instead, a panic will
//! occur.

use crate::{ast, auxiliary, declare, diagnostic, lowering_ctx, symbol_table};
use inkwell::values::BasicValue;

pub(crate) const ENTRY_POINT_NAME: &str = "main";

/// The name reserved for per-unit initializer functions, which may legally
/// occur more than once per unit and therefore never binds a symbol.
pub(crate) const INIT_FUNCTION_NAME: &str = "init";

pub(crate) const ENTRY_PACKAGE_NAME: &str = "main";

pub(crate) const BUG_BUILDER_UNSET: &str =
  "LLVM builder should be positioned within a block when building instructions";

/// The evaluation scope of a single name within a constant or variable
/// specification.
///
/// Holds the IR representation of the enumeration ordinal, if the name
/// participates in a constant group. A fresh scope is created per resolved
/// name and threaded through expression lowering as an explicit parameter,
/// so nested or recursive group resolution cannot observe an enclosing
/// scope's ordinal.
#[derive(Default, Clone, Copy)]
pub(crate) struct GroupScope<'llvm> {
  pub(crate) iota: Option<inkwell::values::IntValue<'llvm>>,
}

/// Lower one compilation unit into textual LLVM IR.
///
/// This is the orchestration entry point used by drivers: it populates the
/// binding store, lowers every declaration in source order, and verifies the
/// resulting module. A unit whose package is literally named `main` is
/// treated as the program entry package regardless of the given options.
pub fn lower_unit(
  module: &ast::Module,
  options: lowering_ctx::LoweringOptions,
) -> diagnostic::Maybe<String> {
  let llvm_context = inkwell::context::Context::create();
  let llvm_module = llvm_context.create_module(&module.package_name);
  let mut bindings = symbol_table::BindingStore::default();

  declare::declare_module(module, &mut bindings)?;

  let mut options = options;

  options.entry_package |= module.package_name == ENTRY_PACKAGE_NAME;

  let mut lowering_context = lowering_ctx::LoweringContext::new(bindings, &llvm_module, options);

  for decl in &module.decls {
    lowering_context.lower_decl(decl)?;
  }

  log::debug!(
    "lowered unit `{}` ({} declaration(s))",
    module.package_name,
    module.decls.len()
  );

  let llvm_module_string = llvm_module.print_to_string().to_string();

  // If an error occurred during the verification of the LLVM module, it means
  // that there is a logic bug present in the lowering code. In such a case, it
  // is acceptable to panic directly, as there is no point in propagating the
  // error.
  if let Err(error_string) = llvm_module.verify() {
    panic!(
      "\n\n====== LLVM MODULE VERIFICATION FAILED ======\n{}\n====== LLVM MODULE STRING ======\n{}\n====== END ======\n",
      error_string.to_string(),
      llvm_module_string
    );
  }

  Ok(llvm_module_string)
}

impl<'a, 'llvm> lowering_ctx::LoweringContext<'a, 'llvm> {
  /// Lower a single declaration, routing it by kind.
  ///
  /// Function declarations yield their IR value; grouped declarations bind
  /// their names internally and yield nothing.
  pub fn lower_decl(
    &mut self,
    decl: &ast::Decl,
  ) -> diagnostic::Maybe<Option<symbol_table::BoundValue<'llvm>>> {
    match decl {
      ast::Decl::Function(function) => Ok(Some(symbol_table::BoundValue::Function(
        self.lower_function_decl(function)?,
      ))),
      ast::Decl::Group(group) => {
        self.lower_group(group)?;

        Ok(None)
      }
      ast::Decl::Bad(span) => Err(vec![diagnostic::Diagnostic::UnhandledDeclaration(*span)]),
    }
  }

  fn lower_group(&mut self, group: &ast::GroupDecl) -> diagnostic::Maybe {
    match group.keyword {
      // Import resolution happens while assembling the unit's declaration
      // graph, before lowering ever runs.
      ast::GroupKeyword::Import => Ok(()),
      ast::GroupKeyword::Type => Err(vec![diagnostic::Diagnostic::UnsupportedTypeDeclaration(
        group.span,
      )]),
      ast::GroupKeyword::Const => {
        for (spec_index, spec) in group.specs.iter().enumerate() {
          self.lower_value_spec(spec, true, spec_index as u64)?;
        }

        Ok(())
      }
      ast::GroupKeyword::Var => {
        for (spec_index, spec) in group.specs.iter().enumerate() {
          self.lower_value_spec(spec, false, spec_index as u64)?;
        }

        Ok(())
      }
    }
  }

  /// Bind every name of one constant or variable specification, in
  /// declaration order, left-to-right.
  ///
  /// Names that already hold an IR value are skipped without re-evaluating
  /// their initializer; names may have been resolved earlier as a dependency
  /// of another declaration. Initializers of blank names are still
  /// evaluated, since expressions may have observable side effects, but the
  /// resulting value is discarded.
  pub(crate) fn lower_value_spec(
    &mut self,
    spec: &std::rc::Rc<ast::ValueSpec>,
    is_const: bool,
    spec_ordinal: u64,
  ) -> diagnostic::Maybe {
    for (index, name) in spec.names.iter().enumerate() {
      match name.binding_id {
        Some(binding_id) => self.resolve_spec_name(binding_id)?,
        // The blank identifier binds nothing, but its initializer's side
        // effects must still execute exactly once. Inside constant groups
        // the enumeration ordinal remains observable to the discarded
        // expression.
        None => {
          if let Some(initializer) = spec.values.get(index) {
            let scope = GroupScope {
              iota: is_const.then(|| {
                self
                  .llvm_module
                  .get_context()
                  .i32_type()
                  .const_int(spec_ordinal, false)
              }),
            };

            self.lower_expr(initializer, &scope)?;
          }
        }
      }
    }

    Ok(())
  }

  /// Resolve a single specification name to an IR value and store it into
  /// the name's binding.
  ///
  /// This is the demand-driven core of constant evaluation: it is reached
  /// both by specification groups lowered in source order and by references
  /// that force a not-yet-bound name while evaluating another declaration.
  pub(crate) fn resolve_spec_name(
    &mut self,
    binding_id: symbol_table::BindingId,
  ) -> diagnostic::Maybe {
    let binding = self
      .bindings
      .get(&binding_id)
      .expect(auxiliary::BUG_NAME_RESOLUTION);

    // Idempotent re-entry: names already materialized keep their value, and
    // their initializers are not evaluated a second time.
    if let symbol_table::BindingState::Bound(..) = binding.state {
      return Ok(());
    }

    let name = binding.name.clone();
    let exported = binding.exported;
    let origin = binding.origin.clone();

    let ordinal = match binding.state {
      symbol_table::BindingState::PendingOrdinal(ordinal) => Some(ordinal),
      _ => None,
    };

    let (spec, index, is_const) = match origin {
      Some(symbol_table::BindingOrigin::Spec {
        spec,
        index,
        is_const,
      }) => (spec, index, is_const),
      _ => unreachable!("{}", auxiliary::BUG_SPEC_ORIGIN),
    };

    log::trace!("resolving specification name `{}`", name);

    // The enumeration ordinal is only meaningful inside constant groups; its
    // IR representation is scoped to the resolution of this single name.
    let scope = GroupScope {
      iota: ordinal.map(|ordinal| {
        self
          .llvm_module
          .get_context()
          .i32_type()
          .const_int(ordinal, false)
      }),
    };

    let value = match spec.values.get(index) {
      Some(initializer) => self.lower_expr(initializer, &scope)?,
      None => None,
    };

    // Non-exported constants that folded to a primitive scalar never need
    // backing storage; the scalar IR value itself substitutes for the name
    // at every reference site.
    if is_const && !exported && value.map(is_foldable_scalar).unwrap_or(false) {
      let llvm_value = value.expect(lowering_ctx::BUG_LLVM_VALUE);

      self
        .bindings
        .bind(binding_id, symbol_table::BoundValue::Direct(llvm_value))?;

      self.bindings.mark_constant(binding_id);

      return Ok(());
    }

    let mut llvm_init = match value {
      Some(llvm_value) => llvm_value,
      None => {
        let type_hint = spec.type_hint.as_ref().ok_or_else(|| {
          vec![diagnostic::Diagnostic::MissingInitializerType(spec.span)]
        })?;

        self.const_zero(self.lower_type(type_hint))
      }
    };

    // When a constant is initialized from another materialized constant
    // global, take that global's initializer instead, so constants are never
    // indirected through another constant's address.
    if is_const {
      if let Some(aliased_init) = self.constant_alias_initializer(spec.values.get(index)) {
        llvm_init = aliased_init;
      }
    }

    let bound_value = self.materialize_global(&name, exported, is_const, llvm_init);

    self.bindings.bind(binding_id, bound_value)
  }

  /// Create a module-level storage slot with the correct initializer,
  /// linkage, constant-ness, and addressing mode.
  fn materialize_global(
    &mut self,
    name: &str,
    exported: bool,
    is_const: bool,
    llvm_init: inkwell::values::BasicValueEnum<'llvm>,
  ) -> symbol_table::BoundValue<'llvm> {
    let llvm_global = self
      .llvm_module
      .add_global(llvm_init.get_type(), None, name);

    llvm_global.set_initializer(&llvm_init);

    if is_const {
      llvm_global.set_constant(true);
    }

    // Exported names keep default linkage so other compilation units can
    // reference them.
    if !exported {
      llvm_global.set_linkage(inkwell::module::Linkage::Internal);
    }

    // Array identifiers already denote the address of their storage by the
    // source language's own semantics; every other global must be loaded
    // before use.
    if llvm_init.get_type().is_array_type() {
      symbol_table::BoundValue::Direct(llvm_global.as_pointer_value().as_basic_value_enum())
    } else {
      symbol_table::BoundValue::Indirect(llvm_global)
    }
  }

  /// If the given initializer expression is a reference to an
  /// already-materialized global, yield that global's stored initializer.
  fn constant_alias_initializer(
    &self,
    initializer: Option<&ast::Expr>,
  ) -> Option<inkwell::values::BasicValueEnum<'llvm>> {
    let ast::Expr::Reference(ident) = initializer? else {
      return None;
    };

    let binding = self.bindings.get(&ident.binding_id?)?;

    match binding.state {
      symbol_table::BindingState::Bound(symbol_table::BoundValue::Indirect(llvm_global)) => {
        llvm_global.get_initializer()
      }
      _ => None,
    }
  }

  /// Produce an IR function for a function declaration and, if a body is
  /// present, populate it.
  pub(crate) fn lower_function_decl(
    &mut self,
    function: &ast::FunctionDecl,
  ) -> diagnostic::Maybe<inkwell::values::FunctionValue<'llvm>> {
    log::trace!("lowering function `{}`", function.name.name);

    let existing_state = function
      .name
      .binding_id
      .and_then(|binding_id| self.bindings.get(&binding_id))
      .map(|binding| binding.state);

    // A reference evaluated before this declaration was visited may already
    // have materialized the prototype; reuse it so both resolve to the same
    // IR function.
    let (llvm_function, reused_proto) = match existing_state {
      Some(symbol_table::BindingState::Bound(symbol_table::BoundValue::Function(
        llvm_function,
      ))) => (llvm_function, true),
      Some(symbol_table::BindingState::Bound(other)) => {
        return Err(vec![diagnostic::Diagnostic::BindingKindMismatch {
          name: function.name.name.clone(),
          expected: "a function",
          found: other.description(),
        }])
      }
      _ => (self.declare_function_proto(function), false),
    };

    let llvm_entry_block = self
      .llvm_module
      .get_context()
      .append_basic_block(llvm_function, "fn.entry");

    self.llvm_builder.position_at_end(llvm_entry_block);

    if let Some(body) = &function.body {
      self.with_function_frame(llvm_function, |lowering_context| {
        lowering_context.lower_block(body)
      })?;
    }

    // Fallthrough completion: a function declared without a return type is
    // `void`, and its body may legally fall off the end. Appending the
    // missing terminator here guarantees that every emitted function is
    // well-formed IR.
    if function.signature.return_type.is_none() {
      let llvm_last_block = llvm_function
        .get_last_basic_block()
        .expect(auxiliary::BUG_BUFFER_CONTRACT);

      let ends_with_return = llvm_last_block
        .get_last_instruction()
        .map(|instruction| instruction.get_opcode() == inkwell::values::InstructionOpcode::Return)
        .unwrap_or(false);

      if !ends_with_return {
        self.llvm_builder.position_at_end(llvm_last_block);

        self
          .llvm_builder
          .build_return(None)
          .expect(BUG_BUILDER_UNSET);
      }
    }

    // Initializer functions would need to be collected into an ordered list
    // invoked before the entry point; that machinery does not exist yet, and
    // their names deliberately stay unbound since several may coexist.
    if function.name.name == INIT_FUNCTION_NAME {
      return Err(vec![diagnostic::Diagnostic::UnsupportedInitFunction(
        function.span,
      )]);
    }

    if !reused_proto {
      if let Some(binding_id) = function.name.binding_id {
        self
          .bindings
          .bind(binding_id, symbol_table::BoundValue::Function(llvm_function))?;
      }
    }

    Ok(llvm_function)
  }

  /// Create the IR prototype for a function declaration.
  pub(crate) fn declare_function_proto(
    &mut self,
    function: &ast::FunctionDecl,
  ) -> inkwell::values::FunctionValue<'llvm> {
    let llvm_function_type = self.lower_signature_type(&function.signature);
    let name = function.name.name.as_str();

    // The native process entry point contract requires this exact name and
    // external linkage.
    if self.options.entry_package && name == ENTRY_POINT_NAME {
      return self.llvm_module.add_function(
        ENTRY_POINT_NAME,
        llvm_function_type,
        Some(inkwell::module::Linkage::External),
      );
    }

    // Initializer functions are anonymous; several may coexist per unit and
    // must not collide on a symbol name.
    let llvm_name = if name == INIT_FUNCTION_NAME { "" } else { name };

    let llvm_function = self
      .llvm_module
      .add_function(llvm_name, llvm_function_type, None);

    llvm_function.set_call_conventions(self.options.calling_convention.llvm_id());

    llvm_function
  }
}

/// Whether the given value is a primitive scalar constant that can
/// substitute for a name without backing storage.
pub(crate) fn is_foldable_scalar(value: inkwell::values::BasicValueEnum<'_>) -> bool {
  match value {
    inkwell::values::BasicValueEnum::IntValue(int_value) => int_value.is_const(),
    inkwell::values::BasicValueEnum::FloatValue(float_value) => float_value.is_const(),
    _ => false,
  }
}
