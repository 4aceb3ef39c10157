//! The lowering context owns the LLVM buffers and binding store shared by
//! every declaration visited within one compilation unit, along with the
//! type-translation and IR plumbing helpers that declaration lowering builds
//! on.

use crate::{ast, auxiliary, symbol_table, types};
use inkwell::{types::BasicType, values::BasicValue};

pub(crate) const BUG_LLVM_VALUE: &str = "should always yield an LLVM value";

/// The calling convention applied to functions that are not the process
/// entry point.
///
/// The reference behavior is to use the fast convention unconditionally,
/// which is not necessarily valid at external-linkage boundaries; the choice
/// is therefore a policy configured by the driver rather than a hardcoded
/// default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallConvention {
  Fast,
  C,
}

impl CallConvention {
  pub(crate) fn llvm_id(self) -> u32 {
    // LLVM's numeric ids for `fastcc` and `ccc`.
    match self {
      CallConvention::Fast => 8,
      CallConvention::C => 0,
    }
  }
}

impl Default for CallConvention {
  fn default() -> Self {
    CallConvention::Fast
  }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoweringOptions {
  /// Whether the unit being lowered belongs to the program entry package,
  /// whose `main` function is the native process entry point.
  pub entry_package: bool,
  pub calling_convention: CallConvention,
}

pub struct LoweringContext<'a, 'llvm> {
  pub(crate) llvm_builder: inkwell::builder::Builder<'llvm>,
  pub(crate) llvm_module: &'a inkwell::module::Module<'llvm>,
  pub(crate) bindings: symbol_table::BindingStore<'llvm>,
  /// The stack of functions currently being lowered, innermost last.
  ///
  /// Pushed on entry to a function's body and popped on exit; balance is
  /// maintained on every exit path, including fatal ones, via
  /// [`LoweringContext::with_function_frame`].
  pub(crate) function_stack: Vec<inkwell::values::FunctionValue<'llvm>>,
  /// Contains a mapping of interned string literals to their LLVM value.
  ///
  /// This serves as a cache to avoid re-creating the same string literal
  /// multiple times.
  interned_string_literals:
    std::collections::HashMap<String, inkwell::values::BasicValueEnum<'llvm>>,
  pub(crate) options: LoweringOptions,
}

impl<'a, 'llvm> LoweringContext<'a, 'llvm> {
  pub fn new(
    bindings: symbol_table::BindingStore<'llvm>,
    llvm_module: &'a inkwell::module::Module<'llvm>,
    options: LoweringOptions,
  ) -> Self {
    Self {
      llvm_builder: llvm_module.get_context().create_builder(),
      llvm_module,
      bindings,
      function_stack: Vec::new(),
      interned_string_literals: std::collections::HashMap::new(),
      options,
    }
  }

  pub fn binding_store(&self) -> &symbol_table::BindingStore<'llvm> {
    &self.bindings
  }

  /// The function whose body is currently being lowered, if any.
  pub(crate) fn current_function(&self) -> Option<inkwell::values::FunctionValue<'llvm>> {
    self.function_stack.last().copied()
  }

  /// Run `scope` with the given function pushed onto the nesting stack.
  ///
  /// The function is popped again on every exit path, including when `scope`
  /// aborts with diagnostics, so a failed declaration cannot corrupt the
  /// stack observed by declarations processed afterwards.
  pub(crate) fn with_function_frame<T>(
    &mut self,
    llvm_function: inkwell::values::FunctionValue<'llvm>,
    scope: impl FnOnce(&mut Self) -> crate::diagnostic::Maybe<T>,
  ) -> crate::diagnostic::Maybe<T> {
    self.function_stack.push(llvm_function);

    let result = scope(self);

    self.function_stack.pop();

    result
  }

  /// Forcefully retrieve the current LLVM basic block.
  ///
  /// # Panics
  ///
  /// If the LLVM builder is not positioned within a block, this operation
  /// will panic.
  pub(crate) fn get_current_block(&self) -> inkwell::basic_block::BasicBlock<'llvm> {
    self
      .llvm_builder
      .get_insert_block()
      .expect(auxiliary::BUG_BUFFER_CONTRACT)
  }

  /// Lower the given source type into its corresponding LLVM basic type.
  pub(crate) fn lower_type(&self, ty: &types::Type) -> inkwell::types::BasicTypeEnum<'llvm> {
    let llvm_context = self.llvm_module.get_context();

    match ty {
      types::Type::Bool => llvm_context.bool_type().as_basic_type_enum(),
      types::Type::Int(width) | types::Type::Uint(width) => llvm_context
        .custom_width_int_type(width.bit_count())
        .as_basic_type_enum(),
      types::Type::Float(width) => match width {
        types::BitWidth::Width32 => llvm_context.f32_type().as_basic_type_enum(),
        types::BitWidth::Width64 => llvm_context.f64_type().as_basic_type_enum(),
        _ => unreachable!("the frontend only produces 32 and 64-bit floating-point types"),
      },
      types::Type::Str => llvm_context
        .i8_type()
        .ptr_type(inkwell::AddressSpace::default())
        .as_basic_type_enum(),
      types::Type::Array { element, length } => self
        .lower_type(element)
        .array_type(*length as u32)
        .as_basic_type_enum(),
    }
  }

  /// Lower a function signature into its corresponding LLVM function type.
  ///
  /// A signature without a return type lowers to a `void` function type.
  pub(crate) fn lower_signature_type(
    &self,
    signature: &ast::Signature,
  ) -> inkwell::types::FunctionType<'llvm> {
    let llvm_parameter_types = signature
      .parameters
      .iter()
      .map(|parameter| self.lower_type(&parameter.ty).into())
      .collect::<Vec<_>>();

    match &signature.return_type {
      Some(return_type) => self
        .lower_type(return_type)
        .fn_type(llvm_parameter_types.as_slice(), false),
      None => self
        .llvm_module
        .get_context()
        .void_type()
        .fn_type(llvm_parameter_types.as_slice(), false),
    }
  }

  /// The zero value of the given LLVM type, used for variable specifications
  /// that declare storage without an initializer expression.
  pub(crate) fn const_zero(
    &self,
    llvm_type: inkwell::types::BasicTypeEnum<'llvm>,
  ) -> inkwell::values::BasicValueEnum<'llvm> {
    match llvm_type {
      inkwell::types::BasicTypeEnum::IntType(int_type) => {
        int_type.const_zero().as_basic_value_enum()
      }
      inkwell::types::BasicTypeEnum::FloatType(float_type) => {
        float_type.const_zero().as_basic_value_enum()
      }
      inkwell::types::BasicTypeEnum::ArrayType(array_type) => {
        array_type.const_zero().as_basic_value_enum()
      }
      inkwell::types::BasicTypeEnum::PointerType(pointer_type) => {
        pointer_type.const_null().as_basic_value_enum()
      }
      _ => unreachable!("type lowering only produces integer, float, array and pointer types"),
    }
  }

  /// Memoize a global string literal.
  ///
  /// If the given string literal has already been interned, the memoized
  /// value is returned and no new global is created. String globals are
  /// created directly on the module, so interning works both at package
  /// scope and inside function bodies.
  pub(crate) fn intern_or_get_string(
    &mut self,
    string: &str,
  ) -> inkwell::values::BasicValueEnum<'llvm> {
    if let Some(llvm_existing_value) = self.interned_string_literals.get(string) {
      return llvm_existing_value.to_owned();
    }

    let llvm_string = self
      .llvm_module
      .get_context()
      .const_string(string.as_bytes(), true);

    let llvm_global = self
      .llvm_module
      .add_global(llvm_string.get_type(), None, "str.literal");

    llvm_global.set_initializer(&llvm_string);
    llvm_global.set_constant(true);
    llvm_global.set_linkage(inkwell::module::Linkage::Private);

    let llvm_value = llvm_global.as_pointer_value().as_basic_value_enum();

    self
      .interned_string_literals
      .insert(string.to_owned(), llvm_value);

    llvm_value
  }
}
