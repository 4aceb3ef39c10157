//! Lowering of the expression and statement subset that declaration lowering
//! exercises: initializer expressions of constant and variable
//! specifications, and the statements of function bodies.
//!
//! Expression lowering is demand-driven with respect to bindings: a
//! reference to a name that has not been materialized yet forces its
//! resolution on the spot, which is how forward references and mutual
//! recursion resolve to a single IR value. Outside of a function body no
//! instructions can be emitted, so package-scope expressions must reduce to
//! constants; anything else is deferred initialization, which belongs to the
//! unimplemented unit-initializer machinery.

use crate::{ast, auxiliary, diagnostic, lowering, lowering_ctx, symbol_table, types};
use inkwell::values::BasicValue;

impl<'a, 'llvm> lowering_ctx::LoweringContext<'a, 'llvm> {
  pub(crate) fn lower_expr(
    &mut self,
    expr: &ast::Expr,
    scope: &lowering::GroupScope<'llvm>,
  ) -> diagnostic::Maybe<Option<inkwell::values::BasicValueEnum<'llvm>>> {
    match expr {
      ast::Expr::Literal(literal) => Ok(Some(self.lower_literal(literal))),
      ast::Expr::Iota(span) => match scope.iota {
        Some(llvm_ordinal) => Ok(Some(llvm_ordinal.as_basic_value_enum())),
        None => Err(vec![diagnostic::Diagnostic::IotaOutsideConstGroup(*span)]),
      },
      ast::Expr::Reference(ident) => self.lower_reference(ident),
      ast::Expr::BinaryOp(binary_op) => self.lower_binary_op(binary_op, scope),
      ast::Expr::ArrayLit(array) => self.lower_array_literal(array, scope),
      ast::Expr::Call(call_site) => self.lower_call(call_site, scope),
    }
  }

  fn lower_literal(
    &mut self,
    literal: &ast::Literal,
  ) -> inkwell::values::BasicValueEnum<'llvm> {
    let llvm_context = self.llvm_module.get_context();

    match literal {
      ast::Literal::Bool(value) => llvm_context
        .bool_type()
        .const_int(*value as u64, false)
        .as_basic_value_enum(),
      ast::Literal::Int { value, width } => llvm_context
        .custom_width_int_type(width.bit_count())
        .const_int(*value as u64, *value < 0)
        .as_basic_value_enum(),
      ast::Literal::Float { value, width } => match width {
        types::BitWidth::Width32 => llvm_context.f32_type(),
        types::BitWidth::Width64 => llvm_context.f64_type(),
        _ => unreachable!("the frontend only produces 32 and 64-bit floating-point literals"),
      }
      .const_float(*value)
      .as_basic_value_enum(),
      ast::Literal::Str(string) => self.intern_or_get_string(string),
    }
  }

  /// Resolve an identifier's binding to an IR value, materializing it on
  /// demand if this reference arrives before its declaration was visited.
  pub(crate) fn force_binding(
    &mut self,
    ident: &ast::Ident,
  ) -> diagnostic::Maybe<symbol_table::BoundValue<'llvm>> {
    let Some(binding_id) = ident.binding_id else {
      return Err(vec![diagnostic::Diagnostic::UndefinedReference(
        ident.name.clone(),
        ident.span,
      )]);
    };

    let binding = self
      .bindings
      .get(&binding_id)
      .expect(auxiliary::BUG_NAME_RESOLUTION);

    if let symbol_table::BindingState::Bound(value) = binding.state {
      return Ok(value);
    }

    match binding.origin.clone() {
      Some(symbol_table::BindingOrigin::Function(function)) => {
        // Forward reference to a function: materialize the prototype now and
        // bind it, so the declaration reuses the same IR function later.
        let llvm_function = self.declare_function_proto(&function);

        self
          .bindings
          .bind(binding_id, symbol_table::BoundValue::Function(llvm_function))?;

        Ok(symbol_table::BoundValue::Function(llvm_function))
      }
      Some(symbol_table::BindingOrigin::Spec { .. }) => {
        self.resolve_spec_name(binding_id)?;

        self.bindings.expect_bound(&binding_id)
      }
      None => Err(vec![diagnostic::Diagnostic::UndefinedReference(
        ident.name.clone(),
        ident.span,
      )]),
    }
  }

  fn lower_reference(
    &mut self,
    ident: &ast::Ident,
  ) -> diagnostic::Maybe<Option<inkwell::values::BasicValueEnum<'llvm>>> {
    let bound_value = self.force_binding(ident)?;

    Ok(Some(match bound_value {
      symbol_table::BoundValue::Direct(llvm_value) => llvm_value,
      symbol_table::BoundValue::Function(llvm_function) => {
        llvm_function.as_global_value().as_basic_value_enum()
      }
      symbol_table::BoundValue::Indirect(llvm_global) => {
        if self.current_function().is_some() {
          let llvm_pointee_type = llvm_global
            .get_initializer()
            .expect(auxiliary::BUG_GLOBAL_INITIALIZER)
            .get_type();

          self
            .llvm_builder
            .build_load(
              llvm_pointee_type,
              llvm_global.as_pointer_value(),
              &format!("access.{}", ident.name),
            )
            .expect(lowering::BUG_BUILDER_UNSET)
        } else {
          // At package scope the identifier denotes the global's address;
          // constant consumers fold through the stored initializer rather
          // than loading.
          llvm_global.as_pointer_value().as_basic_value_enum()
        }
      }
    }))
  }

  fn lower_binary_op(
    &mut self,
    binary_op: &ast::BinaryOp,
    scope: &lowering::GroupScope<'llvm>,
  ) -> diagnostic::Maybe<Option<inkwell::values::BasicValueEnum<'llvm>>> {
    let llvm_left_operand = self
      .lower_expr(&binary_op.left_operand, scope)?
      .expect(lowering_ctx::BUG_LLVM_VALUE);

    let llvm_right_operand = self
      .lower_expr(&binary_op.right_operand, scope)?
      .expect(lowering_ctx::BUG_LLVM_VALUE);

    if self.current_function().is_none() {
      return fold_constant_binary_op(
        binary_op.operator,
        llvm_left_operand,
        llvm_right_operand,
        binary_op.span,
      )
      .map(Some);
    }

    let llvm_value = match (llvm_left_operand, llvm_right_operand) {
      (
        inkwell::values::BasicValueEnum::IntValue(llvm_left),
        inkwell::values::BasicValueEnum::IntValue(llvm_right),
      ) => match binary_op.operator {
        ast::BinaryOperator::Add => self
          .llvm_builder
          .build_int_add(llvm_left, llvm_right, "int.add"),
        ast::BinaryOperator::Subtract => self
          .llvm_builder
          .build_int_sub(llvm_left, llvm_right, "int.sub"),
        ast::BinaryOperator::Multiply => self
          .llvm_builder
          .build_int_mul(llvm_left, llvm_right, "int.mul"),
        ast::BinaryOperator::Divide => self
          .llvm_builder
          .build_int_signed_div(llvm_left, llvm_right, "int.div"),
        ast::BinaryOperator::ShiftLeft => self
          .llvm_builder
          .build_left_shift(llvm_left, llvm_right, "int.shl"),
      }
      .expect(lowering::BUG_BUILDER_UNSET)
      .as_basic_value_enum(),
      (
        inkwell::values::BasicValueEnum::FloatValue(llvm_left),
        inkwell::values::BasicValueEnum::FloatValue(llvm_right),
      ) => match binary_op.operator {
        ast::BinaryOperator::Add => self
          .llvm_builder
          .build_float_add(llvm_left, llvm_right, "float.add"),
        ast::BinaryOperator::Subtract => self
          .llvm_builder
          .build_float_sub(llvm_left, llvm_right, "float.sub"),
        ast::BinaryOperator::Multiply => self
          .llvm_builder
          .build_float_mul(llvm_left, llvm_right, "float.mul"),
        ast::BinaryOperator::Divide => self
          .llvm_builder
          .build_float_div(llvm_left, llvm_right, "float.div"),
        ast::BinaryOperator::ShiftLeft => {
          unreachable!("the frontend rejects shift operations on floating-point operands")
        }
      }
      .expect(lowering::BUG_BUILDER_UNSET)
      .as_basic_value_enum(),
      // After upstream type checking, both operands are of the same scalar
      // type.
      _ => unreachable!("binary operands should share a scalar type after type checking"),
    };

    Ok(Some(llvm_value))
  }

  fn lower_array_literal(
    &mut self,
    array: &ast::ArrayLit,
    scope: &lowering::GroupScope<'llvm>,
  ) -> diagnostic::Maybe<Option<inkwell::values::BasicValueEnum<'llvm>>> {
    let llvm_element_type = self.lower_type(&array.element_type);
    let mut llvm_elements = Vec::with_capacity(array.elements.len());

    for element in &array.elements {
      llvm_elements.push(
        self
          .lower_expr(element, scope)?
          .expect(lowering_ctx::BUG_LLVM_VALUE),
      );
    }

    let llvm_array = match llvm_element_type {
      inkwell::types::BasicTypeEnum::IntType(llvm_int_type) => llvm_int_type.const_array(
        llvm_elements
          .iter()
          .map(|element| element.into_int_value())
          .collect::<Vec<_>>()
          .as_slice(),
      ),
      inkwell::types::BasicTypeEnum::FloatType(llvm_float_type) => llvm_float_type.const_array(
        llvm_elements
          .iter()
          .map(|element| element.into_float_value())
          .collect::<Vec<_>>()
          .as_slice(),
      ),
      inkwell::types::BasicTypeEnum::PointerType(llvm_pointer_type) => llvm_pointer_type
        .const_array(
          llvm_elements
            .iter()
            .map(|element| element.into_pointer_value())
            .collect::<Vec<_>>()
            .as_slice(),
        ),
      _ => {
        return Err(vec![diagnostic::Diagnostic::UnsupportedArrayElementType(
          array.span,
        )])
      }
    };

    Ok(Some(llvm_array.as_basic_value_enum()))
  }

  fn lower_call(
    &mut self,
    call_site: &ast::CallSite,
    scope: &lowering::GroupScope<'llvm>,
  ) -> diagnostic::Maybe<Option<inkwell::values::BasicValueEnum<'llvm>>> {
    // Emitting a call requires a position inside a function; an initializer
    // that needs one is deferred initialization, which is part of the same
    // unimplemented machinery as `init` functions.
    if self.current_function().is_none() {
      return Err(vec![diagnostic::Diagnostic::NonConstantGlobalInitializer(
        call_site.span,
      )]);
    }

    let callee = self.force_binding(&call_site.callee)?;

    let llvm_callee = match callee {
      symbol_table::BoundValue::Function(llvm_function) => llvm_function,
      other => {
        return Err(vec![diagnostic::Diagnostic::BindingKindMismatch {
          name: call_site.callee.name.clone(),
          expected: "a function",
          found: other.description(),
        }])
      }
    };

    let mut llvm_arguments = Vec::with_capacity(call_site.arguments.len());

    for argument in &call_site.arguments {
      llvm_arguments.push(
        self
          .lower_expr(argument, scope)?
          .expect(lowering_ctx::BUG_LLVM_VALUE)
          .into(),
      );
    }

    let llvm_call = self
      .llvm_builder
      .build_direct_call(llvm_callee, llvm_arguments.as_slice(), "call")
      .expect(lowering::BUG_BUILDER_UNSET);

    Ok(llvm_call.try_as_basic_value().left())
  }

  pub(crate) fn lower_block(&mut self, block: &ast::Block) -> diagnostic::Maybe {
    for statement in &block.statements {
      self.lower_statement(statement)?;

      // Do not continue lowering statements once the current block has been
      // terminated.
      if self.get_current_block().get_terminator().is_some() {
        break;
      }
    }

    Ok(())
  }

  fn lower_statement(&mut self, statement: &ast::Statement) -> diagnostic::Maybe {
    // Statements evaluate outside any constant group, so no enumeration
    // ordinal is in scope.
    let scope = lowering::GroupScope::default();

    match statement {
      ast::Statement::Expr(expr) => {
        self.lower_expr(expr, &scope)?;
      }
      ast::Statement::Return(value) => {
        let llvm_value = match value {
          Some(expr) => self.lower_expr(expr, &scope)?,
          None => None,
        };

        match llvm_value {
          Some(llvm_value) => self
            .llvm_builder
            .build_return(Some(&llvm_value))
            .expect(lowering::BUG_BUILDER_UNSET),
          None => self
            .llvm_builder
            .build_return(None)
            .expect(lowering::BUG_BUILDER_UNSET),
        };
      }
    }

    Ok(())
  }
}

/// Fold a binary operation over two scalar constants at compile time.
///
/// Package-scope expressions cannot emit instructions, so operands that are
/// not constants at this point cannot be lowered at all.
fn fold_constant_binary_op<'llvm>(
  operator: ast::BinaryOperator,
  llvm_left_operand: inkwell::values::BasicValueEnum<'llvm>,
  llvm_right_operand: inkwell::values::BasicValueEnum<'llvm>,
  span: ast::Span,
) -> diagnostic::Maybe<inkwell::values::BasicValueEnum<'llvm>> {
  match (llvm_left_operand, llvm_right_operand) {
    (
      inkwell::values::BasicValueEnum::IntValue(llvm_left),
      inkwell::values::BasicValueEnum::IntValue(llvm_right),
    ) => {
      let (Some(left), Some(right)) = (
        llvm_left.get_sign_extended_constant(),
        llvm_right.get_sign_extended_constant(),
      ) else {
        return Err(vec![diagnostic::Diagnostic::NonConstantGlobalInitializer(
          span,
        )]);
      };

      let folded = match operator {
        ast::BinaryOperator::Add => left.wrapping_add(right),
        ast::BinaryOperator::Subtract => left.wrapping_sub(right),
        ast::BinaryOperator::Multiply => left.wrapping_mul(right),
        ast::BinaryOperator::Divide => {
          if right == 0 {
            return Err(vec![diagnostic::Diagnostic::DivisionByZeroInConstant(
              span,
            )]);
          }

          left.wrapping_div(right)
        }
        ast::BinaryOperator::ShiftLeft => left.wrapping_shl(right as u32),
      };

      Ok(
        llvm_left
          .get_type()
          .const_int(folded as u64, folded < 0)
          .as_basic_value_enum(),
      )
    }
    (
      inkwell::values::BasicValueEnum::FloatValue(llvm_left),
      inkwell::values::BasicValueEnum::FloatValue(llvm_right),
    ) => {
      let (Some((left, _)), Some((right, _))) =
        (llvm_left.get_constant(), llvm_right.get_constant())
      else {
        return Err(vec![diagnostic::Diagnostic::NonConstantGlobalInitializer(
          span,
        )]);
      };

      let folded = match operator {
        ast::BinaryOperator::Add => left + right,
        ast::BinaryOperator::Subtract => left - right,
        ast::BinaryOperator::Multiply => left * right,
        ast::BinaryOperator::Divide => left / right,
        ast::BinaryOperator::ShiftLeft => {
          unreachable!("the frontend rejects shift operations on floating-point operands")
        }
      };

      Ok(
        llvm_left
          .get_type()
          .const_float(folded)
          .as_basic_value_enum(),
      )
    }
    _ => Err(vec![diagnostic::Diagnostic::NonConstantGlobalInitializer(
      span,
    )]),
  }
}
