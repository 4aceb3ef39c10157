extern crate gosling;
extern crate inkwell;

#[cfg(test)]
mod tests {
  use gosling::{ast, declare, diagnostic, lowering, lowering_ctx, symbol_table, types};
  use pretty_assertions::assert_eq;

  fn mock_span() -> ast::Span {
    ast::Span { start: 0, end: 0 }
  }

  fn ident(name: &str, binding_id: usize) -> ast::Ident {
    ast::Ident {
      name: String::from(name),
      binding_id: Some(symbol_table::BindingId(binding_id)),
      span: mock_span(),
    }
  }

  fn blank_ident() -> ast::Ident {
    ast::Ident {
      name: String::from(ast::Ident::BLANK),
      binding_id: None,
      span: mock_span(),
    }
  }

  fn int_lit(value: i64) -> ast::Expr {
    ast::Expr::Literal(ast::Literal::Int {
      value,
      width: types::BitWidth::Width32,
    })
  }

  fn spec(names: Vec<ast::Ident>, values: Vec<ast::Expr>) -> std::rc::Rc<ast::ValueSpec> {
    std::rc::Rc::new(ast::ValueSpec {
      names,
      type_hint: None,
      values,
      span: mock_span(),
    })
  }

  fn group(keyword: ast::GroupKeyword, specs: Vec<std::rc::Rc<ast::ValueSpec>>) -> ast::Decl {
    ast::Decl::Group(std::rc::Rc::new(ast::GroupDecl {
      keyword,
      specs,
      span: mock_span(),
    }))
  }

  fn function(
    name: &str,
    binding_id: usize,
    return_type: Option<types::Type>,
    statements: Vec<ast::Statement>,
  ) -> ast::Decl {
    ast::Decl::Function(std::rc::Rc::new(ast::FunctionDecl {
      name: ident(name, binding_id),
      signature: ast::Signature {
        parameters: Vec::new(),
        return_type,
      },
      body: Some(ast::Block { statements }),
      span: mock_span(),
    }))
  }

  fn module(decls: Vec<ast::Decl>) -> ast::Module {
    ast::Module {
      package_name: String::from("unit_test"),
      decls,
    }
  }

  fn lower_module_into<'a, 'llvm>(
    module: &ast::Module,
    llvm_module: &'a inkwell::module::Module<'llvm>,
    options: lowering_ctx::LoweringOptions,
  ) -> diagnostic::Maybe<lowering_ctx::LoweringContext<'a, 'llvm>> {
    let mut bindings = symbol_table::BindingStore::default();

    declare::declare_module(module, &mut bindings)?;

    let mut lowering_context = lowering_ctx::LoweringContext::new(bindings, llvm_module, options);

    for decl in &module.decls {
      lowering_context.lower_decl(decl)?;
    }

    Ok(lowering_context)
  }

  fn bound_int_constant(
    lowering_context: &lowering_ctx::LoweringContext<'_, '_>,
    binding_id: usize,
  ) -> i64 {
    match lowering_context
      .binding_store()
      .expect_bound(&symbol_table::BindingId(binding_id))
      .unwrap()
    {
      symbol_table::BoundValue::Direct(inkwell::values::BasicValueEnum::IntValue(llvm_value)) => {
        llvm_value
          .get_sign_extended_constant()
          .expect("folded constants should be LLVM integer constants")
      }
      other => panic!("expected a folded integer constant, found {:?}", other),
    }
  }

  fn find_global<'llvm>(
    llvm_module: &inkwell::module::Module<'llvm>,
    name: &str,
  ) -> inkwell::values::GlobalValue<'llvm> {
    llvm_module
      .get_globals()
      .find(|global| global.get_name().to_str() == Ok(name))
      .unwrap_or_else(|| panic!("global `{}` should have been materialized", name))
  }

  #[test]
  fn idempotent_revisits_keep_first_binding() {
    let llvm_context = inkwell::context::Context::create();
    let llvm_module = llvm_context.create_module("unit_test");

    let exported_spec = spec(vec![ident("Exported", 0)], vec![int_lit(7)]);
    let const_group = group(ast::GroupKeyword::Const, vec![exported_spec]);
    let unit = module(vec![const_group.clone()]);

    let mut lowering_context = lower_module_into(
      &unit,
      &llvm_module,
      lowering_ctx::LoweringOptions::default(),
    )
    .unwrap();

    let first_visit = lowering_context
      .binding_store()
      .expect_bound(&symbol_table::BindingId(0))
      .unwrap();

    // Re-visiting the same group must neither allocate a second global nor
    // re-evaluate the initializer.
    lowering_context.lower_decl(&const_group).unwrap();

    let second_visit = lowering_context
      .binding_store()
      .expect_bound(&symbol_table::BindingId(0))
      .unwrap();

    assert_eq!(first_visit, second_visit);
    assert_eq!(1, llvm_module.get_globals().count());
  }

  #[test]
  fn discarded_initializer_side_effect_runs_once() {
    let llvm_context = inkwell::context::Context::create();
    let llvm_module = llvm_context.create_module("unit_test");

    let unit = module(vec![group(
      ast::GroupKeyword::Var,
      vec![spec(
        vec![blank_ident()],
        vec![ast::Expr::Literal(ast::Literal::Str(String::from(
          "observable",
        )))],
      )],
    )]);

    lower_module_into(
      &unit,
      &llvm_module,
      lowering_ctx::LoweringOptions::default(),
    )
    .unwrap();

    // The interned string literal is the initializer's observable side
    // effect; the blank name itself stores nothing.
    assert_eq!(1, llvm_module.get_globals().count());

    assert!(llvm_module
      .get_globals()
      .all(|global| global.get_name().to_str() != Ok(ast::Ident::BLANK)));
  }

  #[test]
  fn iota_groups_are_isolated() {
    let llvm_context = inkwell::context::Context::create();
    let llvm_module = llvm_context.create_module("unit_test");

    // Group A's first initializer depends on group B, which is declared
    // later and itself enumerates with the ordinal. Resolving B in the
    // middle of A's evaluation must not disturb A's ordinals.
    let group_a = group(
      ast::GroupKeyword::Const,
      vec![
        spec(
          vec![ident("a0", 0)],
          vec![ast::Expr::BinaryOp(std::rc::Rc::new(ast::BinaryOp {
            operator: ast::BinaryOperator::Add,
            left_operand: ast::Expr::Iota(mock_span()),
            right_operand: ast::Expr::Reference(ident("b1", 11)),
            span: mock_span(),
          }))],
        ),
        spec(vec![ident("a1", 1)], Vec::new()),
      ],
    );

    let group_b = group(
      ast::GroupKeyword::Const,
      vec![
        spec(vec![ident("b0", 10)], vec![ast::Expr::Iota(mock_span())]),
        spec(vec![ident("b1", 11)], Vec::new()),
      ],
    );

    let unit = module(vec![group_a, group_b]);

    let lowering_context = lower_module_into(
      &unit,
      &llvm_module,
      lowering_ctx::LoweringOptions::default(),
    )
    .unwrap();

    assert_eq!(1, bound_int_constant(&lowering_context, 0));
    assert_eq!(2, bound_int_constant(&lowering_context, 1));
    assert_eq!(0, bound_int_constant(&lowering_context, 10));
    assert_eq!(1, bound_int_constant(&lowering_context, 11));
  }

  #[test]
  fn non_exported_primitive_constant_folds_inline() {
    let llvm_context = inkwell::context::Context::create();
    let llvm_module = llvm_context.create_module("unit_test");

    let unit = module(vec![group(
      ast::GroupKeyword::Const,
      vec![spec(vec![ident("answer", 0)], vec![int_lit(42)])],
    )]);

    let lowering_context = lower_module_into(
      &unit,
      &llvm_module,
      lowering_ctx::LoweringOptions::default(),
    )
    .unwrap();

    assert_eq!(42, bound_int_constant(&lowering_context, 0));
    assert_eq!(0, llvm_module.get_globals().count());

    assert_eq!(
      symbol_table::BindingKind::Constant,
      lowering_context
        .binding_store()
        .get(&symbol_table::BindingId(0))
        .unwrap()
        .kind
    );
  }

  #[test]
  fn exported_constant_materializes_with_default_linkage() {
    let llvm_context = inkwell::context::Context::create();
    let llvm_module = llvm_context.create_module("unit_test");

    let unit = module(vec![group(
      ast::GroupKeyword::Const,
      vec![spec(vec![ident("Answer", 0)], vec![int_lit(42)])],
    )]);

    let lowering_context = lower_module_into(
      &unit,
      &llvm_module,
      lowering_ctx::LoweringOptions::default(),
    )
    .unwrap();

    assert!(matches!(
      lowering_context
        .binding_store()
        .expect_bound(&symbol_table::BindingId(0))
        .unwrap(),
      symbol_table::BoundValue::Indirect(..)
    ));

    assert_eq!(
      inkwell::module::Linkage::External,
      find_global(&llvm_module, "Answer").get_linkage()
    );
  }

  #[test]
  fn non_exported_non_primitive_constant_gets_internal_linkage() {
    let llvm_context = inkwell::context::Context::create();
    let llvm_module = llvm_context.create_module("unit_test");

    let unit = module(vec![group(
      ast::GroupKeyword::Const,
      vec![spec(
        vec![ident("greeting", 0)],
        vec![ast::Expr::Literal(ast::Literal::Str(String::from("hello")))],
      )],
    )]);

    lower_module_into(
      &unit,
      &llvm_module,
      lowering_ctx::LoweringOptions::default(),
    )
    .unwrap();

    assert_eq!(
      inkwell::module::Linkage::Internal,
      find_global(&llvm_module, "greeting").get_linkage()
    );
  }

  #[test]
  fn array_globals_are_direct_and_scalars_indirect() {
    let llvm_context = inkwell::context::Context::create();
    let llvm_module = llvm_context.create_module("unit_test");

    let array_literal = ast::Expr::ArrayLit(std::rc::Rc::new(ast::ArrayLit {
      element_type: types::Type::Int(types::BitWidth::Width32),
      elements: vec![int_lit(1), int_lit(2), int_lit(3)],
      span: mock_span(),
    }));

    let unit = module(vec![group(
      ast::GroupKeyword::Var,
      vec![spec(
        vec![ident("table", 0), ident("scalar", 1)],
        vec![array_literal, int_lit(5)],
      )],
    )]);

    let lowering_context = lower_module_into(
      &unit,
      &llvm_module,
      lowering_ctx::LoweringOptions::default(),
    )
    .unwrap();

    // Array identifiers already denote their storage address, so no
    // indirection tag applies to them.
    assert!(matches!(
      lowering_context
        .binding_store()
        .expect_bound(&symbol_table::BindingId(0))
        .unwrap(),
      symbol_table::BoundValue::Direct(inkwell::values::BasicValueEnum::PointerValue(..))
    ));

    assert!(matches!(
      lowering_context
        .binding_store()
        .expect_bound(&symbol_table::BindingId(1))
        .unwrap(),
      symbol_table::BoundValue::Indirect(..)
    ));
  }

  #[test]
  fn constant_alias_inlines_aliased_initializer() {
    let llvm_context = inkwell::context::Context::create();
    let llvm_module = llvm_context.create_module("unit_test");

    let unit = module(vec![
      group(
        ast::GroupKeyword::Const,
        vec![spec(vec![ident("Origin", 0)], vec![int_lit(40)])],
      ),
      group(
        ast::GroupKeyword::Const,
        vec![spec(
          vec![ident("alias", 1)],
          vec![ast::Expr::Reference(ident("Origin", 0))],
        )],
      ),
    ]);

    let lowering_context = lower_module_into(
      &unit,
      &llvm_module,
      lowering_ctx::LoweringOptions::default(),
    )
    .unwrap();

    // The alias must not be indirected through the origin's address; it
    // inherits the stored initializer itself.
    let symbol_table::BoundValue::Indirect(llvm_alias_global) = lowering_context
      .binding_store()
      .expect_bound(&symbol_table::BindingId(1))
      .unwrap()
    else {
      panic!("aliased constant should have been materialized");
    };

    let llvm_initializer = llvm_alias_global
      .get_initializer()
      .expect("materialized constants should carry an initializer");

    assert_eq!(
      Some(40),
      llvm_initializer
        .into_int_value()
        .get_sign_extended_constant()
    );
  }

  #[test]
  fn void_fallthrough_gets_exactly_one_return() {
    let llvm_context = inkwell::context::Context::create();
    let llvm_module = llvm_context.create_module("unit_test");

    let unit = module(vec![
      function("falls_through", 0, None, Vec::new()),
      function("explicit_return", 1, None, vec![ast::Statement::Return(None)]),
    ]);

    lower_module_into(
      &unit,
      &llvm_module,
      lowering_ctx::LoweringOptions::default(),
    )
    .unwrap();

    for name in ["falls_through", "explicit_return"] {
      let llvm_function = llvm_module.get_function(name).unwrap();
      let llvm_entry_block = llvm_function.get_last_basic_block().unwrap();
      let llvm_terminator = llvm_entry_block.get_last_instruction().unwrap();

      assert_eq!(
        inkwell::values::InstructionOpcode::Return,
        llvm_terminator.get_opcode()
      );

      // Exactly one instruction: the single return, whether written in the
      // source body or appended by fallthrough completion.
      assert_eq!(
        llvm_entry_block.get_first_instruction().unwrap(),
        llvm_terminator
      );
    }
  }

  #[test]
  fn forward_reference_resolves_to_single_function() {
    let llvm_context = inkwell::context::Context::create();
    let llvm_module = llvm_context.create_module("unit_test");

    let call_forward = ast::Statement::Expr(ast::Expr::Call(std::rc::Rc::new(ast::CallSite {
      callee: ident("late", 1),
      arguments: Vec::new(),
      span: mock_span(),
    })));

    let unit = module(vec![
      function("early", 0, None, vec![call_forward]),
      function("late", 1, None, Vec::new()),
    ]);

    let lowering_context = lower_module_into(
      &unit,
      &llvm_module,
      lowering_ctx::LoweringOptions::default(),
    )
    .unwrap();

    assert_eq!(
      1,
      llvm_module
        .get_functions()
        .filter(|function| function.get_name().to_str() == Ok("late"))
        .count()
    );

    // The reference evaluated before the declaration and the declaration
    // itself resolve to the same IR function.
    assert_eq!(
      symbol_table::BoundValue::Function(llvm_module.get_function("late").unwrap()),
      lowering_context
        .binding_store()
        .expect_bound(&symbol_table::BindingId(1))
        .unwrap()
    );
  }

  #[test]
  fn shared_ordinal_expression_slots_enumerate() {
    let llvm_context = inkwell::context::Context::create();
    let llvm_module = llvm_context.create_module("unit_test");

    let unit = module(vec![group(
      ast::GroupKeyword::Const,
      vec![
        spec(vec![ident("a", 0)], vec![ast::Expr::Iota(mock_span())]),
        spec(vec![ident("b", 1)], Vec::new()),
        spec(vec![ident("c", 2)], Vec::new()),
      ],
    )]);

    let lowering_context = lower_module_into(
      &unit,
      &llvm_module,
      lowering_ctx::LoweringOptions::default(),
    )
    .unwrap();

    assert_eq!(0, bound_int_constant(&lowering_context, 0));
    assert_eq!(1, bound_int_constant(&lowering_context, 1));
    assert_eq!(2, bound_int_constant(&lowering_context, 2));

    // None are exported, so none may be materialized.
    assert_eq!(0, llvm_module.get_globals().count());
  }

  #[test]
  fn type_declarations_are_rejected() {
    let llvm_context = inkwell::context::Context::create();
    let llvm_module = llvm_context.create_module("unit_test");
    let unit = module(vec![group(ast::GroupKeyword::Type, Vec::new())]);

    let result = lower_module_into(
      &unit,
      &llvm_module,
      lowering_ctx::LoweringOptions::default(),
    );

    assert!(matches!(
      result.err().as_deref(),
      Some([diagnostic::Diagnostic::UnsupportedTypeDeclaration(..)])
    ));
  }

  #[test]
  fn unhandled_declarations_report_their_position() {
    let llvm_context = inkwell::context::Context::create();
    let llvm_module = llvm_context.create_module("unit_test");
    let unit = module(vec![ast::Decl::Bad(ast::Span { start: 3, end: 9 })]);

    let result = lower_module_into(
      &unit,
      &llvm_module,
      lowering_ctx::LoweringOptions::default(),
    );

    assert!(matches!(
      result.err().as_deref(),
      Some([diagnostic::Diagnostic::UnhandledDeclaration(ast::Span {
        start: 3,
        end: 9
      })])
    ));
  }

  #[test]
  fn init_functions_are_unimplemented() {
    let llvm_context = inkwell::context::Context::create();
    let llvm_module = llvm_context.create_module("unit_test");
    let unit = module(vec![function("init", 0, None, Vec::new())]);

    let result = lower_module_into(
      &unit,
      &llvm_module,
      lowering_ctx::LoweringOptions::default(),
    );

    assert!(matches!(
      result.err().as_deref(),
      Some([diagnostic::Diagnostic::UnsupportedInitFunction(..)])
    ));
  }

  #[test]
  fn entry_point_keeps_exact_name_and_external_linkage() {
    let llvm_context = inkwell::context::Context::create();
    let llvm_module = llvm_context.create_module("main");

    let unit = ast::Module {
      package_name: String::from("main"),
      decls: vec![
        function("main", 0, None, Vec::new()),
        function("helper", 1, None, Vec::new()),
      ],
    };

    let options = lowering_ctx::LoweringOptions {
      entry_package: true,
      ..Default::default()
    };

    lower_module_into(&unit, &llvm_module, options).unwrap();

    let llvm_main = llvm_module.get_function("main").unwrap();

    assert_eq!(inkwell::module::Linkage::External, llvm_main.get_linkage());

    // The entry point keeps the default C convention, while ordinary
    // functions follow the configured policy (fast by default).
    assert_eq!(0, llvm_main.get_call_conventions());

    assert_eq!(
      8,
      llvm_module
        .get_function("helper")
        .unwrap()
        .get_call_conventions()
    );
  }

  #[test]
  fn calling_convention_policy_is_configurable() {
    let llvm_context = inkwell::context::Context::create();
    let llvm_module = llvm_context.create_module("unit_test");
    let unit = module(vec![function("helper", 0, None, Vec::new())]);

    let options = lowering_ctx::LoweringOptions {
      entry_package: false,
      calling_convention: lowering_ctx::CallConvention::C,
    };

    lower_module_into(&unit, &llvm_module, options).unwrap();

    assert_eq!(
      0,
      llvm_module
        .get_function("helper")
        .unwrap()
        .get_call_conventions()
    );
  }

  #[test]
  fn lower_unit_emits_verified_ir() {
    let unit = ast::Module {
      package_name: String::from("main"),
      decls: vec![
        group(
          ast::GroupKeyword::Const,
          vec![spec(vec![ident("Limit", 0)], vec![int_lit(8)])],
        ),
        group(
          ast::GroupKeyword::Var,
          vec![spec(vec![ident("counter", 1)], vec![int_lit(0)])],
        ),
        function("main", 2, None, Vec::new()),
      ],
    };

    let llvm_ir_output =
      lowering::lower_unit(&unit, lowering_ctx::LoweringOptions::default()).unwrap();

    assert!(llvm_ir_output.contains("define void @main()"));
    assert!(llvm_ir_output.contains("@Limit"));
    assert!(llvm_ir_output.contains("@counter"));
  }
}
