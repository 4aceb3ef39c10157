//! The declare step walks a compilation unit's declaration graph and creates
//! one binding record per declared package-level name, before any lowering
//! takes place.
//!
//! Besides registering names, this step resolves two things that lowering
//! would otherwise have to re-derive on every visit: the specification
//! ordinal a constant name enumerates with, and the expression list a name
//! borrows from when a constant group uses implicit repetition (a
//! specification with no expressions repeats the nearest preceding non-empty
//! expression list).

use crate::{ast, diagnostic, symbol_table};

pub struct DeclarationContext<'a, 'llvm> {
  store: &'a mut symbol_table::BindingStore<'llvm>,
  diagnostics: diagnostic::DiagnosticsHelper,
}

impl<'a, 'llvm> DeclarationContext<'a, 'llvm> {
  pub fn new(store: &'a mut symbol_table::BindingStore<'llvm>) -> Self {
    Self {
      store,
      diagnostics: diagnostic::DiagnosticsHelper::default(),
    }
  }

  pub fn declare_module(mut self, module: &ast::Module) -> diagnostic::Maybe {
    for decl in &module.decls {
      match decl {
        ast::Decl::Function(function) => self.declare_function(function),
        ast::Decl::Group(group) => self.declare_group(group),
        // Reported during lowering, where unhandled forms are diagnosed with
        // their position.
        ast::Decl::Bad(..) => {}
      }
    }

    self.diagnostics.check()
  }

  fn declare_function(&mut self, function: &std::rc::Rc<ast::FunctionDecl>) {
    let Some(binding_id) = function.name.binding_id else {
      return;
    };

    self.try_declare(
      binding_id,
      symbol_table::Binding {
        name: function.name.name.clone(),
        exported: function.name.is_exported(),
        kind: symbol_table::BindingKind::Ordinary,
        state: symbol_table::BindingState::Unresolved,
        origin: Some(symbol_table::BindingOrigin::Function(std::rc::Rc::clone(
          function,
        ))),
      },
    );
  }

  fn declare_group(&mut self, group: &ast::GroupDecl) {
    let is_const = match group.keyword {
      ast::GroupKeyword::Const => true,
      ast::GroupKeyword::Var => false,
      // Imports are a no-op here, and type groups are rejected during
      // lowering; neither introduces value bindings.
      ast::GroupKeyword::Import | ast::GroupKeyword::Type => return,
    };

    let mut carried_spec: Option<std::rc::Rc<ast::ValueSpec>> = None;

    for (spec_index, spec) in group.specs.iter().enumerate() {
      // Only constant groups repeat expression lists implicitly; a variable
      // specification without expressions declares zero-valued storage.
      let expression_spec = if is_const && spec.values.is_empty() {
        carried_spec.clone().unwrap_or_else(|| std::rc::Rc::clone(spec))
      } else {
        carried_spec = Some(std::rc::Rc::clone(spec));

        std::rc::Rc::clone(spec)
      };

      if !spec.values.is_empty() && spec.values.len() != spec.names.len() {
        self
          .diagnostics
          .add_one(diagnostic::Diagnostic::MismatchedValueCount {
            names: spec.names.len(),
            values: spec.values.len(),
            span: spec.span,
          });
      }

      for (index, name) in spec.names.iter().enumerate() {
        let Some(binding_id) = name.binding_id else {
          continue;
        };

        let state = if is_const {
          symbol_table::BindingState::PendingOrdinal(spec_index as u64)
        } else {
          symbol_table::BindingState::Unresolved
        };

        self.try_declare(
          binding_id,
          symbol_table::Binding {
            name: name.name.clone(),
            exported: name.is_exported(),
            kind: symbol_table::BindingKind::Ordinary,
            state,
            origin: Some(symbol_table::BindingOrigin::Spec {
              spec: std::rc::Rc::clone(&expression_spec),
              index,
              is_const,
            }),
          },
        );
      }
    }
  }

  fn try_declare(&mut self, binding_id: symbol_table::BindingId, binding: symbol_table::Binding<'llvm>) {
    if let Err(diagnostics) = self.store.declare(binding_id, binding) {
      self.diagnostics.add_many(diagnostics);
    }
  }
}

/// Populate the binding store from a module's declaration graph.
pub fn declare_module<'llvm>(
  module: &ast::Module,
  store: &mut symbol_table::BindingStore<'llvm>,
) -> diagnostic::Maybe {
  DeclarationContext::new(store).declare_module(module)
}
