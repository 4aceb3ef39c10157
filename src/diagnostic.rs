//! Diagnostics represent the fatal conditions that declaration lowering can
//! encounter: unimplemented declaration forms and invariant violations on the
//! binding store.
//!
//! Malformed source is assumed to have been rejected by the upstream frontend
//! before lowering begins, so none of these conditions are recoverable; the
//! first one aborts the compilation unit, and the enclosing driver is
//! responsible for presenting it and choosing an exit status.

use crate::ast;

/// A function that may produce diagnostics which are visible to the end user,
/// in the case of its failure.
///
/// Any function with this return type can be considered a high-level function,
/// and should also be allowed to make assumptions (ie. if contract assumptions
/// are to be broken, it constitutes a logic bug, which is a valid situation in
/// which panics may occur).
pub type Maybe<T = ()> = Result<T, Vec<Diagnostic>>;

#[derive(Debug, Clone)]
pub enum Diagnostic {
  /// Type declarations are not handled by this stage of the compiler.
  UnsupportedTypeDeclaration(ast::Span),
  /// Package initializer functions require ordered collection and invocation
  /// before the entry point, which is not implemented yet.
  UnsupportedInitFunction(ast::Span),
  UnhandledDeclaration(ast::Span),
  /// A binding was read while holding a different kind of content than the
  /// consumer requires.
  BindingKindMismatch {
    name: String,
    expected: &'static str,
    found: &'static str,
  },
  /// An attempt was made to overwrite a binding that already holds an IR
  /// value. Bindings are materialized at most once.
  BindingRebound(String),
  Redeclaration(String),
  MismatchedValueCount {
    names: usize,
    values: usize,
    span: ast::Span,
  },
  UndefinedReference(String, ast::Span),
  IotaOutsideConstGroup(ast::Span),
  /// A package-level initializer that cannot be computed at compile time.
  /// Deferring such initializers to a generated `init` function is part of
  /// the same unimplemented machinery as user-written `init` functions.
  NonConstantGlobalInitializer(ast::Span),
  DivisionByZeroInConstant(ast::Span),
  MissingInitializerType(ast::Span),
  UnsupportedArrayElementType(ast::Span),
}

impl Diagnostic {
  /// Every condition raised by declaration lowering aborts the unit; this
  /// stage produces no warning-severity diagnostics.
  pub fn is_error(&self) -> bool {
    true
  }

  fn message(&self) -> String {
    match self {
      Diagnostic::UnsupportedTypeDeclaration(..) => {
        String::from("type declarations are not supported by declaration lowering")
      }
      Diagnostic::UnsupportedInitFunction(..) => {
        String::from("package initializer functions are not supported yet")
      }
      Diagnostic::UnhandledDeclaration(..) => String::from("unhandled declaration form"),
      Diagnostic::BindingKindMismatch {
        name,
        expected,
        found,
      } => format!(
        "binding for `{}` was expected to hold {}, but holds {}",
        name, expected, found
      ),
      Diagnostic::BindingRebound(name) => {
        format!("binding for `{}` is already materialized and cannot be rebound", name)
      }
      Diagnostic::Redeclaration(name) => format!("`{}` is declared more than once", name),
      Diagnostic::MismatchedValueCount { names, values, .. } => format!(
        "specification declares {} name(s) but provides {} value(s)",
        names, values
      ),
      Diagnostic::UndefinedReference(name, ..) => {
        format!("reference to undeclared name `{}`", name)
      }
      Diagnostic::IotaOutsideConstGroup(..) => {
        String::from("the enumeration ordinal is only available inside constant groups")
      }
      Diagnostic::NonConstantGlobalInitializer(..) => {
        String::from("package-level initializer cannot be computed at compile time")
      }
      Diagnostic::DivisionByZeroInConstant(..) => {
        String::from("division by zero in constant expression")
      }
      Diagnostic::MissingInitializerType(..) => {
        String::from("specification has neither an initializer nor a declared type")
      }
      Diagnostic::UnsupportedArrayElementType(..) => {
        String::from("array literal element type cannot be lowered to a constant array")
      }
    }
  }

  fn find_span(&self) -> Option<ast::Span> {
    match self {
      Diagnostic::UnsupportedTypeDeclaration(span)
      | Diagnostic::UnsupportedInitFunction(span)
      | Diagnostic::UnhandledDeclaration(span)
      | Diagnostic::MismatchedValueCount { span, .. }
      | Diagnostic::UndefinedReference(.., span)
      | Diagnostic::IotaOutsideConstGroup(span)
      | Diagnostic::NonConstantGlobalInitializer(span)
      | Diagnostic::DivisionByZeroInConstant(span)
      | Diagnostic::MissingInitializerType(span)
      | Diagnostic::UnsupportedArrayElementType(span) => Some(*span),
      Diagnostic::BindingKindMismatch { .. }
      | Diagnostic::BindingRebound(..)
      | Diagnostic::Redeclaration(..) => None,
    }
  }

  /// Render this diagnostic for terminal reporting against the original
  /// source file, identified by `file_id`.
  pub fn report(&self, file_id: usize) -> codespan_reporting::diagnostic::Diagnostic<usize> {
    let report = codespan_reporting::diagnostic::Diagnostic::error().with_message(self.message());

    match self.find_span() {
      Some(span) => report.with_labels(vec![codespan_reporting::diagnostic::Label::primary(
        file_id,
        span.start..span.end,
      )]),
      None => report,
    }
  }
}

#[derive(Default, Clone)]
pub struct DiagnosticsHelper {
  pub diagnostics: Vec<Diagnostic>,
}

impl DiagnosticsHelper {
  pub fn check(&self) -> Maybe {
    if self.contains_errors() {
      Err(self.diagnostics.clone())
    } else {
      Ok(())
    }
  }

  pub fn add_one(&mut self, diagnostic: Diagnostic) {
    self.diagnostics.push(diagnostic);
  }

  pub fn add_many(&mut self, diagnostics: Vec<Diagnostic>) {
    self.diagnostics.extend(diagnostics);
  }

  pub fn contains_errors(&self) -> bool {
    self.diagnostics.iter().any(Diagnostic::is_error)
  }
}

impl std::convert::From<Vec<Diagnostic>> for DiagnosticsHelper {
  fn from(diagnostics: Vec<Diagnostic>) -> Self {
    Self { diagnostics }
  }
}
