use crate::symbol_table;

pub(crate) const BUG_NAME_RESOLUTION: &str =
  "name resolution should have previously registered all referenced bindings in the binding store";

pub(crate) const BUG_BUFFER_CONTRACT: &str =
  "required buffer should contain a value when this function is invoked";

pub(crate) const BUG_SPEC_ORIGIN: &str =
  "bindings created from value specifications should always carry a specification origin";

pub(crate) const BUG_GLOBAL_INITIALIZER: &str =
  "globals materialized by declaration lowering always carry an initializer";

#[derive(Default)]
pub struct IdGenerator {
  counter: usize,
}

impl IdGenerator {
  pub fn new(initial_count: usize) -> Self {
    Self {
      counter: initial_count,
    }
  }

  pub fn get_counter(&self) -> usize {
    self.counter
  }

  /// Create a unique, non-repeating identifier based from a counter.
  pub fn next(&mut self) -> usize {
    let id = self.counter;

    self.counter += 1;

    id
  }

  pub fn next_binding_id(&mut self) -> symbol_table::BindingId {
    symbol_table::BindingId(self.next())
  }
}
