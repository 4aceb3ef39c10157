//! Source-level types, restricted to what declaration lowering and its
//! initializer expressions exercise.
//!
//! The frontend has already resolved and checked every type; the variants
//! here arrive fully concrete, with no inference or alias layers remaining.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum BitWidth {
  Width8,
  Width16,
  Width32,
  Width64,
}

impl BitWidth {
  pub fn bit_count(&self) -> u32 {
    match self {
      BitWidth::Width8 => 8,
      BitWidth::Width16 => 16,
      BitWidth::Width32 => 32,
      BitWidth::Width64 => 64,
    }
  }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Type {
  Bool,
  Int(BitWidth),
  Uint(BitWidth),
  Float(BitWidth),
  /// An immutable string; lowered as a pointer to its character data.
  Str,
  Array { element: Box<Type>, length: u64 },
}

impl Type {
  pub fn is_array(&self) -> bool {
    matches!(self, Type::Array { .. })
  }
}
