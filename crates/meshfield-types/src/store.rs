//! Flat stores of typed values
//!
//! A [`ValueStore`] holds `count` values of one declared [`ValueType`].
//! Slots are zero/null-initialized on allocation, every access is bounds-
//! and type-checked, and copies are deep: array, string and mesh-location
//! sub-buffers are freshly cloned so two stores never alias. Dropping a
//! store releases all owned sub-buffers.

use crate::error::ValueError;
use crate::value::{Value, ValueType};

/// A flat buffer of `count` packed values of one declared type
#[derive(Debug, Clone, PartialEq)]
pub struct ValueStore {
    value_type: ValueType,
    slots: Vec<Value>,
}

impl ValueStore {
    /// Allocate a store of `count` zero/null-initialized values
    pub fn new(value_type: ValueType, count: usize) -> Self {
        let mut slots = Vec::with_capacity(count);
        slots.resize_with(count, || Value::default_for(value_type));
        ValueStore { value_type, slots }
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Total packed footprint of the store in bytes
    pub fn footprint(&self) -> usize {
        self.value_type.footprint() * self.slots.len()
    }

    fn check_index(&self, index: usize) -> Result<(), ValueError> {
        if index < self.slots.len() {
            Ok(())
        } else {
            Err(ValueError::IndexOutOfBounds {
                index,
                len: self.slots.len(),
            })
        }
    }

    pub fn get(&self, index: usize) -> Result<&Value, ValueError> {
        self.check_index(index)?;
        Ok(&self.slots[index])
    }

    /// Store a value; the variant must match the declared type.
    ///
    /// On any failure the store is unchanged.
    pub fn set(&mut self, index: usize, value: Value) -> Result<(), ValueError> {
        self.check_index(index)?;
        if value.value_type() != self.value_type {
            return Err(ValueError::TypeMismatch {
                expected: self.value_type,
                got: value.value_type(),
            });
        }
        self.slots[index] = value;
        Ok(())
    }

    pub fn get_real(&self, index: usize) -> Result<f64, ValueError> {
        self.get(index)?.as_real().ok_or(ValueError::TypeMismatch {
            expected: ValueType::Real,
            got: self.value_type,
        })
    }

    pub fn set_real(&mut self, index: usize, value: f64) -> Result<(), ValueError> {
        self.set(index, Value::Real(value))
    }

    pub fn get_int(&self, index: usize) -> Result<i32, ValueError> {
        self.get(index)?.as_int().ok_or(ValueError::TypeMismatch {
            expected: ValueType::Int,
            got: self.value_type,
        })
    }

    pub fn set_int(&mut self, index: usize, value: i32) -> Result<(), ValueError> {
        self.set(index, Value::Int(value))
    }

    pub fn get_string(&self, index: usize) -> Result<Option<&str>, ValueError> {
        match self.get(index)? {
            Value::String(s) | Value::Url(s) => Ok(s.as_deref()),
            _ => Err(ValueError::TypeMismatch {
                expected: ValueType::String,
                got: self.value_type,
            }),
        }
    }

    pub fn set_string(&mut self, index: usize, value: impl Into<String>) -> Result<(), ValueError> {
        let slot = match self.value_type {
            ValueType::String => Value::String(Some(value.into())),
            ValueType::Url => Value::Url(Some(value.into())),
            got => {
                return Err(ValueError::TypeMismatch {
                    expected: ValueType::String,
                    got,
                })
            }
        };
        self.set(index, slot)
    }

    /// Deep-copy all values from `src`.
    ///
    /// Counts and types must match. Sub-buffers are cloned into fresh
    /// allocations first and swapped in only once the whole copy has
    /// succeeded, so a failed copy leaves the destination untouched and
    /// nothing half-copied behind.
    pub fn copy_from(&mut self, src: &ValueStore) -> Result<(), ValueError> {
        if src.value_type != self.value_type {
            return Err(ValueError::TypeMismatch {
                expected: self.value_type,
                got: src.value_type,
            });
        }
        if src.len() != self.len() {
            return Err(ValueError::CountMismatch {
                dst: self.len(),
                src: src.len(),
            });
        }
        let cloned = src.slots.clone();
        self.slots = cloned;
        Ok(())
    }

    /// Resize the store, keeping existing values.
    ///
    /// New slots are zero/null-initialized; shrinking drops surplus values
    /// and their owned sub-buffers.
    pub fn resize(&mut self, new_count: usize) {
        let value_type = self.value_type;
        self.slots
            .resize_with(new_count, || Value::default_for(value_type));
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.slots.iter()
    }
}
