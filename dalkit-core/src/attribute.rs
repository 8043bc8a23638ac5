//! Typed key/value metadata attached to nodes.

use crate::buffer::Buffer;
use crate::types::{Element, ElementType};
use crate::{Error, Result};
use std::collections::BTreeMap;

/// A typed scalar or homogeneous list value.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    value: Buffer,
    scalar: bool,
}

impl Attribute {
    /// A single-valued attribute.
    pub fn scalar<T: Element>(value: T) -> Self {
        Self {
            value: Buffer::scalar(value),
            scalar: true,
        }
    }

    /// A list-valued attribute.
    pub fn list<T: Element>(values: Vec<T>) -> Self {
        Self {
            value: Buffer::from_vec(values),
            scalar: false,
        }
    }

    /// Builds an attribute from a raw buffer.
    ///
    /// `scalar` is only honoured for one-element buffers.
    #[must_use]
    pub fn from_buffer(value: Buffer, scalar: bool) -> Self {
        let scalar = scalar && value.len() == 1;
        Self { value, scalar }
    }

    #[must_use]
    pub fn element_type(&self) -> ElementType {
        self.value.element_type()
    }

    #[must_use]
    pub fn is_scalar(&self) -> bool {
        self.scalar
    }

    #[must_use]
    pub fn value(&self) -> &Buffer {
        &self.value
    }

    #[must_use]
    pub fn into_value(self) -> Buffer {
        self.value
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.value.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

/// Attribute collection owned by one node.
///
/// The element type of an attribute is fixed when it is first set; later
/// writes and typed reads must use the same type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeStore {
    entries: BTreeMap<String, Attribute>,
}

impl AttributeStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets or overwrites an attribute.
    ///
    /// # Errors
    /// Returns `TypeMismatch` if `name` already holds a different element type.
    pub fn set(&mut self, name: &str, attribute: Attribute) -> Result<()> {
        if let Some(existing) = self.entries.get(name) {
            if existing.element_type() != attribute.element_type() {
                return Err(Error::TypeMismatch {
                    name: name.to_string(),
                    expected: existing.element_type(),
                    found: attribute.element_type(),
                });
            }
        }
        self.entries.insert(name.to_string(), attribute);
        Ok(())
    }

    /// Returns the attribute stored under `name`.
    ///
    /// # Errors
    /// Returns `NotFound` if absent.
    pub fn get(&self, name: &str) -> Result<&Attribute> {
        self.entries
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("attribute '{name}'")))
    }

    /// Reads a scalar attribute as `T`.
    ///
    /// A list attribute yields its first element.
    ///
    /// # Errors
    /// Returns `NotFound` if absent, `TypeMismatch` if stored as another type,
    /// `ShapeMismatch` if the stored list is empty.
    pub fn get_as<T: Element>(&self, name: &str) -> Result<T> {
        let values = self.get_list_as::<T>(name)?;
        values
            .first()
            .cloned()
            .ok_or(Error::ShapeMismatch {
                expected: 1,
                found: 0,
            })
    }

    /// Reads an attribute as a list of `T`.
    ///
    /// # Errors
    /// Returns `NotFound` if absent, `TypeMismatch` if stored as another type.
    pub fn get_list_as<T: Element>(&self, name: &str) -> Result<&[T]> {
        let attribute = self.get(name)?;
        attribute.value().as_slice::<T>().ok_or(Error::TypeMismatch {
            name: name.to_string(),
            expected: T::TYPE,
            found: attribute.element_type(),
        })
    }

    /// Removes an attribute, returning it.
    ///
    /// # Errors
    /// Returns `NotFound` if absent.
    pub fn remove(&mut self, name: &str) -> Result<Attribute> {
        self.entries
            .remove(name)
            .ok_or_else(|| Error::NotFound(format!("attribute '{name}'")))
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Attribute names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Attribute)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_scalar() {
        let mut store = AttributeStore::new();
        store.set("a", Attribute::scalar(5_i32)).unwrap();
        let attr = store.get("a").unwrap();
        assert_eq!(attr.element_type(), ElementType::I32);
        assert!(attr.is_scalar());
        assert_eq!(store.get_as::<i32>("a").unwrap(), 5);
    }

    #[test]
    fn test_type_is_fixed() {
        let mut store = AttributeStore::new();
        store.set("a", Attribute::scalar(5_i32)).unwrap();
        let err = store
            .set("a", Attribute::scalar("x".to_string()))
            .unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
        assert_eq!(store.get_as::<i32>("a").unwrap(), 5);

        // same type overwrites, list or scalar
        store.set("a", Attribute::list(vec![1_i32, 2, 3])).unwrap();
        assert_eq!(store.get_list_as::<i32>("a").unwrap(), &[1, 2, 3]);
    }

    #[test]
    fn test_typed_read_enforced() {
        let mut store = AttributeStore::new();
        store.set("freq", Attribute::scalar(1.5_f64)).unwrap();
        let err = store.get_as::<f32>("freq").unwrap_err();
        assert_eq!(
            err,
            Error::TypeMismatch {
                name: "freq".into(),
                expected: ElementType::F32,
                found: ElementType::F64,
            }
        );
    }

    #[test]
    fn test_missing_and_remove() {
        let mut store = AttributeStore::new();
        assert!(matches!(store.get("nope"), Err(Error::NotFound(_))));
        store.set("b", Attribute::scalar(1_u8)).unwrap();
        store.set("a", Attribute::scalar(2_u8)).unwrap();
        assert_eq!(store.names(), vec!["a".to_string(), "b".to_string()]);
        store.remove("a").unwrap();
        assert!(!store.contains("a"));
        assert!(matches!(store.remove("a"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_from_buffer_scalar_flag() {
        let attr = Attribute::from_buffer(Buffer::U16(vec![1, 2]), true);
        assert!(!attr.is_scalar());
        let attr = Attribute::from_buffer(Buffer::U16(vec![1]), true);
        assert!(attr.is_scalar());
    }
}
