//! Attribute access shared by every node handle.

use crate::array::Array;
use crate::dataset::{Dataset, Handle};
use crate::group::Group;
use crate::table::Table;
use crate::Result;
use dalkit_core::{Attribute, Element, Error};

/// Typed attribute access on a dataset, group, table or array.
///
/// An attribute's element type is fixed when it is first set. Writes are
/// persisted by the next flush or close.
pub trait Attributes {
    /// Sets or overwrites an attribute.
    ///
    /// # Errors
    /// Returns `TypeMismatch` if `name` holds a different element type,
    /// `ReadOnly` or `Closed`.
    fn set_attribute_value(&self, name: &str, attribute: Attribute) -> Result<()>;

    /// Returns a copy of the attribute stored under `name`.
    ///
    /// # Errors
    /// Returns `NotFound` if absent.
    fn attribute(&self, name: &str) -> Result<Attribute>;

    /// Attribute names in sorted order.
    ///
    /// # Errors
    /// Returns `Closed` after close.
    fn attribute_names(&self) -> Result<Vec<String>>;

    /// # Errors
    /// Returns `NotFound` if absent.
    fn remove_attribute(&self, name: &str) -> Result<()>;

    /// Sets a scalar attribute.
    ///
    /// # Errors
    /// See [`Attributes::set_attribute_value`].
    fn set_attribute<T: Element>(&self, name: &str, value: T) -> Result<()> {
        self.set_attribute_value(name, Attribute::scalar(value))
    }

    /// Sets a list attribute.
    ///
    /// # Errors
    /// See [`Attributes::set_attribute_value`].
    fn set_attribute_list<T: Element>(&self, name: &str, values: Vec<T>) -> Result<()> {
        self.set_attribute_value(name, Attribute::list(values))
    }

    /// Sets a string attribute.
    ///
    /// # Errors
    /// See [`Attributes::set_attribute_value`].
    fn set_attribute_str(&self, name: &str, value: &str) -> Result<()> {
        self.set_attribute(name, value.to_string())
    }

    /// Reads a scalar attribute as `T`; a list yields its first element.
    ///
    /// # Errors
    /// Returns `NotFound`, `TypeMismatch`, or `ShapeMismatch` for an empty
    /// list.
    fn attribute_as<T: Element>(&self, name: &str) -> Result<T> {
        self.attribute_list_as::<T>(name)?
            .into_iter()
            .next()
            .ok_or_else(|| {
                Error::ShapeMismatch {
                    expected: 1,
                    found: 0,
                }
                .into()
            })
    }

    /// Reads an attribute as a list of `T`.
    ///
    /// # Errors
    /// Returns `NotFound` or `TypeMismatch`.
    fn attribute_list_as<T: Element>(&self, name: &str) -> Result<Vec<T>> {
        let attribute = self.attribute(name)?;
        let found = attribute.element_type();
        attribute.into_value().into_vec::<T>().ok_or_else(|| {
            Error::TypeMismatch {
                name: name.to_string(),
                expected: T::TYPE,
                found,
            }
            .into()
        })
    }
}

fn set(handle: &Handle, name: &str, attribute: Attribute) -> Result<()> {
    handle.write(|node, _| node.attributes_mut().set(name, attribute))
}

fn get(handle: &Handle, name: &str) -> Result<Attribute> {
    handle.read(|node, _| node.attributes().get(name).cloned())
}

fn names(handle: &Handle) -> Result<Vec<String>> {
    handle.read(|node, _| Ok(node.attributes().names()))
}

fn remove(handle: &Handle, name: &str) -> Result<()> {
    handle.write(|node, _| node.attributes_mut().remove(name).map(|_| ()))
}

macro_rules! impl_attributes {
    ($($t:ty),*) => {
        $(impl Attributes for $t {
            fn set_attribute_value(&self, name: &str, attribute: Attribute) -> Result<()> {
                set(self.handle(), name, attribute)
            }

            fn attribute(&self, name: &str) -> Result<Attribute> {
                get(self.handle(), name)
            }

            fn attribute_names(&self) -> Result<Vec<String>> {
                names(self.handle())
            }

            fn remove_attribute(&self, name: &str) -> Result<()> {
                remove(self.handle(), name)
            }
        })*
    };
}

impl_attributes!(Dataset, Group, Table, Array);
