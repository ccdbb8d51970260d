// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Field classes and field instances.
//!
//! Field classes are immutable once built and shared through `Arc`, so they
//! need no frozen flag. [`Field`] values are default-constructed from their
//! class and filled in by producers before the owning message is shared.

use crate::error::Result;
use crate::integer_range::{SignedIntegerRangeSet, UnsignedIntegerRangeSet};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldClassType {
    Bool,
    UnsignedInteger,
    SignedInteger,
    Real,
    String,
    Structure,
    StaticArray,
    DynamicArray,
    Option,
    Variant,
}

/// Integer selector ranges of an option or variant field class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorRanges {
    Unsigned(UnsignedIntegerRangeSet),
    Signed(SignedIntegerRangeSet),
}

#[derive(Debug, Clone)]
pub struct StructureMember {
    pub name: String,
    pub field_class: FieldClass,
}

#[derive(Debug, Clone)]
pub struct VariantOption {
    pub name: String,
    pub field_class: FieldClass,
    pub selector_ranges: Option<SelectorRanges>,
}

#[derive(Debug)]
pub enum FieldClassKind {
    Bool,
    /// `field_value_range` is the number of significant bits (1 to 64).
    UnsignedInteger {
        field_value_range: u8,
    },
    SignedInteger {
        field_value_range: u8,
    },
    Real {
        single_precision: bool,
    },
    String,
    Structure {
        members: Vec<StructureMember>,
    },
    StaticArray {
        element: FieldClass,
        length: u64,
    },
    DynamicArray {
        element: FieldClass,
    },
    Option {
        content: FieldClass,
        selector_ranges: Option<SelectorRanges>,
    },
    Variant {
        options: Vec<VariantOption>,
    },
}

/// Shared, immutable field class.
#[derive(Debug, Clone)]
pub struct FieldClass(Arc<FieldClassKind>);

impl FieldClass {
    pub fn bool() -> Self {
        Self(Arc::new(FieldClassKind::Bool))
    }

    /// # Errors
    ///
    /// `field_value_range` must be in `1..=64`.
    pub fn unsigned_integer(field_value_range: u8) -> Result<Self> {
        ensure_pre!(
            (1..=64).contains(&field_value_range),
            "valid-field-value-range",
            "Invalid integer field value range: {field_value_range}"
        );
        Ok(Self(Arc::new(FieldClassKind::UnsignedInteger { field_value_range })))
    }

    /// # Errors
    ///
    /// `field_value_range` must be in `1..=64`.
    pub fn signed_integer(field_value_range: u8) -> Result<Self> {
        ensure_pre!(
            (1..=64).contains(&field_value_range),
            "valid-field-value-range",
            "Invalid integer field value range: {field_value_range}"
        );
        Ok(Self(Arc::new(FieldClassKind::SignedInteger { field_value_range })))
    }

    pub fn real(single_precision: bool) -> Self {
        Self(Arc::new(FieldClassKind::Real { single_precision }))
    }

    pub fn string() -> Self {
        Self(Arc::new(FieldClassKind::String))
    }

    pub fn structure() -> StructureBuilder {
        StructureBuilder { members: Vec::new() }
    }

    pub fn static_array(element: Self, length: u64) -> Self {
        Self(Arc::new(FieldClassKind::StaticArray { element, length }))
    }

    pub fn dynamic_array(element: Self) -> Self {
        Self(Arc::new(FieldClassKind::DynamicArray { element }))
    }

    pub fn option(content: Self, selector_ranges: Option<SelectorRanges>) -> Self {
        Self(Arc::new(FieldClassKind::Option { content, selector_ranges }))
    }

    pub fn variant() -> VariantBuilder {
        VariantBuilder { options: Vec::new() }
    }

    pub fn kind(&self) -> &FieldClassKind {
        &self.0
    }

    pub fn field_class_type(&self) -> FieldClassType {
        match self.kind() {
            FieldClassKind::Bool => FieldClassType::Bool,
            FieldClassKind::UnsignedInteger { .. } => FieldClassType::UnsignedInteger,
            FieldClassKind::SignedInteger { .. } => FieldClassType::SignedInteger,
            FieldClassKind::Real { .. } => FieldClassType::Real,
            FieldClassKind::String => FieldClassType::String,
            FieldClassKind::Structure { .. } => FieldClassType::Structure,
            FieldClassKind::StaticArray { .. } => FieldClassType::StaticArray,
            FieldClassKind::DynamicArray { .. } => FieldClassType::DynamicArray,
            FieldClassKind::Option { .. } => FieldClassType::Option,
            FieldClassKind::Variant { .. } => FieldClassType::Variant,
        }
    }

    pub fn is_structure(&self) -> bool {
        matches!(self.kind(), FieldClassKind::Structure { .. })
    }

    /// Member of a structure field class by name.
    pub fn member(&self, name: &str) -> Option<&StructureMember> {
        match self.kind() {
            FieldClassKind::Structure { members } => members.iter().find(|m| m.name == name),
            _ => None,
        }
    }
}

#[derive(Debug)]
#[must_use]
pub struct StructureBuilder {
    members: Vec<StructureMember>,
}

impl StructureBuilder {
    pub fn member(mut self, name: impl Into<String>, field_class: FieldClass) -> Self {
        self.members.push(StructureMember { name: name.into(), field_class });
        self
    }

    /// # Errors
    ///
    /// Member names must be unique.
    pub fn build(self) -> Result<FieldClass> {
        for (index, member) in self.members.iter().enumerate() {
            ensure_pre!(
                !self.members[..index].iter().any(|other| other.name == member.name),
                "unique-member-name",
                "Duplicate structure member name: `{}`",
                member.name
            );
        }
        Ok(FieldClass(Arc::new(FieldClassKind::Structure { members: self.members })))
    }
}

#[derive(Debug)]
#[must_use]
pub struct VariantBuilder {
    options: Vec<VariantOption>,
}

impl VariantBuilder {
    pub fn option(
        mut self,
        name: impl Into<String>,
        field_class: FieldClass,
        selector_ranges: Option<SelectorRanges>,
    ) -> Self {
        self.options.push(VariantOption { name: name.into(), field_class, selector_ranges });
        self
    }

    /// # Errors
    ///
    /// Option names must be unique and selector ranges of distinct options
    /// must not overlap.
    pub fn build(self) -> Result<FieldClass> {
        for (index, option) in self.options.iter().enumerate() {
            for other in &self.options[..index] {
                ensure_pre!(
                    other.name != option.name,
                    "unique-option-name",
                    "Duplicate variant option name: `{}`",
                    option.name
                );
                let overlap = match (&other.selector_ranges, &option.selector_ranges) {
                    (Some(SelectorRanges::Unsigned(a)), Some(SelectorRanges::Unsigned(b))) => {
                        a.intersects(b)
                    },
                    (Some(SelectorRanges::Signed(a)), Some(SelectorRanges::Signed(b))) => {
                        a.intersects(b)
                    },
                    _ => false,
                };
                ensure_pre!(
                    !overlap,
                    "ranges-do-not-overlap",
                    "Selector ranges of options `{}` and `{}` overlap",
                    other.name,
                    option.name
                );
            }
        }
        Ok(FieldClass(Arc::new(FieldClassKind::Variant { options: self.options })))
    }
}

/// A field value conforming to a [`FieldClass`].
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Bool(bool),
    UnsignedInteger(u64),
    SignedInteger(i64),
    Real(f64),
    String(String),
    Structure(Vec<(String, Field)>),
    Array(Vec<Field>),
    Option(Option<Box<Field>>),
    Variant { selected: usize, value: Box<Field> },
}

impl Field {
    /// Default value for `field_class`: zero, empty, unset option, first variant option.
    pub fn from_class(field_class: &FieldClass) -> Self {
        match field_class.kind() {
            FieldClassKind::Bool => Self::Bool(false),
            FieldClassKind::UnsignedInteger { .. } => Self::UnsignedInteger(0),
            FieldClassKind::SignedInteger { .. } => Self::SignedInteger(0),
            FieldClassKind::Real { .. } => Self::Real(0.0),
            FieldClassKind::String => Self::String(String::new()),
            FieldClassKind::Structure { members } => Self::Structure(
                members.iter().map(|m| (m.name.clone(), Self::from_class(&m.field_class))).collect(),
            ),
            FieldClassKind::StaticArray { element, length } => {
                let count = usize::try_from(*length).unwrap_or(0);
                Self::Array((0..count).map(|_| Self::from_class(element)).collect())
            },
            FieldClassKind::DynamicArray { .. } => Self::Array(Vec::new()),
            FieldClassKind::Option { .. } => Self::Option(None),
            FieldClassKind::Variant { options } => options.first().map_or_else(
                || Self::Structure(Vec::new()),
                |first| Self::Variant {
                    selected: 0,
                    value: Box::new(Self::from_class(&first.field_class)),
                },
            ),
        }
    }

    /// Structure member by name.
    pub fn member(&self, name: &str) -> Option<&Self> {
        match self {
            Self::Structure(members) => members.iter().find(|(n, _)| n == name).map(|(_, f)| f),
            _ => None,
        }
    }

    pub fn member_mut(&mut self, name: &str) -> Option<&mut Self> {
        match self {
            Self::Structure(members) => {
                members.iter_mut().find(|(n, _)| n == name).map(|(_, f)| f)
            },
            _ => None,
        }
    }

    pub const fn as_unsigned(&self) -> Option<u64> {
        match self {
            Self::UnsignedInteger(value) => Some(*value),
            _ => None,
        }
    }

    pub const fn as_signed(&self) -> Option<i64> {
        match self {
            Self::SignedInteger(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn structure_defaults() {
        let fc = FieldClass::structure()
            .member("cpu_id", FieldClass::unsigned_integer(32).unwrap())
            .member("comm", FieldClass::string())
            .member("regs", FieldClass::static_array(FieldClass::signed_integer(64).unwrap(), 3))
            .build()
            .unwrap();
        let mut field = Field::from_class(&fc);
        assert_eq!(field.member("cpu_id").and_then(Field::as_unsigned), Some(0));
        assert_eq!(field.member("regs"), Some(&Field::Array(vec![Field::SignedInteger(0); 3])));

        *field.member_mut("comm").unwrap() = Field::String("swapper".into());
        assert_eq!(field.member("comm").and_then(Field::as_str), Some("swapper"));
    }

    #[test]
    fn duplicate_member_is_rejected() {
        let err = FieldClass::structure()
            .member("a", FieldClass::bool())
            .member("a", FieldClass::string())
            .build()
            .unwrap_err();
        assert_eq!(err.precondition().map(|v| v.id), Some("unique-member-name"));
    }

    #[test]
    fn variant_selector_ranges_must_not_overlap() {
        let mut low = UnsignedIntegerRangeSet::new();
        low.add_range(0, 4).unwrap();
        let mut high = UnsignedIntegerRangeSet::new();
        high.add_range(4, 9).unwrap();
        let err = FieldClass::variant()
            .option("low", FieldClass::bool(), Some(SelectorRanges::Unsigned(low.clone())))
            .option("high", FieldClass::string(), Some(SelectorRanges::Unsigned(high)))
            .build()
            .unwrap_err();
        assert_eq!(err.precondition().map(|v| v.id), Some("ranges-do-not-overlap"));

        let mut disjoint = UnsignedIntegerRangeSet::new();
        disjoint.add_range(5, 9).unwrap();
        let fc = FieldClass::variant()
            .option("low", FieldClass::bool(), Some(SelectorRanges::Unsigned(low)))
            .option("high", FieldClass::string(), Some(SelectorRanges::Unsigned(disjoint)))
            .build()
            .unwrap();
        assert_eq!(fc.field_class_type(), FieldClassType::Variant);
        assert!(matches!(Field::from_class(&fc), Field::Variant { selected: 0, .. }));
    }
}
