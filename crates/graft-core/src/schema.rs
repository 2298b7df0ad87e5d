//! Type classification.
//!
//! The store keeps no schema of its own; the [`TypeRegistry`] answers the
//! handful of questions node construction and overlay linking need about a
//! type name: value or reference semantics, identifiability, and whether a
//! collection's items carry identities.

use std::collections::HashMap;

use crate::value::{InstanceData, ObjectStore, Value};

/// Structural shape of a value, resolved through the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeShape {
    Primitive,
    Object,
    Sequence,
    Map,
}

/// Per-type capability flags. Unknown types get the defaults: a reference
/// type, not identifiable, with identity-tracked collection items.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeInfo {
    /// Treated as primitive: no node is built for its content.
    pub primitive: bool,
    /// Value semantics: assignment copies, and nodes are boxed per slot.
    pub value_semantics: bool,
    /// Instances of this type carry a stable identifier.
    pub identifiable: bool,
    /// Collections of this type skip item identity maps.
    pub non_identifiable_items: bool,
}

#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: HashMap<String, TypeInfo>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        TypeRegistry::default()
    }

    pub fn register(&mut self, type_name: &str, info: TypeInfo) {
        self.types.insert(type_name.to_owned(), info);
    }

    pub fn register_value_type(&mut self, type_name: &str) {
        self.register(
            type_name,
            TypeInfo {
                value_semantics: true,
                ..TypeInfo::default()
            },
        );
    }

    pub fn register_identifiable(&mut self, type_name: &str) {
        self.register(
            type_name,
            TypeInfo {
                identifiable: true,
                ..TypeInfo::default()
            },
        );
    }

    pub fn register_non_identifiable_items(&mut self, type_name: &str) {
        self.register(
            type_name,
            TypeInfo {
                non_identifiable_items: true,
                ..TypeInfo::default()
            },
        );
    }

    pub fn info(&self, type_name: &str) -> TypeInfo {
        self.types.get(type_name).copied().unwrap_or_default()
    }

    pub fn is_primitive(&self, type_name: &str) -> bool {
        self.info(type_name).primitive
    }

    pub fn is_value_type(&self, type_name: &str) -> bool {
        self.info(type_name).value_semantics
    }

    pub fn is_identifiable(&self, type_name: &str) -> bool {
        self.info(type_name).identifiable
    }

    pub fn non_identifiable_items(&self, type_name: &str) -> bool {
        self.info(type_name).non_identifiable_items
    }

    /// Resolves the structural shape of a value, following `Ref` through the
    /// store. Refs to primitive-registered types count as primitive.
    pub fn shape(&self, value: &Value, store: &ObjectStore) -> TypeShape {
        let Some(id) = value.as_ref_id() else {
            return TypeShape::Primitive;
        };
        let Some(instance) = store.get(id) else {
            return TypeShape::Primitive;
        };
        if self.is_primitive(&instance.type_name) {
            return TypeShape::Primitive;
        }
        match &instance.data {
            InstanceData::Object(_) => TypeShape::Object,
            InstanceData::Sequence(_) => TypeShape::Sequence,
            InstanceData::Map(_) => TypeShape::Map,
        }
    }
}
