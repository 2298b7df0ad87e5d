//! Dynamic value model and the instance store.
//!
//! Every object, sequence and map lives in an [`ObjectStore`] under an
//! [`InstanceId`]; values embed primitives directly and refer to stored
//! instances through [`Value::Ref`]. Instance identity is what the node layer
//! keys on: two slots holding the same `InstanceId` alias the same data and
//! resolve to the same node.

use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::GraphError;
use crate::index::Index;
use crate::item_ids::{ItemId, ItemIds};

/// Store-scoped identity of one object, sequence or map instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u64);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A single graph value: a primitive, or a reference to a stored instance.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Id(Uuid),
    Ref(InstanceId),
}

impl Value {
    pub fn as_ref_id(&self) -> Option<InstanceId> {
        match self {
            Value::Ref(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_id(&self) -> Option<Uuid> {
        match self {
            Value::Id(id) => Some(*id),
            _ => None,
        }
    }

    /// True for values with no stored instance behind them.
    pub fn is_primitive(&self) -> bool {
        !matches!(self, Value::Ref(_))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Id(v)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstanceData {
    Object(IndexMap<String, Value>),
    Sequence(Vec<Value>),
    Map(IndexMap<String, Value>),
}

impl InstanceData {
    pub fn is_collection(&self) -> bool {
        matches!(self, InstanceData::Sequence(_) | InstanceData::Map(_))
    }
}

/// One stored object/sequence/map: a type name for classification by the
/// type registry, an optional stable identifier, and the data itself.
#[derive(Debug, Clone)]
pub struct Instance {
    pub type_name: String,
    pub stable_id: Option<Uuid>,
    pub data: InstanceData,
}

/// Arena of instances plus the out-of-band item-identity side table.
#[derive(Debug, Default)]
pub struct ObjectStore {
    instances: HashMap<InstanceId, Instance>,
    item_ids: HashMap<InstanceId, ItemIds>,
    next: u64,
}

impl ObjectStore {
    pub fn new() -> Self {
        ObjectStore::default()
    }

    fn alloc(&mut self, instance: Instance) -> InstanceId {
        let id = InstanceId(self.next);
        self.next += 1;
        self.instances.insert(id, instance);
        id
    }

    pub fn new_object(
        &mut self,
        type_name: &str,
        members: IndexMap<String, Value>,
    ) -> InstanceId {
        self.alloc(Instance {
            type_name: type_name.to_owned(),
            stable_id: None,
            data: InstanceData::Object(members),
        })
    }

    pub fn new_sequence(&mut self, type_name: &str, items: Vec<Value>) -> InstanceId {
        self.alloc(Instance {
            type_name: type_name.to_owned(),
            stable_id: None,
            data: InstanceData::Sequence(items),
        })
    }

    pub fn new_map(&mut self, type_name: &str, entries: IndexMap<String, Value>) -> InstanceId {
        self.alloc(Instance {
            type_name: type_name.to_owned(),
            stable_id: None,
            data: InstanceData::Map(entries),
        })
    }

    pub fn get(&self, id: InstanceId) -> Option<&Instance> {
        self.instances.get(&id)
    }

    pub fn get_mut(&mut self, id: InstanceId) -> Option<&mut Instance> {
        self.instances.get_mut(&id)
    }

    pub fn contains(&self, id: InstanceId) -> bool {
        self.instances.contains_key(&id)
    }

    pub fn type_name(&self, id: InstanceId) -> Option<&str> {
        self.get(id).map(|i| i.type_name.as_str())
    }

    pub fn stable_id(&self, id: InstanceId) -> Option<Uuid> {
        self.get(id).and_then(|i| i.stable_id)
    }

    /// Assigns a stable identifier at most once; further calls return the
    /// identifier assigned at creation time.
    pub fn make_identifiable(&mut self, id: InstanceId) -> Result<Uuid, GraphError> {
        let instance = self
            .instances
            .get_mut(&id)
            .ok_or(GraphError::MissingInstance(id))?;
        Ok(*instance.stable_id.get_or_insert_with(Uuid::new_v4))
    }

    /// Finds the instance carrying the given stable identifier, if any.
    pub fn find_by_stable_id(&self, stable: Uuid) -> Option<InstanceId> {
        self.instances
            .iter()
            .find(|(_, i)| i.stable_id == Some(stable))
            .map(|(id, _)| *id)
    }

    pub fn member(&self, id: InstanceId, name: &str) -> Option<&Value> {
        match &self.get(id)?.data {
            InstanceData::Object(m) => m.get(name),
            _ => None,
        }
    }

    pub fn set_member(
        &mut self,
        id: InstanceId,
        name: &str,
        value: Value,
    ) -> Result<(), GraphError> {
        let instance = self
            .instances
            .get_mut(&id)
            .ok_or(GraphError::MissingInstance(id))?;
        match &mut instance.data {
            InstanceData::Object(m) => {
                m.insert(name.to_owned(), value);
                Ok(())
            }
            _ => Err(GraphError::ShapeMismatch {
                expected: "an object instance".into(),
                found: "a collection instance".into(),
            }),
        }
    }

    pub fn read_index(&self, id: InstanceId, index: &Index) -> Result<Value, GraphError> {
        let instance = self.get(id).ok_or(GraphError::MissingInstance(id))?;
        match (&instance.data, index) {
            (InstanceData::Sequence(v), Index::Num(n)) => v
                .get(*n)
                .cloned()
                .ok_or_else(|| GraphError::InvalidIndex { index: index.clone() }),
            (InstanceData::Map(m), Index::Key(k)) => m
                .get(k)
                .cloned()
                .ok_or_else(|| GraphError::InvalidIndex { index: index.clone() }),
            (InstanceData::Object(m), Index::Key(k)) => m
                .get(k)
                .cloned()
                .ok_or_else(|| GraphError::InvalidIndex { index: index.clone() }),
            _ => Err(GraphError::InvalidIndex { index: index.clone() }),
        }
    }

    /// Replaces the element at `index`, keeping its item identity.
    pub fn write_index(
        &mut self,
        id: InstanceId,
        index: &Index,
        value: Value,
    ) -> Result<(), GraphError> {
        let instance = self
            .instances
            .get_mut(&id)
            .ok_or(GraphError::MissingInstance(id))?;
        match (&mut instance.data, index) {
            (InstanceData::Sequence(v), Index::Num(n)) if *n < v.len() => {
                v[*n] = value;
                Ok(())
            }
            (InstanceData::Map(m), Index::Key(k)) if m.contains_key(k) => {
                m.insert(k.clone(), value);
                Ok(())
            }
            (InstanceData::Object(m), Index::Key(k)) if m.contains_key(k) => {
                m.insert(k.clone(), value);
                Ok(())
            }
            _ => Err(GraphError::InvalidIndex { index: index.clone() }),
        }
    }

    /// Inserts an element, assigning a fresh item identity when the
    /// collection tracks one. `Index::Empty` appends to a sequence.
    pub fn insert_index(
        &mut self,
        id: InstanceId,
        index: &Index,
        value: Value,
    ) -> Result<Option<ItemId>, GraphError> {
        let instance = self
            .instances
            .get_mut(&id)
            .ok_or(GraphError::MissingInstance(id))?;
        match (&mut instance.data, index) {
            (InstanceData::Sequence(v), Index::Num(n)) if *n <= v.len() => v.insert(*n, value),
            (InstanceData::Sequence(v), Index::Empty) => v.push(value),
            (InstanceData::Map(m), Index::Key(k)) if !m.contains_key(k) => {
                m.insert(k.clone(), value);
            }
            _ => return Err(GraphError::InvalidIndex { index: index.clone() }),
        }
        Ok(self
            .item_ids
            .get_mut(&id)
            .and_then(|ids| ids.insert(index)))
    }

    /// Inserts an element carrying a caller-supplied item identity.
    pub fn insert_index_with_id(
        &mut self,
        id: InstanceId,
        index: &Index,
        value: Value,
        item: ItemId,
    ) -> Result<(), GraphError> {
        let effective = match (index, self.get(id).map(|i| &i.data)) {
            (Index::Empty, Some(InstanceData::Sequence(v))) => Index::Num(v.len()),
            _ => index.clone(),
        };
        self.insert_index(id, &effective, value)?;
        if let Some(ids) = self.item_ids.get_mut(&id) {
            // insert_index already assigned a fresh id at this slot; replace it
            // in place (map keys overwrite, sequence slots need a swap).
            if matches!(effective, Index::Num(_)) {
                ids.remove(&effective);
            }
            ids.insert_with(&effective, item);
        }
        Ok(())
    }

    /// Removes the element at `index`, dropping its item identity entry.
    pub fn remove_index(
        &mut self,
        id: InstanceId,
        index: &Index,
    ) -> Result<(Value, Option<ItemId>), GraphError> {
        let instance = self
            .instances
            .get_mut(&id)
            .ok_or(GraphError::MissingInstance(id))?;
        let removed = match (&mut instance.data, index) {
            (InstanceData::Sequence(v), Index::Num(n)) if *n < v.len() => v.remove(*n),
            (InstanceData::Map(m), Index::Key(k)) => m
                .shift_remove(k)
                .ok_or_else(|| GraphError::InvalidIndex { index: index.clone() })?,
            _ => return Err(GraphError::InvalidIndex { index: index.clone() }),
        };
        let item = self.item_ids.get_mut(&id).and_then(|ids| ids.remove(index));
        Ok((removed, item))
    }

    /// Moves a sequence element, keeping its item identity attached.
    pub fn move_index(
        &mut self,
        id: InstanceId,
        from: usize,
        to: usize,
    ) -> Result<(), GraphError> {
        let instance = self
            .instances
            .get_mut(&id)
            .ok_or(GraphError::MissingInstance(id))?;
        match &mut instance.data {
            InstanceData::Sequence(v) if from < v.len() && to < v.len() => {
                let value = v.remove(from);
                v.insert(to, value);
            }
            _ => {
                return Err(GraphError::InvalidIndex {
                    index: Index::Num(from),
                })
            }
        }
        if let Some(ids) = self.item_ids.get_mut(&id) {
            ids.move_item(from, to);
        }
        Ok(())
    }

    pub fn item_ids(&self, id: InstanceId) -> Option<&ItemIds> {
        self.item_ids.get(&id)
    }

    pub fn item_ids_mut(&mut self, id: InstanceId) -> Option<&mut ItemIds> {
        self.item_ids.get_mut(&id)
    }

    /// Creates or resynchronizes the item-identity table for a collection.
    /// Out-of-sync entries are dropped and missing ones backfilled.
    pub fn ensure_item_ids(&mut self, id: InstanceId) -> Result<&mut ItemIds, GraphError> {
        let instance = self.instances.get(&id).ok_or(GraphError::MissingInstance(id))?;
        match &instance.data {
            InstanceData::Sequence(v) => {
                let len = v.len();
                let ids = self
                    .item_ids
                    .entry(id)
                    .or_insert_with(|| ItemIds::new_sequence(len));
                ids.resync_sequence(len);
            }
            InstanceData::Map(m) => {
                let keys: Vec<String> = m.keys().cloned().collect();
                let ids = self
                    .item_ids
                    .entry(id)
                    .or_insert_with(|| ItemIds::new_map(keys.iter().map(|k| k.as_str())));
                ids.resync_map(keys.iter().map(|k| k.as_str()));
            }
            InstanceData::Object(_) => {
                return Err(GraphError::ShapeMismatch {
                    expected: "a collection instance".into(),
                    found: "an object instance".into(),
                })
            }
        }
        self.item_ids
            .get_mut(&id)
            .ok_or(GraphError::MissingInstance(id))
    }

    /// Deep-copies a value tree. Instance ids are fresh; stable identifiers
    /// and item identities are preserved so a mirrored clone keeps matching
    /// its origin on later passes. Aliases and cycles are preserved through
    /// the mapping table.
    pub fn deep_clone(&mut self, value: &Value) -> Value {
        let mut mapping = HashMap::new();
        self.clone_value(value, &mut mapping, false)
    }

    /// Like [`ObjectStore::deep_clone`] but assigns fresh stable identifiers,
    /// producing an independently-identified copy (a "derive" of the
    /// original). Item identities are still preserved.
    pub fn derive_clone(&mut self, value: &Value) -> Value {
        let mut mapping = HashMap::new();
        self.clone_value(value, &mut mapping, true)
    }

    fn clone_value(
        &mut self,
        value: &Value,
        mapping: &mut HashMap<InstanceId, InstanceId>,
        fresh_stable_ids: bool,
    ) -> Value {
        let Value::Ref(src) = value else {
            return value.clone();
        };
        if let Some(done) = mapping.get(src) {
            return Value::Ref(*done);
        }
        let Some(instance) = self.instances.get(src) else {
            return Value::Null;
        };
        let type_name = instance.type_name.clone();
        let stable_id = match (instance.stable_id, fresh_stable_ids) {
            (Some(_), true) => Some(Uuid::new_v4()),
            (other, _) => other,
        };
        let data = instance.data.clone();

        // Register the clone before descending so cycles terminate.
        let dst = self.alloc(Instance {
            type_name,
            stable_id,
            data: InstanceData::Object(IndexMap::new()),
        });
        mapping.insert(*src, dst);

        let cloned = match data {
            InstanceData::Object(m) => InstanceData::Object(
                m.iter()
                    .map(|(k, v)| (k.clone(), self.clone_value(v, mapping, fresh_stable_ids)))
                    .collect(),
            ),
            InstanceData::Sequence(v) => InstanceData::Sequence(
                v.iter()
                    .map(|x| self.clone_value(x, mapping, fresh_stable_ids))
                    .collect(),
            ),
            InstanceData::Map(m) => InstanceData::Map(
                m.iter()
                    .map(|(k, v)| (k.clone(), self.clone_value(v, mapping, fresh_stable_ids)))
                    .collect(),
            ),
        };
        if let Some(instance) = self.instances.get_mut(&dst) {
            instance.data = cloned;
        }
        if let Some(ids) = self.item_ids.get(src).cloned() {
            self.item_ids.insert(dst, ids);
        }
        Value::Ref(dst)
    }

    /// Builds instances from a JSON document. Objects become `"object"`
    /// instances and arrays become `"sequence"` instances.
    pub fn insert_json(&mut self, json: &JsonValue) -> Value {
        self.insert_json_typed(json, None)
    }

    /// Like [`ObjectStore::insert_json`], with an explicit type name for the
    /// root instance (nested instances keep the defaults).
    pub fn insert_json_as(&mut self, type_name: &str, json: &JsonValue) -> Value {
        self.insert_json_typed(json, Some(type_name))
    }

    fn insert_json_typed(&mut self, json: &JsonValue, type_name: Option<&str>) -> Value {
        match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(*b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            JsonValue::String(s) => Value::Str(s.clone()),
            JsonValue::Array(items) => {
                let items = items.iter().map(|x| self.insert_json_typed(x, None)).collect();
                Value::Ref(self.new_sequence(type_name.unwrap_or("sequence"), items))
            }
            JsonValue::Object(map) => {
                let members = map
                    .iter()
                    .map(|(k, v)| (k.clone(), self.insert_json_typed(v, None)))
                    .collect();
                Value::Ref(self.new_object(type_name.unwrap_or("object"), members))
            }
        }
    }

    /// Builds a map-shaped instance from a JSON object.
    pub fn insert_json_map(&mut self, type_name: &str, json: &JsonValue) -> Value {
        let JsonValue::Object(map) = json else {
            return Value::Null;
        };
        let entries = map
            .iter()
            .map(|(k, v)| (k.clone(), self.insert_json_typed(v, None)))
            .collect();
        Value::Ref(self.new_map(type_name, entries))
    }

    /// Renders a value back to JSON, resolving instance references. Revisited
    /// instances (aliases or cycles) render as `null`.
    pub fn export_json(&self, value: &Value) -> JsonValue {
        let mut visiting = Vec::new();
        self.export_json_inner(value, &mut visiting)
    }

    fn export_json_inner(&self, value: &Value, visiting: &mut Vec<InstanceId>) -> JsonValue {
        match value {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int(i) => JsonValue::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::Str(s) => JsonValue::String(s.clone()),
            Value::Id(id) => JsonValue::String(id.to_string()),
            Value::Ref(id) => {
                if visiting.contains(id) {
                    return JsonValue::Null;
                }
                let Some(instance) = self.get(*id) else {
                    return JsonValue::Null;
                };
                visiting.push(*id);
                let out = match &instance.data {
                    InstanceData::Object(m) | InstanceData::Map(m) => JsonValue::Object(
                        m.iter()
                            .map(|(k, v)| (k.clone(), self.export_json_inner(v, visiting)))
                            .collect(),
                    ),
                    InstanceData::Sequence(v) => JsonValue::Array(
                        v.iter()
                            .map(|x| self.export_json_inner(x, visiting))
                            .collect(),
                    ),
                };
                visiting.pop();
                out
            }
        }
    }
}
