//! Runtime values and their dynamic-typing rules.
//!
//! Small immediate values are stored inline; lists and maps live in the
//! [`Heap`] arena and are referenced by id, so a value is always cheap to
//! clone and a container can be written through a Place binding.

use std::cmp::Ordering;

use indexmap::IndexMap;

use crate::{
    action::Action,
    diag::{RtError, RtErrorKind, RtResult},
    graph::{EntityId, EntitySet, GraphStore},
    heap::{Heap, HeapId},
};

/// Primary value type of the language.
#[derive(Debug, Clone)]
pub enum Value {
    /// Result of statements and absent values.
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Ordered sequence, stored in the heap arena.
    List(HeapId),
    /// Insertion-ordered string-keyed mapping, stored in the heap arena.
    Map(HeapId),
    /// A stable handle naming a node, edge, walker, or graph root.
    Entity(EntityId),
    /// An ordered, duplicate-free collection of entity handles.
    Set(EntitySet),
    /// A resolved ability or builtin action.
    Action(Box<Action>),
}

/// Numeric view used for arithmetic coercion: booleans count as integers.
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn as_f64(&self) -> f64 {
        match self {
            Self::Int(i) => *i as f64,
            Self::Float(f) => *f,
        }
    }
}

impl Value {
    /// The language-level type name, used in diagnostics and type checks.
    /// Entities report their kind (`node`, `edge`, `walker`, `graph`).
    pub fn type_name(&self, graph: &GraphStore) -> &'static str {
        match self {
            Self::Entity(id) => graph.get(*id).map_or("null", |e| e.kind.into()),
            _ => self.kind_str(),
        }
    }

    /// Graph-free tag name; entities report the generic "entity".
    fn kind_str(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Set(_) => "set",
            Self::Entity(_) => "entity",
            Self::Action(_) => "action",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The entity handle inside this value, if it is one.
    pub fn as_entity(&self) -> Option<EntityId> {
        match self {
            Self::Entity(id) => Some(*id),
            _ => None,
        }
    }

    fn as_num(&self) -> Option<Num> {
        match self {
            Self::Bool(b) => Some(Num::Int(i64::from(*b))),
            Self::Int(i) => Some(Num::Int(*i)),
            Self::Float(f) => Some(Num::Float(*f)),
            _ => None,
        }
    }

    /// Dynamic truthiness: empty containers, zero, the empty string, and
    /// `Null` are falsy; entities and actions are truthy.
    pub fn truthy(&self, heap: &Heap) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::List(id) => !heap.list(*id).is_empty(),
            Self::Map(id) => !heap.map(*id).is_empty(),
            Self::Set(set) => !set.is_empty(),
            Self::Entity(_) | Self::Action(_) => true,
        }
    }

    /// Equality under the language's dynamic-typing rules.
    ///
    /// Numbers compare across Bool/Int/Float; lists and maps compare deeply
    /// through the heap; entities compare by handle; values of unrelated
    /// types are unequal.
    pub fn eq_value(&self, other: &Self, heap: &Heap) -> bool {
        if let (Some(a), Some(b)) = (self.as_num(), other.as_num()) {
            return match (a, b) {
                (Num::Int(x), Num::Int(y)) => x == y,
                (x, y) => x.as_f64() == y.as_f64(),
            };
        }
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Entity(a), Self::Entity(b)) => a == b,
            (Self::Set(a), Self::Set(b)) => a == b,
            (Self::Action(a), Self::Action(b)) => a.name == b.name,
            (Self::List(a), Self::List(b)) => {
                let (xs, ys) = (heap.list(*a).clone(), heap.list(*b).clone());
                xs.len() == ys.len() && xs.iter().zip(&ys).all(|(x, y)| x.eq_value(y, heap))
            }
            (Self::Map(a), Self::Map(b)) => {
                let (xs, ys) = (heap.map(*a).clone(), heap.map(*b).clone());
                xs.len() == ys.len()
                    && xs
                        .iter()
                        .all(|(k, v)| ys.get(k).is_some_and(|w| v.eq_value(w, heap)))
            }
            _ => false,
        }
    }

    /// Ordering under the language's dynamic-typing rules.
    ///
    /// Numbers coerce across Bool/Int/Float (which is what makes the chained
    /// comparison left-fold observable: `false < 1` is true); strings compare
    /// lexicographically; lists compare elementwise. Unrelated types have no
    /// ordering and comparing them is a type error at the call site.
    pub fn partial_cmp_value(&self, other: &Self, heap: &Heap) -> Option<Ordering> {
        if let (Some(a), Some(b)) = (self.as_num(), other.as_num()) {
            return match (a, b) {
                (Num::Int(x), Num::Int(y)) => Some(x.cmp(&y)),
                (x, y) => x.as_f64().partial_cmp(&y.as_f64()),
            };
        }
        match (self, other) {
            (Self::Str(a), Self::Str(b)) => Some(a.cmp(b)),
            (Self::List(a), Self::List(b)) => {
                let (xs, ys) = (heap.list(*a).clone(), heap.list(*b).clone());
                for (x, y) in xs.iter().zip(&ys) {
                    match x.partial_cmp_value(y, heap) {
                        Some(Ordering::Equal) => {}
                        other => return other,
                    }
                }
                Some(xs.len().cmp(&ys.len()))
            }
            _ => None,
        }
    }

    /// Membership test with `self` as the container.
    pub fn contains(&self, needle: &Self, heap: &Heap) -> RtResult<bool> {
        match self {
            Self::List(id) => {
                let items = heap.list(*id).clone();
                Ok(items.iter().any(|item| item.eq_value(needle, heap)))
            }
            Self::Map(id) => match needle {
                Self::Str(key) => Ok(heap.map(*id).contains_key(key)),
                _ => Err(RtError::type_error("map membership requires a string key")),
            },
            Self::Str(s) => match needle {
                Self::Str(sub) => Ok(s.contains(sub.as_str())),
                _ => Err(RtError::type_error("string membership requires a string")),
            },
            Self::Set(set) => match needle {
                Self::Entity(id) => Ok(set.contains(*id)),
                _ => Ok(false),
            },
            _ => Err(RtError::type_error(format!(
                "a {} is not a container",
                self.kind_str()
            ))),
        }
    }

    /// Addition: numeric add, string and list concatenation, set union.
    pub fn add(&self, other: &Self, heap: &mut Heap) -> RtResult<Self> {
        if let (Some(a), Some(b)) = (self.as_num(), other.as_num()) {
            return Ok(match (a, b) {
                (Num::Int(x), Num::Int(y)) => x
                    .checked_add(y)
                    .map_or_else(|| Self::Float(x as f64 + y as f64), Self::Int),
                (x, y) => Self::Float(x.as_f64() + y.as_f64()),
            });
        }
        match (self, other) {
            (Self::Str(a), Self::Str(b)) => Ok(Self::Str(format!("{a}{b}"))),
            (Self::List(a), Self::List(b)) => {
                let mut items = heap.list(*a).clone();
                items.extend(heap.list(*b).clone());
                Ok(Self::List(heap.alloc_list(items)))
            }
            (Self::Set(a), Self::Set(b)) => {
                let mut set = a.clone();
                set.union_with(b);
                Ok(Self::Set(set))
            }
            _ => Err(self.binary_type_error("+", other)),
        }
    }

    pub fn sub(&self, other: &Self) -> RtResult<Self> {
        match (self.as_num(), other.as_num()) {
            (Some(Num::Int(x)), Some(Num::Int(y))) => Ok(x
                .checked_sub(y)
                .map_or_else(|| Self::Float(x as f64 - y as f64), Self::Int)),
            (Some(a), Some(b)) => Ok(Self::Float(a.as_f64() - b.as_f64())),
            _ => Err(self.binary_type_error("-", other)),
        }
    }

    pub fn mul(&self, other: &Self) -> RtResult<Self> {
        match (self.as_num(), other.as_num()) {
            (Some(Num::Int(x)), Some(Num::Int(y))) => Ok(x
                .checked_mul(y)
                .map_or_else(|| Self::Float(x as f64 * y as f64), Self::Int)),
            (Some(a), Some(b)) => Ok(Self::Float(a.as_f64() * b.as_f64())),
            _ => Err(self.binary_type_error("*", other)),
        }
    }

    /// Division is value-dependent: integer division when both operands are
    /// integral, floating-point otherwise. Division by zero is an error.
    pub fn div(&self, other: &Self) -> RtResult<Self> {
        match (self.as_num(), other.as_num()) {
            (Some(Num::Int(x)), Some(Num::Int(y))) => {
                if y == 0 {
                    Err(RtError::new(RtErrorKind::UnsupportedOperation, "division by zero"))
                } else {
                    Ok(Self::Int(x.wrapping_div(y)))
                }
            }
            (Some(a), Some(b)) => {
                if b.as_f64() == 0.0 {
                    Err(RtError::new(RtErrorKind::UnsupportedOperation, "division by zero"))
                } else {
                    Ok(Self::Float(a.as_f64() / b.as_f64()))
                }
            }
            _ => Err(self.binary_type_error("/", other)),
        }
    }

    pub fn modulo(&self, other: &Self) -> RtResult<Self> {
        match (self.as_num(), other.as_num()) {
            (Some(Num::Int(x)), Some(Num::Int(y))) => {
                if y == 0 {
                    Err(RtError::new(RtErrorKind::UnsupportedOperation, "modulo by zero"))
                } else {
                    Ok(Self::Int(x.wrapping_rem(y)))
                }
            }
            (Some(a), Some(b)) => {
                if b.as_f64() == 0.0 {
                    Err(RtError::new(RtErrorKind::UnsupportedOperation, "modulo by zero"))
                } else {
                    Ok(Self::Float(a.as_f64() % b.as_f64()))
                }
            }
            _ => Err(self.binary_type_error("%", other)),
        }
    }

    /// Exponentiation. Integer bases with small non-negative integer
    /// exponents stay integral; everything else goes through floats.
    pub fn pow(&self, other: &Self) -> RtResult<Self> {
        match (self.as_num(), other.as_num()) {
            (Some(Num::Int(x)), Some(Num::Int(y))) if y >= 0 => {
                let result = u32::try_from(y).ok().and_then(|exp| x.checked_pow(exp));
                Ok(result.map_or_else(|| Self::Float((x as f64).powf(y as f64)), Self::Int))
            }
            (Some(a), Some(b)) => Ok(Self::Float(a.as_f64().powf(b.as_f64()))),
            _ => Err(self.binary_type_error("**", other)),
        }
    }

    pub fn neg(&self) -> RtResult<Self> {
        match self.as_num() {
            Some(Num::Int(i)) => Ok(i.checked_neg().map_or_else(|| Self::Float(-(i as f64)), Self::Int)),
            Some(Num::Float(f)) => Ok(Self::Float(-f)),
            None => Err(RtError::type_error(format!("cannot negate a {}", self.kind_str()))),
        }
    }

    fn binary_type_error(&self, op: &str, other: &Self) -> RtError {
        RtError::type_error(format!(
            "unsupported operands for {op}: {} and {}",
            self.kind_str(),
            other.kind_str()
        ))
    }
}

/// Converts a value to a JSON document for entity serialization.
///
/// Entities and entity sets render as jid strings at this level (documents
/// must stay acyclic); actions are not serializable; non-finite floats are
/// rejected because JSON cannot carry them.
pub fn value_to_json(value: &Value, heap: &Heap, graph: &GraphStore) -> RtResult<serde_json::Value> {
    match value {
        Value::Null => Ok(serde_json::Value::Null),
        Value::Bool(b) => Ok(serde_json::Value::Bool(*b)),
        Value::Int(i) => Ok(serde_json::Value::Number((*i).into())),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .ok_or_else(|| RtError::not_serializable("non-finite float")),
        Value::Str(s) => Ok(serde_json::Value::String(s.clone())),
        Value::List(id) => {
            let items = heap.list(*id).clone();
            items
                .iter()
                .map(|item| value_to_json(item, heap, graph))
                .collect::<RtResult<Vec<_>>>()
                .map(serde_json::Value::Array)
        }
        Value::Map(id) => {
            let map = heap.map(*id).clone();
            let mut out = serde_json::Map::new();
            for (key, item) in &map {
                out.insert(key.clone(), value_to_json(item, heap, graph)?);
            }
            Ok(serde_json::Value::Object(out))
        }
        Value::Entity(id) => {
            let entity = graph
                .get(*id)
                .ok_or_else(|| RtError::not_serializable("entity no longer exists"))?;
            Ok(serde_json::Value::String(entity.jid.to_string()))
        }
        Value::Set(set) => set
            .iter()
            .map(|id| value_to_json(&Value::Entity(id), heap, graph))
            .collect::<RtResult<Vec<_>>>()
            .map(serde_json::Value::Array),
        Value::Action(_) => Err(RtError::not_serializable("actions are not serializable")),
    }
}

/// Rebuilds a language value from a JSON document, allocating containers on
/// the heap. Used by the `info` / `details` built-ins to surface entity
/// documents as ordinary values.
pub fn json_to_value(doc: &serde_json::Value, heap: &mut Heap) -> Value {
    match doc {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map_or_else(|| Value::Float(n.as_f64().unwrap_or(0.0)), Value::Int),
        serde_json::Value::String(s) => Value::Str(s.clone()),
        serde_json::Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(|item| json_to_value(item, heap)).collect();
            Value::List(heap.alloc_list(values))
        }
        serde_json::Value::Object(entries) => {
            let mut map = IndexMap::new();
            for (key, item) in entries {
                let value = json_to_value(item, heap);
                map.insert(key.clone(), value);
            }
            Value::Map(heap.alloc_map(map))
        }
    }
}
