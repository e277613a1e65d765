//! Depth-bounded serialization of live interpreter values.
//!
//! The host exposes its values through [`HostValue`], which classifies a value
//! into a closed set of shapes. [`serialize`] walks that view and produces a
//! [`ValueNode`] tree that no longer borrows anything from the runtime.

use std::borrow::Cow;

use serde::Serialize;

use crate::error::SerializeError;

/// Interpreter type names as clients see them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeTag {
    Nil,
    Boolean,
    Number,
    String,
    Table,
    Function,
    Userdata,
    Thread,
}

impl TypeTag {
    pub fn as_str(self) -> &'static str {
        match self {
            TypeTag::Nil => "nil",
            TypeTag::Boolean => "boolean",
            TypeTag::Number => "number",
            TypeTag::String => "string",
            TypeTag::Table => "table",
            TypeTag::Function => "function",
            TypeTag::Userdata => "userdata",
            TypeTag::Thread => "thread",
        }
    }
}

/// The shape of a host value.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueClass<'a> {
    Nil,
    Boolean(bool),
    Number(f64),
    Text(Cow<'a, str>),
    /// Something that is never traversed: functions, userdata, coroutines.
    /// `identity` must be stable for the lifetime of the value.
    Reference { tag: TypeTag, identity: usize },
    /// An associative container whose entries come from
    /// [`HostValue::for_each_entry`].
    Container { identity: usize },
}

/// Read-only view of one interpreter value.
pub trait HostValue {
    fn class(&self) -> ValueClass<'_>;

    /// Visit every key/value pair in native iteration order. Only called for
    /// [`ValueClass::Container`] values. The entries are only borrowed for the
    /// duration of the callback.
    fn for_each_entry(&self, _visit: &mut dyn FnMut(&dyn HostValue, &dyn HostValue)) {}
}

/// A serialized value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueNode {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub type_tag: TypeTag,
    /// Set on containers cut off by the depth limit; `value` then holds the
    /// identifier instead of the entries.
    #[serde(rename = "raw", skip_serializing_if = "is_false")]
    pub truncated: bool,
    pub value: Payload,
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Payload of a [`ValueNode`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Null,
    Boolean(bool),
    Number(f64),
    Text(String),
    /// Identifier token of an untraversed value.
    Reference(String),
    Entries(Vec<Entry>),
}

/// One key/value pair of a serialized container.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entry {
    pub key: ValueNode,
    pub value: ValueNode,
}

impl ValueNode {
    /// A nameless `nil`.
    pub fn nil() -> Self {
        Self {
            name: None,
            type_tag: TypeTag::Nil,
            truncated: false,
            value: Payload::Null,
        }
    }

    /// Entries of an expanded container, or an empty slice.
    pub fn entries(&self) -> &[Entry] {
        match &self.value {
            Payload::Entries(entries) => entries,
            _ => &[],
        }
    }
}

/// Serialize `value` down to `levels` container levels.
///
/// At `levels == 0` a container becomes a truncated summary; otherwise its
/// keys are serialized at depth 0 and its values at `levels - 1`. There is no
/// cycle detection: the depth bound is what terminates self-referencing tables.
pub fn serialize(
    value: &dyn HostValue,
    levels: i32,
    name: Option<&str>,
) -> Result<ValueNode, SerializeError> {
    if levels < 0 {
        return Err(SerializeError::NegativeDepth(levels));
    }
    Ok(serialize_node(value, levels as u32, name.map(str::to_owned)))
}

fn serialize_node(value: &dyn HostValue, levels: u32, name: Option<String>) -> ValueNode {
    let (type_tag, truncated, payload) = match value.class() {
        ValueClass::Nil => (TypeTag::Nil, false, Payload::Null),
        ValueClass::Boolean(b) => (TypeTag::Boolean, false, Payload::Boolean(b)),
        ValueClass::Number(n) => (TypeTag::Number, false, Payload::Number(n)),
        ValueClass::Text(s) => (TypeTag::String, false, Payload::Text(s.into_owned())),
        ValueClass::Reference { tag, identity } => {
            (tag, false, Payload::Reference(identifier(identity)))
        }
        ValueClass::Container { identity } if levels == 0 => {
            (TypeTag::Table, true, Payload::Reference(identifier(identity)))
        }
        ValueClass::Container { .. } => {
            let mut entries = Vec::new();
            value.for_each_entry(&mut |key, val| {
                entries.push(Entry {
                    key: serialize_node(key, 0, None),
                    value: serialize_node(val, levels - 1, None),
                });
            });
            (TypeTag::Table, false, Payload::Entries(entries))
        }
    };
    ValueNode {
        name,
        type_tag,
        truncated,
        value: payload,
    }
}

fn identifier(identity: usize) -> String {
    format!("{:#x}", identity)
}
