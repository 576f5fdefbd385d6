use std::collections::HashMap;

use alloy::json_abi::{Event, EventParam, JsonAbi};
use alloy::primitives::{Address, Bytes, Log, B256, I256, U256};
use alloy_dyn_abi::{DynSolType, DynSolValue};
use serde::{Serialize, Serializer};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::DecodeError;

/// Decoded event argument, shaped by the contract's ABI at runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Bool(bool),
    Uint(U256),
    Int(I256),
    Address(Address),
    Bytes(Bytes),
    FixedBytes(Bytes),
    String(String),
    Array(Vec<FieldValue>),
    Tuple(Vec<FieldValue>),
}

impl FieldValue {
    /// Integers become decimal strings so 256-bit values survive JSONB
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Uint(u) => Value::String(u.to_string()),
            FieldValue::Int(i) => Value::String(i.to_string()),
            FieldValue::Address(addr) => Value::String(format!("{:#x}", addr)),
            FieldValue::Bytes(bytes) | FieldValue::FixedBytes(bytes) => {
                Value::String(format!("0x{}", hex::encode(bytes)))
            }
            FieldValue::String(s) => Value::String(s.clone()),
            FieldValue::Array(items) | FieldValue::Tuple(items) => {
                Value::Array(items.iter().map(FieldValue::to_json).collect())
            }
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<DynSolValue> for FieldValue {
    fn from(value: DynSolValue) -> Self {
        match value {
            DynSolValue::Bool(b) => FieldValue::Bool(b),
            DynSolValue::Int(i, _) => FieldValue::Int(i),
            DynSolValue::Uint(u, _) => FieldValue::Uint(u),
            DynSolValue::FixedBytes(word, size) => {
                FieldValue::FixedBytes(Bytes::copy_from_slice(&word.as_slice()[..size.min(32)]))
            }
            DynSolValue::Address(addr) => FieldValue::Address(addr),
            DynSolValue::Bytes(bytes) => FieldValue::Bytes(Bytes::from(bytes)),
            DynSolValue::String(s) => FieldValue::String(s),
            DynSolValue::Array(items) | DynSolValue::FixedArray(items) => {
                FieldValue::Array(items.into_iter().map(FieldValue::from).collect())
            }
            DynSolValue::Tuple(items) => {
                FieldValue::Tuple(items.into_iter().map(FieldValue::from).collect())
            }
            other => FieldValue::String(format!("{:?}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEventParam {
    pub name: String,
    pub param_type: String,
    pub value: FieldValue,
    pub indexed: bool,
}

/// Per-contract decoder over the events declared in the contract's JSON ABI
#[derive(Debug, Clone, Default)]
pub struct EventDecoder {
    events: HashMap<String, Vec<Event>>,
}

impl EventDecoder {
    pub fn new(abi: &JsonAbi) -> Self {
        let mut events: HashMap<String, Vec<Event>> = HashMap::new();
        for event in abi.events() {
            events.entry(event.name.clone()).or_default().push(event.clone());
        }
        Self { events }
    }

    /// Parse a JSON ABI, adding `"anonymous": false` to events that omit it
    pub fn parse_abi(abi_json: Value) -> Result<JsonAbi, serde_json::Error> {
        let preprocessed = preprocess_abi_json(abi_json);
        serde_json::from_value(preprocessed)
    }

    /// ABI definition for `name`, preferring the overload whose selector is `selector`
    pub fn definition(&self, name: &str, selector: &B256) -> Option<&Event> {
        let overloads = self.events.get(name)?;
        overloads
            .iter()
            .find(|event| event.selector() == *selector)
            .or_else(|| overloads.first())
    }

    pub fn events_count(&self) -> usize {
        self.events.values().map(Vec::len).sum()
    }

    /// Decode a log of the configured event `name`.
    ///
    /// Events the ABI doesn't declare are surfaced raw: up to `raw_field_limit`
    /// indexed topics under `indexed_N` and the data payload under `data`.
    pub fn decode(
        &self,
        name: &str,
        log: &Log,
        raw_field_limit: usize,
    ) -> Result<Vec<ParsedEventParam>, DecodeError> {
        let Some(topic0) = log.topics().first() else {
            return Err(DecodeError::MissingTopics { event: name.to_string() });
        };

        match self.definition(name, topic0) {
            Some(event) => decode_log_with_event(log, event),
            None => {
                debug!("Event {} is not declared in the ABI, keeping raw topics", name);
                Ok(decode_raw(log, raw_field_limit))
            }
        }
    }
}

/// Decode a log entry using a specific (non-anonymous) event definition
pub fn decode_log_with_event(log: &Log, event: &Event) -> Result<Vec<ParsedEventParam>, DecodeError> {
    let topics = log.topics();
    if topics.is_empty() {
        return Err(DecodeError::MissingTopics { event: event.name.clone() });
    }

    let mut parsed: Vec<(usize, ParsedEventParam)> = Vec::with_capacity(event.inputs.len());
    let mut topic_index = 1; // Skip the event signature

    for (position, param) in event.inputs.iter().enumerate().filter(|(_, p)| p.indexed) {
        let topic = topics.get(topic_index).ok_or_else(|| DecodeError::NotEnoughTopics {
            event: event.name.clone(),
            param: param_key(param, position),
        })?;
        let value = decode_indexed_param(event, param, position, *topic)?;
        parsed.push((
            position,
            ParsedEventParam {
                name: param_key(param, position),
                param_type: param.ty.clone(),
                value,
                indexed: true,
            },
        ));
        topic_index += 1;
    }

    let body: Vec<(usize, &EventParam)> = event
        .inputs
        .iter()
        .enumerate()
        .filter(|(_, p)| !p.indexed)
        .collect();
    let values = decode_data_params(event, &body, &log.data.data)?;

    for ((position, param), value) in body.into_iter().zip(values) {
        parsed.push((
            position,
            ParsedEventParam {
                name: param_key(param, position),
                param_type: param.ty.clone(),
                value: value.into(),
                indexed: false,
            },
        ));
    }

    // Keep the declaration order of the event
    parsed.sort_by_key(|(position, _)| *position);
    Ok(parsed.into_iter().map(|(_, param)| param).collect())
}

/// Raw surface for events with no ABI definition
pub fn decode_raw(log: &Log, field_limit: usize) -> Vec<ParsedEventParam> {
    let mut params: Vec<ParsedEventParam> = log
        .topics()
        .iter()
        .skip(1)
        .take(field_limit)
        .enumerate()
        .map(|(i, topic)| ParsedEventParam {
            name: format!("indexed_{}", i),
            param_type: "bytes32".to_string(),
            value: FieldValue::FixedBytes(Bytes::copy_from_slice(topic.as_slice())),
            indexed: true,
        })
        .collect();

    if !log.data.data.is_empty() {
        params.push(ParsedEventParam {
            name: "data".to_string(),
            param_type: "bytes".to_string(),
            value: FieldValue::Bytes(log.data.data.clone()),
            indexed: false,
        });
    }

    params
}

/// Decode an indexed parameter from a topic
fn decode_indexed_param(
    event: &Event,
    param: &EventParam,
    position: usize,
    topic: B256,
) -> Result<FieldValue, DecodeError> {
    let sol_type = resolve_type(param, position)?;

    match &sol_type {
        // Reference types are stored as the keccak256 of their encoding, the value is unrecoverable
        DynSolType::String
        | DynSolType::Bytes
        | DynSolType::Array(_)
        | DynSolType::FixedArray(..)
        | DynSolType::Tuple(_) => Ok(FieldValue::FixedBytes(Bytes::copy_from_slice(topic.as_slice()))),
        _ => sol_type
            .abi_decode(topic.as_slice())
            .map(FieldValue::from)
            .map_err(|e| DecodeError::Abi {
                event: event.name.clone(),
                what: format!("indexed parameter {}", param_key(param, position)),
                reason: e.to_string(),
            }),
    }
}

/// Decode non-indexed parameters from log data
fn decode_data_params(
    event: &Event,
    params: &[(usize, &EventParam)],
    data: &Bytes,
) -> Result<Vec<DynSolValue>, DecodeError> {
    if params.is_empty() {
        return Ok(Vec::new());
    }

    let param_types = params
        .iter()
        .map(|(position, p)| resolve_type(p, *position))
        .collect::<Result<Vec<_>, _>>()?;

    let decoded = DynSolType::Tuple(param_types)
        .abi_decode_params(data)
        .map_err(|e| DecodeError::Abi {
            event: event.name.clone(),
            what: "log data".to_string(),
            reason: e.to_string(),
        })?;

    match decoded {
        DynSolValue::Tuple(values) => Ok(values),
        other => Ok(vec![other]),
    }
}

fn resolve_type(param: &EventParam, position: usize) -> Result<DynSolType, DecodeError> {
    let ty = param.selector_type();
    DynSolType::parse(&ty).map_err(|e| DecodeError::UnknownType {
        param: param_key(param, position),
        ty: ty.to_string(),
        reason: e.to_string(),
    })
}

fn param_key(param: &EventParam, position: usize) -> String {
    if param.name.is_empty() {
        format!("arg_{}", position)
    } else {
        param.name.clone()
    }
}

/// Events without an explicit `anonymous` member are treated as non-anonymous
pub fn preprocess_abi_json(mut abi_json: Value) -> Value {
    if let Value::Array(items) = &mut abi_json {
        for item in items.iter_mut() {
            if let Value::Object(obj) = item {
                let is_event = obj.get("type").and_then(Value::as_str) == Some("event");
                if is_event && !obj.contains_key("anonymous") {
                    if let Some(Value::String(name)) = obj.get("name") {
                        warn!("Event {} has no explicit anonymous field, treating as non-anonymous", name);
                    }
                    obj.insert("anonymous".to_string(), Value::Bool(false));
                }
            }
        }
    }
    abi_json
}
