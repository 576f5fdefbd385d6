use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use alloy::json_abi::JsonAbi;
use alloy::primitives::{Address, Log, B256};
use alloy_dyn_abi::DynSolType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{ConfigError, DecodeError};
use crate::event_decoder::{EventDecoder, ParsedEventParam};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventConfig {
    pub signature: String,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractConfig {
    /// Optional restatement of the map key, which is the address used
    #[serde(default)]
    pub address: Option<String>,
    /// JSON ABI, either as an encoded string or inline
    pub abi: Value,
    #[serde(default)]
    pub events: BTreeMap<String, EventConfig>,
}

#[derive(Debug, Clone)]
struct ConfiguredEvent {
    name: String,
    signature: B256,
    field_count: usize,
}

#[derive(Debug, Clone)]
struct ContractSchema {
    decoder: EventDecoder,
    events: Vec<ConfiguredEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEvent {
    pub contract: Address,
    pub name: String,
    pub fields: Vec<ParsedEventParam>,
}

/// Contracts whose events are decoded, built once at startup and shared read-only
#[derive(Debug, Clone, Default)]
pub struct ContractRegistry {
    contracts: BTreeMap<Address, ContractSchema>,
}

impl ContractRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let registry = Self::from_json_str(&content)?;
        info!(
            "Loaded {} contract(s) from {}",
            registry.contracts.len(),
            path.display()
        );
        Ok(registry)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let configs: BTreeMap<String, ContractConfig> = serde_json::from_str(content)?;
        Self::from_configs(configs)
    }

    pub fn from_configs(configs: BTreeMap<String, ContractConfig>) -> Result<Self, ConfigError> {
        let mut contracts = BTreeMap::new();

        for (key, contract) in configs {
            let address = Address::from_str(&key)
                .map_err(|e| ConfigError::Invalid(format!("contract {}: bad address: {}", key, e)))?;
            if let Some(member) = &contract.address {
                let matches = Address::from_str(member).is_ok_and(|stated| stated == address);
                if !matches {
                    return Err(ConfigError::Invalid(format!(
                        "contract {}: address member {} does not match the key",
                        key, member
                    )));
                }
            }

            let abi = parse_contract_abi(&key, contract.abi)?;
            let decoder = EventDecoder::new(&abi);

            let mut events = Vec::with_capacity(contract.events.len());
            for (name, event) in contract.events {
                let signature = B256::from_str(&event.signature).map_err(|e| {
                    ConfigError::Invalid(format!(
                        "contract {} event {}: signature {} is not a 32-byte hex value: {}",
                        key, name, event.signature, e
                    ))
                })?;

                for (field, ty) in &event.fields {
                    DynSolType::parse(ty).map_err(|e| {
                        ConfigError::Invalid(format!(
                            "contract {} event {} field {}: unknown type {}: {}",
                            key, name, field, ty, e
                        ))
                    })?;
                }

                let abi_selectors: Vec<B256> = abi
                    .events()
                    .filter(|e| e.name == name)
                    .map(|e| e.selector())
                    .collect();
                if !abi_selectors.is_empty() && !abi_selectors.contains(&signature) {
                    warn!(
                        "Contract {} event {}: configured signature {:#x} differs from the ABI selector {:#x}",
                        key, name, signature, abi_selectors[0]
                    );
                }

                events.push(ConfiguredEvent {
                    name,
                    signature,
                    field_count: event.fields.len(),
                });
            }

            if contracts.insert(address, ContractSchema { decoder, events }).is_some() {
                warn!("Contract {:#x} configured more than once, keeping the last entry", address);
            }
        }

        Ok(Self { contracts })
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.contracts.keys().copied().collect()
    }

    /// `None` when the log isn't a configured event of a configured contract
    pub fn decode_log(&self, log: &Log) -> Option<Result<DecodedEvent, DecodeError>> {
        let schema = self.contracts.get(&log.address)?;
        let topic0 = log.topics().first()?;
        let event = schema.events.iter().find(|e| e.signature == *topic0)?;

        let decoded = schema
            .decoder
            .decode(&event.name, log, event.field_count)
            .map(|fields| DecodedEvent {
                contract: log.address,
                name: event.name.clone(),
                fields,
            });
        Some(decoded)
    }
}

fn parse_contract_abi(key: &str, abi: Value) -> Result<JsonAbi, ConfigError> {
    let abi_json = match abi {
        Value::String(encoded) => serde_json::from_str(&encoded).map_err(|e| {
            ConfigError::Invalid(format!("contract {}: ABI string is not valid JSON: {}", key, e))
        })?,
        inline => inline,
    };

    EventDecoder::parse_abi(abi_json)
        .map_err(|e| ConfigError::Invalid(format!("contract {}: invalid ABI: {}", key, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{keccak256, Bytes, LogData, U256};
    use serde_json::json;

    use crate::event_decoder::FieldValue;

    const TOKEN: &str = "0x1111111111111111111111111111111111111111";

    fn approval_config(abi: Value) -> String {
        json!({
            TOKEN: {
                "address": TOKEN,
                "abi": abi,
                "events": {
                    "Approval": {
                        "signature": format!("{:#x}", keccak256("Approval(address,address,uint256)")),
                        "fields": {"owner": "address", "spender": "address", "value": "uint256"}
                    }
                }
            }
        })
        .to_string()
    }

    fn approval_abi() -> Value {
        json!([{
            "type": "event",
            "name": "Approval",
            "anonymous": false,
            "inputs": [
                {"name": "owner", "type": "address", "indexed": true},
                {"name": "spender", "type": "address", "indexed": true},
                {"name": "value", "type": "uint256", "indexed": false}
            ]
        }])
    }

    fn approval_log(address: Address) -> Log {
        let owner = Address::repeat_byte(0xaa);
        let spender = Address::repeat_byte(0xbb);
        Log {
            address,
            data: LogData::new_unchecked(
                vec![
                    keccak256("Approval(address,address,uint256)"),
                    owner.into_word(),
                    spender.into_word(),
                ],
                Bytes::from(U256::from(42u64).to_be_bytes::<32>().to_vec()),
            ),
        }
    }

    #[test]
    fn test_abi_as_encoded_string() {
        let registry = ContractRegistry::from_json_str(&approval_config(Value::String(
            approval_abi().to_string(),
        )))
        .unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.addresses(), vec![Address::from_str(TOKEN).unwrap()]);
    }

    #[test]
    fn test_decodes_configured_event() {
        let registry = ContractRegistry::from_json_str(&approval_config(approval_abi())).unwrap();
        let address = Address::from_str(TOKEN).unwrap();

        let decoded = registry.decode_log(&approval_log(address)).unwrap().unwrap();
        assert_eq!(decoded.name, "Approval");
        assert_eq!(decoded.fields[0].value, FieldValue::Address(Address::repeat_byte(0xaa)));
        assert_eq!(decoded.fields[1].value, FieldValue::Address(Address::repeat_byte(0xbb)));
        assert_eq!(decoded.fields[2].value, FieldValue::Uint(U256::from(42u64)));
    }

    #[test]
    fn test_event_missing_from_abi_is_raw() {
        let registry = ContractRegistry::from_json_str(&approval_config(json!([]))).unwrap();
        let address = Address::from_str(TOKEN).unwrap();

        let decoded = registry.decode_log(&approval_log(address)).unwrap().unwrap();
        let names: Vec<&str> = decoded.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["indexed_0", "indexed_1", "data"]);
    }

    #[test]
    fn test_unconfigured_logs_are_ignored() {
        let registry = ContractRegistry::from_json_str(&approval_config(approval_abi())).unwrap();
        assert!(registry.decode_log(&approval_log(Address::repeat_byte(0x22))).is_none());

        let mut other_topic = approval_log(Address::from_str(TOKEN).unwrap());
        other_topic.data = LogData::new_unchecked(vec![B256::repeat_byte(0x01)], Bytes::new());
        assert!(registry.decode_log(&other_topic).is_none());
    }

    #[test]
    fn test_rejects_bad_signature() {
        let config = json!({
            TOKEN: {
                "address": TOKEN,
                "abi": "[]",
                "events": {"Approval": {"signature": "0x1234", "fields": {}}}
            }
        });
        let err = ContractRegistry::from_json_str(&config.to_string()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_unknown_field_type() {
        let config = json!({
            TOKEN: {
                "address": TOKEN,
                "abi": "[]",
                "events": {"Approval": {
                    "signature": format!("{:#x}", B256::ZERO),
                    "fields": {"owner": "adress"}
                }}
            }
        });
        assert!(ContractRegistry::from_json_str(&config.to_string()).is_err());
    }

    #[test]
    fn test_loads_example_file() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/contracts.example.json");
        let registry = ContractRegistry::from_file(path).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(ContractRegistry::from_file("./does-not-exist.json").is_err());
    }

    #[test]
    fn test_rejects_bad_address() {
        let config = json!({"x": {"abi": "[]", "events": {}}});
        assert!(ContractRegistry::from_json_str(&config.to_string()).is_err());
    }

    #[test]
    fn test_key_is_the_address() {
        let config = json!({TOKEN: {"abi": approval_abi(), "events": {}}});
        let registry = ContractRegistry::from_json_str(&config.to_string()).unwrap();
        assert_eq!(registry.addresses(), vec![Address::from_str(TOKEN).unwrap()]);

        // Same address, different letter case
        let key = format!("0x{}", "ab".repeat(20));
        let member = format!("0x{}", "AB".repeat(20));
        let config = json!({key: {"address": member, "abi": "[]", "events": {}}});
        let registry = ContractRegistry::from_json_str(&config.to_string()).unwrap();
        assert_eq!(registry.addresses(), vec![Address::repeat_byte(0xab)]);
    }

    #[test]
    fn test_rejects_address_member_differing_from_key() {
        for member in ["0x2222222222222222222222222222222222222222", "0xnothex"] {
            let config = json!({TOKEN: {"address": member, "abi": "[]", "events": {}}});
            let err = ContractRegistry::from_json_str(&config.to_string()).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)));
        }
    }
}
