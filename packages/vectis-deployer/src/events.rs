//! Reading results out of the events a transaction emitted.
//!
//! Contracts created inside a tx (nested instantiation, governance execution,
//! code upload) are only observable here. Matching is exact on the event type
//! and attribute key, an empty value counts as missing.

use cosmwasm_std::Event;

use crate::{
    backend::TxResult,
    error::{DeployError, DeployResult},
};

pub const INSTANTIATE_EVENT: &str = "instantiate";
pub const STORE_CODE_EVENT: &str = "store_code";
pub const WASM_EVENT: &str = "wasm";
pub const CONTRACT_ADDR_KEY: &str = "_contract_address";
pub const CODE_ID_KEY: &str = "code_id";

fn values<'a>(
    events: &'a [Event],
    event_type: &'a str,
    key: &'a str,
) -> impl Iterator<Item = &'a str> + 'a {
    events
        .iter()
        .filter(move |e| e.ty == event_type)
        .flat_map(move |e| e.attributes.iter().filter(move |a| a.key == key))
        .map(|a| a.value.as_str())
        .filter(|v| !v.is_empty())
}

/// First value of `key` on an event of type `event_type`
pub fn extract_attribute(tx: &TxResult, event_type: &str, key: &str) -> DeployResult<String> {
    values(&tx.events, event_type, key)
        .next()
        .map(str::to_string)
        .ok_or_else(|| DeployError::EventNotFound {
            event_type: event_type.to_string(),
            key: key.to_string(),
        })
}

pub fn extract_address(tx: &TxResult, event_type: &str, key: &str) -> DeployResult<String> {
    extract_attribute(tx, event_type, key)
}

/// Every contract instantiated by the tx, in emission order
pub fn instantiated_addresses(tx: &TxResult) -> Vec<String> {
    values(&tx.events, INSTANTIATE_EVENT, CONTRACT_ADDR_KEY)
        .map(str::to_string)
        .collect()
}

/// Attribute set by `contract` itself on its `wasm` event
pub fn wasm_attribute(tx: &TxResult, contract: &str, key: &str) -> Option<String> {
    tx.events
        .iter()
        .filter(|e| e.ty == WASM_EVENT)
        .filter(|e| {
            e.attributes
                .iter()
                .any(|a| a.key == CONTRACT_ADDR_KEY && a.value == contract)
        })
        .flat_map(|e| e.attributes.iter())
        .find(|a| a.key == key && !a.value.is_empty())
        .map(|a| a.value.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn tx(events: Vec<Event>) -> TxResult {
        TxResult {
            hash: "AB".into(),
            height: 1,
            code: 0,
            log: String::new(),
            gas_used: 0,
            events,
            data: None,
        }
    }

    #[test]
    fn exact_match_only() {
        let res = tx(vec![
            Event::new("instantiate_v2").add_attribute(CONTRACT_ADDR_KEY, "juno1wrong"),
            Event::new(INSTANTIATE_EVENT).add_attribute("_contract_address_x", "juno1wrong"),
            Event::new(INSTANTIATE_EVENT).add_attribute(CONTRACT_ADDR_KEY, "juno1right"),
        ]);
        assert_eq!(
            extract_address(&res, INSTANTIATE_EVENT, CONTRACT_ADDR_KEY).unwrap(),
            "juno1right"
        );
    }

    #[test]
    fn missing_or_empty_fails_loudly() {
        let res = tx(vec![Event::new(INSTANTIATE_EVENT).add_attribute(CONTRACT_ADDR_KEY, "")]);
        assert_matches!(
            extract_address(&res, INSTANTIATE_EVENT, CONTRACT_ADDR_KEY),
            Err(DeployError::EventNotFound { event_type, key })
                if event_type == INSTANTIATE_EVENT && key == CONTRACT_ADDR_KEY
        );
        assert_matches!(
            extract_attribute(&tx(vec![]), STORE_CODE_EVENT, CODE_ID_KEY),
            Err(DeployError::EventNotFound { .. })
        );
    }

    #[test]
    fn collects_nested_instantiations() {
        let res = tx(vec![
            Event::new(INSTANTIATE_EVENT).add_attribute(CONTRACT_ADDR_KEY, "juno1dao"),
            Event::new(WASM_EVENT).add_attribute(CONTRACT_ADDR_KEY, "juno1dao"),
            Event::new(INSTANTIATE_EVENT).add_attribute(CONTRACT_ADDR_KEY, "juno1voting"),
        ]);
        assert_eq!(instantiated_addresses(&res), vec!["juno1dao", "juno1voting"]);
    }

    #[test]
    fn wasm_attribute_is_scoped_to_contract() {
        let res = tx(vec![
            Event::new(WASM_EVENT)
                .add_attribute(CONTRACT_ADDR_KEY, "juno1other")
                .add_attribute("proposal_id", "9"),
            Event::new(WASM_EVENT)
                .add_attribute(CONTRACT_ADDR_KEY, "juno1prop")
                .add_attribute("proposal_id", "3"),
        ]);
        assert_eq!(wasm_attribute(&res, "juno1prop", "proposal_id").as_deref(), Some("3"));
        assert_eq!(wasm_attribute(&res, "juno1none", "proposal_id"), None);
    }
}
