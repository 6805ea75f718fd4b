//! CBOR wire format for transaction bodies, witnesses and outputs.
//!
//! Each structure is lowered to a [`ciborium::value::Value`] tree with
//! integer map keys and written with [`ciborium::into_writer`]. Integer heads
//! always use the shortest form, so encoded lengths are deterministic and
//! fee estimation over a draft matches the final serialization.
//!
//! Layout:
//! ```text
//! transaction = [body, witness_set, true, null]
//! body        = {0: [[tx_hash, index]*], 1: [output*], 2: fee, 3: ttl}
//! output      = [address_bytes, value]
//! value       = coin / [coin, {policy_id: {asset_name: quantity}}]
//! witness_set = {0: [[vkey, signature]*]}  ; {} when unsigned
//! ```

use ciborium::value::Value;
use std::collections::BTreeMap;

use crate::error::TransactionError;
use crate::types::{AssetName, Balance, PolicyId, Transaction, TransactionBody, TxOutput, WitnessSet};

fn uint(n: u64) -> Value {
    Value::Integer(n.into())
}

fn bytes(data: &[u8]) -> Value {
    Value::Bytes(data.to_vec())
}

fn value_of(balance: &Balance) -> Value {
    if balance.is_pure_ada() {
        return uint(balance.lovelace);
    }
    let mut by_policy: BTreeMap<&PolicyId, Vec<(&AssetName, u64)>> = BTreeMap::new();
    for (id, qty) in balance.assets() {
        by_policy.entry(&id.policy_id).or_default().push((&id.name, qty));
    }
    let multiasset = by_policy
        .into_iter()
        .map(|(policy, names)| {
            let names = names.into_iter().map(|(name, qty)| (bytes(name.as_bytes()), uint(qty))).collect();
            (bytes(policy.as_bytes()), Value::Map(names))
        })
        .collect();
    Value::Array(vec![uint(balance.lovelace), Value::Map(multiasset)])
}

fn output_value(output: &TxOutput) -> Value {
    Value::Array(vec![bytes(&output.address.to_bytes()), value_of(&output.balance)])
}

fn body_value(body: &TransactionBody) -> Value {
    let inputs = body
        .inputs
        .iter()
        .map(|input| Value::Array(vec![bytes(input.tx_hash.as_bytes()), uint(u64::from(input.index))]))
        .collect();
    let outputs = body.outputs.iter().map(output_value).collect();
    Value::Map(vec![
        (uint(0), Value::Array(inputs)),
        (uint(1), Value::Array(outputs)),
        (uint(2), uint(body.fee)),
        (uint(3), uint(body.ttl)),
    ])
}

fn witness_set_value(witnesses: &WitnessSet) -> Value {
    if witnesses.is_empty() {
        return Value::Map(Vec::new());
    }
    let vkeys = witnesses
        .vkeys
        .iter()
        .map(|w| Value::Array(vec![bytes(&w.vkey), bytes(w.signature.as_bytes())]))
        .collect();
    Value::Map(vec![(uint(0), Value::Array(vkeys))])
}

fn write(value: &Value) -> Result<Vec<u8>, TransactionError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| TransactionError::Serialization(e.to_string()))?;
    Ok(buf)
}

pub fn encode_output(output: &TxOutput) -> Result<Vec<u8>, TransactionError> {
    write(&output_value(output))
}

pub fn encode_body(body: &TransactionBody) -> Result<Vec<u8>, TransactionError> {
    write(&body_value(body))
}

pub fn encode_witness_set(witnesses: &WitnessSet) -> Result<Vec<u8>, TransactionError> {
    write(&witness_set_value(witnesses))
}

pub fn encode_transaction(tx: &Transaction) -> Result<Vec<u8>, TransactionError> {
    write(&Value::Array(vec![
        body_value(&tx.body),
        witness_set_value(&tx.witnesses),
        Value::Bool(true),
        Value::Null,
    ]))
}
