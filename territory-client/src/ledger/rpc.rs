//! JSON-RPC ledger transport
//!
//! Reads go out as one JSON-RPC batch of `eth_call`s. Writes use
//! `eth_sendTransaction`, so the endpoint must be a wallet provider that
//! holds the player's key and signs on its behalf.

use super::abi;
use super::{GameCall, LedgerReader, LedgerWriter, ReadQuery, ReadValue, Receipt, TxHandle};
use crate::config::{ClientConfig, ContractAddresses};
use crate::{ClientError, ClientResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use shared::models::{Address, Amount};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    id: Option<u64>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

impl RpcErrorObject {
    fn into_error(self) -> ClientError {
        let data = match self.data {
            Some(Value::String(s)) => Some(s),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        };
        let reason = data
            .as_deref()
            .and_then(|d| abi::parse_hex(d).ok())
            .and_then(|bytes| abi::decode_revert_reason(&bytes));
        let reverted = self.code == 3 || self.message.to_lowercase().contains("execution reverted");

        if reason.is_some() || reverted {
            let reason = reason.or_else(|| {
                self.message
                    .split_once("execution reverted: ")
                    .map(|(_, r)| r.trim().to_string())
                    .filter(|r| !r.is_empty())
            });
            return ClientError::Reverted { reason };
        }

        ClientError::Rpc {
            code: self.code,
            message: self.message,
            data,
        }
    }
}

impl RpcResponse {
    fn into_result(self) -> ClientResult<Value> {
        if let Some(error) = self.error {
            return Err(error.into_error());
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

/// Ledger reached over Ethereum-style JSON-RPC
#[derive(Debug)]
pub struct RpcLedger {
    client: Client,
    url: String,
    contracts: ContractAddresses,
    /// Account writes are sent from
    from: Option<Address>,
    expected_chain_id: u64,
    next_id: AtomicU64,
}

impl RpcLedger {
    /// Create a new ledger transport from configuration
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;

        Ok(Self {
            client,
            url: config.rpc_url.clone(),
            contracts: config.contracts,
            from: config.player,
            expected_chain_id: config.chain_id,
            next_id: AtomicU64::new(1),
        })
    }

    fn request<'a>(&self, method: &'a str, params: Value) -> RpcRequest<'a> {
        RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        }
    }

    async fn post(&self, body: &impl Serialize) -> ClientResult<Value> {
        let response = self.client.post(&self.url).json(body).send().await?;
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await?;
            return Err(ClientError::invalid_response(format!("HTTP {}: {}", status, text)));
        }

        response.json().await.map_err(Into::into)
    }

    /// Single JSON-RPC call
    async fn call(&self, method: &str, params: Value) -> ClientResult<Value> {
        let request = self.request(method, params);
        tracing::trace!(method, id = request.id, "rpc call");
        let body = self.post(&request).await?;
        serde_json::from_value::<RpcResponse>(body)?.into_result()
    }

    /// JSON-RPC batch; results come back in request order
    async fn batch(&self, requests: Vec<RpcRequest<'_>>) -> ClientResult<Vec<ClientResult<Value>>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<u64> = requests.iter().map(|r| r.id).collect();
        let body = self.post(&requests).await?;

        let responses: Vec<RpcResponse> = match body {
            Value::Array(items) => items
                .into_iter()
                .map(serde_json::from_value)
                .collect::<Result<_, _>>()?,
            // some nodes answer a rejected batch with one error object
            other => return Err(serde_json::from_value::<RpcResponse>(other)?
                .into_result()
                .err()
                .unwrap_or_else(|| ClientError::invalid_response("expected a batch response"))),
        };

        let mut by_id: HashMap<u64, RpcResponse> = responses
            .into_iter()
            .filter_map(|r| r.id.map(|id| (id, r)))
            .collect();

        Ok(ids
            .into_iter()
            .map(|id| {
                by_id
                    .remove(&id)
                    .ok_or_else(|| ClientError::invalid_response(format!("missing response for id {}", id)))
                    .and_then(RpcResponse::into_result)
            })
            .collect())
    }

    fn read_target(&self, query: &ReadQuery) -> Address {
        match *query {
            ReadQuery::PlayerLocation { .. }
            | ReadQuery::LocationOwner { .. }
            | ReadQuery::LocationBasePower { .. } => self.contracts.map,
            ReadQuery::GarrisonUnits { garrison, .. } => garrison,
            ReadQuery::TokenBalance { token, .. } | ReadQuery::Allowance { token, .. } => token,
            ReadQuery::EscrowBalance { .. } => self.contracts.game_master,
            ReadQuery::GarrisonContract => self.contracts.combat,
            ReadQuery::UnitToken { .. } => self.contracts.unit_factory,
        }
    }

    fn write_target(&self, call: &GameCall) -> Address {
        match *call {
            GameCall::Approve { token, .. } => token,
            GameCall::Deposit { .. } => self.contracts.game_master,
            GameCall::Spawn { .. } => self.contracts.spawn,
            GameCall::Move { .. } => self.contracts.map,
            GameCall::Fortify { garrison, .. } => garrison,
            GameCall::Attack { .. } => self.contracts.combat,
        }
    }
}

fn decode_read(query: &ReadQuery, result: Value) -> ClientResult<ReadValue> {
    let hex = result
        .as_str()
        .ok_or_else(|| ClientError::invalid_response("eth_call result is not a string"))?;
    let bytes = abi::parse_hex(hex)?;
    match query {
        ReadQuery::LocationOwner { .. } | ReadQuery::GarrisonContract | ReadQuery::UnitToken { .. } => {
            abi::decode_address(&bytes).map(ReadValue::Address)
        }
        _ => abi::decode_uint(&bytes).map(ReadValue::Uint),
    }
}

fn parse_receipt(handle: &TxHandle, value: Value) -> ClientResult<Option<Receipt>> {
    if value.is_null() {
        return Ok(None);
    }
    let field = |name: &str| {
        value
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| ClientError::invalid_response(format!("receipt without {}", name)))
    };
    let status = abi::decode_quantity(field("status")?)?;
    let block = abi::decode_quantity(field("blockNumber")?)?;

    Ok(Some(Receipt {
        handle: handle.clone(),
        success: status == 1,
        block,
        revert_reason: None,
    }))
}

#[async_trait]
impl LedgerReader for RpcLedger {
    async fn chain_id(&self) -> ClientResult<u64> {
        let result = self.call("eth_chainId", json!([])).await?;
        let hex = result
            .as_str()
            .ok_or_else(|| ClientError::invalid_response("eth_chainId result is not a string"))?;
        abi::decode_quantity(hex)
    }

    async fn read_batch(&self, queries: &[ReadQuery]) -> ClientResult<Vec<ClientResult<ReadValue>>> {
        let requests = queries
            .iter()
            .map(|query| {
                let to = self.read_target(query);
                let data = format!("0x{}", hex::encode(abi::encode_read(query)));
                self.request("eth_call", json!([{ "to": to, "data": data }, "latest"]))
            })
            .collect();

        let results = self.batch(requests).await?;
        Ok(queries
            .iter()
            .zip(results)
            .map(|(query, result)| result.and_then(|value| decode_read(query, value)))
            .collect())
    }
}

#[async_trait]
impl LedgerWriter for RpcLedger {
    async fn submit(&self, call: &GameCall, value: Amount) -> ClientResult<TxHandle> {
        let from = self
            .from
            .ok_or_else(|| ClientError::config("PLAYER_ADDRESS must be set to send writes"))?;

        let actual = self.chain_id().await?;
        if actual != self.expected_chain_id {
            return Err(ClientError::WrongNetwork {
                expected: self.expected_chain_id,
                actual,
            });
        }

        let tx = json!({
            "from": from,
            "to": self.write_target(call),
            "data": format!("0x{}", hex::encode(abi::encode_call(call))),
            "value": abi::encode_quantity(value.wei()),
        });
        let result = self.call("eth_sendTransaction", json!([tx])).await?;
        let hash = result
            .as_str()
            .ok_or_else(|| ClientError::invalid_response("eth_sendTransaction result is not a string"))?;

        tracing::debug!(call = call.name(), hash, "transaction broadcast");
        Ok(TxHandle::new(hash))
    }

    async fn receipt(&self, handle: &TxHandle) -> ClientResult<Option<Receipt>> {
        let result = self
            .call("eth_getTransactionReceipt", json!([handle.as_str()]))
            .await?;
        parse_receipt(handle, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::LocationId;

    fn rpc_error(value: Value) -> ClientError {
        serde_json::from_value::<RpcErrorObject>(value).unwrap().into_error()
    }

    #[test]
    fn test_user_rejection_stays_rpc_error() {
        let err = rpc_error(json!({"code": 4001, "message": "User rejected the request."}));
        assert!(err.is_user_rejection());
    }

    #[test]
    fn test_revert_with_error_string_payload() {
        let reason = b"not owner";
        let mut data = abi::ERROR_STRING.to_vec();
        data.extend_from_slice(&abi::uint_word(32));
        data.extend_from_slice(&abi::uint_word(reason.len() as u128));
        let mut padded = [0u8; 32];
        padded[..reason.len()].copy_from_slice(reason);
        data.extend_from_slice(&padded);

        let err = rpc_error(json!({
            "code": 3,
            "message": "execution reverted",
            "data": format!("0x{}", hex::encode(data)),
        }));
        assert!(matches!(err, ClientError::Reverted { reason: Some(ref r) } if r == "not owner"));
    }

    #[test]
    fn test_revert_reason_from_message() {
        let err = rpc_error(json!({"code": -32000, "message": "execution reverted: not adjacent"}));
        assert!(matches!(err, ClientError::Reverted { reason: Some(ref r) } if r == "not adjacent"));
    }

    #[test]
    fn test_other_rpc_error() {
        let err = rpc_error(json!({"code": -32000, "message": "nonce too low", "data": {"x": 1}}));
        match err {
            ClientError::Rpc { code, message, data } => {
                assert_eq!(code, -32000);
                assert_eq!(message, "nonce too low");
                assert_eq!(data.as_deref(), Some("{\"x\":1}"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_receipt() {
        let handle = TxHandle::new("0xabc");
        assert_eq!(parse_receipt(&handle, Value::Null).unwrap(), None);

        let receipt = parse_receipt(&handle, json!({"status": "0x1", "blockNumber": "0x10"}))
            .unwrap()
            .unwrap();
        assert!(receipt.success);
        assert_eq!(receipt.block, 16);

        let reverted = parse_receipt(&handle, json!({"status": "0x0", "blockNumber": "0x11"}))
            .unwrap()
            .unwrap();
        assert!(!reverted.success);

        assert!(parse_receipt(&handle, json!({"status": "0x1"})).is_err());
    }

    #[test]
    fn test_decode_read_by_query_type() {
        let owner_word = format!("0x{}", hex::encode(abi::address_word(Address::from_bytes([5; 20]))));
        let value = decode_read(
            &ReadQuery::LocationOwner {
                location: LocationId::new(1),
            },
            json!(owner_word),
        )
        .unwrap();
        assert_eq!(value, ReadValue::Address(Address::from_bytes([5; 20])));

        let power_word = format!("0x{}", hex::encode(abi::uint_word(30)));
        let value = decode_read(
            &ReadQuery::LocationBasePower {
                location: LocationId::new(1),
            },
            json!(power_word),
        )
        .unwrap();
        assert_eq!(value, ReadValue::Uint(Amount::from_wei(30)));

        assert!(decode_read(&ReadQuery::GarrisonContract, json!(42)).is_err());
    }

    #[test]
    fn test_write_targets() {
        let config = ClientConfig::default().with_player(Address::from_bytes([1; 20]));
        let ledger = RpcLedger::new(&config).unwrap();
        let garrison = Address::from_bytes([9; 20]);
        assert_eq!(
            ledger.write_target(&GameCall::Move {
                from: LocationId::new(1),
                to: LocationId::new(2)
            }),
            config.contracts.map
        );
        assert_eq!(
            ledger.write_target(&GameCall::Fortify {
                garrison,
                location: LocationId::new(1),
                token: Address::ZERO,
                units: 1
            }),
            garrison
        );
        assert_eq!(
            ledger.write_target(&GameCall::Deposit {
                token: config.contracts.gold,
                amount: Amount::from_units(1)
            }),
            config.contracts.game_master
        );
    }
}
