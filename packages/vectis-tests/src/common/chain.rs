use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use bech32::{ToBase32, Variant};
use cosmwasm_std::{from_json, to_json_binary, Binary, CosmosMsg, Event, IbcOrder, WasmMsg};
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use vectis_deployer::{
    backend::{AccountInfo, BackendError, ChainBackend, ChainStatus, ContractInfo, Msg, SignedTx, TxResult},
    signer::verify_signature,
};
use vectis_wallet::{contract_from_port_id, wasm_port_id, StdAck, ICS20_ORDER, ICS20_PORT, ICS20_VERSION};

pub type MockResult<T> = Result<T, String>;

pub fn err(e: impl std::fmt::Display) -> String {
    e.to_string()
}

pub fn parse<T: DeserializeOwned>(msg: &Binary) -> MockResult<T> {
    from_json(msg).map_err(err)
}

pub fn respond<T: Serialize>(res: &T) -> MockResult<Binary> {
    to_json_binary(res).map_err(err)
}

/// Contract logic a simulated chain runs for a stored code
pub trait MockCode: Send + Sync {
    fn instantiate(&self, ctx: &mut Ctx, msg: &Binary) -> MockResult<()>;

    fn execute(&self, ctx: &mut Ctx, msg: &Binary) -> MockResult<()>;

    fn query(&self, deps: &Deps, msg: &Binary) -> MockResult<Binary>;

    fn channel_open(&self, _ctx: &mut Ctx, _channel: &ChannelInfo) -> MockResult<()> {
        Err("contract is not ibc enabled".to_string())
    }

    fn channel_connect(&self, _ctx: &mut Ctx, _channel: &ChannelInfo) -> MockResult<()> {
        Ok(())
    }

    fn packet_receive(&self, _ctx: &mut Ctx, _packet: &Packet) -> MockResult<Binary> {
        Err("contract is not ibc enabled".to_string())
    }

    fn packet_ack(&self, _ctx: &mut Ctx, _packet: &Packet, _ack: &Binary) -> MockResult<()> {
        Ok(())
    }
}

/// Bytecode to contract logic, shared by every simulated chain
#[derive(Clone, Default)]
pub struct CodeRegistry {
    codes: HashMap<Vec<u8>, Arc<dyn MockCode>>,
}

impl CodeRegistry {
    pub fn register(&mut self, wasm: &[u8], code: Arc<dyn MockCode>) {
        self.codes.insert(wasm.to_vec(), code);
    }

    pub fn get(&self, wasm: &[u8]) -> Option<Arc<dyn MockCode>> {
        self.codes.get(wasm).cloned()
    }
}

#[derive(Clone)]
struct StoredCode {
    checksum: Vec<u8>,
    code: Arc<dyn MockCode>,
}

#[derive(Clone, Debug)]
pub struct ContractEntry {
    pub code_id: u64,
    pub creator: String,
    pub admin: Option<String>,
    pub label: String,
    storage: serde_json::Value,
}

#[derive(Clone, Debug)]
pub struct ConnectionEnd {
    pub counterparty: Option<String>,
    pub open: bool,
}

#[derive(Clone, Debug)]
pub struct ChannelEnd {
    pub port_id: String,
    pub counterparty_port_id: String,
    pub counterparty_channel_id: Option<String>,
    pub connection_id: String,
    pub version: String,
    pub order: IbcOrder,
    pub open: bool,
}

/// What a contract sees of a channel during the handshake
#[derive(Clone, Debug)]
pub struct ChannelInfo {
    pub channel_id: String,
    pub port_id: String,
    pub counterparty_port_id: String,
    pub counterparty_channel_id: Option<String>,
    pub connection_id: String,
    pub version: String,
    pub order: IbcOrder,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Packet {
    pub sequence: u64,
    pub src_port: String,
    pub src_channel: String,
    pub dst_port: String,
    pub dst_channel: String,
    pub data: Binary,
}

#[derive(Clone)]
struct Included {
    result: TxResult,
    polls_left: u32,
}

#[derive(Clone)]
pub struct ChainState {
    chain_id: String,
    prefix: String,
    fee_denom: String,
    height: u64,
    unreachable: bool,
    fail_broadcasts: u32,
    inclusion_delay: u32,
    broadcasts: u32,
    registry: Arc<CodeRegistry>,
    sequences: BTreeMap<String, u64>,
    codes: Vec<StoredCode>,
    contracts: BTreeMap<String, ContractEntry>,
    contract_seq: u64,
    txs: HashMap<String, Included>,
    connections: BTreeMap<String, ConnectionEnd>,
    next_connection: u64,
    channels: BTreeMap<String, ChannelEnd>,
    next_channel: u64,
    // (src channel, sequence)
    commitments: BTreeMap<(String, u64), Packet>,
    next_sequence: BTreeMap<String, u64>,
    // (dst channel, sequence) -> ack
    receipts: BTreeMap<(String, u64), Binary>,
}

impl ChainState {
    fn new(chain_id: &str, prefix: &str, fee_denom: &str, registry: Arc<CodeRegistry>) -> Self {
        ChainState {
            chain_id: chain_id.to_string(),
            prefix: prefix.to_string(),
            fee_denom: fee_denom.to_string(),
            height: 1,
            unreachable: false,
            fail_broadcasts: 0,
            inclusion_delay: 1,
            broadcasts: 0,
            registry,
            sequences: BTreeMap::new(),
            codes: vec![],
            contracts: BTreeMap::new(),
            contract_seq: 0,
            txs: HashMap::new(),
            connections: BTreeMap::new(),
            next_connection: 0,
            channels: BTreeMap::new(),
            next_channel: 0,
            commitments: BTreeMap::new(),
            next_sequence: BTreeMap::new(),
            receipts: BTreeMap::new(),
        }
    }

    fn reachable(&self) -> Result<(), BackendError> {
        if self.unreachable {
            Err(BackendError::Unreachable(format!("{} is down", self.chain_id)))
        } else {
            Ok(())
        }
    }

    fn next_contract_address(&mut self) -> String {
        self.contract_seq += 1;
        let hash = Sha256::digest(format!("{}/contract/{}", self.chain_id, self.contract_seq));
        bech32::encode(&self.prefix, hash.to_vec().to_base32(), Variant::Bech32)
            .expect("valid bech32 prefix")
    }

    fn code_of(&self, contract: &str) -> MockResult<Arc<dyn MockCode>> {
        let entry = self
            .contracts
            .get(contract)
            .ok_or_else(|| format!("contract {contract} not found"))?;
        self.codes
            .get(entry.code_id as usize - 1)
            .map(|c| c.code.clone())
            .ok_or_else(|| format!("code {} not found", entry.code_id))
    }

    fn store_code(&mut self, wasm: &[u8], events: &mut Vec<Event>) -> MockResult<u64> {
        let checksum = Sha256::digest(wasm).to_vec();
        let code_id = match self.codes.iter().position(|c| c.checksum == checksum) {
            Some(index) => index as u64 + 1,
            None => {
                let code = self
                    .registry
                    .get(wasm)
                    .ok_or("invalid wasm: unknown bytecode")?;
                self.codes.push(StoredCode { checksum, code });
                self.codes.len() as u64
            }
        };
        events.push(Event::new("store_code").add_attribute("code_id", code_id.to_string()));
        Ok(code_id)
    }

    fn instantiate_contract(
        &mut self,
        sender: &str,
        code_id: u64,
        msg: &Binary,
        admin: Option<String>,
        label: &str,
        events: &mut Vec<Event>,
    ) -> MockResult<String> {
        let code = self
            .codes
            .get((code_id as usize).wrapping_sub(1))
            .map(|c| c.code.clone())
            .ok_or_else(|| format!("code {code_id} not found"))?;
        let address = self.next_contract_address();
        self.contracts.insert(
            address.clone(),
            ContractEntry {
                code_id,
                creator: sender.to_string(),
                admin,
                label: label.to_string(),
                storage: serde_json::Value::Null,
            },
        );
        events.push(
            Event::new("instantiate")
                .add_attribute("_contract_address", &address)
                .add_attribute("code_id", code_id.to_string()),
        );
        let mut ctx = Ctx::new(self, &address, sender, events);
        code.instantiate(&mut ctx, msg)?;
        ctx.finish();
        Ok(address)
    }

    fn execute_contract(
        &mut self,
        sender: &str,
        contract: &str,
        msg: &Binary,
        events: &mut Vec<Event>,
    ) -> MockResult<()> {
        let code = self.code_of(contract)?;
        events.push(Event::new("execute").add_attribute("_contract_address", contract));
        let mut ctx = Ctx::new(self, contract, sender, events);
        code.execute(&mut ctx, msg)?;
        ctx.finish();
        Ok(())
    }

    fn query_contract(&self, contract: &str, msg: &Binary) -> MockResult<Binary> {
        let code = self.code_of(contract)?;
        code.query(
            &Deps {
                state: self,
                contract: contract.to_string(),
            },
            msg,
        )
    }

    fn update_admin(&mut self, sender: &str, contract: &str, admin: Option<String>) -> MockResult<()> {
        let entry = self
            .contracts
            .get_mut(contract)
            .ok_or_else(|| format!("contract {contract} not found"))?;
        if entry.admin.as_deref() != Some(sender) {
            return Err("unauthorized: sender is not the contract admin".to_string());
        }
        entry.admin = admin;
        Ok(())
    }

    fn dispatch(&mut self, sender: &str, msg: &CosmosMsg, events: &mut Vec<Event>) -> MockResult<()> {
        match msg {
            CosmosMsg::Wasm(WasmMsg::Execute {
                contract_addr, msg, ..
            }) => self.execute_contract(sender, contract_addr, msg, events),
            CosmosMsg::Wasm(WasmMsg::Instantiate {
                admin,
                code_id,
                msg,
                label,
                ..
            }) => self
                .instantiate_contract(sender, *code_id, msg, admin.clone(), label, events)
                .map(|_| ()),
            CosmosMsg::Wasm(WasmMsg::UpdateAdmin {
                contract_addr,
                admin,
            }) => self.update_admin(sender, contract_addr, Some(admin.clone())),
            CosmosMsg::Wasm(WasmMsg::ClearAdmin { contract_addr }) => {
                self.update_admin(sender, contract_addr, None)
            }
            other => Err(format!("unsupported message {other:?}")),
        }
    }

    fn apply_msgs(&mut self, signer: &str, msgs: &[Msg]) -> MockResult<Vec<Event>> {
        let mut events = vec![];
        for (index, msg) in msgs.iter().enumerate() {
            let res = match msg {
                Msg::StoreCode { wasm } => self.store_code(wasm.as_slice(), &mut events).map(|_| ()),
                Msg::Cosmos(msg) => self.dispatch(signer, msg, &mut events),
            };
            res.map_err(|e| {
                format!("failed to execute message; message index: {index}: {e}: execute wasm contract failed")
            })?;
        }
        Ok(events)
    }

    fn deliver(&mut self, tx: SignedTx) -> Result<String, BackendError> {
        self.reachable()?;
        if self.fail_broadcasts > 0 {
            self.fail_broadcasts -= 1;
            return Err(BackendError::Unreachable("connection reset by peer".to_string()));
        }
        let rejected = |code: u32, log: String| BackendError::Rejected { code, log };
        if tx.body.chain_id != self.chain_id {
            return Err(rejected(4, format!("chain id {} does not match {}", tx.body.chain_id, self.chain_id)));
        }
        verify_signature(&tx, &self.prefix)
            .map_err(|e| rejected(4, format!("signature verification failed: {e}")))?;
        let signer = tx.body.signer.clone();
        let expected = self.sequences.get(&signer).copied().unwrap_or(0);
        if tx.body.sequence != expected {
            return Err(rejected(
                32,
                format!("account sequence mismatch, expected {expected}, got {}", tx.body.sequence),
            ));
        }
        if tx.body.fee.amount.iter().any(|c| c.denom != self.fee_denom) {
            return Err(rejected(13, format!("insufficient fees; fee must be paid in {}", self.fee_denom)));
        }

        self.sequences.insert(signer.clone(), expected + 1);
        self.height += 1;
        self.broadcasts += 1;
        let sign_bytes = tx.body.to_sign_bytes().map_err(|e| rejected(2, e.to_string()))?;
        let hash = hex::encode_upper(Sha256::digest(sign_bytes));

        let snapshot = self.clone();
        let (code, log, events) = match self.apply_msgs(&signer, &tx.body.msgs) {
            Ok(events) => (0, String::new(), events),
            Err(log) => {
                *self = snapshot;
                (5, log, vec![])
            }
        };
        let result = TxResult {
            hash: hash.clone(),
            height: self.height,
            code,
            log,
            gas_used: 100_000 * tx.body.msgs.len() as u64,
            events,
            data: None,
        };
        self.txs.insert(
            hash.clone(),
            Included {
                result,
                polls_left: self.inclusion_delay,
            },
        );
        Ok(hash)
    }

    fn simulate(&self, signer: &str, msgs: &[Msg]) -> Result<u64, BackendError> {
        self.reachable()?;
        let mut scratch = self.clone();
        scratch.height += 1;
        scratch
            .apply_msgs(signer, msgs)
            .map(|_| 100_000 * msgs.len() as u64)
            .map_err(|log| BackendError::Rejected { code: 5, log })
    }

    fn channel_info(&self, channel_id: &str) -> MockResult<ChannelInfo> {
        let end = self
            .channels
            .get(channel_id)
            .ok_or_else(|| format!("channel {channel_id} not found"))?;
        Ok(ChannelInfo {
            channel_id: channel_id.to_string(),
            port_id: end.port_id.clone(),
            counterparty_port_id: end.counterparty_port_id.clone(),
            counterparty_channel_id: end.counterparty_channel_id.clone(),
            connection_id: end.connection_id.clone(),
            version: end.version.clone(),
            order: end.order.clone(),
        })
    }

    fn with_port<T>(
        &mut self,
        port_id: &str,
        hook: impl FnOnce(&dyn MockCode, &mut Ctx) -> MockResult<T>,
    ) -> MockResult<T> {
        let contract = contract_from_port_id(port_id)
            .ok_or_else(|| format!("port {port_id} is not bound"))?
            .to_string();
        let code = self.code_of(&contract)?;
        let mut events = vec![];
        let mut ctx = Ctx::new(self, &contract, "ibc", &mut events);
        let res = hook(code.as_ref(), &mut ctx)?;
        ctx.finish();
        Ok(res)
    }

    pub(crate) fn open_connection(&mut self) -> String {
        let id = format!("connection-{}", self.next_connection);
        self.next_connection += 1;
        self.connections.insert(
            id.clone(),
            ConnectionEnd {
                counterparty: None,
                open: true,
            },
        );
        self.height += 1;
        id
    }

    pub(crate) fn connection(&self, id: &str) -> Option<ConnectionEnd> {
        self.connections.get(id).cloned()
    }

    pub(crate) fn set_connection_counterparty(&mut self, id: &str, counterparty: &str) {
        if let Some(conn) = self.connections.get_mut(id) {
            conn.counterparty = Some(counterparty.to_string());
        }
    }

    pub(crate) fn open_channels(&self, connection_id: &str) -> Vec<(String, ChannelEnd)> {
        self.channels
            .iter()
            .filter(|(_, end)| end.open && end.connection_id == connection_id)
            .map(|(id, end)| (id.clone(), end.clone()))
            .collect()
    }

    /// ChanOpenInit without a counterparty channel, ChanOpenTry with one
    pub(crate) fn chan_open(
        &mut self,
        port_id: &str,
        counterparty_port_id: &str,
        counterparty_channel_id: Option<String>,
        connection_id: &str,
        version: &str,
        order: IbcOrder,
    ) -> MockResult<String> {
        if !self.connections.get(connection_id).map_or(false, |c| c.open) {
            return Err(format!("connection {connection_id} is not open"));
        }
        let channel_id = format!("channel-{}", self.next_channel);
        let info = ChannelInfo {
            channel_id: channel_id.clone(),
            port_id: port_id.to_string(),
            counterparty_port_id: counterparty_port_id.to_string(),
            counterparty_channel_id: counterparty_channel_id.clone(),
            connection_id: connection_id.to_string(),
            version: version.to_string(),
            order: order.clone(),
        };
        let snapshot = self.clone();
        let res = if port_id == ICS20_PORT {
            check_ics20(&info)
        } else {
            self.with_port(port_id, |code, ctx| code.channel_open(ctx, &info))
        };
        if let Err(e) = res {
            *self = snapshot;
            return Err(e);
        }
        self.next_channel += 1;
        self.height += 1;
        self.channels.insert(
            channel_id.clone(),
            ChannelEnd {
                port_id: port_id.to_string(),
                counterparty_port_id: counterparty_port_id.to_string(),
                counterparty_channel_id,
                connection_id: connection_id.to_string(),
                version: version.to_string(),
                order,
                open: false,
            },
        );
        Ok(channel_id)
    }

    /// ChanOpenAck / ChanOpenConfirm
    pub(crate) fn chan_connect(&mut self, channel_id: &str, counterparty_channel_id: &str) -> MockResult<()> {
        let end = self
            .channels
            .get_mut(channel_id)
            .ok_or_else(|| format!("channel {channel_id} not found"))?;
        end.counterparty_channel_id = Some(counterparty_channel_id.to_string());
        let info = self.channel_info(channel_id)?;
        if info.port_id != ICS20_PORT {
            let snapshot = self.clone();
            if let Err(e) = self.with_port(&info.port_id, |code, ctx| code.channel_connect(ctx, &info)) {
                *self = snapshot;
                return Err(e);
            }
        }
        if let Some(end) = self.channels.get_mut(channel_id) {
            end.open = true;
        }
        self.height += 1;
        Ok(())
    }

    pub(crate) fn commitments(&self, channel_id: &str) -> Vec<Packet> {
        self.commitments
            .iter()
            .filter(|((channel, _), _)| channel == channel_id)
            .map(|(_, packet)| packet.clone())
            .collect()
    }

    pub(crate) fn receipt(&self, channel_id: &str, sequence: u64) -> Option<Binary> {
        self.receipts
            .get(&(channel_id.to_string(), sequence))
            .cloned()
    }

    /// Returns the ack, contract failures become error acks
    pub(crate) fn recv_packet(&mut self, packet: &Packet) -> MockResult<Binary> {
        let key = (packet.dst_channel.clone(), packet.sequence);
        if let Some(ack) = self.receipts.get(&key) {
            return Ok(ack.clone());
        }
        let end = self
            .channels
            .get(&packet.dst_channel)
            .filter(|c| c.open)
            .ok_or_else(|| format!("channel {} is not open", packet.dst_channel))?;
        if end.port_id != packet.dst_port {
            return Err(format!("packet port {} does not own {}", packet.dst_port, packet.dst_channel));
        }
        self.height += 1;
        let ack = if packet.dst_port == ICS20_PORT {
            StdAck::success(packet.sequence).map_err(err)?
        } else {
            let snapshot = self.clone();
            match self.with_port(&packet.dst_port, |code, ctx| code.packet_receive(ctx, packet)) {
                Ok(ack) => ack,
                Err(e) => {
                    *self = snapshot;
                    StdAck::fail(e).map_err(err)?
                }
            }
        };
        self.receipts.insert(key, ack.clone());
        Ok(ack)
    }

    pub(crate) fn acknowledge(&mut self, packet: &Packet, ack: &Binary) -> MockResult<()> {
        let key = (packet.src_channel.clone(), packet.sequence);
        if !self.commitments.contains_key(&key) {
            return Ok(());
        }
        self.height += 1;
        if packet.src_port != ICS20_PORT {
            let snapshot = self.clone();
            if let Err(e) = self.with_port(&packet.src_port, |code, ctx| code.packet_ack(ctx, packet, ack)) {
                *self = snapshot;
                return Err(e);
            }
        }
        self.commitments.remove(&key);
        Ok(())
    }
}

fn check_ics20(channel: &ChannelInfo) -> MockResult<()> {
    if channel.version != ICS20_VERSION {
        return Err(format!("invalid ics20 version {}", channel.version));
    }
    if channel.order != ICS20_ORDER || channel.counterparty_port_id != ICS20_PORT {
        return Err("ics20 channels are unordered transfer to transfer".to_string());
    }
    Ok(())
}

/// Mutable view a contract runs with during execution
pub struct Ctx<'a> {
    state: &'a mut ChainState,
    contract: String,
    sender: String,
    attributes: Vec<(String, String)>,
    events: &'a mut Vec<Event>,
}

impl<'a> Ctx<'a> {
    fn new(state: &'a mut ChainState, contract: &str, sender: &str, events: &'a mut Vec<Event>) -> Self {
        Ctx {
            state,
            contract: contract.to_string(),
            sender: sender.to_string(),
            attributes: vec![],
            events,
        }
    }

    pub fn contract(&self) -> &str {
        &self.contract
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn height(&self) -> u64 {
        self.state.height
    }

    pub fn deps(&self) -> Deps<'_> {
        Deps {
            state: &*self.state,
            contract: self.contract.clone(),
        }
    }

    pub fn load<T: DeserializeOwned>(&self) -> MockResult<T> {
        self.deps().load()
    }

    pub fn save<T: Serialize>(&mut self, value: &T) -> MockResult<()> {
        let value = serde_json::to_value(value).map_err(err)?;
        self.state
            .contracts
            .get_mut(&self.contract)
            .ok_or_else(|| format!("contract {} not found", self.contract))?
            .storage = value;
        Ok(())
    }

    pub fn query<M: Serialize, T: DeserializeOwned>(&self, contract: &str, msg: &M) -> MockResult<T> {
        self.deps().query(contract, msg)
    }

    pub fn attr(&mut self, key: &str, value: impl ToString) {
        self.attributes.push((key.to_string(), value.to_string()));
    }

    /// Instantiates with this contract as the sender, returns the new address
    pub fn instantiate<M: Serialize>(
        &mut self,
        code_id: u64,
        msg: &M,
        admin: Option<String>,
        label: &str,
    ) -> MockResult<String> {
        let msg = to_json_binary(msg).map_err(err)?;
        self.instantiate_raw(code_id, &msg, admin, label)
    }

    pub fn instantiate_raw(
        &mut self,
        code_id: u64,
        msg: &Binary,
        admin: Option<String>,
        label: &str,
    ) -> MockResult<String> {
        self.state
            .instantiate_contract(&self.contract, code_id, msg, admin, label, self.events)
    }

    pub fn execute<M: Serialize>(&mut self, contract: &str, msg: &M) -> MockResult<()> {
        let msg = to_json_binary(msg).map_err(err)?;
        self.state
            .execute_contract(&self.contract, contract, &msg, self.events)
    }

    pub fn dispatch(&mut self, msg: &CosmosMsg) -> MockResult<()> {
        self.state.dispatch(&self.contract, msg, self.events)
    }

    pub fn send_packet(&mut self, channel_id: &str, data: Binary) -> MockResult<u64> {
        let end = self
            .state
            .channels
            .get(channel_id)
            .filter(|c| c.open)
            .ok_or_else(|| format!("channel {channel_id} is not open"))?;
        if end.port_id != wasm_port_id(&self.contract) {
            return Err(format!("channel {channel_id} is not bound to {}", self.contract));
        }
        let packet_template = (
            end.port_id.clone(),
            end.counterparty_port_id.clone(),
            end.counterparty_channel_id
                .clone()
                .ok_or_else(|| format!("channel {channel_id} has no counterparty"))?,
        );
        let sequence = self
            .state
            .next_sequence
            .entry(channel_id.to_string())
            .or_insert(0);
        *sequence += 1;
        let sequence = *sequence;
        let (src_port, dst_port, dst_channel) = packet_template;
        self.state.commitments.insert(
            (channel_id.to_string(), sequence),
            Packet {
                sequence,
                src_port: src_port.clone(),
                src_channel: channel_id.to_string(),
                dst_port,
                dst_channel,
                data,
            },
        );
        self.events.push(
            Event::new("send_packet")
                .add_attribute("packet_src_port", src_port)
                .add_attribute("packet_src_channel", channel_id)
                .add_attribute("packet_sequence", sequence.to_string()),
        );
        Ok(sequence)
    }

    fn finish(self) {
        if self.attributes.is_empty() {
            return;
        }
        let mut event = Event::new("wasm").add_attribute("_contract_address", &self.contract);
        for (key, value) in self.attributes {
            event = event.add_attribute(key, value);
        }
        self.events.push(event);
    }
}

/// Read-only view a contract answers queries with
pub struct Deps<'a> {
    state: &'a ChainState,
    contract: String,
}

impl<'a> Deps<'a> {
    pub fn contract(&self) -> &str {
        &self.contract
    }

    pub fn height(&self) -> u64 {
        self.state.height
    }

    pub fn load<T: DeserializeOwned>(&self) -> MockResult<T> {
        let entry = self
            .state
            .contracts
            .get(&self.contract)
            .ok_or_else(|| format!("contract {} not found", self.contract))?;
        serde_json::from_value(entry.storage.clone()).map_err(err)
    }

    pub fn query<M: Serialize, T: DeserializeOwned>(&self, contract: &str, msg: &M) -> MockResult<T> {
        let msg = to_json_binary(msg).map_err(err)?;
        let res = self.state.query_contract(contract, &msg)?;
        from_json(&res).map_err(err)
    }
}

/// A simulated chain.
///
/// Every broadcast and every poll for a tx produces a block. Transactions are
/// atomic, a failing message reverts the whole tx and leaves code 5.
#[derive(Clone)]
pub struct MockChain {
    inner: Arc<Mutex<ChainState>>,
}

impl MockChain {
    pub fn new(chain_id: &str, prefix: &str, fee_denom: &str, registry: Arc<CodeRegistry>) -> Self {
        MockChain {
            inner: Arc::new(Mutex::new(ChainState::new(chain_id, prefix, fee_denom, registry))),
        }
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, ChainState> {
        self.inner.lock().expect("mock chain poisoned")
    }

    pub fn chain_id(&self) -> String {
        self.state().chain_id.clone()
    }

    pub fn height(&self) -> u64 {
        self.state().height
    }

    pub fn advance_blocks(&self, blocks: u64) {
        self.state().height += blocks;
    }

    /// The next `n` broadcasts fail before reaching the mempool
    pub fn fail_broadcasts(&self, n: u32) {
        self.state().fail_broadcasts = n;
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state().unreachable = unreachable;
    }

    /// Polls a tx stays invisible after broadcast
    pub fn set_inclusion_delay(&self, polls: u32) {
        self.state().inclusion_delay = polls;
    }

    /// Accepted broadcasts so far
    pub fn broadcasts(&self) -> u32 {
        self.state().broadcasts
    }

    pub fn sequence(&self, address: &str) -> u64 {
        self.state().sequences.get(address).copied().unwrap_or(0)
    }

    pub fn code_count(&self) -> usize {
        self.state().codes.len()
    }

    pub fn contract(&self, address: &str) -> Option<ContractEntry> {
        self.state().contracts.get(address).cloned()
    }

    /// Rewrites a wasm admin out of band, as a governance action outside the deployer would
    pub fn force_contract_admin(&self, contract: &str, admin: Option<String>) {
        if let Some(entry) = self.state().contracts.get_mut(contract) {
            entry.admin = admin;
        }
    }

    pub fn close_connection(&self, id: &str) {
        if let Some(conn) = self.state().connections.get_mut(id) {
            conn.open = false;
        }
    }

    /// Executes as `sender` without signing, for actors other than the deployer
    pub fn execute_as<M: Serialize>(&self, sender: &str, contract: &str, msg: &M) -> MockResult<Vec<Event>> {
        let msg = to_json_binary(msg).map_err(err)?;
        let mut state = self.state();
        let snapshot = state.clone();
        state.height += 1;
        let mut events = vec![];
        match state.execute_contract(sender, contract, &msg, &mut events) {
            Ok(()) => Ok(events),
            Err(e) => {
                *state = snapshot;
                Err(e)
            }
        }
    }

    pub fn query<M: Serialize, T: DeserializeOwned>(&self, contract: &str, msg: &M) -> MockResult<T> {
        let msg = to_json_binary(msg).map_err(err)?;
        let res = self.state().query_contract(contract, &msg)?;
        from_json(&res).map_err(err)
    }
}

#[async_trait]
impl ChainBackend for MockChain {
    async fn status(&self) -> Result<ChainStatus, BackendError> {
        let mut state = self.state();
        state.reachable()?;
        state.height += 1;
        Ok(ChainStatus {
            chain_id: state.chain_id.clone(),
            height: state.height,
        })
    }

    async fn account(&self, address: &str) -> Result<AccountInfo, BackendError> {
        let state = self.state();
        state.reachable()?;
        Ok(AccountInfo {
            address: address.to_string(),
            sequence: state.sequences.get(address).copied().unwrap_or(0),
        })
    }

    async fn simulate(&self, signer: &str, msgs: &[Msg]) -> Result<u64, BackendError> {
        self.state().simulate(signer, msgs)
    }

    async fn broadcast(&self, tx: SignedTx) -> Result<String, BackendError> {
        self.state().deliver(tx)
    }

    async fn tx(&self, hash: &str) -> Result<Option<TxResult>, BackendError> {
        let mut state = self.state();
        state.reachable()?;
        state.height += 1;
        let Some(included) = state.txs.get_mut(hash) else {
            return Ok(None);
        };
        if included.polls_left > 0 {
            included.polls_left -= 1;
            return Ok(None);
        }
        Ok(Some(included.result.clone()))
    }

    async fn query_smart(&self, contract: &str, msg: &Binary) -> Result<Binary, BackendError> {
        let state = self.state();
        state.reachable()?;
        state.query_contract(contract, msg).map_err(BackendError::Query)
    }

    async fn contract_info(&self, contract: &str) -> Result<ContractInfo, BackendError> {
        let state = self.state();
        state.reachable()?;
        state
            .contracts
            .get(contract)
            .map(|entry| ContractInfo {
                code_id: entry.code_id,
                creator: entry.creator.clone(),
                admin: entry.admin.clone(),
                label: entry.label.clone(),
            })
            .ok_or_else(|| BackendError::NotFound(format!("contract {contract}")))
    }

    async fn code_id_by_checksum(&self, checksum: &[u8]) -> Result<Option<u64>, BackendError> {
        let state = self.state();
        state.reachable()?;
        Ok(state
            .codes
            .iter()
            .position(|c| c.checksum == checksum)
            .map(|index| index as u64 + 1))
    }
}
