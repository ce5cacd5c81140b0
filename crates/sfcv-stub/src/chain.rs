// SPDX-License-Identifier: BUSL-1.1
//! Simulated chain: funded accounts, one block per transaction, a proxy
//! contract, and the staking contract storage behind it.
//!
//! [`SimulatedChain`] is cheaply cloneable via `Arc`; all clones share the
//! same chain. Every operation takes the lock, runs to completion, and
//! releases it, so nothing is held across an await point.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rand_core::{OsRng, RngCore};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use sfcv_client::{CallError, ContractCaller, ContractRef, Receipt};
use sfcv_core::{Account, Address, Amount, SecretKey, TxHash};

use crate::contract::{CallContext, ContractParams, ContractVersion, SfcStorage};

/// Well-known address the proxy is deployed at.
pub const DEFAULT_PROXY_ADDRESS: Address = Address::from_bytes([
    0xfc, 0x00, 0xfa, 0xce, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
]);

/// Bytecode the simulator recognizes as the pre-upgrade implementation.
pub const SFC_V1_BYTECODE: &[u8] = b"sfc-v1";
/// Bytecode the simulator recognizes as the upgraded implementation.
pub const SFC_V2_BYTECODE: &[u8] = b"sfc-v2";

/// Simulator setup.
#[derive(Debug, Clone)]
pub struct StubConfig {
    pub params: ContractParams,
    /// Secret of the payer account. The payer also owns the proxy.
    pub payer_secret: String,
    pub payer_balance: Amount,
    pub proxy_address: Address,
    pub proxy_abi: String,
    pub v1_abi: String,
    pub v2_abi: String,
}

impl Default for StubConfig {
    fn default() -> Self {
        Self {
            params: ContractParams::default(),
            payer_secret: "0x163f5f0f9a621d72fedd85ffca3d08d131ab4e812181e0d30ffd1c885d20aac7"
                .to_string(),
            payer_balance: Amount::new(1_000_000_000_000),
            proxy_address: DEFAULT_PROXY_ADDRESS,
            proxy_abi: "upgradability-proxy".to_string(),
            v1_abi: "sfc-v1".to_string(),
            v2_abi: "sfc-v2".to_string(),
        }
    }
}

/// Derive the address controlled by `secret`: the last 20 bytes of its
/// SHA-256 digest.
pub fn address_for_secret(secret: &str) -> Address {
    let digest = Sha256::digest(secret.as_bytes());
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&digest[12..]);
    Address::from_bytes(bytes)
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[derive(Debug)]
struct MinedTx {
    hash: TxHash,
    block: u64,
    created: Option<Address>,
}

/// Which contract a [`ContractRef`] resolved to.
enum Target {
    Proxy,
    Sfc(ContractVersion),
}

#[derive(Debug)]
struct ChainState {
    config: StubConfig,
    payer: Address,
    block: u64,
    nonce: u64,
    balances: HashMap<Address, Amount>,
    secrets: HashMap<Address, String>,
    implementations: HashMap<Address, ContractVersion>,
    proxy_implementation: Address,
    transactions: Vec<MinedTx>,
    sfc: SfcStorage,
}

impl ChainState {
    fn new(config: StubConfig) -> Self {
        let payer = address_for_secret(&config.payer_secret);
        let genesis_impl = address_for_secret("genesis-implementation");
        let mut balances = HashMap::new();
        balances.insert(payer, config.payer_balance);
        let mut secrets = HashMap::new();
        secrets.insert(payer, config.payer_secret.clone());
        let mut implementations = HashMap::new();
        implementations.insert(genesis_impl, ContractVersion::V1);
        let sfc = SfcStorage::new(config.params.clone());
        Self {
            config,
            payer,
            block: 0,
            nonce: 0,
            balances,
            secrets,
            implementations,
            proxy_implementation: genesis_impl,
            transactions: Vec::new(),
            sfc,
        }
    }

    fn authenticate(&self, address: Address, secret: &str) -> Result<(), CallError> {
        match self.secrets.get(&address) {
            Some(known) if known == secret => Ok(()),
            _ => Err(CallError::Rpc {
                method: "authenticate".to_string(),
                code: -32000,
                message: format!("invalid credentials for {address}"),
            }),
        }
    }

    fn balance(&self, address: Address) -> Amount {
        self.balances.get(&address).copied().unwrap_or(Amount::ZERO)
    }

    fn mine(&mut self, created: Option<Address>) -> TxHash {
        self.block += 1;
        self.nonce += 1;
        let mut hasher = Sha256::new();
        hasher.update(b"tx");
        hasher.update(self.nonce.to_be_bytes());
        hasher.update(self.block.to_be_bytes());
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&hasher.finalize());
        let hash = TxHash::from_bytes(bytes);
        self.transactions.push(MinedTx {
            hash,
            block: self.block,
            created,
        });
        hash
    }

    fn running_version(&self) -> ContractVersion {
        self.implementations
            .get(&self.proxy_implementation)
            .copied()
            .unwrap_or(ContractVersion::V1)
    }

    fn abi_name(&self, version: ContractVersion) -> &str {
        match version {
            ContractVersion::V1 => &self.config.v1_abi,
            ContractVersion::V2 => &self.config.v2_abi,
        }
    }

    /// Resolve a binding and check that both the bound ABI and the running
    /// implementation expose `method`.
    fn resolve(&self, contract: &ContractRef, method: &str) -> Result<Target, CallError> {
        if contract.address != self.config.proxy_address {
            return Err(CallError::NotFound {
                what: format!("no contract at {}", contract.address),
            });
        }
        let abi = contract.abi.as_str();
        if abi == self.config.proxy_abi {
            return Ok(Target::Proxy);
        }
        let bound = if abi == self.config.v1_abi {
            ContractVersion::V1
        } else if abi == self.config.v2_abi {
            ContractVersion::V2
        } else {
            return Err(CallError::Rpc {
                method: method.to_string(),
                code: -32602,
                message: format!("unknown ABI {abi}"),
            });
        };
        if !bound.supports(method) {
            return Err(CallError::incompatible(method, abi));
        }
        let running = self.running_version();
        if !running.supports(method) {
            return Err(CallError::incompatible(method, self.abi_name(running)));
        }
        Ok(Target::Sfc(running))
    }

    fn submit(
        &mut self,
        contract: &ContractRef,
        method: &str,
        args: &[Value],
        sender: &Account,
        value: Amount,
    ) -> Result<TxHash, CallError> {
        self.authenticate(sender.address, sender.secret_key.expose())?;
        let target = self.resolve(contract, method)?;
        let available = self.balance(sender.address);
        if available < value {
            return Err(CallError::reverted(method, "insufficient balance"));
        }

        let payout = match target {
            Target::Proxy => {
                self.proxy_call(method, args, sender.address)?;
                Amount::ZERO
            }
            Target::Sfc(version) => {
                let ctx = CallContext {
                    sender: sender.address,
                    value,
                    owner: self.payer,
                };
                self.sfc.execute(version, method, args, &ctx)?
            }
        };

        let after = available
            .checked_sub(value)
            .and_then(|b| b.checked_add(payout))
            .unwrap_or(available);
        self.balances.insert(sender.address, after);
        Ok(self.mine(None))
    }

    fn proxy_call(
        &mut self,
        method: &str,
        args: &[Value],
        sender: Address,
    ) -> Result<(), CallError> {
        if method != "upgradeTo" {
            return Err(CallError::incompatible(method, self.config.proxy_abi.clone()));
        }
        if sender != self.payer {
            return Err(CallError::reverted(method, "caller is not the proxy owner"));
        }
        let target: Address = args
            .first()
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .ok_or_else(|| CallError::reverted(method, "invalid implementation address"))?;
        if !self.implementations.contains_key(&target) {
            return Err(CallError::reverted(method, "new implementation is not a contract"));
        }
        tracing::info!(from = %self.proxy_implementation, to = %target, "proxy upgraded");
        self.proxy_implementation = target;
        Ok(())
    }

    fn read(
        &self,
        contract: &ContractRef,
        method: &str,
        args: &[Value],
    ) -> Result<Value, CallError> {
        match self.resolve(contract, method)? {
            Target::Proxy if method == "implementation" => Ok(json!(self.proxy_implementation)),
            Target::Proxy => Err(CallError::incompatible(method, self.config.proxy_abi.clone())),
            Target::Sfc(version) => self.sfc.read(version, method, args),
        }
    }

    fn receipt(&self, hash: &TxHash) -> Option<Receipt> {
        self.transactions
            .iter()
            .find(|tx| tx.hash == *hash)
            .map(|tx| Receipt {
                transaction_hash: tx.hash,
                contract_address: tx.created,
                status: true,
            })
    }

    fn recent_creations(&self, depth: u64) -> Vec<TxHash> {
        let floor = self.block.saturating_sub(depth);
        self.transactions
            .iter()
            .rev()
            .take_while(|tx| tx.block > floor)
            .filter(|tx| tx.created.is_some())
            .map(|tx| tx.hash)
            .collect()
    }

    fn fund(&mut self, payer: &Account, amount: Amount) -> Result<Account, CallError> {
        self.authenticate(payer.address, payer.secret_key.expose())?;
        let remaining = self
            .balance(payer.address)
            .checked_sub(amount)
            .ok_or_else(|| CallError::Rpc {
                method: "sfc_fundAccount".to_string(),
                code: -32000,
                message: "insufficient funds for transfer".to_string(),
            })?;

        let mut raw = [0u8; 32];
        OsRng.fill_bytes(&mut raw);
        let secret = format!("0x{}", to_hex(&raw));
        let address = address_for_secret(&secret);

        self.balances.insert(payer.address, remaining);
        self.balances.insert(address, amount);
        self.secrets.insert(address, secret.clone());
        self.mine(None);
        Ok(Account::new(address, SecretKey::new(secret), amount))
    }

    fn deploy(&mut self, sender: &Account, bytecode: &[u8]) -> Result<TxHash, CallError> {
        self.authenticate(sender.address, sender.secret_key.expose())?;
        let version = match bytecode {
            SFC_V1_BYTECODE => ContractVersion::V1,
            SFC_V2_BYTECODE => ContractVersion::V2,
            _ => {
                return Err(CallError::reverted(
                    "sfc_deployContract",
                    "unrecognized bytecode",
                ))
            }
        };
        let mut hasher = Sha256::new();
        hasher.update(b"create");
        hasher.update(sender.address.as_bytes());
        hasher.update(self.nonce.to_be_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest[12..]);
        let address = Address::from_bytes(bytes);

        self.implementations.insert(address, version);
        tracing::debug!(%address, ?version, "implementation deployed");
        Ok(self.mine(Some(address)))
    }
}

/// In-memory chain implementing [`ContractCaller`].
#[derive(Debug, Clone)]
pub struct SimulatedChain {
    inner: Arc<Mutex<ChainState>>,
}

impl Default for SimulatedChain {
    fn default() -> Self {
        Self::new(StubConfig::default())
    }
}

impl SimulatedChain {
    pub fn new(config: StubConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ChainState::new(config))),
        }
    }

    /// The payer account with its current balance.
    pub fn payer(&self) -> Account {
        let state = self.inner.lock();
        Account::new(
            state.payer,
            SecretKey::new(state.config.payer_secret.clone()),
            state.balance(state.payer),
        )
    }

    pub fn config(&self) -> StubConfig {
        self.inner.lock().config.clone()
    }

    /// Address the proxy currently points at.
    pub fn implementation(&self) -> Address {
        self.inner.lock().proxy_implementation
    }

    /// Version of the implementation the proxy currently runs.
    pub fn running_version(&self) -> ContractVersion {
        self.inner.lock().running_version()
    }

    pub fn block_number(&self) -> u64 {
        self.inner.lock().block
    }

    pub fn balance_of(&self, address: Address) -> Amount {
        self.inner.lock().balance(address)
    }

    pub fn active_stakers(&self) -> u64 {
        self.inner.lock().sfc.active_stakers()
    }

    pub fn storage_upgraded(&self, id: u64) -> bool {
        self.inner.lock().sfc.storage_upgraded(id)
    }

    pub fn clock_secs(&self) -> u64 {
        self.inner.lock().sfc.clock_secs()
    }

    /// Move the chain clock forward without sealing an epoch.
    pub fn advance_clock(&self, secs: u64) {
        self.inner.lock().sfc.advance_clock(secs);
    }

    /// Make the next `n` epoch seals revert.
    pub fn fail_next_seals(&self, n: u32) {
        self.inner.lock().sfc.fail_next_seals(n);
    }

    pub fn submit(
        &self,
        contract: &ContractRef,
        method: &str,
        args: &[Value],
        sender: &Account,
        value: Option<Amount>,
    ) -> Result<TxHash, CallError> {
        let result = self.inner.lock().submit(
            contract,
            method,
            args,
            sender,
            value.unwrap_or(Amount::ZERO),
        );
        match &result {
            Ok(hash) => tracing::debug!(method, %hash, "call mined"),
            Err(e) => tracing::debug!(method, error = %e, "call rejected"),
        }
        result
    }

    pub fn read(
        &self,
        contract: &ContractRef,
        method: &str,
        args: &[Value],
    ) -> Result<Value, CallError> {
        self.inner.lock().read(contract, method, args)
    }

    pub fn receipt(&self, hash: &TxHash) -> Option<Receipt> {
        self.inner.lock().receipt(hash)
    }

    /// Contract-creation transactions in the last `depth` blocks, newest
    /// first.
    pub fn recent_creations(&self, depth: u64) -> Vec<TxHash> {
        self.inner.lock().recent_creations(depth)
    }

    pub fn fund(&self, payer: &Account, amount: Amount) -> Result<Account, CallError> {
        self.inner.lock().fund(payer, amount)
    }

    pub fn deploy(&self, sender: &Account, bytecode: &[u8]) -> Result<TxHash, CallError> {
        self.inner.lock().deploy(sender, bytecode)
    }
}

impl ContractCaller for SimulatedChain {
    async fn submit_contract_call(
        &self,
        contract: &ContractRef,
        method: &str,
        args: &[Value],
        sender: &Account,
        value: Option<Amount>,
    ) -> Result<TxHash, CallError> {
        self.submit(contract, method, args, sender, value)
    }

    async fn read_contract_state(
        &self,
        contract: &ContractRef,
        method: &str,
        args: &[Value],
    ) -> Result<Value, CallError> {
        self.read(contract, method, args)
    }

    async fn get_transaction_receipt(&self, hash: &TxHash) -> Result<Option<Receipt>, CallError> {
        Ok(self.receipt(hash))
    }

    async fn most_recent_transactions(&self, depth: u64) -> Result<Vec<TxHash>, CallError> {
        Ok(self.recent_creations(depth))
    }

    async fn fund_account(&self, payer: &Account, amount: Amount) -> Result<Account, CallError> {
        self.fund(payer, amount)
    }

    async fn deploy_contract(
        &self,
        sender: &Account,
        bytecode: &[u8],
    ) -> Result<TxHash, CallError> {
        self.deploy(sender, bytecode)
    }
}
