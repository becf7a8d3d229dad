//! In-memory stand-ins for the uploader, chain, and LLM adapters, so the
//! publish pipeline can be driven end-to-end without a real gateway, RPC
//! node, or language model behind it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use alloy_primitives::{keccak256, Address, B256, U256};
use async_trait::async_trait;
use cadence_control_plane::publish::chain::{ChainAdapter, ChainError, ChainLog, TxReceipt};
use cadence_control_plane::publish::uploader::{Uploader, UploaderError};
use cadence_control_plane::studyset::{LlmClient, LlmError};
use serde_json::{json, Value};

pub struct FakeUploader {
    next_id: AtomicU64,
}

impl FakeUploader {
    pub fn new() -> Self {
        Self { next_id: AtomicU64::new(1) }
    }
}

#[async_trait]
impl Uploader for FakeUploader {
    async fn upload(&self, _bytes: Vec<u8>, tags: Vec<(String, String)>) -> Result<String, UploaderError> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let kind = tags
            .iter()
            .find(|(k, _)| k == "kind")
            .map(|(_, v)| v.as_str())
            .unwrap_or("artifact");
        Ok(format!("cid-{kind}-{n}"))
    }

    async fn resolve_by_tags(&self, _tags: Vec<(String, String)>) -> Result<Option<String>, UploaderError> {
        Ok(None)
    }

    fn gateway_url(&self, piece_cid: &str) -> String {
        format!("http://gateway.test/resolve/{piece_cid}")
    }
}

fn transfer_topic() -> B256 {
    keccak256("Transfer(address,address,uint256)")
}

fn mint_log(collection: Address, to: Address, token_id: U256) -> ChainLog {
    ChainLog {
        address: collection,
        topics: vec![transfer_topic(), B256::ZERO, to.into_word(), B256::from(token_id.to_be_bytes::<32>())],
        data: Vec::new(),
    }
}

/// A `ChainAdapter` whose every call succeeds immediately, except that
/// `register_content_for` can be told to act like a transaction that times
/// out client-side but has actually landed by the time the caller rechecks —
/// exercising `ensure_onchain`'s recheck-absorbs-timeout path end to end.
pub struct FakeChain {
    collection: Address,
    ip_id: Address,
    license_terms: Vec<U256>,
    next_token_id: AtomicU64,
    next_block: AtomicU64,
    time_out_content_register_once: bool,
    content_landed: AtomicBool,
    track_registered: Mutex<std::collections::HashSet<B256>>,
    content_active: Mutex<std::collections::HashSet<B256>>,
}

impl FakeChain {
    pub fn new() -> Self {
        Self {
            collection: "0x00000000000000000000000000000000000c01".parse().unwrap(),
            ip_id: "0x00000000000000000000000000000000000c02".parse().unwrap(),
            license_terms: vec![U256::from(1u64), U256::from(2u64)],
            next_token_id: AtomicU64::new(1),
            next_block: AtomicU64::new(100),
            time_out_content_register_once: false,
            content_landed: AtomicBool::new(false),
            track_registered: Mutex::new(std::collections::HashSet::new()),
            content_active: Mutex::new(std::collections::HashSet::new()),
        }
    }

    pub fn with_content_register_timeout_once() -> Self {
        Self {
            time_out_content_register_once: true,
            ..Self::new()
        }
    }

    fn receipt(&self) -> TxReceipt {
        let block = self.next_block.fetch_add(1, Ordering::SeqCst);
        TxReceipt {
            tx_hash: format!("0x{block:064x}"),
            block_number: block,
            logs: vec![],
        }
    }
}

#[async_trait]
impl ChainAdapter for FakeChain {
    fn collection_address(&self) -> Address {
        self.collection
    }

    async fn anchor_content(&self, _content_id: B256, _piece_cid: &str) -> Result<TxReceipt, ChainError> {
        Ok(self.receipt())
    }

    async fn mint_and_register_ip(
        &self,
        recipient: Address,
        _ip_metadata_uri: &str,
        _ip_metadata_hash: B256,
        _nft_metadata_uri: &str,
        _nft_metadata_hash: B256,
        _allow_duplicates: bool,
    ) -> Result<TxReceipt, ChainError> {
        let token_id = U256::from(self.next_token_id.fetch_add(1, Ordering::SeqCst));
        let mut receipt = self.receipt();
        receipt.logs.push(mint_log(self.collection, recipient, token_id));
        Ok(receipt)
    }

    async fn mint_and_register_derivative_ip(
        &self,
        recipient: Address,
        _ip_metadata_uri: &str,
        _ip_metadata_hash: B256,
        _nft_metadata_uri: &str,
        _nft_metadata_hash: B256,
        _parent_ip_ids: &[Address],
        _license_terms_ids: &[U256],
        _license_template: Address,
        _royalty_context: &[u8],
        _max_minting_fee: U256,
        _max_rts: u32,
        _max_revenue_share: u32,
        _allow_duplicates: bool,
    ) -> Result<TxReceipt, ChainError> {
        let token_id = U256::from(self.next_token_id.fetch_add(1, Ordering::SeqCst));
        let mut receipt = self.receipt();
        receipt.logs.push(mint_log(self.collection, recipient, token_id));
        Ok(receipt)
    }

    async fn resolve_ip_id(&self, _token_id: U256) -> Result<Address, ChainError> {
        Ok(self.ip_id)
    }

    async fn attached_license_terms(&self, _ip_id: Address) -> Result<Vec<U256>, ChainError> {
        Ok(self.license_terms.clone())
    }

    async fn is_track_registered(&self, track_id: B256) -> Result<bool, ChainError> {
        Ok(self.track_registered.lock().unwrap().contains(&track_id))
    }

    async fn register_track(&self, track_id: B256, _owner: Address) -> Result<TxReceipt, ChainError> {
        self.track_registered.lock().unwrap().insert(track_id);
        Ok(self.receipt())
    }

    async fn set_track_cover(&self, _track_id: B256, _cover_ref: &str) -> Result<TxReceipt, ChainError> {
        Ok(self.receipt())
    }

    async fn is_content_active(&self, content_id: B256) -> Result<bool, ChainError> {
        if self.time_out_content_register_once && self.content_landed.load(Ordering::SeqCst) {
            return Ok(true);
        }
        Ok(self.content_active.lock().unwrap().contains(&content_id))
    }

    async fn register_content_for(
        &self,
        content_id: B256,
        _track_id: B256,
        _owner: Address,
    ) -> Result<TxReceipt, ChainError> {
        if self.time_out_content_register_once && !self.content_landed.swap(true, Ordering::SeqCst) {
            return Err(ChainError::Timeout);
        }
        self.content_active.lock().unwrap().insert(content_id);
        Ok(self.receipt())
    }
}

pub struct FakeLlm;

#[async_trait]
impl LlmClient for FakeLlm {
    async fn complete_json(
        &self,
        _system_prompt: &str,
        _user_prompt: &str,
        _schema_name: &str,
        _schema: Value,
    ) -> Result<Value, LlmError> {
        Ok(json!({}))
    }
}
