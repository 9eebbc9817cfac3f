// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Mock collaborators and fixtures shared by the unit tests.

use crate::chain_syncer::{
    ChainEvent, ChainRpc, EventKey, EventKind, LensEvent, LensEventDecoder, PublicationCreated,
    SyncError, SyncResult,
};
use crate::content::{ContentError, ContentFetcher};
use crate::lens_api::{LensApi, LensApiError, LensApiResult, Page};
use async_trait::async_trait;
use ethers::abi::Token;
use ethers::types::{Address, Bytes, Log, H256, U256, U64};
use lens_schema::{Profile, Publication};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn address(n: u64) -> Address {
    Address::from_low_u64_be(n)
}

/// Contract every fixture log is emitted from.
pub fn lens_hub() -> Address {
    address(0x1e45)
}

/// Checksummed form, as decoded events carry it.
pub fn wallet(n: u64) -> String {
    ethers::utils::to_checksum(&address(n), None)
}

/// Builds raw logs through the production ABI so decoding under test is the
/// real path.
pub struct LogBuilder {
    topics: Vec<H256>,
    data: Vec<u8>,
    block_number: u64,
    log_index: u64,
}

impl LogBuilder {
    pub fn new(decoder: &LensEventDecoder, kind: EventKind) -> Self {
        Self {
            topics: decoder.event_signature(kind).into_iter().collect(),
            data: vec![],
            block_number: 0,
            log_index: 0,
        }
    }

    pub fn uint_topic(mut self, value: u64) -> Self {
        let mut bytes = [0u8; 32];
        U256::from(value).to_big_endian(&mut bytes);
        self.topics.push(H256::from(bytes));
        self
    }

    pub fn address_topic(mut self, address: Address) -> Self {
        self.topics.push(H256::from(address));
        self
    }

    pub fn data(mut self, tokens: Vec<Token>) -> Self {
        self.data = ethers::abi::encode(&tokens);
        self
    }

    pub fn at(mut self, block_number: u64, log_index: u64) -> Self {
        self.block_number = block_number;
        self.log_index = log_index;
        self
    }

    pub fn build(self) -> Log {
        Log {
            address: lens_hub(),
            topics: self.topics,
            data: Bytes::from(self.data),
            block_number: Some(U64::from(self.block_number)),
            transaction_hash: Some(tx_hash(self.block_number, self.log_index)),
            log_index: Some(U256::from(self.log_index)),
            ..Default::default()
        }
    }
}

fn tx_hash(block_number: u64, log_index: u64) -> H256 {
    H256::from_low_u64_be(block_number * 10_000 + log_index + 1)
}

pub fn profile_created_log(
    decoder: &LensEventDecoder,
    profile_id: u64,
    owner: u64,
    timestamp: u64,
    block_number: u64,
    log_index: u64,
) -> Log {
    LogBuilder::new(decoder, EventKind::ProfileCreated)
        .uint_topic(profile_id)
        .address_topic(address(owner))
        .address_topic(address(owner))
        .data(vec![
            Token::String(format!("user{}.lens", profile_id)),
            Token::String("ipfs://QmImage".into()),
            Token::Address(Address::zero()),
            Token::Bytes(vec![]),
            Token::String("ipfs://QmFollow".into()),
            Token::Uint(U256::from(timestamp)),
        ])
        .at(block_number, log_index)
        .build()
}

pub fn post_created_log(
    decoder: &LensEventDecoder,
    profile_id: u64,
    pub_id: u64,
    content_uri: &str,
    timestamp: u64,
    block_number: u64,
    log_index: u64,
) -> Log {
    LogBuilder::new(decoder, EventKind::PostCreated)
        .uint_topic(profile_id)
        .uint_topic(pub_id)
        .data(vec![
            Token::String(content_uri.to_string()),
            Token::Address(address(0xc0)),
            Token::Bytes(vec![]),
            Token::Address(Address::zero()),
            Token::Bytes(vec![]),
            Token::Uint(U256::from(timestamp)),
        ])
        .at(block_number, log_index)
        .build()
}

/// A decoded event at `(block_number, log_index)`.
pub fn chain_event(block_number: u64, log_index: u64, event: LensEvent) -> ChainEvent {
    ChainEvent {
        key: EventKey {
            tx_hash: format!("{:?}", tx_hash(block_number, log_index)),
            log_index,
        },
        block_number,
        event,
    }
}

pub fn post(profile_id: &str, pub_id: &str, content_uri: &str, timestamp: i64) -> LensEvent {
    LensEvent::PostCreated(PublicationCreated {
        profile_id: profile_id.to_string(),
        pub_id: pub_id.to_string(),
        content_uri: Some(content_uri.to_string()),
        collect_module: None,
        reference_module: None,
        pointed: None,
        timestamp,
    })
}

pub fn profile_created(profile_id: &str, owner: &str, timestamp: i64) -> LensEvent {
    LensEvent::ProfileCreated {
        profile_id: profile_id.to_string(),
        creator: owner.to_string(),
        to: owner.to_string(),
        handle: format!("{}.lens", profile_id),
        image_uri: "ipfs://QmImage".to_string(),
        follow_module: None,
        follow_nft_uri: "ipfs://QmFollow".to_string(),
        timestamp,
    }
}

// ==========================================================================
// Chain RPC
// ==========================================================================

#[derive(Clone, Default)]
pub struct MockChainRpc {
    height: Arc<AtomicU64>,
    height_calls: Arc<AtomicUsize>,
    height_failures: Arc<AtomicUsize>,
    logs: Arc<Mutex<Vec<Log>>>,
    // Any fetch whose range covers one of these blocks fails.
    failing_blocks: Arc<Mutex<Vec<u64>>>,
    requested_ranges: Arc<Mutex<Vec<(u64, u64)>>>,
}

impl MockChainRpc {
    pub fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::SeqCst);
    }

    /// Fails the next `n` height queries.
    pub fn fail_height(&self, n: usize) {
        self.height_failures.store(n, Ordering::SeqCst);
    }

    pub fn height_calls(&self) -> usize {
        self.height_calls.load(Ordering::SeqCst)
    }

    pub fn add_logs(&self, logs: Vec<Log>) {
        self.logs.lock().unwrap().extend(logs);
    }

    pub fn fail_logs_at(&self, block_number: u64) {
        self.failing_blocks.lock().unwrap().push(block_number);
    }

    pub fn clear_failures(&self) {
        self.failing_blocks.lock().unwrap().clear();
    }

    pub fn requested_ranges(&self) -> Vec<(u64, u64)> {
        self.requested_ranges.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainRpc for MockChainRpc {
    async fn get_block_number(&self) -> SyncResult<u64> {
        self.height_calls.fetch_add(1, Ordering::SeqCst);
        let failures = self.height_failures.load(Ordering::SeqCst);
        if failures > 0 {
            self.height_failures.store(failures - 1, Ordering::SeqCst);
            return Err(SyncError::Rpc("eth_blockNumber unavailable".to_string()));
        }
        Ok(self.height.load(Ordering::SeqCst))
    }

    async fn get_logs(
        &self,
        addresses: &[Address],
        topics: &[H256],
        from_block: u64,
        to_block: u64,
    ) -> SyncResult<Vec<Log>> {
        self.requested_ranges
            .lock()
            .unwrap()
            .push((from_block, to_block));
        if self
            .failing_blocks
            .lock()
            .unwrap()
            .iter()
            .any(|b| (from_block..=to_block).contains(b))
        {
            return Err(SyncError::Rpc("eth_getLogs unavailable".to_string()));
        }
        Ok(self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|log| {
                let block = log.block_number.map(|n| n.as_u64()).unwrap_or_default();
                (from_block..=to_block).contains(&block)
                    && addresses.contains(&log.address)
                    && log.topics.first().map_or(false, |t| topics.contains(t))
            })
            .cloned()
            .collect())
    }
}

// ==========================================================================
// Lens API
// ==========================================================================

#[derive(Default)]
struct LensApiState {
    profiles: Vec<Profile>,
    publications: Vec<Publication>,
    failures: VecDeque<LensApiError>,
    calls: Vec<String>,
}

/// Offset-paginated in-memory Lens API. Page tokens are decimal offsets and
/// a `next` token is returned for every page, as the real API does.
#[derive(Default)]
pub struct MockLensApi {
    state: Mutex<LensApiState>,
}

impl MockLensApi {
    pub fn add_profile(&self, profile: Profile) {
        self.state.lock().unwrap().profiles.push(profile);
    }

    pub fn add_publication(&self, publication: Publication) {
        self.state.lock().unwrap().publications.push(publication);
    }

    /// The next query fails with `error`. Calls queue up.
    pub fn fail_next(&self, error: LensApiError) {
        self.state.lock().unwrap().failures.push_back(error);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn begin(&self, call: String) -> LensApiResult<std::sync::MutexGuard<'_, LensApiState>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        match state.failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(state),
        }
    }
}

fn paginate<T: Clone>(items: Vec<T>, cursor: Option<&str>, limit: i64) -> Page<T> {
    let offset: usize = cursor.and_then(|c| c.parse().ok()).unwrap_or(0);
    let page: Vec<T> = items
        .into_iter()
        .skip(offset)
        .take(limit as usize)
        .collect();
    let next = Some((offset + page.len()).to_string());
    Page { items: page, next }
}

#[async_trait]
impl LensApi for MockLensApi {
    async fn explore_profiles(
        &self,
        cursor: Option<&str>,
        limit: i64,
    ) -> LensApiResult<Page<Profile>> {
        let state = self.begin(format!("explore_profiles:{}", cursor.unwrap_or("")))?;
        Ok(paginate(state.profiles.clone(), cursor, limit))
    }

    async fn profiles_by_ids(&self, ids: &[String]) -> LensApiResult<Vec<Profile>> {
        let state = self.begin(format!("profiles_by_ids:{}", ids.join(",")))?;
        Ok(state
            .profiles
            .iter()
            .filter(|p| ids.contains(&p.id))
            .cloned()
            .collect())
    }

    async fn profiles_by_owners(
        &self,
        owners: &[String],
        cursor: Option<&str>,
        limit: i64,
    ) -> LensApiResult<Page<Profile>> {
        let state = self.begin(format!(
            "profiles_by_owners:{}:{}",
            owners.join(","),
            cursor.unwrap_or("")
        ))?;
        let owned: Vec<Profile> = state
            .profiles
            .iter()
            .filter(|p| p.owned_by.as_ref().map_or(false, |o| owners.contains(o)))
            .cloned()
            .collect();
        Ok(paginate(owned, cursor, limit))
    }

    async fn publications_by_profile(
        &self,
        profile_id: &str,
        cursor: Option<&str>,
        limit: i64,
    ) -> LensApiResult<Page<Publication>> {
        let state = self.begin(format!(
            "publications_by_profile:{}:{}",
            profile_id,
            cursor.unwrap_or("")
        ))?;
        let publications: Vec<Publication> = state
            .publications
            .iter()
            .filter(|p| p.profile_id == profile_id)
            .cloned()
            .collect();
        Ok(paginate(publications, cursor, limit))
    }

    async fn publications_by_ids(&self, ids: &[String]) -> LensApiResult<Vec<Publication>> {
        let state = self.begin(format!("publications_by_ids:{}", ids.join(",")))?;
        Ok(state
            .publications
            .iter()
            .filter(|p| ids.contains(&p.id))
            .cloned()
            .collect())
    }
}

// ==========================================================================
// Content
// ==========================================================================

#[derive(Default)]
pub struct MockContentFetcher {
    documents: Mutex<HashMap<String, Value>>,
    requests: Mutex<Vec<String>>,
}

impl MockContentFetcher {
    pub fn insert(&self, url: &str, document: Value) {
        self.documents
            .lock()
            .unwrap()
            .insert(url.to_string(), document);
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentFetcher for MockContentFetcher {
    async fn get_json(&self, url: &str, _timeout: Duration) -> Result<Value, ContentError> {
        self.requests.lock().unwrap().push(url.to_string());
        self.documents
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or(ContentError::Http { status: 404 })
    }
}
