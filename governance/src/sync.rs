//! Polling reads against a [`GovernanceProvider`].
//!
//! Every [`QueryKey`] owns one slot in the synchronizer's table: its policy,
//! the last published state, a generation counter and, while subscribed, a
//! poll task. A fetch takes the next generation when it is issued and may only
//! publish if nothing newer has been published and the slot has not been
//! invalidated or cancelled since. Reads are retried with a fixed delay;
//! writes are never retried.

use crate::config::GovConfig;
use crate::proposals::{Proposal, VoteRecord};
use crate::provider::{GovernanceProvider, Operation, OperationStatus, ProviderError};
use crate::stats::{aggregate, GovernanceStats};
use crate::Address;
use futures::future::try_join_all;
use num_bigint::BigUint;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueryKey {
    Proposals,
    ProposalVotes,
    TotalVotes,
    Balance,
    TotalSupply,
}

impl QueryKey {
    pub const ALL: [QueryKey; 5] = [
        QueryKey::Proposals,
        QueryKey::ProposalVotes,
        QueryKey::TotalVotes,
        QueryKey::Balance,
        QueryKey::TotalSupply,
    ];

    fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKey::Proposals => "proposals",
            QueryKey::ProposalVotes => "proposal-votes",
            QueryKey::TotalVotes => "total-votes",
            QueryKey::Balance => "balance",
            QueryKey::TotalSupply => "total-supply",
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryPolicy {
    pub interval: Duration,
    /// Age under which a cached value is served without fetching.
    pub stale_time: Duration,
    pub retries: u32,
    pub retry_delay: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryValue {
    Proposals(Vec<Proposal>),
    ProposalVotes(BTreeMap<u64, Vec<VoteRecord>>),
    TotalVotes(u64),
    Balance(BigUint),
    TotalSupply(BigUint),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("{key} read failed after {attempts} attempts: {source}")]
    Exhausted {
        key: QueryKey,
        attempts: u32,
        #[source]
        source: ProviderError,
    },
    #[error("{0} is not enabled")]
    Disabled(QueryKey),
    #[error("{0} result was superseded")]
    Superseded(QueryKey),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    #[error("submit failed: {0}")]
    Submit(#[source] ProviderError),
    #[error("confirmation failed: {0}")]
    Confirmation(#[source] ProviderError),
    #[error("operation {hash} finished with status {status}")]
    NotApplied {
        hash: String,
        status: OperationStatus,
    },
}

/// Published view of one query slot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryState {
    /// Last successful value; kept when a later cycle fails.
    pub value: Option<QueryValue>,
    /// Error of the latest published cycle, cleared by the next success.
    pub error: Option<SyncError>,
    pub updated_at: Option<Instant>,
    /// Generation of the cycle that produced this state.
    pub generation: u64,
}

struct Slot {
    policy: QueryPolicy,
    state: QueryState,
    issued: u64,
    /// Results from generations below this are dropped.
    floor: u64,
    stale: bool,
    subscribers: usize,
    tx: watch::Sender<QueryState>,
    wake: Arc<Notify>,
    task: Option<JoinHandle<()>>,
}

impl Slot {
    fn new(policy: QueryPolicy) -> Self {
        let (tx, _) = watch::channel(QueryState::default());
        Self {
            policy,
            state: QueryState::default(),
            issued: 0,
            floor: 0,
            stale: false,
            subscribers: 0,
            tx,
            wake: Arc::new(Notify::new()),
            task: None,
        }
    }

    fn is_fresh(&self, now: Instant) -> bool {
        if self.stale || self.state.value.is_none() {
            return false;
        }
        self.state
            .updated_at
            .map_or(false, |at| now.saturating_duration_since(at) < self.policy.stale_time)
    }
}

struct Inner {
    provider: Arc<dyn GovernanceProvider>,
    account: Option<Address>,
    /// One slot per key, indexed by [`QueryKey::index`].
    table: Mutex<[Slot; 5]>,
}

impl Inner {
    fn table(&self) -> MutexGuard<'_, [Slot; 5]> {
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn unsubscribe(&self, key: QueryKey) {
        let mut table = self.table();
        let slot = &mut table[key.index()];
        slot.subscribers = slot.subscribers.saturating_sub(1);
        if slot.subscribers == 0 {
            slot.floor = slot.issued + 1;
            if let Some(task) = slot.task.take() {
                task.abort();
                info!(key = %key, "poll task stopped");
            }
        }
    }
}

/// Read cache and poll scheduler shared by every consumer of one provider.
#[derive(Clone)]
pub struct Synchronizer {
    inner: Arc<Inner>,
}

/// Cached reads handed to pure consumers such as [`aggregate`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CachedReads {
    pub proposals: Vec<Proposal>,
    pub votes: BTreeMap<u64, Vec<VoteRecord>>,
    pub total_votes: Option<u64>,
    pub balance: Option<BigUint>,
    pub total_supply: Option<BigUint>,
}

impl CachedReads {
    pub fn stats(&self) -> GovernanceStats {
        aggregate(
            &self.proposals,
            self.total_supply.as_ref(),
            self.balance.as_ref(),
            self.total_votes,
        )
    }
}

impl Synchronizer {
    pub fn new(provider: Arc<dyn GovernanceProvider>, config: &GovConfig) -> Self {
        let sync = &config.sync;
        let table = [
            Slot::new(sync.proposals_policy()),
            Slot::new(sync.votes_policy()),
            Slot::new(sync.total_votes_policy()),
            Slot::new(sync.balance_policy()),
            Slot::new(sync.supply_policy()),
        ];
        Self {
            inner: Arc::new(Inner {
                provider,
                account: config.account.clone(),
                table: Mutex::new(table),
            }),
        }
    }

    pub fn policy(&self, key: QueryKey) -> QueryPolicy {
        self.inner.table()[key.index()].policy
    }

    pub fn state(&self, key: QueryKey) -> QueryState {
        self.inner.table()[key.index()].state.clone()
    }

    fn cached(&self, key: QueryKey) -> Option<QueryValue> {
        self.inner.table()[key.index()].state.value.clone()
    }

    fn proposal_ids(&self) -> Vec<u64> {
        match self.cached(QueryKey::Proposals) {
            Some(QueryValue::Proposals(list)) => list.iter().map(|p| p.id).collect(),
            _ => Vec::new(),
        }
    }

    /// Whether `key` may be fetched right now.
    pub fn enabled(&self, key: QueryKey) -> bool {
        match key {
            QueryKey::Balance => self.inner.account.is_some(),
            QueryKey::ProposalVotes => !self.proposal_ids().is_empty(),
            QueryKey::Proposals | QueryKey::TotalVotes | QueryKey::TotalSupply => true,
        }
    }

    async fn fetch_once(&self, key: QueryKey) -> Result<QueryValue, ProviderError> {
        let provider = &self.inner.provider;
        match key {
            QueryKey::Proposals => Ok(QueryValue::Proposals(provider.get_proposals().await?)),
            QueryKey::ProposalVotes => {
                let reads = self.proposal_ids().into_iter().map(|id| async move {
                    let records = provider.get_votes_power(id).await?;
                    Ok::<_, ProviderError>((id, records))
                });
                let votes = try_join_all(reads).await?;
                Ok(QueryValue::ProposalVotes(votes.into_iter().collect()))
            }
            QueryKey::TotalVotes => Ok(QueryValue::TotalVotes(
                provider.get_total_nb_votes().await?,
            )),
            QueryKey::Balance => {
                let account = self
                    .inner
                    .account
                    .as_ref()
                    .ok_or_else(|| ProviderError::Unavailable("no account configured".into()))?;
                Ok(QueryValue::Balance(provider.get_balance(account).await?))
            }
            QueryKey::TotalSupply => Ok(QueryValue::TotalSupply(
                provider.get_total_supply().await?,
            )),
        }
    }

    async fn fetch_with_retry(
        &self,
        key: QueryKey,
        policy: QueryPolicy,
    ) -> Result<QueryValue, SyncError> {
        let mut attempt = 0u32;
        loop {
            match self.fetch_once(key).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < policy.retries => {
                    attempt += 1;
                    warn!(key = %key, attempt, error = %err, "retrying read");
                    time::sleep(policy.retry_delay).await;
                }
                Err(err) => {
                    warn!(key = %key, attempts = attempt + 1, error = %err, "read failed");
                    return Err(SyncError::Exhausted {
                        key,
                        attempts: attempt + 1,
                        source: err,
                    });
                }
            }
        }
    }

    fn publish(
        &self,
        key: QueryKey,
        generation: u64,
        result: Result<QueryValue, SyncError>,
    ) -> Result<QueryValue, SyncError> {
        let mut table = self.inner.table();
        let slot = &mut table[key.index()];
        if generation < slot.floor || generation <= slot.state.generation {
            debug!(key = %key, generation, current = slot.state.generation, "discarding stale result");
            return slot
                .state
                .value
                .clone()
                .ok_or(SyncError::Superseded(key));
        }
        slot.state.generation = generation;
        match &result {
            Ok(value) => {
                slot.state.value = Some(value.clone());
                slot.state.error = None;
                slot.state.updated_at = Some(Instant::now());
                slot.stale = false;
            }
            Err(err) => slot.state.error = Some(err.clone()),
        }
        slot.tx.send_replace(slot.state.clone());
        result
    }

    /// Run one fetch cycle for `key` and publish its outcome.
    pub async fn refetch(&self, key: QueryKey) -> Result<QueryValue, SyncError> {
        if !self.enabled(key) {
            debug!(key = %key, "skipping disabled query");
            return Err(SyncError::Disabled(key));
        }
        let (generation, policy) = {
            let mut table = self.inner.table();
            let slot = &mut table[key.index()];
            slot.issued += 1;
            (slot.issued, slot.policy)
        };
        let result = self.fetch_with_retry(key, policy).await;
        self.publish(key, generation, result)
    }

    /// Serve the cached value while fresh, fetch otherwise.
    pub async fn get(&self, key: QueryKey) -> Result<QueryValue, SyncError> {
        let cached = {
            let table = self.inner.table();
            let slot = &table[key.index()];
            if slot.is_fresh(Instant::now()) {
                slot.state.value.clone()
            } else {
                None
            }
        };
        if let Some(value) = cached {
            debug!(key = %key, "cache hit");
            return Ok(value);
        }
        self.refetch(key).await
    }

    /// Mark keys stale, drop in-flight results for them and wake their pollers.
    pub fn invalidate(&self, keys: &[QueryKey]) {
        let mut table = self.inner.table();
        for key in keys {
            let slot = &mut table[key.index()];
            slot.stale = true;
            slot.floor = slot.issued + 1;
            if slot.task.is_some() {
                slot.wake.notify_one();
            }
            debug!(key = %key, "invalidated");
        }
    }

    /// Start (or join) the poll task for `key`.
    pub fn subscribe(&self, key: QueryKey) -> Subscription {
        let mut table = self.inner.table();
        let slot = &mut table[key.index()];
        slot.subscribers += 1;
        let rx = slot.tx.subscribe();
        if slot.task.is_none() {
            let sync = self.clone();
            let wake = slot.wake.clone();
            let interval = slot.policy.interval;
            slot.task = Some(tokio::spawn(async move {
                sync.poll(key, interval, wake).await;
            }));
            info!(key = %key, interval_ms = interval.as_millis() as u64, "poll task started");
        }
        Subscription {
            key,
            inner: self.inner.clone(),
            rx,
        }
    }

    async fn poll(&self, key: QueryKey, interval: Duration, wake: Arc<Notify>) {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = wake.notified() => {}
            }
            if !self.enabled(key) {
                debug!(key = %key, "poll skipped, query disabled");
                continue;
            }
            // Failures are published into the slot; the next tick retries.
            let _ = self.refetch(key).await;
        }
    }

    pub fn snapshot(&self) -> CachedReads {
        let table = self.inner.table();
        let mut reads = CachedReads::default();
        for slot in table.iter() {
            match &slot.state.value {
                Some(QueryValue::Proposals(list)) => reads.proposals = list.clone(),
                Some(QueryValue::ProposalVotes(votes)) => reads.votes = votes.clone(),
                Some(QueryValue::TotalVotes(n)) => reads.total_votes = Some(*n),
                Some(QueryValue::Balance(b)) => reads.balance = Some(b.clone()),
                Some(QueryValue::TotalSupply(s)) => reads.total_supply = Some(s.clone()),
                None => {}
            }
        }
        reads
    }

    async fn finalize(
        &self,
        label: &'static str,
        submitted: Result<Box<dyn Operation>, ProviderError>,
        invalidates: &[QueryKey],
    ) -> Result<String, MutationError> {
        let op = submitted.map_err(|err| {
            warn!(operation = label, error = %err, "submit failed");
            MutationError::Submit(err)
        })?;
        let hash = op.hash().to_string();
        let status = op.confirmation().await.map_err(|err| {
            warn!(operation = label, %hash, error = %err, "confirmation failed");
            MutationError::Confirmation(err)
        })?;
        if !status.is_success() {
            warn!(operation = label, %hash, %status, "operation not applied");
            return Err(MutationError::NotApplied { hash, status });
        }
        info!(operation = label, %hash, "operation applied");
        self.invalidate(invalidates);
        Ok(hash)
    }

    /// Ask the contract to recompute proposal state.
    pub async fn refresh(&self, fee: u64) -> Result<String, MutationError> {
        let submitted = self.inner.provider.refresh(fee).await;
        self.finalize(
            "refresh",
            submitted,
            &[QueryKey::Proposals, QueryKey::ProposalVotes, QueryKey::TotalVotes],
        )
        .await
    }

    pub async fn manage_auto_refresh(
        &self,
        enabled: bool,
        max_gas: u64,
        max_fee: u64,
    ) -> Result<String, MutationError> {
        let submitted = self
            .inner
            .provider
            .manage_auto_refresh(enabled, max_gas, max_fee)
            .await;
        self.finalize("manage_auto_refresh", submitted, &[QueryKey::Proposals])
            .await
    }

    pub async fn delete_proposal(&self, proposal_id: u64) -> Result<String, MutationError> {
        let submitted = self.inner.provider.delete_proposal(proposal_id).await;
        self.finalize(
            "delete_proposal",
            submitted,
            &[QueryKey::Proposals, QueryKey::ProposalVotes, QueryKey::TotalVotes],
        )
        .await
    }
}

/// Keeps a key polled while alive. Dropping the last subscription for a key
/// stops its poll task and discards any read still in flight.
pub struct Subscription {
    key: QueryKey,
    inner: Arc<Inner>,
    rx: watch::Receiver<QueryState>,
}

impl Subscription {
    pub fn key(&self) -> QueryKey {
        self.key
    }

    pub fn current(&self) -> QueryState {
        self.rx.borrow().clone()
    }

    /// Wait for the next published state. The subscription keeps its
    /// synchronizer alive, so polling continues after every [`Synchronizer`]
    /// handle is dropped and this only returns `false` if the sender is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.inner.unsubscribe(self.key);
    }
}
