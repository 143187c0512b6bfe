//! Contract surface the client reads from and writes to. Transport lives
//! behind [`GovernanceProvider`]; the client never talks to the chain
//! directly.

use crate::proposals::{Proposal, VoteRecord};
use crate::Address;
use async_trait::async_trait;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("read failed: {0}")]
    Read(String),
    #[error("operation rejected: {0}")]
    Rejected(String),
    #[error("proposal {0} not found")]
    UnknownProposal(u64),
}

/// Execution status reported once an operation is final.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Applied,
    Failed,
    Backtracked,
    Skipped,
}

impl OperationStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, OperationStatus::Applied)
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationStatus::Applied => "applied",
            OperationStatus::Failed => "failed",
            OperationStatus::Backtracked => "backtracked",
            OperationStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// A submitted write whose finalization can be awaited once.
#[async_trait]
pub trait Operation: Send {
    fn hash(&self) -> &str;
    async fn confirmation(self: Box<Self>) -> Result<OperationStatus, ProviderError>;
}

#[async_trait]
pub trait GovernanceProvider: Send + Sync {
    async fn get_proposals(&self) -> Result<Vec<Proposal>, ProviderError>;
    async fn get_votes_power(&self, proposal_id: u64) -> Result<Vec<VoteRecord>, ProviderError>;
    async fn get_total_nb_votes(&self) -> Result<u64, ProviderError>;
    async fn get_balance(&self, account: &Address) -> Result<BigUint, ProviderError>;
    async fn get_total_supply(&self) -> Result<BigUint, ProviderError>;

    async fn refresh(&self, fee: u64) -> Result<Box<dyn Operation>, ProviderError>;
    async fn manage_auto_refresh(
        &self,
        enabled: bool,
        max_gas: u64,
        max_fee: u64,
    ) -> Result<Box<dyn Operation>, ProviderError>;
    async fn delete_proposal(&self, proposal_id: u64) -> Result<Box<dyn Operation>, ProviderError>;
}

pub mod memory {
    //! In-process provider backed by a chain snapshot. Used by tests and by
    //! the gov-ui tool when no node is reachable.

    use super::*;
    use std::collections::{BTreeMap, HashMap, HashSet};
    use std::fs;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex, MutexGuard};
    use std::time::Duration;

    /// Serialized chain state the memory provider serves.
    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ChainSnapshot {
        #[serde(default)]
        pub proposals: Vec<Proposal>,
        #[serde(default)]
        pub votes: BTreeMap<u64, Vec<VoteRecord>>,
        #[serde(default)]
        pub total_votes: u64,
        #[serde(default, with = "crate::amount")]
        pub total_supply: BigUint,
        #[serde(default, with = "crate::amount::map")]
        pub balances: HashMap<Address, BigUint>,
    }

    impl ChainSnapshot {
        pub fn load(path: impl AsRef<Path>) -> Result<Self, ProviderError> {
            let text = fs::read_to_string(path.as_ref())
                .map_err(|e| ProviderError::Unavailable(format!("read snapshot: {e}")))?;
            serde_json::from_str(&text)
                .map_err(|e| ProviderError::Unavailable(format!("decode snapshot: {e}")))
        }
    }

    #[derive(Default)]
    struct Faults {
        vote_reads: HashSet<u64>,
        failing_reads: usize,
        next_status: Option<OperationStatus>,
        reject_writes: bool,
    }

    #[derive(Clone, Default)]
    pub struct MemoryProvider {
        state: Arc<Mutex<ChainSnapshot>>,
        faults: Arc<Mutex<Faults>>,
        read_delay: Arc<Mutex<HashMap<u64, Duration>>>,
        reads: Arc<AtomicUsize>,
        writes: Arc<Mutex<Vec<String>>>,
    }

    fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
        m.lock().unwrap_or_else(|e| e.into_inner())
    }

    impl MemoryProvider {
        pub fn new(snapshot: ChainSnapshot) -> Self {
            Self {
                state: Arc::new(Mutex::new(snapshot)),
                ..Self::default()
            }
        }

        pub fn update(&self, f: impl FnOnce(&mut ChainSnapshot)) {
            f(&mut lock(&self.state));
        }

        /// Make every vote read for `proposal_id` fail until cleared.
        pub fn fail_votes_for(&self, proposal_id: u64) {
            lock(&self.faults).vote_reads.insert(proposal_id);
        }

        pub fn clear_vote_failures(&self) {
            lock(&self.faults).vote_reads.clear();
        }

        /// Fail the next `n` reads of any kind.
        pub fn fail_next_reads(&self, n: usize) {
            lock(&self.faults).failing_reads = n;
        }

        /// Delay the next vote read for one proposal, to interleave concurrent
        /// polls.
        pub fn delay_votes_for(&self, proposal_id: u64, delay: Duration) {
            lock(&self.read_delay).insert(proposal_id, delay);
        }

        /// Status the next operation finalizes with.
        pub fn finalize_next_with(&self, status: OperationStatus) {
            lock(&self.faults).next_status = Some(status);
        }

        pub fn reject_writes(&self, reject: bool) {
            lock(&self.faults).reject_writes = reject;
        }

        /// Number of read calls served, failed ones included.
        pub fn read_count(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }

        /// Operations submitted so far, in order.
        pub fn writes(&self) -> Vec<String> {
            lock(&self.writes).clone()
        }

        fn begin_read(&self) -> Result<(), ProviderError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            let mut faults = lock(&self.faults);
            if faults.failing_reads > 0 {
                faults.failing_reads -= 1;
                return Err(ProviderError::Read("injected failure".into()));
            }
            Ok(())
        }

        fn submit(
            &self,
            label: String,
        ) -> Result<(Box<dyn Operation>, bool), ProviderError> {
            let status = {
                let mut faults = lock(&self.faults);
                if faults.reject_writes {
                    return Err(ProviderError::Rejected(label));
                }
                faults.next_status.take().unwrap_or(OperationStatus::Applied)
            };
            let mut writes = lock(&self.writes);
            writes.push(label);
            let applied = status.is_success();
            let op = MemoryOperation {
                hash: format!("op{:04}", writes.len()),
                status,
            };
            Ok((Box::new(op), applied))
        }
    }

    struct MemoryOperation {
        hash: String,
        status: OperationStatus,
    }

    #[async_trait]
    impl Operation for MemoryOperation {
        fn hash(&self) -> &str {
            &self.hash
        }

        async fn confirmation(self: Box<Self>) -> Result<OperationStatus, ProviderError> {
            Ok(self.status)
        }
    }

    #[async_trait]
    impl GovernanceProvider for MemoryProvider {
        async fn get_proposals(&self) -> Result<Vec<Proposal>, ProviderError> {
            self.begin_read()?;
            Ok(lock(&self.state).proposals.clone())
        }

        async fn get_votes_power(
            &self,
            proposal_id: u64,
        ) -> Result<Vec<VoteRecord>, ProviderError> {
            self.begin_read()?;
            let delay = lock(&self.read_delay).remove(&proposal_id);
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if lock(&self.faults).vote_reads.contains(&proposal_id) {
                return Err(ProviderError::Read(format!(
                    "votes for proposal {proposal_id}"
                )));
            }
            let state = lock(&self.state);
            if !state.proposals.iter().any(|p| p.id == proposal_id) {
                return Err(ProviderError::UnknownProposal(proposal_id));
            }
            Ok(state.votes.get(&proposal_id).cloned().unwrap_or_default())
        }

        async fn get_total_nb_votes(&self) -> Result<u64, ProviderError> {
            self.begin_read()?;
            Ok(lock(&self.state).total_votes)
        }

        async fn get_balance(&self, account: &Address) -> Result<BigUint, ProviderError> {
            self.begin_read()?;
            Ok(lock(&self.state)
                .balances
                .get(account)
                .cloned()
                .unwrap_or_default())
        }

        async fn get_total_supply(&self) -> Result<BigUint, ProviderError> {
            self.begin_read()?;
            Ok(lock(&self.state).total_supply.clone())
        }

        async fn refresh(&self, fee: u64) -> Result<Box<dyn Operation>, ProviderError> {
            self.submit(format!("refresh fee={fee}")).map(|(op, _)| op)
        }

        async fn manage_auto_refresh(
            &self,
            enabled: bool,
            max_gas: u64,
            max_fee: u64,
        ) -> Result<Box<dyn Operation>, ProviderError> {
            self.submit(format!(
                "auto_refresh enabled={enabled} max_gas={max_gas} max_fee={max_fee}"
            ))
            .map(|(op, _)| op)
        }

        async fn delete_proposal(
            &self,
            proposal_id: u64,
        ) -> Result<Box<dyn Operation>, ProviderError> {
            let (op, applied) = self.submit(format!("delete proposal={proposal_id}"))?;
            if applied {
                self.update(|s| {
                    s.proposals.retain(|p| p.id != proposal_id);
                    s.votes.remove(&proposal_id);
                });
            }
            Ok(op)
        }
    }
}
