//! Client-side governance logic: parameter-change drafting, proposal status
//! derivation, statistics, and synchronized reads against a governance
//! contract provider.

mod amount;
pub mod changes;
pub mod config;
pub mod params;
pub mod proposals;
pub mod provider;
pub mod stats;
pub mod sync;

pub use changes::{
    available_parameters, duplicate_selections, encode, select_parameter, size_warning,
    validate, validate_rows, CategoryOptions, ChangeReview, DraftRow, EncodedChange,
    EncodedPayload, EncodedValue, SelectionError, SizeWarning,
};
pub use config::{ConfigError, GovConfig, SyncConfig};
pub use params::{Category, Parameter, ParameterKind, ParameterRegistry, RegistryError};
pub use proposals::{
    Proposal, ProposalStatus, ProposalTally, ProposalWindows, StatusEngine, VoteChoice,
    VoteRecord, VotingWindow, WindowPhase, DISCUSSION_WINDOW, VOTING_WINDOW,
};
pub use provider::{GovernanceProvider, Operation, OperationStatus, ProviderError};
pub use stats::{aggregate, GovernanceStats, VotingPowerShare};
pub use sync::{
    CachedReads, MutationError, QueryKey, QueryPolicy, QueryState, QueryValue, Subscription,
    SyncError, Synchronizer,
};

/// Account address as reported by the provider.
pub type Address = String;

#[cfg(doctest)]
#[doc = concat!("```rust\n", include_str!("../examples/usage.rs"), "\n```")]
mod governance_example {}
