use gov_client::provider::memory::{ChainSnapshot, MemoryProvider};
use gov_client::{
    ChangeReview, DraftRow, GovConfig, ParameterRegistry, Proposal, ProposalStatus, QueryKey,
    StatusEngine, Synchronizer,
};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let config = GovConfig::default();
    let registry = ParameterRegistry::builtin().unwrap();

    let rows = vec![
        DraftRow::new("quorum_percent", "12.5"),
        DraftRow::new("platform_name", "Commons"),
    ];
    let review = ChangeReview::new(&registry, &rows, config.max_parameter_change_size);
    assert!(review.is_submittable());
    println!("{}", review.encoded.payload);

    let created_at = 1_700_000_000_000;
    let proposal = Proposal {
        id: 1,
        title: "Raise quorum".into(),
        summary: String::new(),
        owner: "tz1owner".into(),
        created_at,
        forum_link: None,
        status: ProposalStatus::Voting,
    };
    let engine = StatusEngine::new(config.windows());
    let window = engine.window(created_at);
    assert_eq!(
        engine.effective_status(&proposal, window.end + 1),
        ProposalStatus::PendingFinal
    );

    let provider = MemoryProvider::new(ChainSnapshot {
        proposals: vec![proposal],
        total_votes: 4,
        ..ChainSnapshot::default()
    });
    let sync = Synchronizer::new(Arc::new(provider), &config);
    sync.get(QueryKey::Proposals).await.unwrap();
    sync.get(QueryKey::ProposalVotes).await.unwrap();
    sync.get(QueryKey::TotalVotes).await.unwrap();
    let stats = sync.snapshot().stats();
    assert_eq!(stats.total_votes, 4);
    assert_eq!(stats.open_proposals, 1);
}
