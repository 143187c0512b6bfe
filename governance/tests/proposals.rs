use gov_client::{
    Proposal, ProposalStatus, ProposalTally, ProposalWindows, StatusEngine, VoteRecord,
    WindowPhase,
};
use num_bigint::BigUint;
use std::time::Duration;

const DAY: u64 = 24 * 60 * 60 * 1000;
const T: u64 = 1_700_000_000_000;

fn proposal(status: ProposalStatus) -> Proposal {
    Proposal {
        id: 7,
        title: "Lower quorum".into(),
        summary: String::new(),
        owner: "tz1owner".into(),
        created_at: T,
        forum_link: None,
        status,
    }
}

#[test]
fn decodes_contract_listing() {
    let raw = r#"[
        {"id": 1, "title": "A", "owner": "tz1a", "createdAt": 1700000000000, "status": "VOTING",
         "forumLink": "https://forum.example/t/1"},
        {"id": 2, "title": "B", "summary": "s", "owner": "tz1b", "createdAt": 1700000000001,
         "status": "SUSPENDED"}
    ]"#;
    let list: Vec<Proposal> = serde_json::from_str(raw).unwrap();
    assert_eq!(list[0].status, ProposalStatus::Voting);
    assert_eq!(list[0].forum_link.as_deref(), Some("https://forum.example/t/1"));
    assert_eq!(list[1].status, ProposalStatus::Other("SUSPENDED".into()));
    assert!(!list[1].status.is_terminal());

    let encoded = serde_json::to_value(&list[1]).unwrap();
    assert_eq!(encoded["createdAt"], 1_700_000_000_001u64);
    assert_eq!(encoded["status"], "SUSPENDED");
    assert!(encoded.get("forumLink").is_none());
}

#[test]
fn effective_status_table() {
    let engine = StatusEngine::default();
    let end = T + 49 * DAY;
    let cases = [
        (ProposalStatus::Voting, T + 50 * DAY, ProposalStatus::PendingFinal),
        (ProposalStatus::Voting, end, ProposalStatus::Voting),
        (ProposalStatus::Voting, end + 1, ProposalStatus::PendingFinal),
        (ProposalStatus::Accepted, T + 100 * DAY, ProposalStatus::Accepted),
        (ProposalStatus::Rejected, T, ProposalStatus::Rejected),
        (ProposalStatus::Discussion, T + 30 * DAY, ProposalStatus::Discussion),
        (ProposalStatus::Discussion, T + 60 * DAY, ProposalStatus::Discussion),
    ];
    for (reported, now, expected) in cases {
        let p = proposal(reported.clone());
        assert_eq!(engine.effective_status(&p, now), expected, "{reported} at {now}");
        assert_eq!(p.status, reported);
    }
}

#[test]
fn recheck_follows_window_end() {
    let engine = StatusEngine::default();
    let voting = proposal(ProposalStatus::Voting);
    let end = engine.window(T).end;
    assert_eq!(engine.next_recheck(&voting, T), Some(end + 1));
    assert_eq!(engine.next_recheck(&voting, end + 1), None);
    assert_eq!(engine.next_recheck(&proposal(ProposalStatus::Accepted), T), None);
}

#[test]
fn custom_windows() {
    let engine = StatusEngine::new(ProposalWindows {
        discussion: Duration::from_secs(60),
        voting: Duration::from_secs(120),
    });
    let window = engine.window(T);
    assert_eq!(window.start, T + 60_000);
    assert_eq!(window.end, T + 180_000);
    assert_eq!(window.phase(T + 90_000), WindowPhase::Open);
    assert_eq!(
        engine.status_at(T, &ProposalStatus::Voting, T + 180_001),
        ProposalStatus::PendingFinal
    );
    let saturated = engine.window(u64::MAX - 1);
    assert_eq!(saturated.end, u64::MAX);
}

#[test]
fn tally_sums_power_per_choice() {
    let raw = r#"[
        {"voter": "tz1a", "power": "18446744073709551616", "choice": "YES"},
        {"voter": "tz1b", "power": 5, "choice": "NO"},
        {"voter": "tz1c", "power": "7", "choice": "YES"},
        {"voter": "tz1d", "power": 1, "choice": "ABSTAIN"}
    ]"#;
    let records: Vec<VoteRecord> = serde_json::from_str(raw).unwrap();
    let tally = ProposalTally::from_records(&records);
    assert_eq!(tally.yes, BigUint::from(u64::MAX) + BigUint::from(8u32));
    assert_eq!(tally.no, BigUint::from(5u32));
    assert_eq!(tally.abstain, BigUint::from(1u32));
    assert_eq!(tally.voters, 4);
    assert_eq!(tally.total(), BigUint::from(u64::MAX) + BigUint::from(14u32));
}
