use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::Address;

pub const DISCUSSION_WINDOW: Duration = Duration::from_secs(21 * 24 * 60 * 60);
pub const VOTING_WINDOW: Duration = Duration::from_secs(28 * 24 * 60 * 60);

/// Lifecycle phase of a proposal. `PendingFinal` is never reported by the
/// chain; the status engine derives it once the voting window has elapsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ProposalStatus {
    Discussion,
    Voting,
    PendingFinal,
    Accepted,
    Rejected,
    Other(String),
}

impl ProposalStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProposalStatus::Accepted | ProposalStatus::Rejected)
    }

    pub fn as_str(&self) -> &str {
        match self {
            ProposalStatus::Discussion => "DISCUSSION",
            ProposalStatus::Voting => "VOTING",
            ProposalStatus::PendingFinal => "PENDING_FINAL",
            ProposalStatus::Accepted => "ACCEPTED",
            ProposalStatus::Rejected => "REJECTED",
            ProposalStatus::Other(s) => s,
        }
    }
}

impl FromStr for ProposalStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "DISCUSSION" => ProposalStatus::Discussion,
            "VOTING" => ProposalStatus::Voting,
            "PENDING_FINAL" => ProposalStatus::PendingFinal,
            "ACCEPTED" => ProposalStatus::Accepted,
            "REJECTED" => ProposalStatus::Rejected,
            other => ProposalStatus::Other(other.to_string()),
        })
    }
}

impl TryFrom<String> for ProposalStatus {
    type Error = std::convert::Infallible;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ProposalStatus> for String {
    fn from(status: ProposalStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub summary: String,
    pub owner: Address,
    /// Creation time in epoch milliseconds.
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forum_link: Option<String>,
    pub status: ProposalStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VoteChoice {
    Yes,
    No,
    Abstain,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub voter: Address,
    #[serde(with = "crate::amount")]
    pub power: BigUint,
    pub choice: VoteChoice,
}

/// Voting power summed per choice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProposalTally {
    #[serde(with = "crate::amount")]
    pub yes: BigUint,
    #[serde(with = "crate::amount")]
    pub no: BigUint,
    #[serde(with = "crate::amount")]
    pub abstain: BigUint,
    pub voters: usize,
}

impl ProposalTally {
    pub fn from_records(records: &[VoteRecord]) -> Self {
        let mut tally = ProposalTally::default();
        for record in records {
            let bucket = match record.choice {
                VoteChoice::Yes => &mut tally.yes,
                VoteChoice::No => &mut tally.no,
                VoteChoice::Abstain => &mut tally.abstain,
            };
            *bucket += &record.power;
        }
        tally.voters = records.len();
        tally
    }

    pub fn total(&self) -> BigUint {
        &self.yes + &self.no + &self.abstain
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProposalWindows {
    pub discussion: Duration,
    pub voting: Duration,
}

impl Default for ProposalWindows {
    fn default() -> Self {
        Self {
            discussion: DISCUSSION_WINDOW,
            voting: VOTING_WINDOW,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPhase {
    BeforeVoting,
    Open,
    Closed,
}

/// Voting window boundaries in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VotingWindow {
    pub start: u64,
    pub end: u64,
}

impl VotingWindow {
    /// `end` itself still counts as open.
    pub fn phase(&self, now: u64) -> WindowPhase {
        if now < self.start {
            WindowPhase::BeforeVoting
        } else if now <= self.end {
            WindowPhase::Open
        } else {
            WindowPhase::Closed
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Derives the displayed status of a proposal from its creation time and the
/// status reported by the chain. Never mutates the proposal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusEngine {
    windows: ProposalWindows,
}

impl StatusEngine {
    pub fn new(windows: ProposalWindows) -> Self {
        Self { windows }
    }

    pub fn windows(&self) -> ProposalWindows {
        self.windows
    }

    pub fn window(&self, created_at: u64) -> VotingWindow {
        let start = created_at.saturating_add(millis(self.windows.discussion));
        let end = start.saturating_add(millis(self.windows.voting));
        VotingWindow { start, end }
    }

    pub fn status_at(&self, created_at: u64, reported: &ProposalStatus, now: u64) -> ProposalStatus {
        if reported.is_terminal() {
            return reported.clone();
        }
        if *reported == ProposalStatus::Voting && now > self.window(created_at).end {
            return ProposalStatus::PendingFinal;
        }
        reported.clone()
    }

    pub fn effective_status(&self, proposal: &Proposal, now: u64) -> ProposalStatus {
        self.status_at(proposal.created_at, &proposal.status, now)
    }

    /// Earliest time at which the effective status can change without a new
    /// report from the chain.
    pub fn next_recheck(&self, proposal: &Proposal, now: u64) -> Option<u64> {
        if proposal.status != ProposalStatus::Voting {
            return None;
        }
        let end = self.window(proposal.created_at).end;
        (now <= end).then(|| end.saturating_add(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: u64 = 24 * 60 * 60 * 1000;
    const T: u64 = 1_700_000_000_000;

    #[test]
    fn window_boundaries() {
        let engine = StatusEngine::default();
        let window = engine.window(T);
        assert_eq!(window.start, T + 21 * DAY);
        assert_eq!(window.end, T + 49 * DAY);
        assert_eq!(window.phase(window.start - 1), WindowPhase::BeforeVoting);
        assert_eq!(window.phase(window.start), WindowPhase::Open);
        assert_eq!(window.phase(window.end), WindowPhase::Open);
        assert_eq!(window.phase(window.end + 1), WindowPhase::Closed);
    }

    #[test]
    fn voting_turns_pending_only_after_end() {
        let engine = StatusEngine::default();
        let end = engine.window(T).end;
        let voting = ProposalStatus::Voting;
        assert_eq!(engine.status_at(T, &voting, end), ProposalStatus::Voting);
        assert_eq!(
            engine.status_at(T, &voting, end + 1),
            ProposalStatus::PendingFinal
        );
    }

    #[test]
    fn terminal_status_wins() {
        let engine = StatusEngine::default();
        for status in [ProposalStatus::Accepted, ProposalStatus::Rejected] {
            assert_eq!(engine.status_at(T, &status, 0), status);
            assert_eq!(engine.status_at(T, &status, u64::MAX), status);
        }
    }

    #[test]
    fn other_statuses_pass_through() {
        let engine = StatusEngine::default();
        let queued = ProposalStatus::Other("QUEUED".into());
        assert_eq!(engine.status_at(T, &queued, u64::MAX), queued);
        assert_eq!(
            engine.status_at(T, &ProposalStatus::Discussion, T + 30 * DAY),
            ProposalStatus::Discussion
        );
    }

    #[test]
    fn window_saturates() {
        let engine = StatusEngine::default();
        let window = engine.window(u64::MAX - 5);
        assert_eq!(window.start, u64::MAX);
        assert_eq!(window.end, u64::MAX);
    }

    #[test]
    fn status_wire_form() {
        let status: ProposalStatus = serde_json::from_str("\"ACCEPTED\"").unwrap();
        assert_eq!(status, ProposalStatus::Accepted);
        let other: ProposalStatus = serde_json::from_str("\"CANCELLED\"").unwrap();
        assert_eq!(other, ProposalStatus::Other("CANCELLED".into()));
        assert_eq!(serde_json::to_string(&other).unwrap(), "\"CANCELLED\"");
    }

    #[test]
    fn tally_sums_power_by_choice() {
        let records = vec![
            VoteRecord {
                voter: "a".into(),
                power: BigUint::from(10u32),
                choice: VoteChoice::Yes,
            },
            VoteRecord {
                voter: "b".into(),
                power: BigUint::from(5u32),
                choice: VoteChoice::No,
            },
            VoteRecord {
                voter: "c".into(),
                power: BigUint::from(7u32),
                choice: VoteChoice::Yes,
            },
        ];
        let tally = ProposalTally::from_records(&records);
        assert_eq!(tally.yes, BigUint::from(17u32));
        assert_eq!(tally.no, BigUint::from(5u32));
        assert_eq!(tally.total(), BigUint::from(22u32));
        assert_eq!(tally.voters, 3);
    }
}
