use anyhow::{Context, Result};
use clap::Parser;
use gov_client::provider::memory::{ChainSnapshot, MemoryProvider};
use gov_client::{
    ChangeReview, DraftRow, GovConfig, ParameterRegistry, Proposal, ProposalStatus,
    ProposalTally, QueryKey, StatusEngine, Synchronizer, VotingWindow,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};
use warp::http::StatusCode;
use warp::Filter;

#[derive(Parser, Debug)]
#[command(name = "gov-ui")]
#[command(about = "Governance dashboard backed by a chain snapshot")]
struct Args {
    /// Client configuration (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Chain snapshot served by the in-memory provider
    #[arg(long)]
    snapshot: PathBuf,

    /// Parameter catalogue replacing the builtin one
    #[arg(long)]
    registry: Option<PathBuf>,

    #[arg(long, default_value = "127.0.0.1:8080")]
    listen: SocketAddr,

    /// Account whose voting power is shown
    #[arg(long)]
    account: Option<String>,
}

struct App {
    sync: Synchronizer,
    engine: StatusEngine,
    registry: ParameterRegistry,
    max_change_size: usize,
}

fn with_app(
    app: Arc<App>,
) -> impl Filter<Extract = (Arc<App>,), Error = Infallible> + Clone {
    warp::any().map(move || app.clone())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProposalView {
    #[serde(flatten)]
    proposal: Proposal,
    effective_status: ProposalStatus,
    window: VotingWindow,
    tally: ProposalTally,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsView {
    voting_power: String,
    total_votes: u64,
    proposal_count: usize,
    open_proposals: usize,
    votes_per_proposal: f64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChangesView {
    errors: Vec<String>,
    payload: String,
    warning: Option<String>,
    fallback: bool,
    submittable: bool,
}

#[derive(Deserialize)]
struct RefreshForm {
    fee: u64,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn list_proposals(app: &App) -> Vec<ProposalView> {
    let reads = app.sync.snapshot();
    let now = now_ms();
    reads
        .proposals
        .into_iter()
        .map(|proposal| {
            let tally = reads
                .votes
                .get(&proposal.id)
                .map(|records| ProposalTally::from_records(records))
                .unwrap_or_default();
            ProposalView {
                effective_status: app.engine.effective_status(&proposal, now),
                window: app.engine.window(proposal.created_at),
                tally,
                proposal,
            }
        })
        .collect()
}

fn stats(app: &App) -> StatsView {
    let stats = app.sync.snapshot().stats();
    StatsView {
        voting_power: stats.voting_power.display(),
        total_votes: stats.total_votes,
        proposal_count: stats.proposal_count,
        open_proposals: stats.open_proposals,
        votes_per_proposal: stats.votes_per_proposal(),
    }
}

fn review(app: &App, rows: &[DraftRow]) -> ChangesView {
    let review = ChangeReview::new(&app.registry, rows, app.max_change_size);
    ChangesView {
        submittable: review.is_submittable(),
        warning: review.encoded.warning.map(|w| w.to_string()),
        fallback: review.encoded.fallback,
        payload: review.encoded.payload,
        errors: review.errors,
    }
}

async fn refresh(form: RefreshForm, app: Arc<App>) -> Result<impl warp::Reply, Infallible> {
    let reply = match app.sync.refresh(form.fee).await {
        Ok(hash) => warp::reply::with_status(
            warp::reply::json(&serde_json::json!({ "hash": hash })),
            StatusCode::OK,
        ),
        Err(err) => {
            warn!(error = %err, "refresh failed");
            warp::reply::with_status(
                warp::reply::json(&serde_json::json!({ "error": err.to_string() })),
                StatusCode::BAD_GATEWAY,
            )
        }
    };
    Ok(reply)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,gov_client=debug".into()),
        )
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => GovConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => GovConfig::default(),
    }
    .with_env_overrides()?;
    if args.account.is_some() {
        config.account = args.account.clone();
    }
    let registry = match &args.registry {
        Some(path) => ParameterRegistry::load(path)
            .with_context(|| format!("loading registry {}", path.display()))?,
        None => ParameterRegistry::builtin()?,
    };
    let snapshot = ChainSnapshot::load(&args.snapshot)?;
    info!(
        proposals = snapshot.proposals.len(),
        parameters = registry.len(),
        "loaded chain snapshot"
    );

    let provider = Arc::new(MemoryProvider::new(snapshot));
    let sync = Synchronizer::new(provider, &config);
    let _subscriptions: Vec<_> = QueryKey::ALL
        .into_iter()
        .filter(|key| *key != QueryKey::Balance || config.account.is_some())
        .map(|key| sync.subscribe(key))
        .collect();

    let app = Arc::new(App {
        sync,
        engine: StatusEngine::new(config.windows()),
        registry,
        max_change_size: config.max_parameter_change_size,
    });

    let proposals_route = warp::get()
        .and(warp::path("proposals"))
        .and(warp::path::end())
        .and(with_app(app.clone()))
        .map(|app: Arc<App>| warp::reply::json(&list_proposals(&app)));
    let stats_route = warp::get()
        .and(warp::path("stats"))
        .and(warp::path::end())
        .and(with_app(app.clone()))
        .map(|app: Arc<App>| warp::reply::json(&stats(&app)));
    let changes_route = warp::post()
        .and(warp::path("changes"))
        .and(warp::path::end())
        .and(warp::body::json())
        .and(with_app(app.clone()))
        .map(|rows: Vec<DraftRow>, app: Arc<App>| warp::reply::json(&review(&app, &rows)));
    let refresh_route = warp::post()
        .and(warp::path("refresh"))
        .and(warp::path::end())
        .and(warp::body::json())
        .and(with_app(app.clone()))
        .and_then(refresh);

    info!(listen = %args.listen, "serving governance dashboard");
    warp::serve(
        proposals_route
            .or(stats_route)
            .or(changes_route)
            .or(refresh_route),
    )
    .run(args.listen)
    .await;
    Ok(())
}
