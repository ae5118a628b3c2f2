//! Worker bootstrap and event loop.

use microengine_gateway::{ArtifactClient, GatewayClient};
use tracing::{info, warn};

use crate::config::MicroengineConfig;
use crate::engine::{ClamdEngine, ScanEngine};
use crate::error::{MicroengineError, MicroengineResult};
use crate::events::{BountyEvent, Event};
use crate::scan::{BountyScanner, ScanAggregator};
use crate::scheduler::{BountyMarket, Scheduler};
use crate::signer::{load_key, TransactionSigner};
use crate::stream::{EventSource, EventStream, StreamError, TransactionBridge};
use crate::wait::until_ready;

pub const EVENTS_PATH: &str = "events/home";
pub const TRANSACTIONS_PATH: &str = "transactions";

/// The assembled worker.
#[derive(Debug, Clone)]
pub struct Microengine {
    config: MicroengineConfig,
}

impl Microengine {
    pub fn new(config: MicroengineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MicroengineConfig {
        &self.config
    }

    /// Start every collaborator and follow the gateway until a fatal error.
    pub async fn run(self) -> MicroengineResult<()> {
        let config = self.config;
        config.validate()?;
        let policy = config.ready_policy();

        if !config.startup_delay.is_zero() {
            info!(delay = ?config.startup_delay, "delaying startup");
            tokio::time::sleep(config.startup_delay).await;
        }
        info!("starting microengine");

        let signer = TransactionSigner::new(load_key(&config.keyfile, &config.keyfile_password).await?);
        let account = signer.address().to_checksum(None);
        info!(account = %account, "using account");
        let signer = signer.spawn();

        let engine = ClamdEngine::new(config.clamd_addr.clone());
        until_ready("clamd", policy, || engine.ping()).await?;
        match engine.version().await {
            Ok(version) => info!(addr = %config.clamd_addr, version = %version, "clamd ready"),
            Err(e) => warn!(addr = %config.clamd_addr, error = %e, "clamd ready, version unknown"),
        }

        let gateway_config = config.gateway.clone().with_account(account);
        let gateway = GatewayClient::new(gateway_config.clone())?;
        let artifacts = ArtifactClient::new(gateway_config.clone())?;

        let mut events = EventStream::connect(gateway_config.websocket_url(EVENTS_PATH), policy)
            .await
            .map_err(|StreamError::Unavailable { source, .. }| MicroengineError::Unavailable(source))?;
        let bridge = TransactionBridge::new(
            gateway_config.websocket_url(TRANSACTIONS_PATH),
            policy,
            signer.requests,
            signer.responses,
        );
        let mut bridge = tokio::spawn(bridge.run());

        let aggregator = ScanAggregator::new(artifacts, engine)
            .with_max_artifacts(config.max_artifacts)
            .with_max_artifact_size(config.max_artifact_size);
        let mut scheduler = Scheduler::new(aggregator, gateway)
            .with_bid(config.bid)
            .with_voting_window(config.voting_window);

        if config.backfill {
            backfill(&mut scheduler).await;
        }

        tokio::select! {
            result = follow(&mut scheduler, &mut events, config.backfill) => Err(result.into()),
            joined = &mut bridge => match joined {
                Ok(Ok(())) => Err(MicroengineError::TaskFailed {
                    task: "transaction signer",
                    message: "signer channel closed".into(),
                }),
                Ok(Err(e)) => Err(e.into()),
                Err(e) => Err(MicroengineError::TaskFailed {
                    task: "transaction bridge",
                    message: e.to_string(),
                }),
            },
        }
    }
}

/// Commit to bounties that were posted while we were away.
pub async fn backfill<S, M>(scheduler: &mut Scheduler<S, M>) -> usize
where
    S: BountyScanner,
    M: BountyMarket,
{
    let pending = match scheduler.market().pending_bounties().await {
        Ok(pending) => pending,
        Err(e) => {
            warn!(error = %e, "could not list pending bounties, skipping backfill");
            return 0;
        }
    };

    info!(count = pending.len(), "backfilling pending bounties");
    let count = pending.len();
    for bounty in pending {
        scheduler.on_bounty(BountyEvent::from(bounty)).await;
    }
    count
}

/// Feed events to the scheduler until the source fails for good.
///
/// With `resync`, every reconnect of the source is followed by a backfill
/// so bounties posted while the feed was down are still picked up.
pub async fn follow<S, M, E>(
    scheduler: &mut Scheduler<S, M>,
    events: &mut E,
    resync: bool,
) -> StreamError
where
    S: BountyScanner,
    M: BountyMarket,
    E: EventSource,
{
    loop {
        match events.next_event().await {
            Ok(Event::Reconnected) if resync => {
                backfill(scheduler).await;
            }
            Ok(event) => scheduler.handle(event).await,
            Err(e) => return e,
        }
    }
}
