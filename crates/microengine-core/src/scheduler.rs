//! Commit-reveal scheduler.
//!
//! Owns the outstanding commitments. A bounty is scanned and committed to
//! once; the commitment is revealed once the arbiter voting window after
//! its expiration has fully passed, then forgotten whether or not the
//! reveal was accepted.

use std::collections::HashMap;

use async_trait::async_trait;
use microengine_gateway::{
    AssertionReceipt, AssertionRequest, GatewayClient, GatewayResult, PendingBounty,
    RevealRequest,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::events::{BlockEvent, BountyEvent, Event};
use crate::scan::BountyScanner;

/// Default arbiter voting window, in blocks.
pub const DEFAULT_VOTING_WINDOW: u64 = 25;

/// Default bid, in wei.
pub const DEFAULT_BID: u128 = 62_500_000_000_000_000;

/// Blocks between heartbeat log lines.
const BLOCK_LOG_INTERVAL: u64 = 20;

/// A posted assertion awaiting its reveal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commitment {
    pub guid: Uuid,
    pub index: String,
    pub expiration_block: u64,
    pub verdicts: Vec<bool>,
    pub metadata: String,
    pub nonce: String,
}

impl Commitment {
    /// First block at which the reveal may be posted.
    pub fn reveal_at(&self, voting_window: u64) -> u64 {
        self.expiration_block
            .saturating_add(voting_window)
            .saturating_add(1)
    }

    pub fn reveal_due(&self, block: u64, voting_window: u64) -> bool {
        block >= self.reveal_at(voting_window)
    }

    fn reveal_request(&self) -> RevealRequest {
        RevealRequest {
            nonce: self.nonce.clone(),
            verdicts: self.verdicts.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

/// The gateway operations the scheduler depends on.
#[async_trait]
pub trait BountyMarket: Send + Sync {
    async fn post_assertion(
        &self,
        guid: Uuid,
        assertion: &AssertionRequest,
    ) -> GatewayResult<AssertionReceipt>;

    async fn post_reveal(&self, guid: Uuid, index: &str, reveal: &RevealRequest)
        -> GatewayResult<()>;

    async fn pending_bounties(&self) -> GatewayResult<Vec<PendingBounty>>;
}

#[async_trait]
impl BountyMarket for GatewayClient {
    async fn post_assertion(
        &self,
        guid: Uuid,
        assertion: &AssertionRequest,
    ) -> GatewayResult<AssertionReceipt> {
        GatewayClient::post_assertion(self, guid, assertion).await
    }

    async fn post_reveal(
        &self,
        guid: Uuid,
        index: &str,
        reveal: &RevealRequest,
    ) -> GatewayResult<()> {
        GatewayClient::post_reveal(self, guid, index, reveal).await
    }

    async fn pending_bounties(&self) -> GatewayResult<Vec<PendingBounty>> {
        GatewayClient::pending_bounties(self).await
    }
}

/// What happened to a bounty event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BountyOutcome {
    Committed,
    Duplicate,
    NothingToAssert,
    Dropped,
}

/// Drives the commit-reveal lifecycle from gateway events.
pub struct Scheduler<S, M> {
    scanner: S,
    market: M,
    bid: u128,
    voting_window: u64,
    outstanding: HashMap<Uuid, Commitment>,
}

impl<S, M> Scheduler<S, M>
where
    S: BountyScanner,
    M: BountyMarket,
{
    pub fn new(scanner: S, market: M) -> Self {
        Self {
            scanner,
            market,
            bid: DEFAULT_BID,
            voting_window: DEFAULT_VOTING_WINDOW,
            outstanding: HashMap::new(),
        }
    }

    pub fn with_bid(mut self, bid: u128) -> Self {
        self.bid = bid;
        self
    }

    pub fn with_voting_window(mut self, voting_window: u64) -> Self {
        self.voting_window = voting_window;
        self
    }

    pub fn market(&self) -> &M {
        &self.market
    }

    /// Commitments awaiting reveal.
    pub fn outstanding(&self) -> impl Iterator<Item = &Commitment> {
        self.outstanding.values()
    }

    pub fn is_outstanding(&self, guid: &Uuid) -> bool {
        self.outstanding.contains_key(guid)
    }

    /// Dispatch one decoded event.
    pub async fn handle(&mut self, event: Event) {
        match event {
            Event::Bounty(bounty) => {
                self.on_bounty(bounty).await;
            }
            Event::Block(block) => {
                self.on_block(block).await;
            }
            Event::Malformed { reason } => {
                warn!(reason = %reason, "skipping malformed event");
            }
            Event::Unknown { reason } => {
                debug!(reason = %reason, "skipping event");
            }
            Event::Reconnected => {
                debug!(outstanding = self.outstanding.len(), "event feed reconnected");
            }
        }
    }

    /// Scan a bounty and commit an assertion for it.
    pub async fn on_bounty(&mut self, bounty: BountyEvent) -> BountyOutcome {
        let guid = bounty.guid;

        if self.outstanding.contains_key(&guid) {
            debug!(guid = %guid, "bounty already committed, ignoring");
            return BountyOutcome::Duplicate;
        }

        info!(
            guid = %guid,
            uri = %bounty.artifact_uri,
            expiration = bounty.expiration_block,
            "received bounty"
        );

        let report = match self.scanner.scan(&bounty.artifact_uri).await {
            Ok(report) => report,
            Err(e) => {
                warn!(guid = %guid, error = %e, "bounty rejected");
                return BountyOutcome::Dropped;
            }
        };

        if report.is_empty() {
            info!(guid = %guid, "no artifacts scanned, not asserting");
            return BountyOutcome::NothingToAssert;
        }

        let assertion = AssertionRequest::answering_all(report.verdicts.clone(), self.bid);
        let receipt = match self.market.post_assertion(guid, &assertion).await {
            Ok(receipt) => receipt,
            Err(e) => {
                error!(guid = %guid, error = %e, "failed to post assertion");
                return BountyOutcome::Dropped;
            }
        };

        info!(
            guid = %guid,
            index = %receipt.index,
            verdicts = ?report.verdicts,
            "assertion committed"
        );

        self.outstanding.insert(
            guid,
            Commitment {
                guid,
                index: receipt.index,
                expiration_block: bounty.expiration_block,
                verdicts: report.verdicts,
                metadata: report.metadata,
                nonce: receipt.nonce,
            },
        );

        BountyOutcome::Committed
    }

    /// Reveal every commitment whose voting window has elapsed. Returns the
    /// guids that were revealed (successfully or not).
    pub async fn on_block(&mut self, block: BlockEvent) -> Vec<Uuid> {
        let number = block.block_number;
        if number % BLOCK_LOG_INTERVAL == 0 {
            info!(block = number, outstanding = self.outstanding.len(), "block");
        }

        let window = self.voting_window;
        let (due, pending): (HashMap<_, _>, HashMap<_, _>) = std::mem::take(&mut self.outstanding)
            .into_iter()
            .partition(|(_, c)| c.reveal_due(number, window));
        self.outstanding = pending;

        let mut revealed = Vec::with_capacity(due.len());
        for commitment in due.into_values() {
            let guid = commitment.guid;
            match self
                .market
                .post_reveal(guid, &commitment.index, &commitment.reveal_request())
                .await
            {
                Ok(()) => info!(guid = %guid, index = %commitment.index, block = number, "revealed assertion"),
                Err(e) => error!(
                    guid = %guid,
                    index = %commitment.index,
                    block = number,
                    error = %e,
                    "failed to reveal assertion"
                ),
            }
            revealed.push(guid);
        }

        revealed
    }
}
