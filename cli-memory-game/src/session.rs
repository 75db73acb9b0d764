use anyhow::{anyhow, bail, Result};
use tracing::info;

use chessflip::{
    ActiveGame, GameId, GameOutcome, LedgerClient, PlayerClient, ProfileId, SettlementRecord,
};

/// Player state behind the REPL: at most one current game, which stays current
/// until its settlement completes or the player abandons it.
pub struct Session<L: LedgerClient + ?Sized> {
    client: PlayerClient<L>,
    game: Option<ActiveGame>,
    coins_spent: u64,
}

impl<L: LedgerClient + ?Sized> Session<L> {
    pub fn new(client: PlayerClient<L>) -> Self {
        Self {
            client,
            game: None,
            coins_spent: 0,
        }
    }

    pub fn client(&self) -> &PlayerClient<L> {
        &self.client
    }

    pub fn game(&self) -> Option<&ActiveGame> {
        self.game.as_ref()
    }

    pub async fn register(&mut self, username: &str) -> Result<ProfileId> {
        Ok(self.client.register(username).await?)
    }

    /// Pay for and deal a new game. Refused while the current game is in play
    /// or finished but not yet settled.
    pub async fn start(&mut self) -> Result<&ActiveGame> {
        if self.client.profile_id().is_none() {
            bail!("Register first: register <name>");
        }
        self.release_if_settled();

        if let Some(game) = &self.game {
            if game.machine.outcome().is_none() {
                bail!("Finish or forfeit the current game first.");
            }
            bail!(
                "Game {} is not settled yet. Type 'settle', 'retry' or 'abandon' first.",
                game.game_id
            );
        }

        self.coins_spent += 1;
        let coin_id = format!("coin-{}", self.coins_spent);
        let game = self.client.start_game(&coin_id).await?;
        Ok(self.game.insert(game))
    }

    pub fn forfeit(&self) -> Result<GameOutcome> {
        let Some(game) = &self.game else {
            bail!("No game in progress.");
        };
        if !game.machine.forfeit() {
            bail!("Can't forfeit right now.");
        }
        game.machine
            .outcome()
            .ok_or_else(|| anyhow!("Forfeited game has no outcome"))
    }

    /// Settle the current game. On failure the game stays current and its
    /// checkpoint is kept for `retry`.
    pub async fn settle(&mut self) -> Result<SettlementRecord> {
        let Some(game) = &self.game else {
            bail!("No finished game to settle.");
        };

        let record = self.client.finish_game(game).await?;
        self.release_if_settled();
        Ok(record)
    }

    /// Resume every settlement that still has a step to run
    pub async fn retry(&mut self) -> Result<Vec<SettlementRecord>> {
        let pending = self.client.coordinator().unsettled();
        if pending.is_empty() {
            bail!("Nothing to retry.");
        }

        let mut settled = Vec::with_capacity(pending.len());
        for record in pending {
            settled.push(self.client.retry_settlement(&record.game_id).await?);
        }
        self.release_if_settled();
        Ok(settled)
    }

    /// Drop the current game and any settlement it started. Nothing more is sent
    /// to the ledger for it.
    pub fn abandon(&mut self) -> Result<GameId> {
        let Some(game_id) = self.game.as_ref().map(|g| g.game_id.clone()) else {
            bail!("No game to abandon.");
        };

        if self.client.coordinator().record(&game_id).is_some() {
            self.client.coordinator().abandon(&game_id)?;
        }
        if let Some(game) = self.game.take() {
            game.abandon();
        }
        Ok(game_id)
    }

    fn release_if_settled(&mut self) {
        let settled = self.game.as_ref().is_some_and(|game| {
            self.client
                .coordinator()
                .record(&game.game_id)
                .is_some_and(|record| record.phase.is_complete())
        });

        if settled {
            if let Some(game) = self.game.take() {
                info!(game_id = %game.game_id, "Settled game released");
                game.machine.abandon();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chessflip::{
        ChessFlipConfig, InMemoryLedger, LedgerError, LedgerGameState, Outcome, PaymentRef,
        PlayerProfile, SettlementPhase,
    };
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// In-memory ledger whose claims can be made to fail
    #[derive(Default)]
    struct FlakyLedger {
        inner: InMemoryLedger,
        claims_down: AtomicBool,
    }

    #[async_trait]
    impl LedgerClient for FlakyLedger {
        async fn register_player(&self, username: &str) -> Result<ProfileId, LedgerError> {
            self.inner.register_player(username).await
        }

        async fn start_game(&self, payment: &PaymentRef) -> Result<GameId, LedgerError> {
            self.inner.start_game(payment).await
        }

        async fn submit_game_result(&self, game_id: &GameId, outcome: Outcome) -> Result<(), LedgerError> {
            self.inner.submit_game_result(game_id, outcome).await
        }

        async fn claim_points(&self, profile_id: &ProfileId, game_id: &GameId) -> Result<u64, LedgerError> {
            if self.claims_down.load(Ordering::SeqCst) {
                return Err(LedgerError::Network("fullnode unreachable".to_string()));
            }
            self.inner.claim_points(profile_id, game_id).await
        }

        async fn get_player_profile(&self, profile_id: &ProfileId) -> Result<Option<PlayerProfile>, LedgerError> {
            self.inner.get_player_profile(profile_id).await
        }

        async fn get_game_state(&self, game_id: &GameId) -> Result<Option<LedgerGameState>, LedgerError> {
            self.inner.get_game_state(game_id).await
        }
    }

    async fn session() -> (Arc<FlakyLedger>, Session<FlakyLedger>) {
        let ledger = Arc::new(FlakyLedger::default());
        let client = PlayerClient::new(Arc::clone(&ledger), ChessFlipConfig::default());
        let mut session = Session::new(client);
        session.register("stranded").await.unwrap();
        (ledger, session)
    }

    #[tokio::test]
    async fn test_failed_claim_blocks_start_until_retry() {
        let (ledger, mut session) = session().await;
        let first = session.start().await.unwrap().game_id.clone();
        session.forfeit().unwrap();

        ledger.claims_down.store(true, Ordering::SeqCst);
        assert!(session.settle().await.is_err());
        assert_eq!(session.game().map(|g| &g.game_id), Some(&first));

        // A new game would hide the half-settled one
        let err = session.start().await.unwrap_err();
        assert!(err.to_string().contains("not settled"));
        assert_eq!(ledger.inner.game_count(), 1);

        ledger.claims_down.store(false, Ordering::SeqCst);
        let settled = session.retry().await.unwrap();
        assert_eq!(settled.len(), 1);
        assert_eq!(settled[0].game_id, first);
        assert_eq!(settled[0].phase, SettlementPhase::PointsClaimed);
        assert!(session.game().is_none());

        let second = session.start().await.unwrap().game_id.clone();
        assert_ne!(first, second);
        let profile = session.client().profile().await.unwrap().unwrap();
        assert_eq!(profile.total_points, 2);
    }

    #[tokio::test]
    async fn test_finished_game_must_be_settled_before_next_start() {
        let (_ledger, mut session) = session().await;
        session.start().await.unwrap();
        assert!(session.start().await.is_err());

        session.forfeit().unwrap();
        assert!(session.start().await.is_err());

        session.settle().await.unwrap();
        assert!(session.game().is_none());
        assert!(session.start().await.is_ok());
    }

    #[tokio::test]
    async fn test_abandon_drops_stuck_settlement() {
        let (ledger, mut session) = session().await;
        let game_id = session.start().await.unwrap().game_id.clone();
        session.forfeit().unwrap();

        ledger.claims_down.store(true, Ordering::SeqCst);
        assert!(session.settle().await.is_err());

        assert_eq!(session.abandon().unwrap(), game_id);
        assert!(session.client().coordinator().record(&game_id).is_none());
        assert!(session.retry().await.is_err());
        assert!(session.start().await.is_ok());
    }
}
