//! Casino service: owns the store and the ledger and opens game sessions.
//!
//! Opening a casino restores the persisted state, starts the persistence
//! worker and validates the slot variants. Every session it opens shares the
//! same [`Ledger`], so all games draw against one balance.

use crate::{
    config::{CasinoConfig, ConfigError, StoreBackend},
    db::Database,
    engine::{DriftWarning, EngineError, SlotVariant, audit_variants},
    game::{
        BlackjackSession, CrapsSession, GameKind, GameSession, RouletteSession, SessionError,
        SessionInfo, SlotSession, VideoPokerSession,
    },
    ledger::{BalanceMirror, BalanceSnapshot, Ledger, LedgerError, MirrorHandle},
    store::{FileStore, MemoryStore, PgStore, StateKey, StateStore, StoreError, load_state},
};
use std::sync::Arc;
use thiserror::Error;
use tokio::{sync::Mutex, task::JoinHandle};

/// Casino errors
#[derive(Debug, Error)]
pub enum CasinoError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Invalid default wager: {0}")]
    InvalidWager(u64),
}

/// Result type for casino operations
pub type CasinoResult<T> = Result<T, CasinoError>;

#[derive(Debug)]
struct Settings {
    default_wager: u64,
    last_active_game: Option<String>,
}

/// The running casino
pub struct Casino {
    config: CasinoConfig,
    store: Arc<dyn StateStore>,
    ledger: Ledger,
    /// Registration order: presets first, then loaded variants
    variants: Vec<Arc<SlotVariant>>,
    settings: Mutex<Settings>,
    worker: JoinHandle<()>,
}

impl Casino {
    /// Open the store selected by `config` and restore state from it
    ///
    /// # Errors
    ///
    /// * `CasinoError::Config` - the configuration is invalid
    /// * `CasinoError::Store` - the database could not be reached or prepared
    /// * `CasinoError::Engine` - a built-in variant failed validation
    pub async fn open(config: CasinoConfig) -> CasinoResult<Self> {
        config.validate()?;

        let store: Arc<dyn StateStore> = match config.backend {
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
            StoreBackend::File => Arc::new(FileStore::with_journal_limit(
                &config.state_file,
                config.history_limit,
            )),
            StoreBackend::Postgres => {
                let db = Database::new(&config.database)
                    .await
                    .map_err(StoreError::from)?;
                db.health_check().await.map_err(StoreError::from)?;
                let store = PgStore::new(Arc::new(db.pool().clone()));
                store.ensure_schema().await?;
                Arc::new(store)
            }
        };
        log::info!("Opening casino with the {} store", config.backend);

        Self::with_store(config, store).await
    }

    /// Restore state from an already constructed store
    pub async fn with_store(config: CasinoConfig, store: Arc<dyn StateStore>) -> CasinoResult<Self> {
        let state = load_state(store.as_ref(), config.persistence.write_timeout).await;
        log::info!(
            "Restored balance {} (default wager {}, last game {:?})",
            state.balance,
            state.default_wager,
            state.last_active_game
        );

        let opening = BalanceSnapshot {
            balance: state.balance,
            written_at: state.balance_written_at,
        };
        let (ledger, worker) = Ledger::open(store.clone(), opening, &config);
        let worker = tokio::spawn(worker.run());

        let variants = SlotVariant::presets(config.paytable_tolerance)?
            .into_iter()
            .map(Arc::new)
            .collect();

        let casino = Self {
            config,
            store,
            ledger,
            variants,
            settings: Mutex::new(Settings {
                default_wager: state.default_wager,
                last_active_game: state.last_active_game,
            }),
            worker,
        };
        casino.audit();
        Ok(casino)
    }

    pub fn config(&self) -> &CasinoConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn store(&self) -> Arc<dyn StateStore> {
        self.store.clone()
    }

    pub fn variant_names(&self) -> Vec<&str> {
        self.variants.iter().map(|v| v.name()).collect()
    }

    pub fn variant(&self, name: &str) -> Option<Arc<SlotVariant>> {
        self.variants.iter().find(|v| v.name() == name).cloned()
    }

    /// Register a variant loaded from JSON, replacing one of the same name
    pub fn load_variant(&mut self, json: &str) -> CasinoResult<Arc<SlotVariant>> {
        let variant = Arc::new(SlotVariant::from_json(json, self.config.paytable_tolerance)?);
        log::info!("Loaded variant {}", variant);
        match self.variants.iter_mut().find(|v| v.name() == variant.name()) {
            Some(existing) => *existing = variant.clone(),
            None => self.variants.push(variant.clone()),
        }
        Ok(variant)
    }

    /// Compare the registered variants in registration order; differences are
    /// logged as warnings
    pub fn audit(&self) -> Vec<DriftWarning> {
        let variants: Vec<SlotVariant> = self.variants.iter().map(|v| (**v).clone()).collect();
        audit_variants(&variants)
    }

    pub async fn default_wager(&self) -> u64 {
        self.settings.lock().await.default_wager
    }

    /// Change and persist the default wager
    ///
    /// # Errors
    ///
    /// * `CasinoError::InvalidWager` - zero
    pub async fn set_default_wager(&self, wager: u64) -> CasinoResult<()> {
        if wager == 0 {
            return Err(CasinoError::InvalidWager(wager));
        }
        self.settings.lock().await.default_wager = wager;
        self.ledger
            .save_setting(StateKey::DefaultWager, Some(wager.to_string()));
        Ok(())
    }

    pub async fn last_active_game(&self) -> Option<String> {
        self.settings.lock().await.last_active_game.clone()
    }

    /// Open a slot session for a registered variant
    pub async fn open_slots(&self, variant: &str, seed: Option<u64>) -> CasinoResult<SlotSession> {
        let variant = self
            .variant(variant)
            .ok_or_else(|| EngineError::UnknownVariant(variant.to_string()))?;
        let session = SlotSession::new(variant, self.ledger.clone(), seed);
        self.mark_active(&session).await;
        Ok(session)
    }

    /// Open a table game session
    ///
    /// # Errors
    ///
    /// * `CasinoError::Session` - `GameKind::Slots` needs a variant; use [`Casino::open_slots`]
    pub async fn open_game(&self, kind: GameKind, seed: Option<u64>) -> CasinoResult<GameSession> {
        let ledger = self.ledger.clone();
        let session: GameSession = match kind {
            GameKind::Slots => return Err(SessionError::InvalidAction.into()),
            GameKind::Blackjack => BlackjackSession::new(ledger, seed).into(),
            GameKind::Craps => CrapsSession::new(ledger, seed).into(),
            GameKind::Roulette => RouletteSession::new(ledger, seed).into(),
            GameKind::VideoPoker => VideoPokerSession::new(ledger, seed).into(),
        };
        self.mark_active(&session).await;
        Ok(session)
    }

    /// Create a display mirror of the balance; spawn its `run`
    pub async fn mirror(&self) -> (BalanceMirror, MirrorHandle) {
        BalanceMirror::new(
            self.ledger.clone(),
            self.store.clone(),
            self.config.reconcile_interval,
            self.config.persistence.write_timeout,
        )
        .await
    }

    /// Wait for pending writes
    pub async fn flush(&self) -> CasinoResult<()> {
        self.ledger.flush().await?;
        Ok(())
    }

    /// Flush and stop the persistence worker
    pub async fn shutdown(self) -> CasinoResult<()> {
        self.ledger.flush().await?;
        self.worker.abort();
        log::info!("Casino closed at balance {}", self.ledger.balance().await);
        Ok(())
    }

    async fn mark_active<S: SessionInfo>(&self, session: &S) {
        let game = session.game_id();
        let mut settings = self.settings.lock().await;
        if settings.last_active_game.as_deref() != Some(game.as_str()) {
            self.ledger
                .save_setting(StateKey::LastActiveGame, Some(game.clone()));
            settings.last_active_game = Some(game);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DEFAULT_BALANCE, DEFAULT_WAGER};

    async fn casino() -> (Casino, MemoryStore) {
        let store = MemoryStore::new();
        let casino = Casino::with_store(CasinoConfig::in_memory(), Arc::new(store.clone()))
            .await
            .unwrap();
        (casino, store)
    }

    #[tokio::test]
    async fn test_first_launch_seeds_defaults() {
        let (casino, store) = casino().await;
        assert_eq!(casino.ledger().balance().await, DEFAULT_BALANCE);
        assert_eq!(casino.default_wager().await, DEFAULT_WAGER);
        assert_eq!(casino.last_active_game().await, None);

        let balance = store.load(StateKey::Balance).await.unwrap().unwrap();
        assert_eq!(balance.value, "1000");
    }

    #[tokio::test]
    async fn test_settings_are_persisted() {
        let (casino, store) = casino().await;
        casino.set_default_wager(25).await.unwrap();
        let _slots = casino.open_slots("cyber", Some(1)).await.unwrap();
        casino.flush().await.unwrap();

        let wager = store.load(StateKey::DefaultWager).await.unwrap().unwrap();
        assert_eq!(wager.value, "25");
        let game = store.load(StateKey::LastActiveGame).await.unwrap().unwrap();
        assert_eq!(game.value, "slots/cyber");
        assert_eq!(
            casino.last_active_game().await.as_deref(),
            Some("slots/cyber")
        );

        assert!(matches!(
            casino.set_default_wager(0).await,
            Err(CasinoError::InvalidWager(0))
        ));
    }

    #[tokio::test]
    async fn test_open_sessions() {
        let (casino, _) = casino().await;
        assert!(matches!(
            casino.open_slots("atlantis", None).await,
            Err(CasinoError::Engine(EngineError::UnknownVariant(_)))
        ));

        let session = casino.open_game(GameKind::Craps, Some(4)).await.unwrap();
        assert_eq!(session.kind(), GameKind::Craps);
        assert_eq!(session.phase(), "come_out");
        assert!(session.is_idle());
        assert_eq!(casino.last_active_game().await.as_deref(), Some("craps"));
    }

    #[tokio::test]
    async fn test_load_variant_from_json() {
        let (mut casino, _) = casino().await;
        let mut definition = crate::engine::variants::classic();
        definition.name = "classic_copy".to_string();
        let json = serde_json::to_string(&definition).unwrap();

        casino.load_variant(&json).unwrap();
        assert_eq!(casino.variant_names().last(), Some(&"classic_copy"));
        assert!(casino.load_variant("{}").is_err());

        casino.load_variant(&json).unwrap();
        let names = casino.variant_names();
        assert_eq!(names.iter().filter(|&&n| n == "classic_copy").count(), 1);
    }

    #[tokio::test]
    async fn test_variants_keep_preset_order() {
        let (casino, _) = casino().await;
        assert_eq!(casino.variant_names(), SlotVariant::preset_names());

        // classic is registered first, so it is the reference for paylines.
        let warnings = casino.audit();
        assert_eq!(warnings[0].reference, "classic/line");
        assert_eq!(warnings[0].other, "advanced/paylines");
    }
}
