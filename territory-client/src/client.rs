//! Game client facade
//!
//! Wires one ledger into a snapshot cache and an action orchestrator.
//!
//! ```ignore
//! let config = ClientConfig::from_dotenv()?;
//! let client = GameClient::connect(config).await?;
//! let polling = client.start_polling();
//!
//! client.actions().approve(Amount::MAX).await?;
//! client.actions().deposit(Amount::from_units(50)).await?;
//!
//! polling.stop().await;
//! ```

use crate::config::ClientConfig;
use crate::ledger::{Ledger, LedgerReader, ReadQuery, RpcLedger};
use crate::orchestrator::{ActionOrchestrator, ActionSettings};
use crate::snapshot::{Bindings, PollingHandle, QueryPlan, RefreshOutcome, Snapshot, SnapshotCache};
use crate::{ClientError, ClientResult};
use shared::combat::BattlePreview;
use shared::models::{Address, LocationId, LocationStatus};
use std::sync::Arc;
use tokio::sync::watch;

/// Connected game client
pub struct GameClient {
    config: ClientConfig,
    player: Address,
    bindings: Bindings,
    cache: SnapshotCache,
    actions: Arc<ActionOrchestrator>,
}

impl GameClient {
    /// Connect over JSON-RPC to `config.rpc_url`
    pub async fn connect(config: ClientConfig) -> ClientResult<Self> {
        let ledger = Arc::new(RpcLedger::new(&config)?);
        Self::connect_with(config, ledger).await
    }

    /// Connect through any ledger implementation.
    ///
    /// Checks the chain, resolves contract bindings and loads the first
    /// snapshot.
    pub async fn connect_with<L>(config: ClientConfig, ledger: Arc<L>) -> ClientResult<Self>
    where
        L: Ledger + 'static,
    {
        let player = config.require_player()?;

        let actual = ledger.chain_id().await?;
        if actual != config.chain_id {
            return Err(ClientError::WrongNetwork {
                expected: config.chain_id,
                actual,
            });
        }

        let bindings = resolve_bindings(&config, &*ledger).await?;
        tracing::info!(
            player = %player.short(),
            chain_id = actual,
            garrison = %bindings.garrison,
            unit_token = %bindings.unit_token,
            "Connected to ledger"
        );

        let reader: Arc<dyn LedgerReader> = ledger.clone();
        let cache = SnapshotCache::new(reader, QueryPlan::new(&config, bindings), config.request_timeout);
        let writer: Arc<dyn Ledger> = ledger;
        let actions = Arc::new(ActionOrchestrator::new(
            writer,
            cache.clone(),
            ActionSettings::new(&config, bindings),
        ));

        cache.refresh().await;

        Ok(Self {
            config,
            player,
            bindings,
            cache,
            actions,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn player(&self) -> Address {
        self.player
    }

    pub fn bindings(&self) -> Bindings {
        self.bindings
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.cache.current()
    }

    pub fn watch(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.cache.watch()
    }

    pub async fn refresh(&self) -> RefreshOutcome {
        self.cache.refresh().await
    }

    /// Poll at the configured interval until the handle is stopped
    pub fn start_polling(&self) -> PollingHandle {
        self.cache.subscribe(self.config.poll_interval)
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    pub fn actions(&self) -> Arc<ActionOrchestrator> {
        self.actions.clone()
    }

    pub fn location_status(&self, location: LocationId) -> Option<LocationStatus> {
        self.snapshot()
            .location(location)
            .map(|l| l.status_for(Some(&self.player)))
    }

    /// Predicted outcome of attacking `location` with `units`, from the
    /// current snapshot. `None` until the location's values are known.
    pub fn preview_attack(&self, location: LocationId, units: u64) -> Option<BattlePreview> {
        let snapshot = self.snapshot();
        let view = snapshot.location_view(location)?;
        let target = view.to_location()?;
        Some(BattlePreview::new(
            &target,
            target.status_for(Some(&self.player)),
            units,
            self.config.unit_power,
            view.is_stale(),
        ))
    }
}

async fn resolve_bindings(config: &ClientConfig, reader: &dyn LedgerReader) -> ClientResult<Bindings> {
    let mut queries = vec![ReadQuery::UnitToken {
        level: config.unit_level,
    }];
    if config.contracts.garrison.is_none() {
        queries.push(ReadQuery::GarrisonContract);
    }

    let mut results = reader.read_batch(&queries).await?.into_iter();
    let unit_token = next_address(&mut results, "unit token")?;
    let garrison = match config.contracts.garrison {
        Some(garrison) => garrison,
        None => next_address(&mut results, "garrison contract")?,
    };

    Ok(Bindings { garrison, unit_token })
}

fn next_address(
    results: &mut impl Iterator<Item = ClientResult<crate::ledger::ReadValue>>,
    what: &str,
) -> ClientResult<Address> {
    let value = results
        .next()
        .ok_or_else(|| ClientError::invalid_response(format!("no result for {}", what)))??;
    value
        .as_address()
        .and_then(Address::non_zero)
        .ok_or_else(|| ClientError::config(format!("{} is not deployed", what)))
}
