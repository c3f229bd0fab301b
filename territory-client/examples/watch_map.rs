//! Watch the map over JSON-RPC
//!
//! ```bash
//! PLAYER_ADDRESS=0x... cargo run -p territory-client --example watch_map
//! ```

use territory_client::{ClientConfig, GameClient, logger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ClientConfig::from_dotenv()?;
    logger::init_from_env();

    let client = GameClient::connect(config).await?;
    let polling = client.start_polling();
    let mut updates = client.watch();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                for location in snapshot.known_locations() {
                    tracing::info!(
                        version = snapshot.version,
                        location = %location.id,
                        status = ?location.status_for(Some(&client.player())),
                        defender_power = location.defender_power(),
                        "Location"
                    );
                }
                if let Some(error) = &snapshot.last_error {
                    tracing::warn!(kind = error.kind.name(), "{}", error);
                }
            }
        }
    }

    polling.stop().await;
    Ok(())
}
