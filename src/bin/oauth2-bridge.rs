//! Silent OAuth 2.0 bridge server configured from flags or `OAUTH2_BRIDGE_*` environment variables.

// crates.io
use oauth2_bridge::{config::BridgeConfig, flows::Bridge, obs, server};

#[tokio::main]
async fn main() -> oauth2_bridge::Result<()> {
	obs::init_tracing();

	let config = BridgeConfig::from_args()?;
	let bridge = Bridge::new(config)?;

	server::serve(bridge).await
}
