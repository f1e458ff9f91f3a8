/// Log format selector read from the environment.
pub const LOG_FORMAT_ENV: &str = "OAUTH2_BRIDGE_LOG_FORMAT";

/// Installs the process-wide tracing subscriber.
///
/// Filtering follows `RUST_LOG` (default `info`); set `OAUTH2_BRIDGE_LOG_FORMAT=json` for
/// newline-delimited JSON output. Calling this more than once is harmless.
pub fn init_tracing() {
	#[cfg(feature = "tracing")]
	{
		// crates.io
		use tracing_subscriber::EnvFilter;

		let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
		let json = std::env::var(LOG_FORMAT_ENV).is_ok_and(|v| v.eq_ignore_ascii_case("json"));
		let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
		let _ = if json { builder.json().try_init() } else { builder.try_init() };
	}
}
