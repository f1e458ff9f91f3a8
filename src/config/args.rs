//! Command-line and `OAUTH2_BRIDGE_*` environment settings.
//!
//! Every flag falls back to its environment variable; anything left unset keeps the
//! [`BridgeConfigBuilder`] default.

// std
use std::net::SocketAddr;
// crates.io
use clap::{Parser, builder::BoolishValueParser};
// self
use crate::{
	_prelude::*,
	auth::ScopeSet,
	config::{BridgeConfig, BridgeConfigBuilder, ClientAuthMethod},
	error::ConfigError,
};

/// Settings accepted by the `oauth2-bridge` binary.
#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct BridgeArgs {
	/// Identity provider public URL (serves `/sessions/whoami`).
	#[arg(long, env = "OAUTH2_BRIDGE_IDP_URL")]
	pub idp_url: Url,

	/// Authorization server public URL.
	#[arg(long, env = "OAUTH2_BRIDGE_PUBLIC_URL")]
	pub public_url: Url,

	/// Authorization server admin URL.
	#[arg(long, env = "OAUTH2_BRIDGE_ADMIN_URL")]
	pub admin_url: Url,

	/// OAuth client identifier.
	#[arg(long, env = "OAUTH2_BRIDGE_CLIENT_ID")]
	pub client_id: String,

	/// OAuth client secret for confidential clients.
	#[arg(long, env = "OAUTH2_BRIDGE_CLIENT_SECRET", hide_env_values = true)]
	pub client_secret: Option<String>,

	/// Token endpoint authentication: `none`, `client_secret_post` or `client_secret_basic`.
	#[arg(long, env = "OAUTH2_BRIDGE_CLIENT_AUTH")]
	pub client_auth: Option<ClientAuthMethod>,

	/// Callback URI registered for the client.
	#[arg(long, env = "OAUTH2_BRIDGE_REDIRECT_URI")]
	pub redirect_uri: Url,

	/// Space-delimited scope list; must include an offline scope.
	#[arg(long, env = "OAUTH2_BRIDGE_SCOPE")]
	pub scope: Option<ScopeSet>,

	/// Identity provider session cookie name.
	#[arg(long, env = "OAUTH2_BRIDGE_SESSION_COOKIE")]
	pub session_cookie: Option<String>,

	/// Seconds the authorization server remembers an accepted login or consent.
	#[arg(long, env = "OAUTH2_BRIDGE_REMEMBER_FOR", value_parser = clap::value_parser!(i64).range(0..))]
	pub remember_for: Option<i64>,

	/// ACR value sent with login acceptance.
	#[arg(long, env = "OAUTH2_BRIDGE_ACR")]
	pub acr: Option<String>,

	/// Per-call upstream HTTP timeout in seconds.
	#[arg(long, env = "OAUTH2_BRIDGE_HTTP_TIMEOUT", value_parser = clap::value_parser!(i64).range(1..))]
	pub http_timeout: Option<i64>,

	/// Whether issued cookies carry the `Secure` attribute.
	#[arg(long, env = "OAUTH2_BRIDGE_SECURE_COOKIES", value_parser = BoolishValueParser::new())]
	pub secure_cookies: Option<bool>,

	/// Socket address the HTTP surface binds to.
	#[arg(long, env = "OAUTH2_BRIDGE_LISTEN")]
	pub listen: Option<SocketAddr>,
}
impl BridgeArgs {
	/// Validates the settings into a [`BridgeConfig`].
	pub fn into_config(self) -> Result<BridgeConfig, ConfigError> {
		let mut builder = BridgeConfigBuilder::new()
			.identity_provider(self.idp_url)
			.authorization_server(self.public_url)
			.authorization_admin(self.admin_url)
			.client_id(self.client_id)
			.redirect_uri(self.redirect_uri);

		if let Some(secret) = self.client_secret {
			builder = builder.client_secret(secret);
		}
		if let Some(method) = self.client_auth {
			builder = builder.client_auth_method(method);
		}
		if let Some(scope) = self.scope {
			builder = builder.scope(scope);
		}
		if let Some(cookie) = self.session_cookie {
			builder = builder.session_cookie(cookie);
		}
		if let Some(secs) = self.remember_for {
			builder = builder.remember_for(Duration::seconds(secs));
		}
		if let Some(acr) = self.acr {
			builder = builder.acr(acr);
		}
		if let Some(secs) = self.http_timeout {
			builder = builder.http_timeout(Duration::seconds(secs));
		}
		if let Some(secure) = self.secure_cookies {
			builder = builder.secure_cookies(secure);
		}
		if let Some(addr) = self.listen {
			builder = builder.listen_addr(addr);
		}

		builder.build()
	}
}

impl BridgeConfig {
	/// Parses the process arguments and environment, exiting with usage on malformed input.
	pub fn from_args() -> Result<Self, ConfigError> {
		BridgeArgs::parse().into_config()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use clap::{CommandFactory, error::ErrorKind};
	// self
	use super::*;

	const REQUIRED: [&str; 11] = [
		"oauth2-bridge",
		"--idp-url",
		"http://kratos:4433",
		"--public-url",
		"http://hydra:4444",
		"--admin-url",
		"http://hydra:4445",
		"--client-id",
		"dashboard",
		"--redirect-uri",
		"http://localhost:3000/api/auth/callback",
	];

	fn parse(extra: &[&str]) -> Result<BridgeArgs, clap::Error> {
		BridgeArgs::try_parse_from(REQUIRED.iter().chain(extra))
	}

	#[test]
	fn command_definition_is_consistent() {
		BridgeArgs::command().debug_assert();
	}

	#[test]
	fn loads_required_and_optional_values() {
		let config = parse(&[
			"--scope",
			"openid offline email",
			"--remember-for",
			"7200",
			"--secure-cookies",
			"off",
			"--listen",
			"0.0.0.0:8080",
			"--client-auth",
			"client_secret_post",
			"--client-secret",
			"s3cr3t",
		])
		.expect("Arguments should parse.")
		.into_config()
		.expect("Configuration should build.");

		assert_eq!(config.client_id, "dashboard");
		assert_eq!(config.scope.normalized(), "email offline openid");
		assert_eq!(config.remember_for, Duration::seconds(7200));
		assert!(!config.secure_cookies);
		assert_eq!(config.listen_addr.port(), 8080);
		assert_eq!(config.client_auth_method, ClientAuthMethod::ClientSecretPost);
		assert_eq!(config.client_secret.as_ref().map(|s| s.expose()), Some("s3cr3t"));
	}

	#[test]
	fn missing_and_malformed_values_fail() {
		let err = BridgeArgs::try_parse_from(&REQUIRED[..9])
			.expect_err("Missing redirect URI must fail.");

		assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);

		for extra in [["--http-timeout", "soon"], ["--http-timeout", "0"], ["--client-auth", "jwt"]] {
			let err = parse(&extra).expect_err("Malformed values must fail.");

			assert_eq!(err.kind(), ErrorKind::ValueValidation, "{extra:?}");
		}
	}

	#[test]
	fn scopes_without_offline_access_are_rejected() {
		let err = parse(&["--scope", "openid email"])
			.expect("Arguments should parse.")
			.into_config()
			.expect_err("A scope list without an offline scope must fail.");

		assert!(matches!(err, ConfigError::MissingOfflineScope));
	}
}
