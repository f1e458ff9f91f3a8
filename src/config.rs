//! Bridge configuration: upstream endpoints, OAuth client registration, and cookie/session knobs.
//!
//! `BridgeConfig` is immutable once built. Use [`BridgeConfig::builder`] for programmatic
//! construction or [`BridgeConfig::from_args`] to read flags and `OAUTH2_BRIDGE_*` variables.

/// Command-line and environment loader.
pub mod args;
/// Builder API for assembling bridge configurations.
pub mod builder;

pub use args::*;
pub use builder::*;

// std
use std::net::SocketAddr;
// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenSecret},
	error::ConfigError,
};

/// Client authentication modes for token endpoint calls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
	/// HTTP Basic with `client_id`/`client_secret`.
	ClientSecretBasic,
	/// Form POST body parameters for `client_id`/`client_secret`.
	ClientSecretPost,
	#[default]
	/// Public clients that prove possession via PKCE only.
	NoneWithPkce,
}
impl ClientAuthMethod {
	/// Returns the configuration identifier for the method.
	pub fn as_str(self) -> &'static str {
		match self {
			ClientAuthMethod::ClientSecretBasic => "client_secret_basic",
			ClientAuthMethod::ClientSecretPost => "client_secret_post",
			ClientAuthMethod::NoneWithPkce => "none",
		}
	}
}
impl FromStr for ClientAuthMethod {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"client_secret_basic" | "basic" => Ok(Self::ClientSecretBasic),
			"client_secret_post" | "post" => Ok(Self::ClientSecretPost),
			"none" | "none_with_pkce" => Ok(Self::NoneWithPkce),
			other => Err(ConfigError::InvalidValue {
				name: "client_auth_method",
				reason: format!("unknown client auth method `{other}`"),
			}),
		}
	}
}

/// Base URLs of the three upstream services.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeEndpoints {
	/// Identity provider public API (serves `/sessions/whoami`).
	pub identity_provider: Url,
	/// Authorization server public API (serves `/oauth2/auth` and `/oauth2/token`).
	pub authorization_server: Url,
	/// Authorization server admin API (serves `/admin/oauth2/auth/requests/...`).
	pub authorization_admin: Url,
}
impl BridgeEndpoints {
	/// Session introspection endpoint on the identity provider.
	pub fn whoami(&self) -> Url {
		join_segments(&self.identity_provider, &["sessions", "whoami"])
	}

	/// Authorization endpoint on the authorization server.
	pub fn authorization(&self) -> Url {
		join_segments(&self.authorization_server, &["oauth2", "auth"])
	}

	/// Token endpoint on the authorization server.
	pub fn token(&self) -> Url {
		join_segments(&self.authorization_server, &["oauth2", "token"])
	}

	/// Admin endpoint under `/admin/oauth2/auth/requests/`.
	pub fn admin_requests(&self, tail: &[&str]) -> Url {
		let mut segments = vec!["admin", "oauth2", "auth", "requests"];

		segments.extend_from_slice(tail);

		join_segments(&self.authorization_admin, &segments)
	}
}

/// Immutable bridge configuration consumed by flows and the HTTP surface.
#[derive(Clone)]
pub struct BridgeConfig {
	/// Upstream endpoints.
	pub endpoints: BridgeEndpoints,
	/// OAuth 2.0 client identifier registered with the authorization server.
	pub client_id: String,
	/// Optional client secret for confidential authentication methods.
	pub client_secret: Option<TokenSecret>,
	/// Client authentication mechanism for the token endpoint.
	pub client_auth_method: ClientAuthMethod,
	/// Callback URI registered for the client.
	pub redirect_uri: Url,
	/// Scopes requested in every authorization request.
	pub scope: ScopeSet,
	/// Name of the identity provider's session cookie.
	pub session_cookie: String,
	/// How long the authorization server remembers accepted login/consent.
	pub remember_for: Duration,
	/// Authentication context class reference sent with login acceptance.
	pub acr: String,
	/// Per-call HTTP timeout for upstream requests.
	pub http_timeout: Duration,
	/// Whether issued cookies carry the `Secure` attribute.
	pub secure_cookies: bool,
	/// Socket address the HTTP surface binds to.
	pub listen_addr: SocketAddr,
}
impl BridgeConfig {
	/// Creates a new builder seeded with defaults.
	pub fn builder() -> BridgeConfigBuilder {
		BridgeConfigBuilder::new()
	}

	/// Returns true if `url` targets the configured callback (same origin and path).
	pub fn is_callback(&self, url: &Url) -> bool {
		url.scheme() == self.redirect_uri.scheme()
			&& url.host_str() == self.redirect_uri.host_str()
			&& url.port_or_known_default() == self.redirect_uri.port_or_known_default()
			&& url.path() == self.redirect_uri.path()
	}
}
impl Debug for BridgeConfig {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("BridgeConfig")
			.field("endpoints", &self.endpoints)
			.field("client_id", &self.client_id)
			.field("client_secret_set", &self.client_secret.is_some())
			.field("client_auth_method", &self.client_auth_method)
			.field("redirect_uri", &self.redirect_uri)
			.field("scope", &self.scope)
			.field("session_cookie", &self.session_cookie)
			.field("remember_for", &self.remember_for)
			.field("acr", &self.acr)
			.field("http_timeout", &self.http_timeout)
			.field("secure_cookies", &self.secure_cookies)
			.field("listen_addr", &self.listen_addr)
			.finish()
	}
}

fn join_segments(base: &Url, segments: &[&str]) -> Url {
	let mut url = base.clone();

	url.set_query(None);
	url.set_fragment(None);

	if let Ok(mut path) = url.path_segments_mut() {
		path.pop_if_empty().extend(segments);
	}

	url
}
