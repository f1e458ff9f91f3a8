// std
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenSecret},
	config::{BridgeConfig, BridgeEndpoints, ClientAuthMethod},
	error::ConfigError,
};

/// Session cookie set by the identity provider when none is configured.
pub const DEFAULT_SESSION_COOKIE: &str = "ory_kratos_session";
/// Scopes requested when none are configured.
pub const DEFAULT_SCOPES: [&str; 4] = ["openid", "offline_access", "email", "profile"];
/// Remember duration applied to accepted login/consent requests.
pub const DEFAULT_REMEMBER_FOR: Duration = Duration::hours(1);
/// ACR hint sent with login acceptance.
pub const DEFAULT_ACR: &str = "aal1";
/// Per-call HTTP timeout applied to upstream requests.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::seconds(10);
/// Socket address the HTTP surface binds to.
pub const DEFAULT_LISTEN_ADDR: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3000);

/// Builder for [`BridgeConfig`] values.
#[derive(Debug, Default)]
pub struct BridgeConfigBuilder {
	identity_provider: Option<Url>,
	authorization_server: Option<Url>,
	authorization_admin: Option<Url>,
	client_id: Option<String>,
	client_secret: Option<TokenSecret>,
	client_auth_method: ClientAuthMethod,
	redirect_uri: Option<Url>,
	scope: Option<ScopeSet>,
	session_cookie: Option<String>,
	remember_for: Option<Duration>,
	acr: Option<String>,
	http_timeout: Option<Duration>,
	secure_cookies: Option<bool>,
	listen_addr: Option<SocketAddr>,
}
impl BridgeConfigBuilder {
	/// Creates an empty builder.
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets the identity provider's public base URL.
	pub fn identity_provider(mut self, url: Url) -> Self {
		self.identity_provider = Some(url);

		self
	}

	/// Sets the authorization server's public base URL.
	pub fn authorization_server(mut self, url: Url) -> Self {
		self.authorization_server = Some(url);

		self
	}

	/// Sets the authorization server's admin base URL.
	pub fn authorization_admin(mut self, url: Url) -> Self {
		self.authorization_admin = Some(url);

		self
	}

	/// Sets the OAuth client identifier.
	pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
		self.client_id = Some(client_id.into());

		self
	}

	/// Sets the client secret used by confidential auth methods.
	pub fn client_secret(mut self, secret: impl Into<String>) -> Self {
		self.client_secret = Some(TokenSecret::new(secret));

		self
	}

	/// Overrides the client authentication method.
	pub fn client_auth_method(mut self, method: ClientAuthMethod) -> Self {
		self.client_auth_method = method;

		self
	}

	/// Sets the registered callback URI.
	pub fn redirect_uri(mut self, url: Url) -> Self {
		self.redirect_uri = Some(url);

		self
	}

	/// Overrides the requested scopes.
	pub fn scope(mut self, scope: ScopeSet) -> Self {
		self.scope = Some(scope);

		self
	}

	/// Overrides the identity provider session cookie name.
	pub fn session_cookie(mut self, name: impl Into<String>) -> Self {
		self.session_cookie = Some(name.into());

		self
	}

	/// Overrides the remember duration for accepted challenges.
	pub fn remember_for(mut self, duration: Duration) -> Self {
		self.remember_for = Some(duration);

		self
	}

	/// Overrides the ACR hint sent with login acceptance.
	pub fn acr(mut self, acr: impl Into<String>) -> Self {
		self.acr = Some(acr.into());

		self
	}

	/// Overrides the per-call HTTP timeout.
	pub fn http_timeout(mut self, timeout: Duration) -> Self {
		self.http_timeout = Some(timeout);

		self
	}

	/// Toggles the `Secure` cookie attribute.
	pub fn secure_cookies(mut self, secure: bool) -> Self {
		self.secure_cookies = Some(secure);

		self
	}

	/// Overrides the listener address.
	pub fn listen_addr(mut self, addr: SocketAddr) -> Self {
		self.listen_addr = Some(addr);

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<BridgeConfig, ConfigError> {
		let identity_provider =
			self.identity_provider.ok_or(ConfigError::Missing { name: "identity_provider" })?;
		let authorization_server = self
			.authorization_server
			.ok_or(ConfigError::Missing { name: "authorization_server" })?;
		let authorization_admin =
			self.authorization_admin.ok_or(ConfigError::Missing { name: "authorization_admin" })?;
		let redirect_uri = self.redirect_uri.ok_or(ConfigError::Missing { name: "redirect_uri" })?;
		let client_id = self
			.client_id
			.filter(|value| !value.trim().is_empty())
			.ok_or(ConfigError::Missing { name: "client_id" })?;
		let scope = match self.scope {
			Some(scope) => scope,
			None => ScopeSet::new(DEFAULT_SCOPES)?,
		};
		let config = BridgeConfig {
			endpoints: BridgeEndpoints {
				identity_provider,
				authorization_server,
				authorization_admin,
			},
			client_id,
			client_secret: self.client_secret,
			client_auth_method: self.client_auth_method,
			redirect_uri,
			scope,
			session_cookie: self
				.session_cookie
				.unwrap_or_else(|| DEFAULT_SESSION_COOKIE.to_owned()),
			remember_for: self.remember_for.unwrap_or(DEFAULT_REMEMBER_FOR),
			acr: self.acr.unwrap_or_else(|| DEFAULT_ACR.to_owned()),
			http_timeout: self.http_timeout.unwrap_or(DEFAULT_HTTP_TIMEOUT),
			secure_cookies: self.secure_cookies.unwrap_or(true),
			listen_addr: self.listen_addr.unwrap_or(DEFAULT_LISTEN_ADDR),
		};

		config.validate()?;

		Ok(config)
	}
}

impl BridgeConfig {
	fn validate(&self) -> Result<(), ConfigError> {
		validate_endpoint("identity_provider", &self.endpoints.identity_provider)?;
		validate_endpoint("authorization_server", &self.endpoints.authorization_server)?;
		validate_endpoint("authorization_admin", &self.endpoints.authorization_admin)?;
		validate_endpoint("redirect_uri", &self.redirect_uri)?;

		if !self.scope.requests_offline_access() {
			return Err(ConfigError::MissingOfflineScope);
		}
		if self.session_cookie.is_empty()
			|| self.session_cookie.contains(|c: char| c.is_whitespace() || c == ';' || c == '=')
		{
			return Err(ConfigError::InvalidValue {
				name: "session_cookie",
				reason: "cookie names cannot be empty or contain whitespace, `;`, or `=`".into(),
			});
		}
		if !self.remember_for.is_positive() {
			return Err(ConfigError::InvalidValue {
				name: "remember_for",
				reason: "must be positive".into(),
			});
		}
		if !self.http_timeout.is_positive() {
			return Err(ConfigError::InvalidValue {
				name: "http_timeout",
				reason: "must be positive".into(),
			});
		}
		if !matches!(self.client_auth_method, ClientAuthMethod::NoneWithPkce)
			&& self.client_secret.is_none()
		{
			return Err(ConfigError::Missing { name: "client_secret" });
		}

		Ok(())
	}
}

fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), ConfigError> {
	if matches!(url.scheme(), "http" | "https") && url.has_host() {
		Ok(())
	} else {
		Err(ConfigError::InvalidEndpoint { endpoint: name, url: url.to_string() })
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn url(value: &str) -> Url {
		Url::parse(value).expect("Failed to parse configuration URL fixture.")
	}

	fn seeded() -> BridgeConfigBuilder {
		BridgeConfig::builder()
			.identity_provider(url("http://kratos:4433"))
			.authorization_server(url("http://hydra:4444"))
			.authorization_admin(url("http://hydra:4445"))
			.client_id("dashboard")
			.redirect_uri(url("https://app.example.com/api/auth/callback"))
	}

	#[test]
	fn defaults_are_applied() {
		let config = seeded().build().expect("Seeded builder should produce a configuration.");

		assert_eq!(config.session_cookie, DEFAULT_SESSION_COOKIE);
		assert_eq!(config.scope.normalized(), "email offline_access openid profile");
		assert_eq!(config.remember_for, Duration::seconds(3600));
		assert_eq!(config.acr, "aal1");
		assert_eq!(config.client_auth_method, ClientAuthMethod::NoneWithPkce);
		assert!(config.secure_cookies);
	}

	#[test]
	fn missing_fields_are_reported() {
		let err = BridgeConfig::builder()
			.identity_provider(url("http://kratos:4433"))
			.build()
			.expect_err("Builder without authorization endpoints must fail.");

		assert!(matches!(err, ConfigError::Missing { name: "authorization_server" }));

		let err = seeded().client_id("  ").build().expect_err("Blank client id must fail.");

		assert!(matches!(err, ConfigError::Missing { name: "client_id" }));
	}

	#[test]
	fn scope_without_offline_access_is_rejected() {
		let err = seeded()
			.scope(ScopeSet::new(["openid", "email"]).expect("Scope fixture should be valid."))
			.build()
			.expect_err("Scopes without an offline scope must fail.");

		assert!(matches!(err, ConfigError::MissingOfflineScope));
	}

	#[test]
	fn non_http_endpoints_are_rejected() {
		let err = seeded()
			.authorization_admin(url("unix:/var/run/hydra.sock"))
			.build()
			.expect_err("Non-http admin endpoints must fail.");

		assert!(matches!(err, ConfigError::InvalidEndpoint { endpoint: "authorization_admin", .. }));
	}

	#[test]
	fn confidential_methods_require_a_secret() {
		let err = seeded()
			.client_auth_method(ClientAuthMethod::ClientSecretPost)
			.build()
			.expect_err("client_secret_post without a secret must fail.");

		assert!(matches!(err, ConfigError::Missing { name: "client_secret" }));
		assert!(
			seeded()
				.client_auth_method(ClientAuthMethod::ClientSecretPost)
				.client_secret("s3cr3t")
				.build()
				.is_ok()
		);
	}

	#[test]
	fn callback_matching_ignores_query() {
		let config = seeded().build().expect("Seeded builder should produce a configuration.");

		assert!(config.is_callback(&url("https://app.example.com/api/auth/callback?code=abc")));
		assert!(config.is_callback(&url("https://app.example.com:443/api/auth/callback")));
		assert!(!config.is_callback(&url("https://app.example.com/api/auth/other?code=abc")));
		assert!(!config.is_callback(&url("https://evil.example.com/api/auth/callback?code=abc")));
	}
}
