//! Silent login orchestration.
//!
//! [`Bridge`] owns the configuration, the outbound HTTP client, and the token exchanger. One
//! [`Bridge::silent_login`] call verifies the first-party session, drives the Authorization
//! Code + PKCE redirect chain server-side, redeems the code, and records the resulting cookies
//! on the caller's [`CookieIssuer`].

pub mod admin;
pub mod chain;
pub mod challenge;
pub mod pkce;

pub use admin::*;
pub use chain::*;
pub use challenge::*;
pub use pkce::*;

// self
use crate::{
	_prelude::*,
	config::BridgeConfig,
	cookie::CookieIssuer,
	http::{FlowCookies, ReqwestHttpClient},
	oauth::{TokenExchanger, TokenResult},
	obs::{self, FlowOutcome, FlowSpan, FlowStage},
	session::SessionVerifier,
};

/// Coordinates silent logins against one identity provider and authorization server pair.
///
/// Cheap to clone; clones share the HTTP client and exchanger.
#[derive(Clone)]
pub struct Bridge {
	/// Immutable configuration.
	pub config: Arc<BridgeConfig>,
	/// Outbound HTTP client (redirects disabled).
	pub http_client: Arc<ReqwestHttpClient>,
	exchanger: Arc<TokenExchanger>,
}
impl Bridge {
	/// Creates a bridge with its own reqwest transport built from `config`.
	pub fn new(config: BridgeConfig) -> Result<Self> {
		let http_client = ReqwestHttpClient::from_config(&config)?;

		Self::try_with_http_client(config, http_client)
	}

	/// Creates a bridge that reuses the caller-provided transport.
	///
	/// The client must not follow redirects.
	pub fn try_with_http_client(
		config: BridgeConfig,
		http_client: impl Into<Arc<ReqwestHttpClient>>,
	) -> Result<Self> {
		let http_client = http_client.into();
		let exchanger = TokenExchanger::from_config(&config, Arc::clone(&http_client))?;

		Ok(Self { config: Arc::new(config), http_client, exchanger: Arc::new(exchanger) })
	}

	/// Infallible variant of [`Bridge::try_with_http_client`] for already-validated configs.
	///
	/// A validated [`BridgeConfig`] always yields parseable endpoint URLs, so construction
	/// cannot fail; a failure here indicates a broken invariant and panics.
	#[cfg(any(test, feature = "test"))]
	pub fn with_http_client(
		config: BridgeConfig,
		http_client: impl Into<Arc<ReqwestHttpClient>>,
	) -> Self {
		Self::try_with_http_client(config, http_client)
			.expect("Validated configuration should always produce a bridge.")
	}

	/// Runs one silent login for the request carrying `cookie_header`.
	///
	/// On success the token cookies are queued on `cookies`. Whenever the flow got past
	/// session verification, the transient PKCE/state cookies are queued for removal
	/// regardless of the outcome. Nothing is queued when the session is rejected.
	pub async fn silent_login(
		&self,
		cookie_header: Option<&str>,
		cookies: &mut CookieIssuer,
	) -> Result<TokenResult> {
		const STAGE: FlowStage = FlowStage::SilentLogin;

		let span = FlowSpan::new(STAGE, "silent_login");

		obs::record_flow_outcome(STAGE, FlowOutcome::Attempt);

		let result = span.instrument(self.silent_login_inner(cookie_header, cookies)).await;

		obs::record_result(STAGE, &result);

		result
	}

	async fn silent_login_inner(
		&self,
		cookie_header: Option<&str>,
		cookies: &mut CookieIssuer,
	) -> Result<TokenResult> {
		let identity =
			SessionVerifier::new(&self.http_client, &self.config).verify(cookie_header).await?;
		let (pkce, state) = pkce::generate();

		cookies.set_transient(&pkce, &state.state);

		let jar = cookie_header.map(FlowCookies::from_header).unwrap_or_default();
		let chain = RedirectChain::new(&self.http_client, &self.config, &identity, &state, jar);
		let result = match chain.run(&pkce).await {
			Ok(outcome) => self.exchanger.exchange(outcome.code, &pkce).await,
			Err(e) => Err(e),
		};

		cookies.clear_transient();

		let tokens = result?;

		cookies.set_tokens(&tokens);

		Ok(tokens)
	}
}
impl Debug for Bridge {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Bridge").field("config", &self.config).finish()
	}
}
impl TryFrom<BridgeConfig> for Bridge {
	type Error = Error;

	fn try_from(config: BridgeConfig) -> Result<Self> {
		Self::new(config)
	}
}
