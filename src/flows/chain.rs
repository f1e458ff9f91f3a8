//! Redirect chain orchestrator.
//!
//! Starting from the authorization request, every redirect target is classified in a fixed
//! priority order and answered locally: challenges go to the admin API, opaque hops are fetched
//! without following redirects, and the first URL carrying `code` ends the walk. The chain is
//! bounded by [`MAX_REDIRECT_HOPS`] inspected targets.

// self
use crate::{
	_prelude::*,
	auth::{Identity, TokenSecret},
	config::BridgeConfig,
	flows::{AdminClient, Challenge, ChallengeKind, FlowState, PkcePair},
	http::{FlowCookies, ReqwestHttpClient},
	obs::{self, FlowOutcome, FlowSpan, FlowStage},
};

/// Maximum number of redirect targets inspected after the authorization request.
pub const MAX_REDIRECT_HOPS: usize = 10;

const SERVICE: &str = "authorization server";

/// Position of the orchestrator inside one flow attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChainState {
	/// Nothing sent yet.
	Init,
	/// Authorization request issued.
	Authorizing,
	/// Login challenge seen, acceptance in flight.
	LoginPending,
	/// Consent challenge seen, acceptance in flight.
	ConsentPending,
	/// Opaque hop fetched.
	OpaqueHop,
	/// Authorization code extracted.
	CodeFound,
	/// Chain finished successfully.
	Done,
	/// Chain aborted.
	Failed,
}

/// Authorization code extracted from the chain.
///
/// Single use: it is moved into the token exchange and never cloned.
#[derive(Debug, PartialEq, Eq)]
pub struct AuthorizationCode(TokenSecret);
impl AuthorizationCode {
	/// Wraps a raw code value.
	pub fn new(value: impl Into<String>) -> Self {
		Self(TokenSecret::new(value))
	}

	/// Returns the raw code. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		self.0.expose()
	}

	/// Consumes the wrapper.
	pub fn into_secret(self) -> TokenSecret {
		self.0
	}
}

/// Result of a successful chain walk.
#[derive(Debug)]
pub struct ChainOutcome {
	/// Authorization code for the token exchange.
	pub code: AuthorizationCode,
	/// Number of redirect targets inspected.
	pub hops: usize,
	/// States visited, in order.
	pub states: Vec<ChainState>,
}

/// Classification of one redirect target.
#[derive(Debug, PartialEq, Eq)]
pub enum Hop {
	/// Target carries the authorization code.
	Code(AuthorizationCode),
	/// Target carries a login or consent challenge.
	Challenge(Challenge),
	/// Target is the callback, but without a code.
	CallbackWithoutCode {
		/// OAuth `error` parameter, if any.
		error: Option<String>,
		/// OAuth `error_description` parameter, if any.
		description: Option<String>,
	},
	/// Any other http(s) target; fetched and its `Location` followed.
	Opaque,
}

/// Classifies `url` in priority order: code, login challenge, consent challenge, callback
/// without code, opaque.
///
/// A code delivered to the callback must echo the flow `state` when it carries one.
pub fn classify(url: &Url, config: &BridgeConfig, state: &FlowState) -> Result<Hop> {
	let param = |key: &str| {
		url.query_pairs().find(|(name, _)| name == key).map(|(_, value)| value.into_owned())
	};
	let is_callback = config.is_callback(url);

	if let Some(code) = param("code").filter(|code| !code.is_empty()) {
		if is_callback
			&& let Some(returned) = param("state")
			&& !state.matches(&returned)
		{
			return Err(Error::unexpected_response(
				"callback state does not match the flow state",
				None,
				None,
			));
		}

		return Ok(Hop::Code(AuthorizationCode::new(code)));
	}

	for kind in [ChallengeKind::Login, ChallengeKind::Consent] {
		if let Some(challenge) = Challenge::from_url(kind, url) {
			return Ok(Hop::Challenge(challenge));
		}
	}

	if is_callback {
		return Ok(Hop::CallbackWithoutCode {
			error: param("error"),
			description: param("error_description"),
		});
	}
	if !matches!(url.scheme(), "http" | "https") {
		return Err(Error::unexpected_response(
			format!("redirect to unsupported `{}` target", url.scheme()),
			None,
			None,
		));
	}

	Ok(Hop::Opaque)
}

/// Builds the authorization request URL for one flow attempt.
pub fn authorization_url(config: &BridgeConfig, pkce: &PkcePair, state: &FlowState) -> Url {
	let mut url = config.endpoints.authorization();

	url.query_pairs_mut()
		.append_pair("response_type", "code")
		.append_pair("client_id", &config.client_id)
		.append_pair("redirect_uri", config.redirect_uri.as_str())
		.append_pair("scope", &config.scope.normalized())
		.append_pair("state", &state.state)
		.append_pair("code_challenge", pkce.challenge())
		.append_pair("code_challenge_method", pkce.method().as_str());

	url
}

/// Walks the chain for one verified identity.
#[derive(Debug)]
pub struct RedirectChain<'a> {
	http: &'a ReqwestHttpClient,
	config: &'a BridgeConfig,
	admin: AdminClient<'a>,
	identity: &'a Identity,
	state: &'a FlowState,
	cookies: FlowCookies,
	states: Vec<ChainState>,
}
impl<'a> RedirectChain<'a> {
	/// Prepares a chain; `cookies` seeds the per-flow jar.
	pub fn new(
		http: &'a ReqwestHttpClient,
		config: &'a BridgeConfig,
		identity: &'a Identity,
		state: &'a FlowState,
		cookies: FlowCookies,
	) -> Self {
		Self {
			http,
			config,
			admin: AdminClient::new(http, config),
			identity,
			state,
			cookies,
			states: vec![ChainState::Init],
		}
	}

	/// Issues the authorization request and walks redirects until a code appears.
	pub async fn run(mut self, pkce: &PkcePair) -> Result<ChainOutcome> {
		const STAGE: FlowStage = FlowStage::Authorize;

		let span = FlowSpan::new(STAGE, "redirect_chain");

		obs::record_flow_outcome(STAGE, FlowOutcome::Attempt);

		let result = span.instrument(self.walk(pkce)).await;

		obs::record_result(STAGE, &result);

		result
	}

	async fn walk(&mut self, pkce: &PkcePair) -> Result<ChainOutcome> {
		match self.walk_inner(pkce).await {
			Ok((code, hops)) => {
				self.states.push(ChainState::Done);
				obs::record_redirect_hops(hops);

				Ok(ChainOutcome { code, hops, states: std::mem::take(&mut self.states) })
			},
			Err(e) => {
				self.states.push(ChainState::Failed);

				#[cfg(feature = "tracing")]
				tracing::debug!(states = ?self.states, "redirect chain aborted");

				Err(e)
			},
		}
	}

	async fn walk_inner(&mut self, pkce: &PkcePair) -> Result<(AuthorizationCode, usize)> {
		let start = authorization_url(self.config, pkce, self.state);

		self.states.push(ChainState::Authorizing);

		let mut next = self.follow(&start, "authorization endpoint").await?;

		for hop in 0..MAX_REDIRECT_HOPS {
			obs::redirect_hop(hop, &next);

			match classify(&next, self.config, self.state)? {
				Hop::Code(code) => {
					self.states.push(ChainState::CodeFound);

					return Ok((code, hop + 1));
				},
				Hop::Challenge(challenge) => match challenge.kind {
					ChallengeKind::Login => {
						self.states.push(ChainState::LoginPending);
						next = self.admin.accept_login(&challenge, self.identity).await?;
					},
					ChallengeKind::Consent => {
						self.states.push(ChainState::ConsentPending);
						next = self.admin.accept_consent(&challenge, self.identity).await?;
					},
				},
				Hop::CallbackWithoutCode { error, description } =>
					return Err(Error::CallbackWithoutCode { error, description }),
				Hop::Opaque => {
					self.states.push(ChainState::OpaqueHop);
					next = self.follow_opaque(&next).await?;
				},
			}
		}

		Err(Error::RedirectBoundExceeded {
			hops: MAX_REDIRECT_HOPS,
			last_url: obs::redacted_target(&next),
		})
	}

	async fn follow_opaque(&mut self, url: &Url) -> Result<Url> {
		const STAGE: FlowStage = FlowStage::RedirectHop;

		obs::record_flow_outcome(STAGE, FlowOutcome::Attempt);

		let result = self.follow(url, "redirect hop").await;

		obs::record_result(STAGE, &result);

		result
	}

	/// Fetches `url` and returns its resolved `Location`.
	async fn follow(&mut self, url: &Url, what: &str) -> Result<Url> {
		let hop = self.http.get_manual(SERVICE, url, &self.cookies).await?;

		if !hop.is_redirect() {
			return Err(Error::unexpected_response(
				format!("{what} answered without a redirect"),
				Some(hop.status.as_u16()),
				Some(&strip_query(url)),
			));
		}

		hop.location.ok_or_else(|| {
			Error::unexpected_response(
				format!("{what} redirected without a usable Location header"),
				Some(hop.status.as_u16()),
				Some(&strip_query(url)),
			)
		})
	}
}

fn strip_query(url: &Url) -> Url {
	let mut url = url.clone();

	url.set_query(None);
	url.set_fragment(None);

	url
}
