//! First-party session verification against the identity provider.
//!
//! The inbound `Cookie` header is forwarded verbatim to `/sessions/whoami`; the bridge never
//! decodes or validates session cookies itself. Requests without the configured session cookie
//! are rejected before any network call.

// crates.io
use reqwest::{
	StatusCode,
	header::{ACCEPT, COOKIE},
};
// self
use crate::{
	_prelude::*,
	auth::{Identity, SubjectId},
	config::BridgeConfig,
	error::{TransientError, TransportError},
	http::{ReqwestHttpClient, parse_cookie_header},
	obs::{self, FlowOutcome, FlowSpan, FlowStage},
};

const SERVICE: &str = "identity provider";

#[derive(Debug, Deserialize)]
struct WhoamiResponse {
	#[serde(default = "default_active")]
	active: bool,
	identity: WhoamiIdentity,
}

#[derive(Debug, Deserialize)]
struct WhoamiIdentity {
	id: String,
	#[serde(default)]
	traits: serde_json::Value,
	#[serde(default)]
	verifiable_addresses: Vec<VerifiableAddress>,
}

#[derive(Debug, Deserialize)]
struct VerifiableAddress {
	value: String,
	#[serde(default)]
	verified: bool,
}

fn default_active() -> bool {
	true
}

/// Resolves the identity behind the inbound cookies.
#[derive(Clone, Copy, Debug)]
pub struct SessionVerifier<'a> {
	http: &'a ReqwestHttpClient,
	config: &'a BridgeConfig,
}
impl<'a> SessionVerifier<'a> {
	/// Creates a verifier bound to the configured identity provider.
	pub fn new(http: &'a ReqwestHttpClient, config: &'a BridgeConfig) -> Self {
		Self { http, config }
	}

	/// Verifies the session carried by `cookie_header` and returns its identity.
	///
	/// Fails with [`Error::Unauthenticated`] when the header or the session cookie is absent,
	/// when the identity provider answers 401/403, or when the session is inactive.
	pub async fn verify(&self, cookie_header: Option<&str>) -> Result<Identity> {
		const STAGE: FlowStage = FlowStage::Session;

		let span = FlowSpan::new(STAGE, "verify_session");

		obs::record_flow_outcome(STAGE, FlowOutcome::Attempt);

		let result = span.instrument(self.verify_inner(cookie_header)).await;

		obs::record_result(STAGE, &result);

		result
	}

	async fn verify_inner(&self, cookie_header: Option<&str>) -> Result<Identity> {
		let header = cookie_header
			.map(str::trim)
			.filter(|header| !header.is_empty())
			.ok_or_else(|| Error::unauthenticated("no cookies were sent"))?;

		if !parse_cookie_header(header).any(|(name, _)| name == self.config.session_cookie) {
			return Err(Error::unauthenticated(format!(
				"the `{}` cookie is missing",
				self.config.session_cookie
			)));
		}

		let response = self
			.http
			.get(self.config.endpoints.whoami())
			.header(COOKIE, header)
			.header(ACCEPT, "application/json")
			.send()
			.await
			.map_err(|e| TransportError::network(SERVICE, e))?;
		let status = response.status();

		match status {
			StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN =>
				return Err(Error::unauthenticated(format!(
					"identity provider rejected the session with HTTP {}",
					status.as_u16()
				))),
			s if !s.is_success() =>
				return Err(TransientError::Upstream {
					service: SERVICE,
					message: format!("session lookup returned HTTP {}", s.as_u16()),
					status: Some(s.as_u16()),
				}
				.into()),
			_ => (),
		}

		let body = response.bytes().await.map_err(|e| TransportError::network(SERVICE, e))?;

		parse_whoami(&body, status)
	}
}

fn parse_whoami(body: &[u8], status: StatusCode) -> Result<Identity> {
	let whoami: WhoamiResponse =
		serde_path_to_error::deserialize(&mut serde_json::Deserializer::from_slice(body)).map_err(
			|source| TransientError::ResponseParse {
				service: SERVICE,
				source,
				status: Some(status.as_u16()),
			},
		)?;

	if !whoami.active {
		return Err(Error::unauthenticated("the session is no longer active"));
	}

	let WhoamiIdentity { id, traits, verifiable_addresses } = whoami.identity;
	let subject = SubjectId::new(&id).map_err(|e| TransientError::Upstream {
		service: SERVICE,
		message: format!("identity id is unusable as a subject: {e}"),
		status: Some(status.as_u16()),
	})?;
	let identity = Identity::new(subject);
	let Some(email) = traits.get("email").and_then(serde_json::Value::as_str) else {
		return Ok(identity);
	};
	let verified = traits.get("email_verified").and_then(serde_json::Value::as_bool).unwrap_or_else(
		|| {
			verifiable_addresses
				.iter()
				.any(|address| address.verified && address.value.eq_ignore_ascii_case(email))
		},
	);

	Ok(identity.with_email(email, verified))
}
