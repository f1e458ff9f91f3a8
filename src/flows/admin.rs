//! Login and consent acceptance through the authorization server's admin API.
//!
//! Both calls consume remote state: a challenge accepted once cannot be accepted again, so
//! nothing here retries. Replies are modeled as [`AdminReply`] so a non-2xx status that
//! still carries a usable `redirect_to` (HTTP 410, "request already handled") is an explicit
//! case instead of an error payload inspected after the fact.

// crates.io
use reqwest::{RequestBuilder, StatusCode, header::ACCEPT};
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::Identity,
	config::BridgeConfig,
	error::TransportError,
	flows::{Challenge, ChallengeKind},
	http::ReqwestHttpClient,
	obs::{self, FlowOutcome, FlowSpan, FlowStage},
};

const SERVICE: &str = "authorization admin API";

/// `{ redirect_to }` body returned by accept calls.
#[derive(Clone, Debug, Deserialize)]
pub struct RedirectTo {
	/// Where the user agent continues.
	pub redirect_to: String,
}

/// Error body returned by the admin API.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AdminErrorBody {
	/// Error code.
	#[serde(default)]
	pub error: Option<String>,
	/// Human-readable description.
	#[serde(default)]
	pub error_description: Option<String>,
	/// Redirect target still attached to some failures.
	#[serde(default)]
	pub redirect_to: Option<String>,
}
impl AdminErrorBody {
	fn summary(&self) -> Option<String> {
		match (&self.error, &self.error_description) {
			(Some(error), Some(description)) => Some(format!("{error}: {description}")),
			(Some(error), None) => Some(error.clone()),
			(None, Some(description)) => Some(description.clone()),
			(None, None) => None,
		}
	}
}

/// Explicit outcome of one admin call.
#[derive(Clone, Debug)]
pub struct AdminReply<T> {
	/// Whether the status was 2xx.
	pub ok: bool,
	/// HTTP status code.
	pub status: u16,
	/// Body decoded as the success payload, if it decoded.
	pub payload: Option<T>,
	/// Body decoded as an error, for non-2xx replies.
	pub error: Option<AdminErrorBody>,
	/// Path of the field that failed to decode on a 2xx reply.
	pub parse_error: Option<String>,
}
impl<T> AdminReply<T>
where
	T: DeserializeOwned,
{
	fn from_body(status: StatusCode, body: &[u8]) -> Self {
		let ok = status.is_success();
		let decoded =
			serde_path_to_error::deserialize::<_, T>(&mut serde_json::Deserializer::from_slice(body));
		let (payload, parse_error) = match decoded {
			Ok(payload) => (Some(payload), None),
			Err(e) => (None, Some(e.to_string())),
		};
		let error = if ok { None } else { serde_json::from_slice::<AdminErrorBody>(body).ok() };

		Self { ok, status: status.as_u16(), payload, error, parse_error }
	}

	/// Redirect target the admin API attached to a handled request, if any.
	fn handled_redirect(&self) -> Option<&str> {
		(self.status == StatusCode::GONE.as_u16())
			.then(|| self.error.as_ref()?.redirect_to.as_deref())
			.flatten()
	}

	fn failure(&self, kind: ChallengeKind, action: &str) -> Error {
		let message = match (self.error.as_ref().and_then(AdminErrorBody::summary), &self.parse_error) {
			(Some(summary), _) => format!("{action} returned HTTP {}: {summary}", self.status),
			(None, Some(path)) if self.ok => format!("{action} returned a malformed body: {path}"),
			_ => format!("{action} returned HTTP {}", self.status),
		};

		Error::ChallengeAcceptFailed { kind, status: Some(self.status), message }
	}
}

/// Pending consent request as reported by the admin API.
#[derive(Clone, Debug, Deserialize)]
pub struct ConsentRequest {
	/// Scopes the client asked for.
	#[serde(default)]
	pub requested_scope: Vec<String>,
	/// Audiences the client asked for.
	#[serde(default)]
	pub requested_access_token_audience: Vec<String>,
	/// Client that initiated the request.
	#[serde(default)]
	pub client: Option<ConsentClient>,
	/// Subject the consent belongs to.
	#[serde(default)]
	pub subject: Option<String>,
}

/// Client summary embedded in a consent request.
#[derive(Clone, Debug, Deserialize)]
pub struct ConsentClient {
	/// OAuth client identifier.
	pub client_id: String,
}

/// Body sent to the login accept endpoint.
#[derive(Debug, Serialize)]
struct AcceptLogin<'a> {
	subject: &'a str,
	remember: bool,
	remember_for: i64,
	acr: &'a str,
	context: serde_json::Value,
}

/// Body sent to the consent accept endpoint.
#[derive(Debug, Serialize)]
struct AcceptConsent<'a> {
	grant_scope: &'a [String],
	grant_access_token_audience: &'a [String],
	session: ConsentSession,
	remember: bool,
	remember_for: i64,
}

#[derive(Debug, Serialize)]
struct ConsentSession {
	access_token: serde_json::Value,
	id_token: serde_json::Value,
}

/// Admin API client scoped to one flow invocation.
#[derive(Clone, Copy, Debug)]
pub struct AdminClient<'a> {
	http: &'a ReqwestHttpClient,
	config: &'a BridgeConfig,
}
impl<'a> AdminClient<'a> {
	/// Creates a client that calls the configured admin endpoint.
	pub fn new(http: &'a ReqwestHttpClient, config: &'a BridgeConfig) -> Self {
		Self { http, config }
	}

	/// Accepts a login challenge for the already-authenticated subject.
	///
	/// Returns the `redirect_to` target that continues the chain.
	pub async fn accept_login(&self, challenge: &Challenge, identity: &Identity) -> Result<Url> {
		const STAGE: FlowStage = FlowStage::LoginAccept;

		let span = FlowSpan::new(STAGE, "accept_login");

		obs::record_flow_outcome(STAGE, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let url = self.challenge_url(challenge, &["login", "accept"]);
				let body = AcceptLogin {
					subject: &identity.subject,
					remember: true,
					remember_for: self.config.remember_for.whole_seconds(),
					acr: &self.config.acr,
					context: identity.claims(),
				};
				let reply =
					self.send::<RedirectTo>(ChallengeKind::Login, self.http.put(url).json(&body)).await?;

				self.redirect_from(ChallengeKind::Login, "login accept", &reply)
			})
			.await;

		obs::record_result(STAGE, &result);

		result
	}

	/// Reads the pending consent request and grants exactly the requested scopes.
	///
	/// Returns the `redirect_to` target that continues the chain.
	pub async fn accept_consent(&self, challenge: &Challenge, identity: &Identity) -> Result<Url> {
		const STAGE: FlowStage = FlowStage::ConsentAccept;

		let span = FlowSpan::new(STAGE, "accept_consent");

		obs::record_flow_outcome(STAGE, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let kind = ChallengeKind::Consent;
				let url = self.challenge_url(challenge, &["consent"]);
				let reply = self.send::<ConsentRequest>(kind, self.http.get(url)).await?;

				if let Some(target) = reply.handled_redirect() {
					obs::handled_challenge(kind, reply.status);

					return parse_redirect(kind, target);
				}

				let request = match (&reply.payload, reply.ok) {
					(Some(request), true) => request,
					_ => return Err(reply.failure(kind, "consent request lookup")),
				};

				if let Some(client) = &request.client
					&& client.client_id != self.config.client_id
				{
					return Err(Error::ChallengeAcceptFailed {
						kind,
						status: None,
						message: format!(
							"consent request belongs to client `{}`, not `{}`",
							client.client_id, self.config.client_id
						),
					});
				}

				let claims = identity.claims();
				let body = AcceptConsent {
					grant_scope: &request.requested_scope,
					grant_access_token_audience: &request.requested_access_token_audience,
					session: ConsentSession { access_token: claims.clone(), id_token: claims },
					remember: true,
					remember_for: self.config.remember_for.whole_seconds(),
				};
				let url = self.challenge_url(challenge, &["consent", "accept"]);
				let reply = self.send::<RedirectTo>(kind, self.http.put(url).json(&body)).await?;

				self.redirect_from(kind, "consent accept", &reply)
			})
			.await;

		obs::record_result(STAGE, &result);

		result
	}

	fn challenge_url(&self, challenge: &Challenge, tail: &[&str]) -> Url {
		let mut url = self.config.endpoints.admin_requests(tail);

		url.query_pairs_mut().append_pair(challenge.kind.param(), &challenge.decoded);

		url
	}

	async fn send<T>(&self, kind: ChallengeKind, request: RequestBuilder) -> Result<AdminReply<T>>
	where
		T: DeserializeOwned,
	{
		let response = request
			.header(ACCEPT, "application/json")
			.send()
			.await
			.map_err(|e| accept_transport_failure(kind, e))?;
		let status = response.status();
		let body = response.bytes().await.map_err(|e| accept_transport_failure(kind, e))?;

		Ok(AdminReply::from_body(status, &body))
	}

	fn redirect_from(
		&self,
		kind: ChallengeKind,
		action: &str,
		reply: &AdminReply<RedirectTo>,
	) -> Result<Url> {
		if let Some(target) = reply.handled_redirect() {
			obs::handled_challenge(kind, reply.status);

			return parse_redirect(kind, target);
		}

		match (&reply.payload, reply.ok) {
			(Some(RedirectTo { redirect_to }), true) => parse_redirect(kind, redirect_to),
			_ => Err(reply.failure(kind, action)),
		}
	}
}

fn parse_redirect(kind: ChallengeKind, target: &str) -> Result<Url> {
	Url::parse(target).map_err(|e| Error::ChallengeAcceptFailed {
		kind,
		status: None,
		message: format!("redirect_to is not an absolute URL: {e}"),
	})
}

// Admin calls are not retried even on transport failure; the request may have landed.
fn accept_transport_failure(kind: ChallengeKind, err: ReqwestError) -> Error {
	let message = if err.is_timeout() {
		format!("{SERVICE} timed out")
	} else {
		format!("{SERVICE} unreachable: {}", TransportError::network(SERVICE, err))
	};

	Error::ChallengeAcceptFailed { kind, status: None, message }
}
