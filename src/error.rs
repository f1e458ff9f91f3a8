//! Bridge-level error types shared across the session verifier, the redirect chain, and the
//! token exchange.

// self
use crate::{_prelude::*, flows::ChallengeKind};

/// Bridge-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical bridge error exposed by public APIs.
///
/// Every variant aborts the current flow attempt. None of them are retried by the bridge; a
/// retry is a new flow with fresh PKCE and state values.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS, timeout).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// No first-party session cookie, or the identity provider rejected it.
	#[error("First-party session is missing or invalid: {reason}.")]
	Unauthenticated {
		/// Why the session was rejected.
		reason: String,
	},
	/// The authorization endpoint (or an intermediate hop) did not answer with a redirect.
	#[error("Unexpected response from authorization endpoint: {reason}.")]
	UnexpectedAuthResponse {
		/// Human-readable description of the unexpected response.
		reason: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// URL that produced the unexpected response.
		url: Option<String>,
	},
	/// Accepting (or fetching) a login/consent challenge failed on the admin API.
	///
	/// Remote state may already be partially advanced, so the call is never retried.
	#[error("Accepting the {kind} challenge failed: {message}.")]
	ChallengeAcceptFailed {
		/// Which challenge was being answered.
		kind: ChallengeKind,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Admin API error message or local failure summary.
		message: String,
	},
	/// The redirect chain did not yield an authorization code within the hop bound.
	#[error("Redirect chain exceeded {hops} hops without an authorization code (last: {last_url}).")]
	RedirectBoundExceeded {
		/// Number of hops inspected.
		hops: usize,
		/// Last redirect target seen before giving up.
		last_url: String,
	},
	/// The callback URI was reached without an authorization code.
	#[error("Callback was reached without an authorization code: {}.", .error.as_deref().unwrap_or("no error reported"))]
	CallbackWithoutCode {
		/// OAuth `error` parameter carried by the callback, if any.
		error: Option<String>,
		/// OAuth `error_description` parameter carried by the callback, if any.
		description: Option<String>,
	},
	/// The token endpoint did not return an access token.
	#[error("Token exchange failed: {reason}.")]
	TokenExchangeFailed {
		/// Token endpoint error or parse failure summary.
		reason: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}
impl Error {
	/// Returns a stable label suitable for response payloads, span fields, or metric labels.
	pub fn kind(&self) -> &'static str {
		match self {
			Error::Config(_) => "config",
			Error::Transient(_) => "transient",
			Error::Transport(_) => "transport",
			Error::Unauthenticated { .. } => "unauthenticated",
			Error::UnexpectedAuthResponse { .. } => "unexpected_auth_response",
			Error::ChallengeAcceptFailed { .. } => "challenge_accept_failed",
			Error::RedirectBoundExceeded { .. } => "redirect_bound_exceeded",
			Error::CallbackWithoutCode { .. } => "callback_without_code",
			Error::TokenExchangeFailed { .. } => "token_exchange_failed",
		}
	}

	/// HTTP status the bridge endpoint answers with for this error.
	pub fn status_code(&self) -> u16 {
		match self {
			Error::Unauthenticated { .. } => 401,
			_ => 500,
		}
	}

	pub(crate) fn unauthenticated(reason: impl Into<String>) -> Self {
		Self::Unauthenticated { reason: reason.into() }
	}

	pub(crate) fn unexpected_response(
		reason: impl Into<String>,
		status: Option<u16>,
		url: Option<&Url>,
	) -> Self {
		Self::UnexpectedAuthResponse {
			reason: reason.into(),
			status,
			url: url.map(|url| url.to_string()),
		}
	}
}

/// Configuration and validation failures raised by the bridge.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// A configured endpoint is not an absolute http(s) URL.
	#[error("The {endpoint} endpoint must be an absolute http(s) URL: {url}.")]
	InvalidEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// A configured URL cannot be parsed.
	#[error("The {name} value is not a valid URL.")]
	InvalidUrl {
		/// Setting name.
		name: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A required setting was not supplied.
	#[error("Missing required setting `{name}`.")]
	Missing {
		/// Setting name.
		name: &'static str,
	},
	/// A setting was supplied with an unusable value.
	#[error("Setting `{name}` is invalid: {reason}.")]
	InvalidValue {
		/// Setting name.
		name: &'static str,
		/// Why the value was rejected.
		reason: String,
	},
	/// Scope list cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Scope list lacks an offline scope, so no refresh token would ever be issued.
	#[error("Scope list must include `offline_access` or `offline`.")]
	MissingOfflineScope,
	/// The HTTP listener could not be bound.
	#[error("Failed to bind the HTTP listener.")]
	Listener(#[source] std::io::Error),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary upstream failure variants.
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Upstream service returned an unexpected but non-fatal response.
	#[error("{service} returned an unexpected response: {message}.")]
	Upstream {
		/// Which upstream was called.
		service: &'static str,
		/// Summary of the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Upstream responded with JSON that could not be parsed.
	#[error("{service} returned malformed JSON.")]
	ResponseParse {
		/// Which upstream was called.
		service: &'static str,
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling {service}.")]
	Network {
		/// Which upstream was called.
		service: &'static str,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred during transport.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(
		service: &'static str,
		src: impl 'static + Send + Sync + std::error::Error,
	) -> Self {
		Self::Network { service, source: Box::new(src) }
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn only_unauthenticated_maps_to_401() {
		assert_eq!(Error::unauthenticated("no cookie").status_code(), 401);
		assert_eq!(
			Error::RedirectBoundExceeded { hops: 10, last_url: "https://x".into() }.status_code(),
			500
		);
		assert_eq!(
			Error::TokenExchangeFailed { reason: "missing access_token".into(), status: None }
				.status_code(),
			500
		);
	}

	#[test]
	fn kinds_are_stable_labels() {
		let err = Error::ChallengeAcceptFailed {
			kind: ChallengeKind::Login,
			status: Some(500),
			message: "boom".into(),
		};

		assert_eq!(err.kind(), "challenge_accept_failed");
		assert_eq!(err.to_string(), "Accepting the login challenge failed: boom.");
	}
}
