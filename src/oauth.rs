//! Token endpoint facade built on the `oauth2` crate.
//!
//! Only the `authorization_code` grant is spoken here. Client authentication follows
//! [`ClientAuthMethod`]: public clients send no secret and rely on PKCE alone.

pub use oauth2;

// crates.io
use oauth2::{
	AuthType, AuthUrl, AuthorizationCode as OAuthCode, ClientId, ClientSecret, EndpointNotSet,
	EndpointSet, HttpClientError, PkceCodeVerifier, RedirectUrl, RequestTokenError,
	TokenResponse, TokenUrl,
	basic::{BasicClient, BasicErrorResponse, BasicRequestTokenError},
};
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	config::{BridgeConfig, ClientAuthMethod},
	error::{ConfigError, TransportError},
	flows::{AuthorizationCode, PkcePair},
	http::{ReqwestHttpClient, ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
	obs::{self, FlowOutcome, FlowSpan, FlowStage},
};

/// Lifetime assumed when the token endpoint omits `expires_in`.
pub const DEFAULT_EXPIRES_IN: Duration = Duration::hours(1);

const SERVICE: &str = "token endpoint";

type ConfiguredBasicClient =
	BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Tokens issued by a successful exchange.
#[derive(Clone, Debug)]
pub struct TokenResult {
	/// Bearer access token.
	pub access_token: TokenSecret,
	/// Refresh token, present when an offline scope was granted.
	pub refresh_token: Option<TokenSecret>,
	/// Access token lifetime.
	pub expires_in: Duration,
}

/// Exchanges authorization codes at the token endpoint.
pub struct TokenExchanger<C = ReqwestHttpClient>
where
	C: ?Sized + TokenHttpClient,
{
	oauth_client: ConfiguredBasicClient,
	http_client: Arc<C>,
}
impl<C> TokenExchanger<C>
where
	C: ?Sized + TokenHttpClient<TransportError = ReqwestError>,
{
	/// Builds an exchanger for the configured client registration.
	pub fn from_config(config: &BridgeConfig, http_client: impl Into<Arc<C>>) -> Result<Self> {
		let auth_url = AuthUrl::new(config.endpoints.authorization().to_string())
			.map_err(|source| ConfigError::InvalidUrl { name: "authorization endpoint", source })?;
		let token_url = TokenUrl::new(config.endpoints.token().to_string())
			.map_err(|source| ConfigError::InvalidUrl { name: "token endpoint", source })?;
		let redirect_url = RedirectUrl::new(config.redirect_uri.to_string())
			.map_err(|source| ConfigError::InvalidUrl { name: "redirect_uri", source })?;
		let mut oauth_client = BasicClient::new(ClientId::new(config.client_id.clone()))
			.set_auth_uri(auth_url)
			.set_token_uri(token_url)
			.set_redirect_uri(redirect_url);

		if !matches!(config.client_auth_method, ClientAuthMethod::NoneWithPkce)
			&& let Some(secret) = &config.client_secret
		{
			oauth_client =
				oauth_client.set_client_secret(ClientSecret::new(secret.expose().to_owned()));
		}
		if matches!(config.client_auth_method, ClientAuthMethod::ClientSecretPost) {
			oauth_client = oauth_client.set_auth_type(AuthType::RequestBody);
		}

		Ok(Self { oauth_client, http_client: http_client.into() })
	}

	/// Redeems `code` with the verifier that produced the authorization request's challenge.
	pub async fn exchange(&self, code: AuthorizationCode, pkce: &PkcePair) -> Result<TokenResult> {
		const STAGE: FlowStage = FlowStage::TokenExchange;

		let span = FlowSpan::new(STAGE, "exchange_authorization_code");

		obs::record_flow_outcome(STAGE, FlowOutcome::Attempt);

		let result = span.instrument(self.exchange_inner(code, pkce)).await;

		obs::record_result(STAGE, &result);

		result
	}

	async fn exchange_inner(
		&self,
		code: AuthorizationCode,
		pkce: &PkcePair,
	) -> Result<TokenResult> {
		let meta = ResponseMetadataSlot::default();
		let instrumented = self.http_client.with_metadata(meta.clone());
		let request = self
			.oauth_client
			.exchange_code(OAuthCode::new(code.into_secret().expose().to_owned()))
			.set_pkce_verifier(PkceCodeVerifier::new(pkce.verifier().expose().to_owned()));
		let response = request
			.request_async(&instrumented)
			.await
			.map_err(|err| map_request_error(meta.take(), err))?;
		let access_token = response.access_token().secret();

		if access_token.is_empty() {
			return Err(Error::TokenExchangeFailed {
				reason: "response carried an empty access_token".into(),
				status: None,
			});
		}

		let expires_in = response
			.expires_in()
			.and_then(|lifetime| i64::try_from(lifetime.as_secs()).ok())
			.filter(|secs| *secs > 0)
			.map(Duration::seconds)
			.unwrap_or(DEFAULT_EXPIRES_IN);

		Ok(TokenResult {
			access_token: TokenSecret::new(access_token.to_owned()),
			refresh_token: response
				.refresh_token()
				.map(|token| TokenSecret::new(token.secret().to_owned())),
			expires_in,
		})
	}
}
impl<C> Debug for TokenExchanger<C>
where
	C: ?Sized + TokenHttpClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenExchanger")
			.field("client_id", self.oauth_client.client_id())
			.finish()
	}
}

fn map_request_error(
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<ReqwestError>>,
) -> Error {
	let status = meta.as_ref().and_then(|value| value.status);

	match err {
		RequestTokenError::ServerResponse(response) => map_server_response_error(response, status),
		RequestTokenError::Request(error) => map_transport_error(error, status),
		RequestTokenError::Parse(error, _body) => Error::TokenExchangeFailed {
			reason: format!("response could not be parsed at `{}`", error.path()),
			status,
		},
		RequestTokenError::Other(message) => Error::TokenExchangeFailed {
			reason: format!("unexpected response: {message}"),
			status,
		},
	}
}

fn map_server_response_error(response: BasicErrorResponse, status: Option<u16>) -> Error {
	let reason = match response.error_description() {
		Some(description) => format!("{}: {description}", response.error().as_ref()),
		None => response.error().as_ref().to_owned(),
	};

	Error::TokenExchangeFailed { reason, status }
}

fn map_transport_error(err: HttpClientError<ReqwestError>, status: Option<u16>) -> Error {
	match err {
		HttpClientError::Reqwest(inner) if inner.is_builder() => ConfigError::from(*inner).into(),
		HttpClientError::Reqwest(inner) => TransportError::network(SERVICE, *inner).into(),
		HttpClientError::Http(inner) => ConfigError::from(inner).into(),
		HttpClientError::Io(inner) => TransportError::Io(inner).into(),
		HttpClientError::Other(message) => Error::TokenExchangeFailed {
			reason: format!("HTTP client error: {message}"),
			status,
		},
		_ => Error::TokenExchangeFailed { reason: "HTTP client error".into(), status },
	}
}
