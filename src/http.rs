//! Transport primitives for the bridge.
//!
//! [`ReqwestHttpClient`] is the single outbound HTTP stack. It never follows redirects: the
//! redirect chain is driven hop by hop through [`ReqwestHttpClient::get_manual`], which reports
//! each hop's status and resolved `Location` and feeds `Set-Cookie` headers into a per-flow
//! [`FlowCookies`] jar. Token exchanges go through the `oauth2` crate via the
//! [`TokenHttpClient`] seam; handles call [`ResponseMetadataSlot::take`] before dispatching and
//! [`ResponseMetadataSlot::store`] once a status is known so error mapping sees consistent
//! metadata.

// std
use std::ops::Deref;
// crates.io
use oauth2::{AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse};
use reqwest::{
	StatusCode,
	cookie::{CookieStore, Jar},
	header::{COOKIE, HeaderMap, LOCATION, SET_COOKIE},
	redirect::Policy,
};
// self
use crate::{
	_prelude::*,
	config::BridgeConfig,
	error::{ConfigError, TransportError},
};

/// Abstraction over HTTP transports capable of executing OAuth token exchanges while
/// publishing response metadata to the bridge's error mapping.
///
/// Implementations must be `Send + Sync + 'static` so they can be shared behind `Arc`, and the
/// handles they return must own whatever state is required so their request futures remain
/// `Send` for the lifetime of the in-flight operation.
pub trait TokenHttpClient
where
	Self: 'static + Send + Sync,
{
	/// Concrete error emitted by the underlying transport.
	type TransportError: 'static + Send + Sync + StdError;

	/// [`AsyncHttpClient`] handle tied to a [`ResponseMetadataSlot`].
	type Handle: for<'c> AsyncHttpClient<
			'c,
			Error = HttpClientError<Self::TransportError>,
			Future: 'c + Send,
		>
		+ 'static
		+ Send
		+ Sync;

	/// Builds an [`AsyncHttpClient`] handle that records outcomes in `slot`.
	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle;
}

/// Captures metadata from the most recent HTTP response for downstream error mapping.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadata {
	/// HTTP status code returned by the endpoint, if available.
	pub status: Option<u16>,
}

/// Thread-safe slot for sharing [`ResponseMetadata`] between transport and error layers.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadataSlot(Arc<Mutex<Option<ResponseMetadata>>>);
impl ResponseMetadataSlot {
	/// Stores new metadata for the current request.
	pub fn store(&self, meta: ResponseMetadata) {
		*self.0.lock() = Some(meta);
	}

	/// Returns the captured metadata, if any, consuming it from the slot.
	pub fn take(&self) -> Option<ResponseMetadata> {
		self.0.lock().take()
	}
}

/// Outcome of a single non-following GET.
#[derive(Clone, Debug)]
pub struct RedirectHop {
	/// URL that was requested.
	pub url: Url,
	/// HTTP status returned by the hop.
	pub status: StatusCode,
	/// `Location` header resolved against [`RedirectHop::url`], if present and parseable.
	pub location: Option<Url>,
}
impl RedirectHop {
	/// Returns true for the redirect statuses the bridge follows (302, 303, 307, 308).
	pub fn is_redirect(&self) -> bool {
		matches!(
			self.status,
			StatusCode::FOUND
				| StatusCode::SEE_OTHER
				| StatusCode::TEMPORARY_REDIRECT
				| StatusCode::PERMANENT_REDIRECT
		)
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// Any custom [`ReqwestClient`] passed to [`ReqwestHttpClient::with_client`] must disable
/// redirect following; the redirect chain depends on observing every `Location` header.
#[derive(Clone, Debug)]
pub struct ReqwestHttpClient(pub ReqwestClient);
impl ReqwestHttpClient {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// Builds a client with redirects disabled and the configured per-call timeout.
	pub fn from_config(config: &BridgeConfig) -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder()
			.redirect(Policy::none())
			.timeout(config.http_timeout.unsigned_abs())
			.build()?;

		Ok(Self(client))
	}

	/// Issues a GET without following redirects, replaying and capturing flow cookies.
	pub async fn get_manual(
		&self,
		service: &'static str,
		url: &Url,
		cookies: &FlowCookies,
	) -> Result<RedirectHop, TransportError> {
		let mut request = self.0.get(url.clone());

		if let Some(header) = cookies.header_for(url) {
			request = request.header(COOKIE, header);
		}

		let response =
			request.send().await.map_err(|e| TransportError::network(service, e))?;
		let status = response.status();
		let headers = response.headers();

		cookies.absorb(url, headers);

		let location = headers
			.get(LOCATION)
			.and_then(|value| value.to_str().ok())
			.and_then(|value| url.join(value.trim()).ok());

		Ok(RedirectHop { url: url.clone(), status, location })
	}

	/// Builds an instrumented HTTP client that captures response metadata.
	pub(crate) fn instrumented(&self, slot: ResponseMetadataSlot) -> InstrumentedHandle {
		InstrumentedHandle::new(self.0.clone(), slot)
	}
}
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
impl TokenHttpClient for ReqwestHttpClient {
	type Handle = InstrumentedHandle;
	type TransportError = ReqwestError;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		self.instrumented(slot)
	}
}

/// Instrumented adapter that implements [`AsyncHttpClient`] for reqwest.
pub(crate) struct InstrumentedHttpClient {
	client: ReqwestClient,
	slot: ResponseMetadataSlot,
}

/// Handle returned by [`ReqwestHttpClient`] that satisfies [`TokenHttpClient`].
#[derive(Clone)]
pub struct InstrumentedHandle(Arc<InstrumentedHttpClient>);
impl InstrumentedHandle {
	fn new(client: ReqwestClient, slot: ResponseMetadataSlot) -> Self {
		Self(Arc::new(InstrumentedHttpClient { client, slot }))
	}
}
impl<'c> AsyncHttpClient<'c> for InstrumentedHandle {
	type Error = HttpClientError<ReqwestError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		let client = Arc::clone(&self.0);

		Box::pin(async move {
			client.slot.take();

			let response = client
				.client
				.execute(request.try_into().map_err(Box::new)?)
				.await
				.map_err(Box::new)?;
			let status = response.status();
			let headers = response.headers().to_owned();

			client.slot.store(ResponseMetadata { status: Some(status.as_u16()) });

			let mut response_new =
				HttpResponse::new(response.bytes().await.map_err(Box::new)?.to_vec());

			*response_new.status_mut() = status;
			*response_new.headers_mut() = headers;

			Ok(response_new)
		})
	}
}

/// Cookie jar scoped to one flow invocation.
///
/// The inbound first-party cookies go to every hop. Cookies the chain picks up from `Set-Cookie`
/// (the authorization server's login/consent CSRF cookies) live in a [`Jar`] and are only
/// replayed where their Domain/Path rules match. A captured cookie shadows an inbound one with
/// the same name.
#[derive(Default)]
pub struct FlowCookies {
	inbound: Vec<(String, String)>,
	captured: Jar,
}
impl FlowCookies {
	/// Seeds the jar from a `Cookie` request header (`a=1; b=2`).
	pub fn from_header(header: &str) -> Self {
		let mut inbound = Vec::<(String, String)>::new();

		for (name, value) in parse_cookie_header(header) {
			match inbound.iter_mut().find(|(key, _)| key == name) {
				Some(entry) => entry.1 = value.to_owned(),
				None => inbound.push((name.to_owned(), value.to_owned())),
			}
		}

		Self { inbound, captured: Jar::default() }
	}

	/// Stores every `Set-Cookie` header `url` answered with.
	pub fn absorb(&self, url: &Url, headers: &HeaderMap) {
		let mut set_cookies = headers.get_all(SET_COOKIE).iter();

		self.captured.set_cookies(&mut set_cookies, url);
	}

	/// Builds the `Cookie` header for a request to `url`.
	pub fn header_for(&self, url: &Url) -> Option<String> {
		let captured = self.captured.cookies(url);
		let captured = captured.as_ref().and_then(|value| value.to_str().ok()).unwrap_or_default();
		let shadowed = parse_cookie_header(captured).map(|(name, _)| name).collect::<Vec<_>>();
		let mut pairs = self
			.inbound
			.iter()
			.filter(|(name, _)| !shadowed.contains(&name.as_str()))
			.map(|(name, value)| format!("{name}={value}"))
			.collect::<Vec<_>>();

		if !captured.is_empty() {
			pairs.push(captured.to_owned());
		}

		(!pairs.is_empty()).then(|| pairs.join("; "))
	}
}
impl Debug for FlowCookies {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("FlowCookies")
			.field("inbound", &self.inbound.iter().map(|(name, _)| name).collect::<Vec<_>>())
			.finish_non_exhaustive()
	}
}

/// Splits a `Cookie` header into `(name, value)` pairs, skipping malformed entries.
pub fn parse_cookie_header(header: &str) -> impl Iterator<Item = (&str, &str)> {
	header.split(';').filter_map(|pair| {
		let (name, value) = pair.split_once('=')?;
		let name = name.trim();

		(!name.is_empty()).then_some((name, value.trim()))
	})
}
