//! Outbound cookie issuance.
//!
//! A [`CookieIssuer`] collects the cookies one request wants to set and renders them as
//! `Set-Cookie` headers at the end. Mutations are keyed by cookie name and the latest one wins,
//! so clearing a transient cookie that was set earlier in the same request yields a single
//! removal cookie.

// crates.io
use reqwest::header::{HeaderMap, HeaderValue, SET_COOKIE};
// self
use crate::{_prelude::*, flows::PkcePair, oauth::TokenResult};

/// Cookie holding the PKCE verifier while a flow is in flight.
pub const CODE_VERIFIER_COOKIE: &str = "oauth2_code_verifier";
/// Cookie holding the flow `state` while a flow is in flight.
pub const STATE_COOKIE: &str = "oauth2_state";
/// Cookie holding the issued access token.
pub const ACCESS_TOKEN_COOKIE: &str = "hydra_access_token";
/// Cookie holding the issued refresh token.
pub const REFRESH_TOKEN_COOKIE: &str = "hydra_refresh_token";

/// Lifetime of the transient flow cookies.
pub const TRANSIENT_MAX_AGE: Duration = Duration::minutes(10);
/// Lifetime of the refresh token cookie.
pub const REFRESH_MAX_AGE: Duration = Duration::days(30);

/// `SameSite` attribute values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SameSite {
	/// Sent only in first-party context.
	Strict,
	/// Also sent on top-level navigation.
	Lax,
}
impl SameSite {
	/// Attribute value.
	pub const fn as_str(self) -> &'static str {
		match self {
			SameSite::Strict => "Strict",
			SameSite::Lax => "Lax",
		}
	}
}

/// One pending `Set-Cookie`.
#[derive(Clone, PartialEq, Eq)]
pub struct IssuedCookie {
	/// Cookie name.
	pub name: &'static str,
	/// Cookie value; empty for removals.
	pub value: String,
	/// `Max-Age`; zero for removals.
	pub max_age: Duration,
	/// Whether scripts are denied access.
	pub http_only: bool,
	/// Whether the cookie is restricted to HTTPS.
	pub secure: bool,
	/// `SameSite` policy.
	pub same_site: SameSite,
}
impl IssuedCookie {
	/// Whether this cookie removes a previously set one.
	pub fn is_removal(&self) -> bool {
		self.value.is_empty() && self.max_age.is_zero()
	}

	/// Renders the `Set-Cookie` header value.
	pub fn header_value(&self) -> String {
		let mut cookie = format!(
			"{}={}; Max-Age={}; Path=/",
			self.name,
			self.value,
			self.max_age.whole_seconds()
		);

		if self.http_only {
			cookie.push_str("; HttpOnly");
		}
		if self.secure {
			cookie.push_str("; Secure");
		}

		cookie.push_str("; SameSite=");
		cookie.push_str(self.same_site.as_str());

		cookie
	}
}
impl Debug for IssuedCookie {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("IssuedCookie")
			.field("name", &self.name)
			.field("value", &if self.value.is_empty() { "" } else { "<redacted>" })
			.field("max_age", &self.max_age)
			.field("http_only", &self.http_only)
			.field("secure", &self.secure)
			.field("same_site", &self.same_site)
			.finish()
	}
}

/// Per-request collection of cookies to emit.
#[derive(Debug, Default)]
pub struct CookieIssuer {
	secure: bool,
	pending: Vec<IssuedCookie>,
}
impl CookieIssuer {
	/// Creates an empty issuer; `secure` controls the `Secure` attribute.
	pub fn new(secure: bool) -> Self {
		Self { secure, pending: Vec::new() }
	}

	/// Stores the PKCE verifier and flow state for the duration of the flow.
	pub fn set_transient(&mut self, pkce: &PkcePair, state: &str) {
		self.put(
			CODE_VERIFIER_COOKIE,
			pkce.verifier().expose(),
			TRANSIENT_MAX_AGE,
			SameSite::Strict,
		);
		self.put(STATE_COOKIE, state, TRANSIENT_MAX_AGE, SameSite::Strict);
	}

	/// Expires both transient cookies.
	pub fn clear_transient(&mut self) {
		self.put(CODE_VERIFIER_COOKIE, "", Duration::ZERO, SameSite::Strict);
		self.put(STATE_COOKIE, "", Duration::ZERO, SameSite::Strict);
	}

	/// Stores the issued tokens.
	pub fn set_tokens(&mut self, tokens: &TokenResult) {
		self.put(
			ACCESS_TOKEN_COOKIE,
			tokens.access_token.expose(),
			tokens.expires_in,
			SameSite::Lax,
		);

		if let Some(refresh) = &tokens.refresh_token {
			self.put(REFRESH_TOKEN_COOKIE, refresh.expose(), REFRESH_MAX_AGE, SameSite::Lax);
		}
	}

	/// Latest pending mutation for `name`.
	pub fn get(&self, name: &str) -> Option<&IssuedCookie> {
		self.pending.iter().find(|cookie| cookie.name == name)
	}

	/// Pending mutations in first-set order.
	pub fn pending(&self) -> &[IssuedCookie] {
		&self.pending
	}

	/// Appends one `Set-Cookie` header per pending mutation.
	pub fn apply(&self, headers: &mut HeaderMap) {
		for cookie in &self.pending {
			match HeaderValue::from_str(&cookie.header_value()) {
				Ok(value) => {
					headers.append(SET_COOKIE, value);
				},
				Err(_) => {
					#[cfg(feature = "tracing")]
					tracing::warn!(cookie = cookie.name, "cookie value is not a valid header, dropped");
				},
			}
		}
	}

	fn put(&mut self, name: &'static str, value: &str, max_age: Duration, same_site: SameSite) {
		let cookie = IssuedCookie {
			name,
			value: value.to_owned(),
			max_age,
			http_only: true,
			secure: self.secure,
			same_site,
		};

		match self.pending.iter_mut().find(|pending| pending.name == name) {
			Some(slot) => *slot = cookie,
			None => self.pending.push(cookie),
		}
	}
}
