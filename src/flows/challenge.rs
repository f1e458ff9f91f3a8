//! Login/consent challenges and the bounded multi-pass decoder that canonicalizes them.
//!
//! Every hop that re-serializes a URL may escape an already-escaped challenge again, so the
//! raw query value can arrive percent-encoded zero, one, or several times. [`decode`] peels
//! layers until the value stops changing, holds no `%`, or [`MAX_DECODE_PASSES`] is reached.

// self
use crate::_prelude::*;

/// Upper bound on decode passes applied to one token.
pub const MAX_DECODE_PASSES: usize = 5;

/// Which admin challenge a redirect carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeKind {
	/// "Who is authenticating", answered by accepting the login request.
	Login,
	/// "Which scopes are granted", answered by accepting the consent request.
	Consent,
}
impl ChallengeKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			ChallengeKind::Login => "login",
			ChallengeKind::Consent => "consent",
		}
	}

	/// Query parameter carrying the challenge.
	pub const fn param(self) -> &'static str {
		match self {
			ChallengeKind::Login => "login_challenge",
			ChallengeKind::Consent => "consent_challenge",
		}
	}
}
impl Display for ChallengeKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Challenge extracted from one redirect hop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Challenge {
	/// Challenge kind.
	pub kind: ChallengeKind,
	/// Value exactly as it appeared in the query string.
	pub raw: String,
	/// Canonical, decoded value sent to the admin API.
	pub decoded: String,
}
impl Challenge {
	/// Builds a challenge from a raw query value.
	pub fn new(kind: ChallengeKind, raw: impl Into<String>) -> Self {
		let raw = raw.into();
		let decoded = decode(&raw);

		Self { kind, raw, decoded }
	}

	/// Extracts the `kind` challenge from `url`, if its query carries a non-empty one.
	pub fn from_url(kind: ChallengeKind, url: &Url) -> Option<Self> {
		raw_query_value(url, kind.param()).filter(|raw| !raw.is_empty()).map(|raw| Self::new(kind, raw))
	}
}

/// Returns the undecoded value of `key` in `url`'s query.
///
/// [`Url::query_pairs`] decodes once, which would hide how many layers the value carried;
/// the raw value is handed to [`decode`] instead.
pub fn raw_query_value<'u>(url: &'u Url, key: &str) -> Option<&'u str> {
	url.query()?.split('&').find_map(|pair| match pair.split_once('=') {
		Some((name, value)) if name == key => Some(value),
		None if pair == key => Some(""),
		_ => None,
	})
}

/// Decodes `raw` into its canonical form.
///
/// Never fails: a malformed escape stops decoding and yields the last good value.
pub fn decode(raw: &str) -> String {
	decode_with_passes(raw).0
}

/// Decodes `raw`, also reporting how many passes changed the value.
pub fn decode_with_passes(raw: &str) -> (String, usize) {
	let mut current = raw.to_owned();
	let mut passes = 0;

	while passes < MAX_DECODE_PASSES && current.contains('%') {
		let Ok(next) = urlencoding::decode(&current) else { break };

		if next == current {
			break;
		}

		current = next.into_owned();
		passes += 1;
	}

	(current, passes)
}
