//! PKCE verifier/challenge pairs and the anti-CSRF state value for one flow attempt.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, auth::TokenSecret};

/// Length of the generated `state` token.
pub const STATE_LEN: usize = 32;
/// Shortest verifier RFC 7636 allows.
pub const PKCE_VERIFIER_MIN_LEN: usize = 43;
/// Longest verifier RFC 7636 allows.
pub const PKCE_VERIFIER_MAX_LEN: usize = 128;

const UNRESERVED: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

/// Supported PKCE challenge methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PkceCodeChallengeMethod {
	/// SHA-256 based PKCE (RFC 7636 S256).
	S256,
}
impl PkceCodeChallengeMethod {
	/// Returns the RFC 7636 identifier for the challenge method.
	pub fn as_str(self) -> &'static str {
		match self {
			PkceCodeChallengeMethod::S256 => "S256",
		}
	}
}

/// PKCE verifier and its derived challenge.
///
/// The verifier is the single source of truth for the exchange: the pair is moved into the
/// token exchange, so the verifier sent there is byte-identical to the one whose challenge
/// went out with the authorization request.
#[derive(Clone)]
pub struct PkcePair {
	verifier: TokenSecret,
	challenge: String,
	method: PkceCodeChallengeMethod,
}
impl PkcePair {
	/// Generates a verifier of random length in `[43, 128]` and its S256 challenge.
	pub fn generate() -> Self {
		let mut rng = rand::rng();
		let len = rng.random_range(PKCE_VERIFIER_MIN_LEN..=PKCE_VERIFIER_MAX_LEN);
		let verifier: String =
			(0..len).map(|_| UNRESERVED[rng.random_range(0..UNRESERVED.len())] as char).collect();

		Self::from_verifier(verifier)
	}

	/// Rebuilds a pair from an existing verifier.
	pub fn from_verifier(verifier: impl Into<String>) -> Self {
		let verifier = verifier.into();
		let challenge = compute_pkce_challenge(&verifier);

		Self { verifier: TokenSecret::new(verifier), challenge, method: PkceCodeChallengeMethod::S256 }
	}

	/// Secret verifier sent to the token endpoint.
	pub fn verifier(&self) -> &TokenSecret {
		&self.verifier
	}

	/// Challenge sent with the authorization request.
	pub fn challenge(&self) -> &str {
		&self.challenge
	}

	/// Challenge method (always `S256`).
	pub fn method(&self) -> PkceCodeChallengeMethod {
		self.method
	}
}
impl Debug for PkcePair {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PkcePair")
			.field("verifier", &self.verifier)
			.field("challenge", &self.challenge)
			.field("method", &self.method)
			.finish()
	}
}

/// Anti-CSRF `state` correlating the authorization request with its callback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowState {
	/// Opaque state value.
	pub state: String,
	/// When the flow attempt started.
	pub created_at: OffsetDateTime,
}
impl FlowState {
	/// Generates a fresh 32-character alphanumeric state.
	pub fn generate() -> Self {
		Self { state: random_string(STATE_LEN), created_at: OffsetDateTime::now_utc() }
	}

	/// Returns true if `returned` matches the generated state.
	pub fn matches(&self, returned: &str) -> bool {
		returned == self.state
	}
}

/// Produces the PKCE pair and state for one flow attempt.
pub fn generate() -> (PkcePair, FlowState) {
	(PkcePair::generate(), FlowState::generate())
}

fn random_string(len: usize) -> String {
	rand::rng().sample_iter(Alphanumeric).take(len).map(char::from).collect()
}

fn compute_pkce_challenge(verifier: &str) -> String {
	let mut hasher = Sha256::new();
	hasher.update(verifier.as_bytes());
	let digest = hasher.finalize();
	URL_SAFE_NO_PAD.encode(digest)
}
