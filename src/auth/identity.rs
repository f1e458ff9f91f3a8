//! Read-only projection of the first-party session.

// std
use std::{borrow::Borrow, ops::Deref};
// self
use crate::_prelude::*;

const SUBJECT_MAX_LEN: usize = 255;

/// Error returned when subject identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty.
	#[error("Subject identifier cannot be empty.")]
	Empty,
	/// The identifier contains whitespace characters.
	#[error("Subject identifier contains whitespace.")]
	ContainsWhitespace,
	/// The identifier exceeded the allowed character count.
	#[error("Subject identifier exceeds {max} characters.")]
	TooLong {
		/// Maximum permitted character count.
		max: usize,
	},
}

/// Stable subject identifier issued by the identity provider.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubjectId(String);
impl SubjectId {
	/// Creates a new identifier after validation.
	pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
		let view = value.as_ref();

		validate_view(view)?;

		Ok(Self(view.to_owned()))
	}
}
impl Deref for SubjectId {
	type Target = str;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
impl AsRef<str> for SubjectId {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl Borrow<str> for SubjectId {
	fn borrow(&self) -> &str {
		&self.0
	}
}
impl From<SubjectId> for String {
	fn from(value: SubjectId) -> Self {
		value.0
	}
}
impl TryFrom<String> for SubjectId {
	type Error = IdentifierError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		validate_view(&value)?;

		Ok(Self(value))
	}
}
impl FromStr for SubjectId {
	type Err = IdentifierError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::new(s)
	}
}
impl Debug for SubjectId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "Subject({})", self.0)
	}
}
impl Display for SubjectId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

/// Identity claims resolved from a verified first-party session.
///
/// The bridge never mutates this value; it only forwards the subject and claims to the
/// authorization server's admin API.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
	/// Subject identifier used as the OAuth `sub`.
	pub subject: SubjectId,
	/// Primary email address, if the identity carries one.
	pub email: Option<String>,
	/// Whether the email address has been verified.
	pub email_verified: bool,
}
impl Identity {
	/// Creates an identity without any claims.
	pub fn new(subject: SubjectId) -> Self {
		Self { subject, email: None, email_verified: false }
	}

	/// Attaches the email claim.
	pub fn with_email(mut self, email: impl Into<String>, verified: bool) -> Self {
		self.email = Some(email.into());
		self.email_verified = verified;

		self
	}

	/// Claims forwarded as login context and consent session data.
	pub fn claims(&self) -> serde_json::Value {
		serde_json::json!({
			"email": self.email,
			"email_verified": self.email_verified,
		})
	}
}

fn validate_view(view: &str) -> Result<(), IdentifierError> {
	if view.is_empty() {
		return Err(IdentifierError::Empty);
	}
	if view.chars().any(char::is_whitespace) {
		return Err(IdentifierError::ContainsWhitespace);
	}
	if view.len() > SUBJECT_MAX_LEN {
		return Err(IdentifierError::TooLong { max: SUBJECT_MAX_LEN });
	}

	Ok(())
}
