//! Key material management.
//!
//! Three key kinds, distinguished by the first letter of the public text:
//! operator ('O'), account ('A'), user ('U'). Each is an Ed25519 pair with a
//! textual seed encoding the private half. Seeds for user keys exist only in
//! process memory; account seeds are stored sealed; the operator seed comes
//! from the environment.

use nkeys::KeyPair;

use crate::prelude::*;

pub mod claims;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KeyKind {
	Operator,
	Account,
	User,
}

impl KeyKind {
	/// Expected first letter of the public key text.
	pub fn prefix(&self) -> char {
		match self {
			KeyKind::Operator => 'O',
			KeyKind::Account => 'A',
			KeyKind::User => 'U',
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			KeyKind::Operator => "operator",
			KeyKind::Account => "account",
			KeyKind::User => "user",
		}
	}
}

/// Generate a fresh pair of the given kind.
pub fn generate(kind: KeyKind) -> KeyPair {
	match kind {
		KeyKind::Operator => KeyPair::new_operator(),
		KeyKind::Account => KeyPair::new_account(),
		KeyKind::User => KeyPair::new_user(),
	}
}

/// Parse a seed and verify that it derives a public key of the expected
/// kind. A syntactically valid seed of the wrong kind is rejected.
pub fn from_seed(kind: KeyKind, seed: &str) -> NhResult<KeyPair> {
	let pair = KeyPair::from_seed(seed.trim())
		.map_err(|err| Error::InvalidKey(format!("seed rejected: {}", err)))?;
	let public = pair.public_key();
	if !public.starts_with(kind.prefix()) {
		return Err(Error::InvalidKey(format!(
			"expected {} key, got public prefix {:?}",
			kind.as_str(),
			public.chars().next().unwrap_or('?')
		)));
	}
	Ok(pair)
}

/// Textual public key.
pub fn public_key(pair: &KeyPair) -> String {
	pair.public_key()
}

/// Textual seed. Fails for pairs constructed from a bare public key.
pub fn seed(pair: &KeyPair) -> NhResult<String> {
	pair.seed().map_err(|err| Error::InvalidKey(format!("seed unavailable: {}", err)))
}

/// Sign arbitrary bytes, mapping failures into the taxonomy.
pub fn sign(pair: &KeyPair, input: &[u8]) -> NhResult<Vec<u8>> {
	pair.sign(input).map_err(|err| Error::SignFailed(format!("ed25519 signing failed: {}", err)))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn generated_pairs_carry_the_kind_prefix() {
		assert!(public_key(&generate(KeyKind::Operator)).starts_with('O'));
		assert!(public_key(&generate(KeyKind::Account)).starts_with('A'));
		assert!(public_key(&generate(KeyKind::User)).starts_with('U'));
	}

	#[test]
	fn seed_round_trip_preserves_public_key() {
		let pair = generate(KeyKind::Account);
		let seed_text = seed(&pair).unwrap();
		let reparsed = from_seed(KeyKind::Account, &seed_text).unwrap();
		assert_eq!(public_key(&pair), public_key(&reparsed));
	}

	#[test]
	fn kind_mismatch_is_rejected() {
		let account_seed = seed(&generate(KeyKind::Account)).unwrap();
		let err = from_seed(KeyKind::User, &account_seed).unwrap_err();
		assert!(matches!(err, Error::InvalidKey(_)));
	}

	#[test]
	fn garbage_seed_is_rejected() {
		assert!(matches!(from_seed(KeyKind::Account, "not-a-seed"), Err(Error::InvalidKey(_))));
	}
}

// vim: ts=4
