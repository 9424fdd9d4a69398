use rand::Rng;

pub const SAFE: [char; 62] = [
	'0', '1', '2', '3', '4', '5', '6', '7', '8', '9',
	'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
	'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z',
];

/// Random alphanumeric string of the given length.
pub fn random_alnum(len: usize) -> String {
	let mut rng = rand::rng();
	let mut result = String::with_capacity(len);
	for _ in 0..len {
		result.push(SAFE[rng.random_range(0..SAFE.len())]);
	}
	result
}

/// Random lowercase hex string of the given length.
pub fn random_hex(len: usize) -> String {
	const HEX: [char; 16] = ['0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f'];
	let mut rng = rand::rng();
	let mut result = String::with_capacity(len);
	for _ in 0..len {
		result.push(HEX[rng.random_range(0..HEX.len())]);
	}
	result
}

/// Event ids: `evt_` followed by 24 hex characters.
pub fn new_event_id() -> String {
	format!("evt_{}", random_hex(24))
}

/// Delivery ids: `dlv_` followed by 24 hex characters.
pub fn new_delivery_id() -> String {
	format!("dlv_{}", random_hex(24))
}

/// Webhook ids: `wh_` followed by 24 hex characters.
pub fn new_webhook_id() -> String {
	format!("wh_{}", random_hex(24))
}

/// Credential ids: `cred_` followed by 24 hex characters.
pub fn new_credential_id() -> String {
	format!("cred_{}", random_hex(24))
}

/// Bearer secrets: `nsh_` followed by 28 alphanumerics. The plaintext is
/// shown once at creation; only its hash is stored.
pub fn new_credential_secret() -> String {
	format!("nsh_{}", random_alnum(28))
}

/// Webhook signing secrets: 64 hex characters.
pub fn new_webhook_secret() -> String {
	random_hex(64)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn generated_ids_match_their_shapes() {
		let evt = new_event_id();
		assert!(evt.starts_with("evt_"));
		assert_eq!(evt.len(), 4 + 24);
		assert!(evt[4..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));

		let secret = new_credential_secret();
		assert!(secret.starts_with("nsh_"));
		assert_eq!(secret.len(), 4 + 28);
		assert!(secret[4..].chars().all(|c| c.is_ascii_alphanumeric()));

		assert_eq!(new_webhook_secret().len(), 64);
	}
}

// vim: ts=4
