use sha2::{Digest, Sha256};

/// Stable cache keys for pipeline lookups
///
/// Cache keys are SHA-256 digests of the request parameters so that
/// arbitrary free-text descriptions never leak into cache key space and
/// keys stay bounded in length regardless of input size.

/// Builds a hex-encoded digest over the given parts.
///
/// Parts are length-prefixed before hashing so `["ab", "c"]` and
/// `["a", "bc"]` produce different keys.
pub fn hash_key(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Key for a classification response.
pub fn classification_key(
    description: &str,
    business_type: Option<&str>,
    source_country: Option<&str>,
) -> String {
    hash_key(&[
        "classify",
        description,
        business_type.unwrap_or(""),
        source_country.unwrap_or(""),
    ])
}

/// Key for a resolved tariff rate record.
pub fn tariff_rates_key(hs_code: &str, destination: &str) -> String {
    hash_key(&["rates", hs_code, destination])
}

/// Key for a resolved qualification rule.
pub fn qualification_rule_key(hs_code: &str, business_type: Option<&str>) -> String {
    hash_key(&["rule", hs_code, business_type.unwrap_or("")])
}

/// Short digest used in human-facing referral codes.
pub fn short_digest(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_deterministic() {
        let a = classification_key("steel brake rotors", Some("automotive"), None);
        let b = classification_key("steel brake rotors", Some("automotive"), None);
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_varies_by_parameter() {
        let with_type = classification_key("steel brake rotors", Some("automotive"), None);
        let without_type = classification_key("steel brake rotors", None, None);
        assert_ne!(with_type, without_type);
    }

    #[test]
    fn test_length_prefix_prevents_boundary_collisions() {
        assert_ne!(hash_key(&["ab", "c"]), hash_key(&["a", "bc"]));
    }

    #[test]
    fn test_short_digest_length() {
        assert_eq!(short_digest("smartphone charging cable").len(), 8);
    }
}
