//! Sender address parsing and normalization.
//!
//! Mail files carry `From` exactly as the upstream classifier wrote it, which
//! may be a bare address or `Name <address>`. Group membership is matched on
//! the normalized bare address only.

/// A parsed sender address.
///
/// # Examples
/// - `"John Doe <A@Gmail.com>"` → `display_name = "John Doe"`, `address = "A@Gmail.com"`, `key() = "a@gmail.com"`
/// - `"a@gmail.com"` → `display_name = ""`, `address = "a@gmail.com"`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailAddress {
    /// Human-readable display name (may be empty).
    pub display_name: String,
    /// The bare address as written.
    pub address: String,
}

impl EmailAddress {
    /// Parse a single address from a `From` value.
    ///
    /// If no angle-bracket form is found the trimmed input is the address.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();

        if let (Some(open), Some(close)) = (trimmed.rfind('<'), trimmed.rfind('>')) {
            if close > open {
                return Self {
                    display_name: strip_quotes(&trimmed[..open]),
                    address: trimmed[open + 1..close].trim().to_string(),
                };
            }
        }

        Self {
            display_name: String::new(),
            address: trimmed.to_string(),
        }
    }

    /// Normalized form used for membership lookups.
    pub fn key(&self) -> String {
        normalize(&self.address)
    }

    /// Whether the address looks like `local@domain`.
    pub fn is_valid(&self) -> bool {
        match self.address.split_once('@') {
            Some((local, domain)) => !local.is_empty() && !domain.is_empty(),
            None => false,
        }
    }
}

/// Normalize a bare address: trim and lowercase.
pub fn normalize(address: &str) -> String {
    address.trim().to_lowercase()
}

fn strip_quotes(s: &str) -> String {
    let trimmed = s.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        trimmed[1..trimmed.len() - 1].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.display_name.is_empty() {
            write!(f, "{}", self.address)
        } else {
            write!(f, "{} <{}>", self.display_name, self.address)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_address() {
        let addr = EmailAddress::parse("  a@gmail.com ");
        assert_eq!(addr.address, "a@gmail.com");
        assert_eq!(addr.display_name, "");
        assert!(addr.is_valid());
    }

    #[test]
    fn test_parse_name_and_address() {
        let addr = EmailAddress::parse("\"Doe, John\" <John.Doe@Example.com>");
        assert_eq!(addr.display_name, "Doe, John");
        assert_eq!(addr.address, "John.Doe@Example.com");
        assert_eq!(addr.key(), "john.doe@example.com");
    }

    #[test]
    fn test_display_roundtrip() {
        let addr = EmailAddress::parse("Support <help@company.com>");
        assert_eq!(addr.to_string(), "Support <help@company.com>");
    }

    #[test]
    fn test_invalid_without_at() {
        assert!(!EmailAddress::parse("postmaster").is_valid());
        assert!(!EmailAddress::parse("").is_valid());
    }
}
