//! Identifier and literal validation.
//!
//! Administrative statements cannot carry bound parameters for object
//! names, so every name fragment is funneled through this module before it
//! may appear in statement text. `SafeIdentifier` and `SafeLiteral` have no
//! public constructor and no `Deserialize` impl; the validator is the only
//! door.

use serde::Serialize;

use crate::error::{Error, Result};

/// Words that may never be used as object names, regardless of casing.
///
/// Extend per deployment through [`ValidatorConfig::with_reserved_words`].
const RESERVED_WORDS: &[&str] = &[
    "ACCESS", "ADD", "ALL", "ALTER", "AND", "ANY", "AS", "AUDIT", "BEGIN",
    "BETWEEN", "BY", "CASCADE", "CHECK", "COLUMN", "COMMENT", "COMMIT",
    "CONNECT", "CREATE", "CURRENT", "DELETE", "DISTINCT", "DROP",
    "ELSE", "END", "EXECUTE", "EXISTS", "FROM", "GRANT", "GROUP", "HAVING",
    "IDENTIFIED", "IN", "INDEX", "INSERT", "INTO", "IS", "LIKE", "LOCK",
    "MERGE", "NOAUDIT", "NOT", "NULL", "ON", "OPTION", "OR", "ORDER",
    "POLICY", "PRIVILEGES", "PROFILE", "PUBLIC", "RENAME", "REVOKE", "ROLE",
    "ROLLBACK", "ROW", "ROWID", "SELECT", "SESSION", "SET", "SYSDATE",
    "TABLE", "THEN", "TO", "TRIGGER", "UNION", "UNIQUE", "UPDATE", "USER",
    "VALUES", "VIEW", "WHERE", "WITH",
];

/// Validation limits and the reserved-word denylist.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Maximum identifier length after normalization.
    pub max_identifier_len: usize,
    /// Minimum secret literal length.
    pub min_literal_len: usize,
    /// Maximum secret literal length.
    pub max_literal_len: usize,
    /// Deployment-specific reserved words, merged with the built-in list.
    pub extra_reserved_words: Vec<String>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_identifier_len: 30,
            min_literal_len: 1,
            max_literal_len: 128,
            extra_reserved_words: Vec::new(),
        }
    }
}

impl ValidatorConfig {
    /// Create a config with the default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum identifier length.
    pub fn with_max_identifier_len(mut self, len: usize) -> Self {
        self.max_identifier_len = len;
        self
    }

    /// Set the secret literal length bounds.
    pub fn with_literal_bounds(mut self, min: usize, max: usize) -> Self {
        self.min_literal_len = min;
        self.max_literal_len = max;
        self
    }

    /// Add deployment-specific reserved words.
    pub fn with_reserved_words<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_reserved_words
            .extend(words.into_iter().map(|w| w.into().to_ascii_uppercase()));
        self
    }

    /// Validate and normalize a name destined for statement text.
    ///
    /// Accepts a token of ASCII letters, digits and underscores that starts
    /// with a letter, within the configured length bound and not on the
    /// reserved-word denylist. The result is uppercased, so validation is
    /// idempotent: validating an already-validated name yields an equal
    /// `SafeIdentifier`.
    pub fn validate_identifier(&self, raw: &str) -> Result<SafeIdentifier> {
        if raw.trim().is_empty() {
            return Err(Error::InvalidIdentifier(
                "identifier is empty or whitespace-only".to_string(),
            ));
        }
        if raw.len() > self.max_identifier_len {
            return Err(Error::InvalidIdentifier(format!(
                "identifier exceeds {} characters",
                self.max_identifier_len
            )));
        }
        let mut chars = raw.chars();
        let first = chars.next().unwrap_or_default();
        if !first.is_ascii_alphabetic() {
            return Err(Error::InvalidIdentifier(format!(
                "identifier must start with a letter, got {:?}",
                first
            )));
        }
        if let Some(bad) = raw
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_'))
        {
            return Err(Error::InvalidIdentifier(format!(
                "identifier contains forbidden character {:?}",
                bad
            )));
        }
        let normalized = raw.to_ascii_uppercase();
        if RESERVED_WORDS.binary_search(&normalized.as_str()).is_ok()
            || self.extra_reserved_words.iter().any(|w| *w == normalized)
        {
            return Err(Error::InvalidIdentifier(format!(
                "'{}' is a reserved word",
                normalized
            )));
        }
        Ok(SafeIdentifier(normalized))
    }

    /// Validate a secret that must be embedded in statement text.
    ///
    /// The statement language offers no bound parameters for this class of
    /// statement, so the literal is embedded quoted; embedded quote
    /// characters are escaped by doubling at render time. Control
    /// characters and out-of-bound lengths are rejected outright.
    pub fn validate_secret_literal(&self, raw: &str) -> Result<SafeLiteral> {
        if raw.len() < self.min_literal_len {
            return Err(Error::InvalidLiteral(format!(
                "literal shorter than {} characters",
                self.min_literal_len
            )));
        }
        if raw.len() > self.max_literal_len {
            return Err(Error::InvalidLiteral(format!(
                "literal exceeds {} characters",
                self.max_literal_len
            )));
        }
        if raw.chars().any(|c| c.is_control()) {
            return Err(Error::InvalidLiteral(
                "literal contains control characters".to_string(),
            ));
        }
        Ok(SafeLiteral(raw.to_string()))
    }
}

/// A validated, case-normalized object name.
///
/// Only [`ValidatorConfig::validate_identifier`] can construct one, which
/// is what makes it safe to splice into non-parameterizable statement text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SafeIdentifier(String);

impl SafeIdentifier {
    /// The normalized name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SafeIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SafeIdentifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A validated secret destined for quoted embedding in statement text.
///
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct SafeLiteral(String);

impl SafeLiteral {
    /// Render the literal double-quoted with embedded quotes doubled.
    pub fn quoted(&self) -> String {
        let mut out = String::with_capacity(self.0.len() + 2);
        out.push('"');
        for c in self.0.chars() {
            if c == '"' {
                out.push('"');
            }
            out.push(c);
        }
        out.push('"');
        out
    }

    /// Length of the underlying secret in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the underlying secret is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for SafeLiteral {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SafeLiteral(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> ValidatorConfig {
        ValidatorConfig::default()
    }

    #[test]
    fn test_reserved_words_sorted() {
        // binary_search requires it
        let mut sorted = RESERVED_WORDS.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, RESERVED_WORDS);
    }

    #[test]
    fn test_accepts_plain_names() {
        let id = cfg().validate_identifier("nhanvien01").unwrap();
        assert_eq!(id.as_str(), "NHANVIEN01");

        let id = cfg().validate_identifier("HR_manager").unwrap();
        assert_eq!(id.as_str(), "HR_MANAGER");
    }

    #[test]
    fn test_rejects_statement_terminator_payload() {
        let err = cfg()
            .validate_identifier("nhanvien01; DROP TABLE projects")
            .unwrap_err();
        assert!(matches!(err, Error::InvalidIdentifier(_)));
    }

    #[test]
    fn test_rejects_quotes_comments_whitespace() {
        for raw in [
            "a\"b",
            "a'b",
            "a--b",
            "a/*b*/",
            "a b",
            "",
            "   ",
            "\t",
            "1abc",
            "_abc",
        ] {
            assert!(
                cfg().validate_identifier(raw).is_err(),
                "{:?} should be rejected",
                raw
            );
        }
    }

    #[test]
    fn test_rejects_reserved_words() {
        for raw in ["select", "DROP", "Grant", "user"] {
            assert!(matches!(
                cfg().validate_identifier(raw),
                Err(Error::InvalidIdentifier(_))
            ));
        }
    }

    #[test]
    fn test_extra_reserved_words() {
        let cfg = cfg().with_reserved_words(["sys", "system"]);
        assert!(cfg.validate_identifier("SYSTEM").is_err());
        assert!(cfg.validate_identifier("sysadmin_2").is_ok());
    }

    #[test]
    fn test_identifier_length_bound() {
        let cfg = cfg().with_max_identifier_len(8);
        assert!(cfg.validate_identifier("abcdefgh").is_ok());
        assert!(cfg.validate_identifier("abcdefghi").is_err());
    }

    #[test]
    fn test_validation_is_idempotent() {
        let once = cfg().validate_identifier("Hr_User").unwrap();
        let twice = cfg().validate_identifier(once.as_str()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_literal_quoting_escapes_quotes() {
        let lit = cfg().validate_secret_literal(r#"pa"ss"#).unwrap();
        assert_eq!(lit.quoted(), r#""pa""ss""#);

        let lit = cfg().validate_secret_literal("plain").unwrap();
        assert_eq!(lit.quoted(), "\"plain\"");
    }

    #[test]
    fn test_literal_bounds_and_control_chars() {
        let cfg = cfg().with_literal_bounds(4, 8);
        assert!(cfg.validate_secret_literal("abc").is_err());
        assert!(cfg.validate_secret_literal("abcdefghi").is_err());
        assert!(cfg.validate_secret_literal("ab\0cd").is_err());
        assert!(cfg.validate_secret_literal("ab\ncd").is_err());
        assert!(cfg.validate_secret_literal("abcd").is_ok());
    }

    #[test]
    fn test_literal_debug_redacts() {
        let lit = cfg().validate_secret_literal("topsecret").unwrap();
        assert!(!format!("{:?}", lit).contains("topsecret"));
    }
}
