//! Source-code tokenizer feeding the in-memory index

use regex::Regex;
use std::sync::OnceLock;

/// Identifiers, numbers, and other runs of word characters
fn token_pattern() -> Option<&'static Regex> {
    static TOKEN_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
    TOKEN_REGEX
        .get_or_init(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*|[0-9][0-9A-Za-z_.]*").ok())
        .as_ref()
}

/// Splits text into terms; token index is the term position
#[derive(Debug, Clone, Copy, Default)]
pub struct Tokenizer {
    lowercase: bool,
}

impl Tokenizer {
    /// Case-preserving tokenizer, for symbol fields
    pub const fn new() -> Self {
        Self { lowercase: false }
    }

    /// Case-folding tokenizer, for full-text fields
    pub const fn lowercasing() -> Self {
        Self { lowercase: true }
    }

    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let Some(pattern) = token_pattern() else {
            return Vec::new();
        };
        pattern
            .find_iter(text)
            .map(|m| {
                if self.lowercase {
                    m.as_str().to_lowercase()
                } else {
                    m.as_str().to_string()
                }
            })
            .collect()
    }

    /// Path components, without separators
    pub fn tokenize_path(&self, path: &str) -> Vec<String> {
        path.split(['/', '\\', '.'])
            .filter(|segment| !segment.is_empty())
            .map(|segment| {
                if self.lowercase {
                    segment.to_lowercase()
                } else {
                    segment.to_string()
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_code() {
        let tokens = Tokenizer::new().tokenize("fn main() { let x_1 = 0x1F + 42; }");
        assert_eq!(tokens, vec!["fn", "main", "let", "x_1", "0x1F", "42"]);
    }

    #[test]
    fn test_lowercasing() {
        let tokens = Tokenizer::lowercasing().tokenize("HashMap::new");
        assert_eq!(tokens, vec!["hashmap", "new"]);
    }

    #[test]
    fn test_tokenize_path() {
        let tokens = Tokenizer::new().tokenize_path("src/engine/Shard.rs");
        assert_eq!(tokens, vec!["src", "engine", "Shard", "rs"]);
    }
}
