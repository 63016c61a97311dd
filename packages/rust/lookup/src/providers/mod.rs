//! Built-in site providers.
//!
//! Selectors and URL patterns track the current markup of each site and are
//! best effort: a selector that stops matching degrades to "no match".

mod directory;
mod network;
mod registry;

pub use directory::DirectoryProvider;
pub use network::ProfessionalNetworkProvider;
pub use registry::RegistryProvider;

/// Whether every whitespace token of `required` appears in `haystack` (both lowercase).
pub(crate) fn contains_all_tokens(haystack: &str, required: &str) -> bool {
    required
        .split_whitespace()
        .all(|token| haystack.contains(token))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multi_word_requirements_match_per_token() {
        let href = "https://www.linkedin.com/in/marie-de-la-tour-123";
        assert!(contains_all_tokens(href, "de la tour"));
        assert!(!contains_all_tokens(href, "dupont"));
        assert!(contains_all_tokens(href, ""));
    }
}
