//! Hybrid retrieval over the knowledge corpus
//!
//! Chunks are scored by cosine similarity to the query embedding plus lexical boosts (exact
//! phrase, key-phrase shingles, configured anchor rules and keyword coverage). Chunks below the
//! semantic floor are discarded before ranking.

mod hybrid;
mod lexical;

pub use hybrid::{cosine_similarity, rank_chunks, HybridRetriever, ScoredPassage};
pub use lexical::{matched_anchor_rules, LexicalBoost, QueryTerms};

/// Header line of the context block handed to the generation model
pub const CONTEXT_HEADER: &str = "Context from knowledge base:";

const SEPARATOR: &str = "---";

/// Join passages into one delimited context block; no passages yields `""`
pub fn format_context(passages: &[String]) -> String {
    let passages: Vec<&str> = passages
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect();
    if passages.is_empty() {
        return String::new();
    }

    let joined = passages.join(&format!("\n{}\n", SEPARATOR));
    format!(
        "\n{}\n{}\n{}\n{}\n",
        CONTEXT_HEADER, SEPARATOR, joined, SEPARATOR
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_context_empty() {
        assert_eq!(format_context(&[]), "");
        assert_eq!(format_context(&["  ".to_string()]), "");
    }

    #[test]
    fn test_format_context_separates_passages() {
        let block = format_context(&["alpha".to_string(), "beta".to_string()]);
        assert_eq!(
            block,
            "\nContext from knowledge base:\n---\nalpha\n---\nbeta\n---\n"
        );
    }
}
