use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use hive_core::types::{PatternKind, PatternMatch};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// PatternIndex contract
// ---------------------------------------------------------------------------

/// Read-only store of historical fix patterns.
///
/// The shipped implementation scores with keyword Jaccard similarity;
/// embedding-backed implementations can substitute without changing the
/// interface.
#[async_trait]
pub trait PatternIndex: Send + Sync {
    async fn retrieve(&self, query: &str, top_k: usize) -> Vec<PatternMatch>;

    /// Total number of loaded patterns.
    fn pattern_count(&self) -> usize;
}

// ---------------------------------------------------------------------------
// JsonPatternIndex
// ---------------------------------------------------------------------------

/// Pattern index primed from `data/rag_index/` at startup:
/// `git_commits.json` (historical fix commits), `chunks.json` (code chunks),
/// and `metadata.json`. Missing files degrade gracefully to an empty index.
pub struct JsonPatternIndex {
    git_commits: Vec<serde_json::Value>,
    code_chunks: Vec<serde_json::Value>,
    metadata: serde_json::Value,
}

impl JsonPatternIndex {
    pub fn load(index_dir: impl Into<PathBuf>) -> Self {
        let dir = index_dir.into();
        info!(dir = %dir.display(), "loading pattern index");

        let git_commits = load_array(&dir.join("git_commits.json"));
        let code_chunks = load_array(&dir.join("chunks.json"));
        let metadata = load_value(&dir.join("metadata.json"));

        let index = Self {
            git_commits,
            code_chunks,
            metadata,
        };
        info!(
            patterns = index.pattern_count(),
            version = index.version().unwrap_or("unknown"),
            "pattern index ready"
        );
        index
    }

    pub fn empty() -> Self {
        Self {
            git_commits: Vec::new(),
            code_chunks: Vec::new(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn version(&self) -> Option<&str> {
        self.metadata["version"].as_str()
    }

    fn score_all(&self, query: &str) -> Vec<PatternMatch> {
        let mut scored = Vec::new();
        for commit in &self.git_commits {
            let text = format!(
                "{} {}",
                commit["message"].as_str().unwrap_or(""),
                commit["diff"].as_str().unwrap_or("")
            );
            let similarity = jaccard(query, &text);
            if similarity > 0.0 {
                scored.push(PatternMatch {
                    kind: PatternKind::GitCommit,
                    data: commit.clone(),
                    similarity,
                });
            }
        }
        for chunk in &self.code_chunks {
            let text = format!(
                "{} {}",
                chunk["file"].as_str().unwrap_or(""),
                chunk["content"].as_str().unwrap_or("")
            );
            let similarity = jaccard(query, &text);
            if similarity > 0.0 {
                scored.push(PatternMatch {
                    kind: PatternKind::CodeChunk,
                    data: chunk.clone(),
                    similarity,
                });
            }
        }
        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored
    }
}

#[async_trait]
impl PatternIndex for JsonPatternIndex {
    async fn retrieve(&self, query: &str, top_k: usize) -> Vec<PatternMatch> {
        if query.trim().is_empty() {
            return Vec::new();
        }
        let mut scored = self.score_all(query);
        scored.truncate(top_k);
        scored
    }

    fn pattern_count(&self) -> usize {
        self.git_commits.len() + self.code_chunks.len()
    }
}

fn load_array(path: &Path) -> Vec<serde_json::Value> {
    match std::fs::read_to_string(path) {
        Ok(text) => match serde_json::from_str::<Vec<serde_json::Value>>(&text) {
            Ok(values) => values,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unparseable pattern file");
                Vec::new()
            }
        },
        Err(_) => {
            warn!(path = %path.display(), "pattern file not found");
            Vec::new()
        }
    }
}

fn load_value(path: &Path) -> serde_json::Value {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|text| serde_json::from_str(&text).ok())
        .unwrap_or(serde_json::Value::Null)
}

/// Keyword Jaccard similarity (intersection over union of word sets).
fn jaccard(a: &str, b: &str) -> f64 {
    let set_a: HashSet<String> = a.to_lowercase().split_whitespace().map(str::to_string).collect();
    let set_b: HashSet<String> = b.to_lowercase().split_whitespace().map(str::to_string).collect();
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    intersection as f64 / union as f64
}

/// Render top patterns into an advisory context block for the chosen worker,
/// bounded by an approximate word budget.
pub fn batch_context(patterns: &[PatternMatch], max_words: usize) -> String {
    if patterns.is_empty() {
        return "No similar patterns found.".to_string();
    }

    let mut lines = vec!["# Similar fix patterns".to_string(), String::new()];
    let mut words_used = 0usize;
    for (i, pattern) in patterns.iter().enumerate() {
        let block = match pattern.kind {
            PatternKind::GitCommit => {
                let sha = pattern.data["sha"].as_str().unwrap_or("unknown");
                let sha = &sha[..sha.len().min(8)];
                format!(
                    "## Pattern {} (sim {:.2})\n# Commit: {}\n# Message: {}\n",
                    i + 1,
                    pattern.similarity,
                    sha,
                    pattern.data["message"].as_str().unwrap_or("")
                )
            }
            PatternKind::CodeChunk => {
                let content = pattern.data["content"].as_str().unwrap_or("");
                let content: String = content.chars().take(200).collect();
                format!(
                    "## Pattern {} (sim {:.2})\n# File: {}\n# Content: {}\n",
                    i + 1,
                    pattern.similarity,
                    pattern.data["file"].as_str().unwrap_or("unknown"),
                    content
                )
            }
        };
        let block_words = block.split_whitespace().count();
        if words_used + block_words > max_words {
            lines.push(format!("# ... {} more patterns (truncated)", patterns.len() - i));
            break;
        }
        words_used += block_words;
        lines.push(block);
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_index(dir: &Path) -> JsonPatternIndex {
        std::fs::write(
            dir.join("git_commits.json"),
            serde_json::json!([
                {"sha": "abc1234567", "message": "fix trailing whitespace in parser", "diff": "- x \n+ x"},
                {"sha": "def7654321", "message": "add retry to http client", "diff": ""},
            ])
            .to_string(),
        )
        .expect("write commits");
        std::fs::write(
            dir.join("chunks.json"),
            serde_json::json!([
                {"file": "src/lint.py", "content": "strip trailing whitespace from lines"},
            ])
            .to_string(),
        )
        .expect("write chunks");
        std::fs::write(
            dir.join("metadata.json"),
            serde_json::json!({"version": "3"}).to_string(),
        )
        .expect("write metadata");
        JsonPatternIndex::load(dir)
    }

    #[tokio::test]
    async fn retrieval_ranks_by_similarity() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let index = seeded_index(tmp.path());
        assert_eq!(index.pattern_count(), 3);
        assert_eq!(index.version(), Some("3"));

        let matches = index.retrieve("trailing whitespace fix", 2).await;
        assert_eq!(matches.len(), 2);
        assert!(matches[0].similarity >= matches[1].similarity);
    }

    #[tokio::test]
    async fn missing_index_directory_yields_empty_index() {
        let index = JsonPatternIndex::load("/nonexistent/rag_index");
        assert_eq!(index.pattern_count(), 0);
        assert!(index.retrieve("anything", 5).await.is_empty());
    }

    #[tokio::test]
    async fn empty_query_returns_nothing() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let index = seeded_index(tmp.path());
        assert!(index.retrieve("", 5).await.is_empty());
    }

    #[test]
    fn batch_context_is_bounded() {
        let patterns: Vec<PatternMatch> = (0..50)
            .map(|i| PatternMatch {
                kind: PatternKind::GitCommit,
                data: serde_json::json!({
                    "sha": format!("{i:040}"),
                    "message": "a reasonably long commit message about fixing lint violations",
                }),
                similarity: 0.5,
            })
            .collect();
        let context = batch_context(&patterns, 100);
        assert!(context.contains("truncated"));
        assert!(context.split_whitespace().count() < 150);
    }

    #[test]
    fn no_patterns_renders_placeholder() {
        assert_eq!(batch_context(&[], 100), "No similar patterns found.");
    }
}
