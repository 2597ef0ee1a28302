/// Catalog of sample prompts the simulated users pick from.
use crate::error::AppError;
use std::path::Path;

const DEFAULT_PROMPTS: &[&str] = &[
    "What is artificial intelligence?",
    "Explain machine learning in simple terms",
    "How does neural network work?",
    "Tell me about natural language processing",
    "What are the benefits of AI?",
    "Describe deep learning",
    "What is the difference between AI and ML?",
    "How can AI help businesses?",
    "Explain computer vision",
    "What is reinforcement learning?",
    "Tell me a short story",
    "What is Python programming?",
    "How do transformers work in AI?",
    "Explain large language models",
    "What is the future of AI?",
];

/// A non-empty list of prompts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptCatalog {
    prompts: Vec<String>,
}

impl PromptCatalog {
    /// Built-in catalog of general AI questions.
    pub fn builtin() -> Self {
        Self {
            prompts: DEFAULT_PROMPTS.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Build a catalog from explicit prompts, dropping blank entries.
    pub fn from_prompts<I, S>(prompts: I) -> Result<Self, AppError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let prompts: Vec<String> = prompts
            .into_iter()
            .map(Into::into)
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();

        if prompts.is_empty() {
            return Err(AppError::Config("Prompt catalog cannot be empty".to_string()));
        }
        Ok(Self { prompts })
    }

    /// Load one prompt per non-empty line.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Io(std::io::Error::other(format!(
                "Failed to read prompt file {}: {}",
                path.display(),
                e
            )))
        })?;
        Self::from_prompts(content.lines())
    }

    /// Pick a prompt uniformly at random.
    pub fn choose(&self, rng: &mut fastrand::Rng) -> &str {
        &self.prompts[rng.usize(..self.prompts.len())]
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }
}

impl Default for PromptCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Prefix a prompt with its origin so server logs can be attributed.
///
/// Node 0 means a single-node run, where prompts are sent untouched.
pub fn tag_prompt(node_id: u32, user_id: u64, prompt: &str) -> String {
    if node_id == 0 {
        prompt.to_string()
    } else {
        format!("[Node{}User{}] {}", node_id, user_id, prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::io::Write;

    #[test]
    fn builtin_catalog_is_not_empty() {
        let catalog = PromptCatalog::builtin();
        assert_eq!(catalog.len(), 15);
        assert!(!catalog.is_empty());
    }

    #[test]
    fn blank_prompts_are_rejected() {
        assert!(matches!(
            PromptCatalog::from_prompts(["", "   "]),
            Err(AppError::Config(_))
        ));
        let catalog = PromptCatalog::from_prompts(["  hi  ", ""]).unwrap();
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn from_file_reads_one_prompt_per_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "first prompt\n\nsecond prompt").unwrap();
        let catalog = PromptCatalog::from_file(file.path()).unwrap();
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn choose_is_deterministic_for_a_seed() {
        let catalog = PromptCatalog::builtin();
        let picks = |seed| {
            let mut rng = fastrand::Rng::with_seed(seed);
            (0..20)
                .map(|_| catalog.choose(&mut rng).to_string())
                .collect::<Vec<_>>()
        };
        assert_eq!(picks(42), picks(42));

        let distinct: HashSet<_> = picks(7).into_iter().collect();
        assert!(distinct.len() > 1);
    }

    #[test]
    fn tagging_only_applies_in_distributed_mode() {
        assert_eq!(tag_prompt(0, 3, "hi"), "hi");
        assert_eq!(tag_prompt(2, 15, "hi"), "[Node2User15] hi");
    }
}
