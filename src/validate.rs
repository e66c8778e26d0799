//! Path contract and input normalization.
//!
//! Canonical document paths are `<docs_root>/<category>/<document_type>/<filename>`
//! relative to the project root. A short whitelist of exception patterns
//! (root-level README-style files, agent and rule definitions) is accepted
//! without the docs root.
//!
//! Document types accept synonyms so callers can use natural names. Three-tier
//! resolution: exact match → synonym lookup → error with suggestion.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::error::{Error, Result};
use crate::model::{Category, DocumentType};

/// Default top-level directory for canonical documents.
pub const DEFAULT_DOCS_ROOT: &str = "docs";

/// Root-level filename prefixes that never need the docs root.
const ROOT_FILE_PREFIXES: [&str; 4] = ["README", "CHANGELOG", "LICENSE", "CONTRIBUTING"];

/// Alternate roots for agent and rule definitions: (directory prefix, required extension).
const ALTERNATE_ROOTS: [(&str, &str); 2] = [(".claude/agents/", "md"), (".cursor/rules/", "mdc")];

/// Which exception pattern a path matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathException {
    /// README*, CHANGELOG*, LICENSE*, CONTRIBUTING* at the project root
    RootFile,
    /// `.claude/agents/**.md`
    AgentDefinition,
    /// `.cursor/rules/**.mdc`
    RuleDefinition,
}

/// Result of checking a path against the contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    Canonical {
        category: Category,
        document_type: DocumentType,
    },
    Exception(PathException),
}

/// The structural path contract for one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathContract {
    docs_root: String,
}

impl Default for PathContract {
    fn default() -> Self {
        Self::new(DEFAULT_DOCS_ROOT)
    }
}

impl PathContract {
    #[must_use]
    pub fn new(docs_root: &str) -> Self {
        Self {
            docs_root: docs_root.trim_matches('/').to_string(),
        }
    }

    #[must_use]
    pub fn docs_root(&self) -> &str {
        &self.docs_root
    }

    /// Check a normalized path for a document of the given type.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPath` when the path is structurally wrong or its type
    /// segment disagrees with `document_type`, and `CategoryMismatch` when the
    /// category segment is not the one `document_type` maps to.
    pub fn check(&self, path: &str, document_type: DocumentType) -> Result<PathKind> {
        self.check_placement(path, document_type.category(), document_type)
    }

    /// Check a path against an explicit category rather than the mapped one.
    ///
    /// Registration always uses [`Self::check`]. Structure migrations that
    /// were run with a category override record the override on the
    /// document, and conformance for those documents is judged against it.
    ///
    /// # Errors
    ///
    /// Same as [`Self::check`].
    pub fn check_placement(
        &self,
        path: &str,
        expected: Category,
        document_type: DocumentType,
    ) -> Result<PathKind> {
        if let Some(exception) = exception_for(path) {
            return Ok(PathKind::Exception(exception));
        }

        let segments: Vec<&str> = path.split('/').collect();
        if segments.len() < 4 {
            return Err(invalid(
                path,
                format!(
                    "expected {}/<category>/<document_type>/<filename>, got {} segment(s)",
                    self.docs_root,
                    segments.len()
                ),
            ));
        }

        if segments[0] != self.docs_root {
            return Err(invalid(
                path,
                format!("must live under '{}/'", self.docs_root),
            ));
        }

        if segments[1] != expected.as_str() {
            return Err(Error::CategoryMismatch {
                path: path.to_string(),
                expected: expected.as_str().to_string(),
                actual: segments[1].to_string(),
            });
        }

        if segments[2] != document_type.as_str() {
            return Err(invalid(
                path,
                format!(
                    "type segment '{}' does not match document type '{}'",
                    segments[2],
                    document_type.as_str()
                ),
            ));
        }

        Ok(PathKind::Canonical {
            category: expected,
            document_type,
        })
    }

    /// Whether a path satisfies the contract for the given type.
    #[must_use]
    pub fn conforms(&self, path: &str, document_type: DocumentType) -> bool {
        self.check(path, document_type).is_ok()
    }

    /// Whether a document sits where its stored category and type say it should.
    #[must_use]
    pub fn is_placed(&self, path: &str, category: Category, document_type: DocumentType) -> bool {
        self.check_placement(path, category, document_type).is_ok()
    }

    /// Build the canonical path for a document.
    #[must_use]
    pub fn canonical_path(
        &self,
        category: Category,
        document_type: DocumentType,
        filename: &str,
    ) -> String {
        format!(
            "{}/{}/{}/{}",
            self.docs_root,
            category.as_str(),
            document_type.as_str(),
            filename
        )
    }
}

/// Match a path against the exception whitelist.
#[must_use]
pub fn exception_for(path: &str) -> Option<PathException> {
    if !path.contains('/') {
        let upper = path.to_uppercase();
        if ROOT_FILE_PREFIXES.iter().any(|p| upper.starts_with(p)) {
            return Some(PathException::RootFile);
        }
        return None;
    }

    for (i, (prefix, ext)) in ALTERNATE_ROOTS.iter().enumerate() {
        if let Some(rest) = path.strip_prefix(prefix) {
            let has_ext = std::path::Path::new(rest)
                .extension()
                .is_some_and(|e| e.eq_ignore_ascii_case(ext));
            if !rest.is_empty() && has_ext {
                return Some(if i == 0 {
                    PathException::AgentDefinition
                } else {
                    PathException::RuleDefinition
                });
            }
        }
    }

    None
}

/// Normalize a caller-supplied relative path.
///
/// Converts `\` to `/`, strips a leading `./`, and rejects absolute paths,
/// `..` components, and empty segments.
///
/// # Errors
///
/// Returns `InvalidPath` if the path cannot be made into a clean relative path.
pub fn normalize_path(input: &str) -> Result<String> {
    let unified = input.trim().replace('\\', "/");
    let trimmed = unified.strip_prefix("./").unwrap_or(&unified);

    if trimmed.is_empty() {
        return Err(invalid(input, "path is empty".to_string()));
    }
    if trimmed.starts_with('/') || trimmed.chars().nth(1) == Some(':') {
        return Err(invalid(input, "path must be relative to the project root".to_string()));
    }

    let mut segments = Vec::new();
    for segment in trimmed.split('/') {
        match segment {
            "" => return Err(invalid(input, "path contains an empty segment".to_string())),
            "." => {}
            ".." => return Err(invalid(input, "path must not contain '..'".to_string())),
            s => segments.push(s),
        }
    }

    Ok(segments.join("/"))
}

/// Last segment of a normalized path.
#[must_use]
pub fn filename_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn invalid(path: &str, reason: String) -> Error {
    Error::InvalidPath {
        path: path.to_string(),
        reason,
    }
}

// ── Document type synonyms ───────────────────────────────────

pub static DOCUMENT_TYPE_SYNONYMS: LazyLock<HashMap<&str, DocumentType>> = LazyLock::new(|| {
    [
        ("requirement", DocumentType::Requirements),
        ("prd", DocumentType::Requirements),
        ("story", DocumentType::UserStory),
        ("plan", DocumentType::ProjectPlan),
        ("idea", DocumentType::IdeaBrief),
        ("architecture", DocumentType::ArchitectureDoc),
        ("design", DocumentType::DesignDoc),
        ("decision", DocumentType::Adr),
        ("decision_record", DocumentType::Adr),
        ("spec", DocumentType::TechnicalSpec),
        ("guide", DocumentType::UserGuide),
        ("howto", DocumentType::Tutorial),
        ("faq", DocumentType::Troubleshooting),
        ("api", DocumentType::ApiDoc),
        ("reference", DocumentType::ReferenceDoc),
        ("test", DocumentType::TestPlan),
        ("process", DocumentType::ProcessDoc),
        ("playbook", DocumentType::Runbook),
        ("deployment", DocumentType::DeploymentGuide),
        ("incident", DocumentType::IncidentReport),
        ("postmortem", DocumentType::IncidentReport),
        ("notes", DocumentType::MeetingNotes),
        ("minutes", DocumentType::MeetingNotes),
        ("status", DocumentType::StatusReport),
        ("changelog", DocumentType::ReleaseNotes),
        ("release", DocumentType::ReleaseNotes),
    ]
    .into_iter()
    .collect()
});

/// Normalize a document type via exact match or synonym lookup.
///
/// Returns the canonical type, or an error with the original input
/// and an optional suggestion.
pub fn normalize_document_type(input: &str) -> std::result::Result<DocumentType, (String, Option<String>)> {
    let lower = input.trim().to_lowercase().replace(['-', ' '], "_");

    // Tier 1: exact match
    if let Some(t) = DocumentType::parse(&lower) {
        return Ok(t);
    }

    // Tier 2: synonym lookup
    if let Some(&t) = DOCUMENT_TYPE_SYNONYMS.get(lower.as_str()) {
        return Ok(t);
    }

    // Tier 3: closest suggestion
    let suggestion = find_closest_type(&lower);
    Err((input.to_string(), suggestion))
}

/// Parse a category name, for overrides supplied on the command line.
///
/// # Errors
///
/// Returns `InvalidArgument` for names outside the eight categories.
pub fn parse_category(input: &str) -> Result<Category> {
    Category::parse(input).ok_or_else(|| {
        let valid: Vec<&str> = Category::ALL.iter().map(Category::as_str).collect();
        Error::InvalidArgument(format!(
            "unknown category '{input}' (expected one of: {})",
            valid.join(", ")
        ))
    })
}

fn find_closest_type(input: &str) -> Option<String> {
    let mut best: Option<(DocumentType, usize)> = None;

    let exact = DocumentType::ALL.iter().map(|t| (t.as_str(), *t));
    let synonyms = DOCUMENT_TYPE_SYNONYMS.iter().map(|(k, v)| (*k, *v));

    for (name, t) in exact.chain(synonyms) {
        let dist = levenshtein_distance(input, name);
        if dist <= 3 && best.is_none_or(|(_, d)| dist < d) {
            best = Some((t, dist));
        }
    }

    best.map(|(t, _)| t.as_str().to_string())
}

// ── Levenshtein distance ─────────────────────────────────────

/// Compute the Levenshtein edit distance between two strings.
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let a_len = a.len();
    let b_len = b.len();

    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for i in 1..=a_len {
        curr[0] = i;
        for j in 1..=b_len {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1) // deletion
                .min(curr[j - 1] + 1) // insertion
                .min(prev[j - 1] + cost); // substitution
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_len]
}
