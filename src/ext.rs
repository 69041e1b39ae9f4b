//! Extension points consulted at the resolution boundary.
//!
//! Both hooks are synchronous and must be pure: the engine may call them
//! repeatedly for the same claim across retries and forks.

use regex::Regex;

use crate::declare::ComponentDeclaration;
use crate::types::{TagSet, TypeExpr};

/// Asked to synthesize a declaration when no declared, template or
/// auto-constructible candidate exists for a claim.
pub trait ExtensionResolver: Send + Sync {
    fn resolve(&self, ty: &TypeExpr, tags: &TagSet) -> Option<ComponentDeclaration>;
}

/// Consulted only to enrich a final unresolved-dependency failure. Hints
/// never affect resolution outcomes.
pub trait HintSource: Send + Sync {
    fn hints(&self, ty: &TypeExpr, tags: &TagSet) -> Vec<String>;
}

/// A hint knowledge base matched by regex over the rendered type name plus
/// exact tag-set equality.
#[derive(Debug, Default)]
pub struct RegexHints {
    entries: Vec<HintEntry>,
}

#[derive(Debug)]
struct HintEntry {
    pattern: Regex,
    tags: TagSet,
    message: String,
}

impl RegexHints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn suggest(
        mut self,
        pattern: &str,
        tags: TagSet,
        message: impl Into<String>,
    ) -> Result<Self, regex::Error> {
        self.entries.push(HintEntry {
            pattern: Regex::new(pattern)?,
            tags,
            message: message.into(),
        });
        Ok(self)
    }
}

impl HintSource for RegexHints {
    fn hints(&self, ty: &TypeExpr, tags: &TagSet) -> Vec<String> {
        let name = ty.to_string();
        self.entries
            .iter()
            .filter(|e| e.tags == *tags && e.pattern.is_match(&name))
            .map(|e| e.message.clone())
            .collect()
    }
}
