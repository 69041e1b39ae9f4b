//! Failure taxonomy for graph construction.
//!
//! A build either fully succeeds or fails with one of these errors; there is
//! no partial result. Resolution failures carry the in-progress claim chain
//! so callers can report the full causal trail.

use std::fmt;

use itertools::Itertools;
use thiserror::Error;

use crate::declare::DependencyClaim;
use crate::types::TypeExpr;

/// One hop of the in-progress resolution stack, outermost first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimTrace {
    /// The component being resolved at this hop.
    pub component: TypeExpr,
    /// The claim it was waiting on, if any.
    pub claim: Option<DependencyClaim>,
}

impl fmt::Display for ClaimTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.claim {
            Some(claim) => write!(f, "{} (requires {})", self.component, claim),
            None => write!(f, "{}", self.component),
        }
    }
}

/// No candidate was found through any resolution strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedDependency {
    pub claim: DependencyClaim,
    pub chain: Vec<ClaimTrace>,
    pub hints: Vec<String>,
}

impl fmt::Display for UnresolvedDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no candidate satisfies {}", self.claim)?;
        if !self.chain.is_empty() {
            write!(f, "; while resolving {}", self.chain.iter().join(" -> "))?;
        }
        for hint in &self.hints {
            write!(f, "; hint: {hint}")?;
        }
        Ok(())
    }
}

impl std::error::Error for UnresolvedDependency {}

/// A dependency cycle that cannot be broken by proxying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircularDependency {
    /// The cycle path, ending where it re-enters.
    pub chain: Vec<TypeExpr>,
}

impl fmt::Display for CircularDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dependency cycle cannot be broken by proxying: {}",
            self.chain.iter().join(" -> ")
        )
    }
}

impl std::error::Error for CircularDependency {}

/// More than one equally ranked candidate for a claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateDependency {
    pub claim: DependencyClaim,
    pub candidates: Vec<String>,
}

impl fmt::Display for DuplicateDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "multiple equally ranked candidates for {}: {}",
            self.claim,
            self.candidates.iter().join(", ")
        )
    }
}

impl std::error::Error for DuplicateDependency {}

/// Errors raised while building the dependency graph.
#[derive(Debug, Clone, Error)]
pub enum BuildError {
    #[error("no root components were declared")]
    EmptyRoots,
    #[error("invalid declaration: {0}")]
    InvalidDeclaration(String),
    #[error(transparent)]
    Unresolved(#[from] UnresolvedDependency),
    #[error(transparent)]
    Circular(#[from] CircularDependency),
    #[error(transparent)]
    Duplicate(#[from] DuplicateDependency),
}
