//! Ahead-of-time dependency-graph resolution: declarations in, ordered
//! initialization plan out.
//!
//! # Simple use case
//!
//! ```
//! use ikebana::*;
//!
//! # fn main() -> Result<(), BuildError> {
//! // Describe the nominal universe: which types exist, how open they are,
//! // and what is assignable to what.
//! let catalog = TypeCatalog::new()
//!     .interface("Greeter")
//!     .open_class("ConsoleGreeter")
//!     .implements("ConsoleGreeter", TypeExpr::named("Greeter"));
//!
//! // Declare producers and entry points.
//! let mut builder = GraphBuilder::new(catalog);
//! builder.declare(ComponentDeclaration::new(
//!     DeclarationOrigin::ModuleMethod,
//!     TypeExpr::named("ConsoleGreeter"),
//! ))?;
//! builder.declare_root(
//!     ComponentDeclaration::new(DeclarationOrigin::ClassConstructor, TypeExpr::named("App"))
//!         .with_claim(DependencyClaim::one(TypeExpr::named("Greeter"))),
//! )?;
//!
//! // Resolve once, ahead of time.
//! let graph = builder.build()?;
//! assert_eq!(graph.len(), 2);
//! for batch in graph.batches() {
//!     assert!(batch.components.len() <= BATCH_SIZE);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Mechanism
//!
//! The builder owns three pieces of state: pools of concrete and template
//! declarations, a worklist of frames (one per component mid-resolution),
//! and the append-only list of resolved components whose order *is* the
//! initialization order. Each dependency claim of each frame is tried
//! against a fixed ladder of strategies (reuse a resolved component,
//! resolve a declared one first, instantiate a template, mark a nullable
//! claim absent, synthesize an optional wrapper or a constructor
//! declaration, ask an extension) and the first hit wins.
//!
//! Two mechanisms keep the resulting order a valid topological sort without
//! giving up on cyclic graphs. Promise and value claims grant deferred
//! access, so they may reference components that have not materialized yet.
//! And when a claim re-enters a component currently being resolved, the
//! engine synthesizes a memoized *promised proxy*, a subtype of the
//! requested type holding a deferred handle to the real component, and
//! substitutes it at the cycle point, provided the requested type is open
//! enough to be subtyped.
//!
//! Template ambiguity that survives the ranking rules forks the entire
//! builder state per candidate; exactly one fork must succeed. Forks share
//! no mutable state, so a failing fork cannot corrupt its parent.
//!
//! The final list is cut into fixed-size batches purely to bound the size
//! of downstream generated units; batching never influences order.

mod declare;
mod emit;
mod error;
mod ext;
mod graph;
mod proxy;
mod resolve;
mod types;
mod unify;

pub use declare::{
    tags_match, ClaimKind, ComponentDeclaration, DeclId, DeclarationOrigin, DeclarationPools,
    DependencyClaim,
};
pub use emit::{batches, Batch, BATCH_SIZE};
pub use error::{
    BuildError, CircularDependency, ClaimTrace, DuplicateDependency, UnresolvedDependency,
};
pub use ext::{ExtensionResolver, HintSource, RegexHints};
pub use graph::{
    AllOfElement, ComponentDependency, ComponentRef, ResolvedComponent, ResolvedGraph,
};
pub use resolve::{BuilderOptions, GraphBuilder};
pub use types::{MatchKind, Openness, Substitution, TagSet, TypeCatalog, TypeExpr, TypeInfo};
pub use unify::{instantiate, match_template, unify, TemplateMatch};

#[cfg(test)]
mod tests;
