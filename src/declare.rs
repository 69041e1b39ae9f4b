//! Component declarations and dependency claims.
//!
//! A declaration describes how a component *could* be produced; a claim is a
//! single parameter's request for a dependency. Declarations stay immutable
//! once pooled: template instantiation copies a declaration with parameters
//! substituted rather than mutating it.

use std::fmt;
use std::sync::Arc;

use crate::error::BuildError;
use crate::types::{TagSet, TypeExpr};

/// Stable identity of a pooled declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeclId(pub(crate) u64);

impl fmt::Display for DeclId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Cardinality and indirection of a dependency request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimKind {
    /// Exactly one component.
    One,
    /// One component, or an explicit absent marker.
    NullableOne,
    /// Every matching component, as a collection.
    All,
    /// Every matching component, each behind a value handle.
    AllOfValue,
    /// Every matching component, each behind a promise handle.
    AllOfPromise,
    /// A snapshot handle to one component.
    ValueOf,
    NullableValueOf,
    /// A deferred handle to one component.
    PromiseOf,
    NullablePromiseOf,
    /// The type itself; no component is required.
    TypeRef,
}

impl ClaimKind {
    pub fn is_all(self) -> bool {
        matches!(
            self,
            ClaimKind::All | ClaimKind::AllOfValue | ClaimKind::AllOfPromise
        )
    }

    pub fn is_nullable(self) -> bool {
        matches!(
            self,
            ClaimKind::NullableOne | ClaimKind::NullableValueOf | ClaimKind::NullablePromiseOf
        )
    }

    /// Kinds whose access is deferred and therefore carry no ordering
    /// requirement in the final plan.
    pub fn is_deferred(self) -> bool {
        matches!(
            self,
            ClaimKind::ValueOf
                | ClaimKind::NullableValueOf
                | ClaimKind::PromiseOf
                | ClaimKind::NullablePromiseOf
                | ClaimKind::AllOfValue
                | ClaimKind::AllOfPromise
        )
    }

    fn label(self) -> &'static str {
        match self {
            ClaimKind::One => "one",
            ClaimKind::NullableOne => "nullable",
            ClaimKind::All => "all",
            ClaimKind::AllOfValue => "all-of-value",
            ClaimKind::AllOfPromise => "all-of-promise",
            ClaimKind::ValueOf => "value-of",
            ClaimKind::NullableValueOf => "nullable-value-of",
            ClaimKind::PromiseOf => "promise-of",
            ClaimKind::NullablePromiseOf => "nullable-promise-of",
            ClaimKind::TypeRef => "type-ref",
        }
    }
}

/// One parameter's dependency request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyClaim {
    pub ty: TypeExpr,
    pub tags: TagSet,
    pub kind: ClaimKind,
}

impl DependencyClaim {
    pub fn new(kind: ClaimKind, ty: TypeExpr) -> Self {
        DependencyClaim {
            ty,
            tags: TagSet::new(),
            kind,
        }
    }

    pub fn one(ty: TypeExpr) -> Self {
        Self::new(ClaimKind::One, ty)
    }

    pub fn nullable(ty: TypeExpr) -> Self {
        Self::new(ClaimKind::NullableOne, ty)
    }

    pub fn all(ty: TypeExpr) -> Self {
        Self::new(ClaimKind::All, ty)
    }

    pub fn all_of_value(ty: TypeExpr) -> Self {
        Self::new(ClaimKind::AllOfValue, ty)
    }

    pub fn all_of_promise(ty: TypeExpr) -> Self {
        Self::new(ClaimKind::AllOfPromise, ty)
    }

    pub fn value_of(ty: TypeExpr) -> Self {
        Self::new(ClaimKind::ValueOf, ty)
    }

    pub fn promise_of(ty: TypeExpr) -> Self {
        Self::new(ClaimKind::PromiseOf, ty)
    }

    pub fn type_ref(ty: TypeExpr) -> Self {
        Self::new(ClaimKind::TypeRef, ty)
    }

    pub fn tagged<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tags(mut self, tags: TagSet) -> Self {
        self.tags = tags;
        self
    }
}

impl fmt::Display for DependencyClaim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.label(), self.ty)?;
        if !self.tags.is_empty() {
            write!(f, " [")?;
            for (i, tag) in self.tags.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{tag}")?;
            }
            write!(f, "]")?;
        }
        Ok(())
    }
}

/// Tag policy: an untagged claim matches only untagged declarations; a
/// tagged claim matches declarations carrying at least its tags.
pub fn tags_match(requested: &TagSet, declared: &TagSet) -> bool {
    if requested.is_empty() {
        declared.is_empty()
    } else {
        requested.is_subset(declared)
    }
}

/// Where a declaration came from. The set is closed; every consumer matches
/// exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationOrigin {
    /// A class with a usable public constructor.
    ClassConstructor,
    /// A module factory method.
    ModuleMethod,
    /// Synthesized to break a dependency cycle.
    PromisedProxy,
    /// Synthesized to satisfy an optional-shaped claim.
    OptionalWrapper,
    /// Supplied by an extension hook.
    Extension,
}

/// An immutable description of a producible component.
#[derive(Debug, Clone)]
pub struct ComponentDeclaration {
    pub id: DeclId,
    pub ty: TypeExpr,
    pub tags: TagSet,
    pub origin: DeclarationOrigin,
    /// Non-empty for templates; instantiation clears it.
    pub type_params: Vec<String>,
    pub claims: Vec<DependencyClaim>,
    pub is_interceptor: bool,
    /// Lowest priority when several candidates tie.
    pub is_default: bool,
}

impl ComponentDeclaration {
    /// A fresh declaration; the id is assigned when it enters a pool.
    pub fn new(origin: DeclarationOrigin, ty: TypeExpr) -> Self {
        ComponentDeclaration {
            id: DeclId(0),
            ty,
            tags: TagSet::new(),
            origin,
            type_params: Vec::new(),
            claims: Vec::new(),
            is_interceptor: false,
            is_default: false,
        }
    }

    pub fn tagged<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_claim(mut self, claim: DependencyClaim) -> Self {
        self.claims.push(claim);
        self
    }

    pub fn with_claims(mut self, claims: Vec<DependencyClaim>) -> Self {
        self.claims = claims;
        self
    }

    pub fn template<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.type_params = params.into_iter().map(Into::into).collect();
        self
    }

    pub fn default_candidate(mut self) -> Self {
        self.is_default = true;
        self
    }

    pub fn interceptor(mut self) -> Self {
        self.is_interceptor = true;
        self
    }

    pub fn is_template(&self) -> bool {
        !self.type_params.is_empty()
    }

    fn validate(&self) -> Result<(), String> {
        let mut free = self.ty.free_params();
        for claim in &self.claims {
            free.append(&mut claim.ty.free_params());
        }
        if self.is_template() {
            for param in &self.type_params {
                if !free.contains(param) {
                    return Err(format!(
                        "template parameter {param} of {} is never used",
                        self.ty
                    ));
                }
            }
            for name in &free {
                if !self.type_params.contains(name) {
                    return Err(format!("{} references undeclared parameter {name}", self.ty));
                }
            }
        } else if !free.is_empty() {
            return Err(format!(
                "{} is not a template but has free parameters",
                self.ty
            ));
        }
        Ok(())
    }
}

/// The live declaration universe: concrete producers and templates, in
/// declaration order. Cloned wholesale when the engine forks.
#[derive(Debug, Clone, Default)]
pub struct DeclarationPools {
    next_id: u64,
    concrete: Vec<Arc<ComponentDeclaration>>,
    templates: Vec<Arc<ComponentDeclaration>>,
}

impl DeclarationPools {
    /// Validate, assign an id, and route to the right pool.
    pub fn add(
        &mut self,
        mut decl: ComponentDeclaration,
    ) -> Result<Arc<ComponentDeclaration>, BuildError> {
        decl.validate().map_err(BuildError::InvalidDeclaration)?;
        decl.id = self.reserve_id();
        let decl = Arc::new(decl);
        if decl.is_template() {
            self.templates.push(decl.clone());
        } else {
            self.concrete.push(decl.clone());
        }
        Ok(decl)
    }

    /// Hand out an id without pooling; proxies live outside the candidate
    /// pools so they are only ever reached through a cycle point.
    pub(crate) fn reserve_id(&mut self) -> DeclId {
        self.next_id += 1;
        DeclId(self.next_id)
    }

    pub fn concrete(&self) -> &[Arc<ComponentDeclaration>] {
        &self.concrete
    }

    pub fn templates(&self) -> &[Arc<ComponentDeclaration>] {
        &self.templates
    }

    pub fn find(&self, id: DeclId) -> Option<&Arc<ComponentDeclaration>> {
        self.concrete
            .iter()
            .chain(&self.templates)
            .find(|d| d.id == id)
    }
}
