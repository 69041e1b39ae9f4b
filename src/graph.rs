//! The resolved output model.
//!
//! A [ResolvedComponent] is created exactly once, when every claim of its
//! declaration has been satisfied, and never mutated afterwards. The one
//! exception is the finalization pass that patches deferred references to
//! indices once the whole graph exists.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::declare::{tags_match, ClaimKind, ComponentDeclaration, DeclId, DependencyClaim};
use crate::emit::{batches, Batch};
use crate::types::{TagSet, TypeExpr};

/// Reference to another component: by initialization index, or deferred by
/// declaration identity until the graph is complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentRef {
    Resolved(usize),
    Deferred(DeclId),
}

impl ComponentRef {
    pub fn index(&self) -> Option<usize> {
        match self {
            ComponentRef::Resolved(index) => Some(*index),
            ComponentRef::Deferred(_) => None,
        }
    }

    fn patched(self, by_decl: &IndexMap<DeclId, usize>) -> ComponentRef {
        match self {
            ComponentRef::Deferred(id) => {
                // Deferral only ever targets a declaration that was in
                // progress on the stack, and the stack drains only once
                // every frame has committed.
                ComponentRef::Resolved(
                    *by_decl
                        .get(&id)
                        .expect("deferred target resolved before finalization"),
                )
            }
            resolved => resolved,
        }
    }
}

/// One element of a collection dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllOfElement {
    pub target: ComponentRef,
    /// The element satisfied the claim through a wrapper unwrap.
    pub wrapped: bool,
}

/// How one claim of a component was satisfied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentDependency {
    /// Direct reference to an already-initialized component.
    Target { claim: DependencyClaim, index: usize },
    /// Direct reference whose value must be unwrapped on access.
    WrappedTarget { claim: DependencyClaim, index: usize },
    /// Deferred handle; carries no ordering requirement.
    PromiseOf {
        claim: DependencyClaim,
        target: ComponentRef,
    },
    /// Snapshot handle; carries no ordering requirement.
    ValueOf {
        claim: DependencyClaim,
        target: ComponentRef,
    },
    /// Every matching component, in declaration order.
    AllOf {
        claim: DependencyClaim,
        elements: Vec<AllOfElement>,
    },
    /// Explicit absence for a nullable claim.
    Null { claim: DependencyClaim },
    /// The type itself; no component involved.
    TypeOf { claim: DependencyClaim },
    /// The lazy handle held by a promised proxy.
    PromisedProxyParam {
        claim: DependencyClaim,
        target: ComponentRef,
    },
}

impl ComponentDependency {
    pub fn claim(&self) -> &DependencyClaim {
        match self {
            ComponentDependency::Target { claim, .. }
            | ComponentDependency::WrappedTarget { claim, .. }
            | ComponentDependency::PromiseOf { claim, .. }
            | ComponentDependency::ValueOf { claim, .. }
            | ComponentDependency::AllOf { claim, .. }
            | ComponentDependency::Null { claim }
            | ComponentDependency::TypeOf { claim }
            | ComponentDependency::PromisedProxyParam { claim, .. } => claim,
        }
    }

    pub(crate) fn patch_deferred(&mut self, by_decl: &IndexMap<DeclId, usize>) {
        match self {
            ComponentDependency::PromiseOf { target, .. }
            | ComponentDependency::ValueOf { target, .. }
            | ComponentDependency::PromisedProxyParam { target, .. } => {
                *target = target.patched(by_decl);
            }
            ComponentDependency::AllOf { elements, .. } => {
                for element in elements {
                    element.target = element.target.patched(by_decl);
                }
            }
            ComponentDependency::Target { .. }
            | ComponentDependency::WrappedTarget { .. }
            | ComponentDependency::Null { .. }
            | ComponentDependency::TypeOf { .. } => {}
        }
    }
}

/// A component with its graph position fixed: the index is the
/// initialization order.
#[derive(Debug, Clone)]
pub struct ResolvedComponent {
    pub index: usize,
    pub declaration: Arc<ComponentDeclaration>,
    pub ty: TypeExpr,
    pub tags: TagSet,
    /// Indices of interceptor components attached to this one.
    pub interceptors: Vec<usize>,
    /// One entry per claim, in original parameter order.
    pub dependencies: Vec<ComponentDependency>,
}

/// The complete, ordered resolution result.
#[derive(Debug, Clone)]
pub struct ResolvedGraph {
    components: Vec<ResolvedComponent>,
    by_decl: IndexMap<DeclId, usize>,
    batch_size: usize,
}

impl ResolvedGraph {
    pub(crate) fn new(
        components: Vec<ResolvedComponent>,
        by_decl: IndexMap<DeclId, usize>,
        batch_size: usize,
    ) -> Self {
        ResolvedGraph {
            components,
            by_decl,
            batch_size,
        }
    }

    pub fn components(&self) -> &[ResolvedComponent] {
        &self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Initialization index of the component backed by a declaration.
    pub fn index_of(&self, decl: DeclId) -> Option<usize> {
        self.by_decl.get(&decl).copied()
    }

    /// First component whose type equals `ty` and whose tags satisfy the
    /// requested set.
    pub fn find(&self, ty: &TypeExpr, tags: &TagSet) -> Option<&ResolvedComponent> {
        self.components
            .iter()
            .find(|c| c.ty == *ty && tags_match(tags, &c.tags))
    }

    /// Partition into fixed-size initialization batches.
    pub fn batches(&self) -> Vec<Batch<'_>> {
        batches(&self.components, self.batch_size)
    }

    /// Check the ordering invariant: every hard dependency references a
    /// strictly lower index; deferred handles are exempt but must have been
    /// patched. Returns violation descriptions, empty when the graph is
    /// well formed.
    pub fn verify(&self) -> Vec<String> {
        let mut violations = Vec::new();
        for component in &self.components {
            for &idx in &component.interceptors {
                if idx >= component.index {
                    violations.push(format!(
                        "component {} has interceptor {} not initialized before it",
                        component.index, idx
                    ));
                }
            }
            for dep in &component.dependencies {
                match dep {
                    ComponentDependency::Target { index, .. }
                    | ComponentDependency::WrappedTarget { index, .. } => {
                        if *index >= component.index {
                            violations.push(format!(
                                "component {} has hard dependency on {} ({})",
                                component.index,
                                index,
                                dep.claim()
                            ));
                        }
                    }
                    ComponentDependency::AllOf { claim, elements } => {
                        for element in elements {
                            match element.target {
                                ComponentRef::Resolved(idx) => {
                                    if claim.kind == ClaimKind::All && idx >= component.index {
                                        violations.push(format!(
                                            "component {} collects {} which is not initialized before it",
                                            component.index, idx
                                        ));
                                    }
                                }
                                ComponentRef::Deferred(id) => violations.push(format!(
                                    "component {} kept an unpatched deferred reference to {id}",
                                    component.index
                                )),
                            }
                        }
                    }
                    ComponentDependency::PromiseOf { target, .. }
                    | ComponentDependency::ValueOf { target, .. }
                    | ComponentDependency::PromisedProxyParam { target, .. } => {
                        if let ComponentRef::Deferred(id) = target {
                            violations.push(format!(
                                "component {} kept an unpatched deferred reference to {id}",
                                component.index
                            ));
                        }
                    }
                    ComponentDependency::Null { .. } | ComponentDependency::TypeOf { .. } => {}
                }
            }
        }
        violations
    }
}
