//! The resolution engine.
//!
//! Resolution runs over an explicit frame stack rather than the call stack:
//! graphs can be arbitrarily deep, and template ambiguity is explored by
//! forking the whole engine state. At every moment the stack is the ancestor
//! chain of the frame being advanced (a parked frame is always waiting on
//! the frames above it), which is what makes in-progress detection a plain
//! stack scan.
//!
//! Each claim is tried against a fixed strategy ladder, first hit wins:
//! collection claims, type references, already-resolved components, declared
//! but unresolved components, templates, nullable absence, optional-shape
//! synthesis, constructor auto-synthesis, extension hooks, and finally a
//! diagnostic failure carrying the live chain.

use std::sync::Arc;

use indexmap::IndexMap;
use itertools::Itertools;
use tracing::{debug, trace};

use crate::declare::{
    tags_match, ClaimKind, ComponentDeclaration, DeclId, DeclarationOrigin, DeclarationPools,
    DependencyClaim,
};
use crate::emit::BATCH_SIZE;
use crate::error::{
    BuildError, CircularDependency, ClaimTrace, DuplicateDependency, UnresolvedDependency,
};
use crate::ext::{ExtensionResolver, HintSource};
use crate::graph::{
    AllOfElement, ComponentDependency, ComponentRef, ResolvedComponent, ResolvedGraph,
};
use crate::proxy::{breakable, proxy_declaration, ProxyMemo};
use crate::types::{MatchKind, Openness, Substitution, TypeCatalog, TypeExpr};
use crate::unify::{instantiate, match_template, TemplateMatch};

/// Tunables that do not affect resolution outcomes.
#[derive(Debug, Clone)]
pub struct BuilderOptions {
    /// Components per emitted batch.
    pub batch_size: usize,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        BuilderOptions {
            batch_size: BATCH_SIZE,
        }
    }
}

/// A unit of pending work.
#[derive(Debug, Clone)]
enum Frame {
    /// An entry in the root list that may still need a component frame.
    Root(usize),
    Component(ComponentFrame),
}

/// A declaration mid-resolution: the claims satisfied so far and a cursor
/// into the remaining ones.
#[derive(Debug, Clone)]
struct ComponentFrame {
    decl: Arc<ComponentDeclaration>,
    cursor: usize,
    deps: Vec<ComponentDependency>,
}

impl ComponentFrame {
    fn new(decl: Arc<ComponentDeclaration>) -> Self {
        ComponentFrame {
            decl,
            cursor: 0,
            deps: Vec::new(),
        }
    }
}

/// Outcome of one claim attempt.
enum ClaimOutcome {
    /// The claim is satisfied; advance the cursor.
    Done(ComponentDependency),
    /// Park the current frame and resolve these first, then retry the claim.
    Park(Vec<ComponentFrame>),
    /// A fork won and this engine adopted its entire state.
    Adopted,
}

/// A match candidate awaiting ranking.
struct Candidate<T> {
    value: T,
    kind: MatchKind,
    is_default: bool,
    label: String,
}

/// Ranking shared by every candidate set: exact-type matches are preferred
/// as a set, then non-default declarations within the survivors.
fn shortlist<T>(mut candidates: Vec<Candidate<T>>) -> Vec<Candidate<T>> {
    if candidates.iter().any(|c| c.kind == MatchKind::Exact) {
        candidates.retain(|c| c.kind == MatchKind::Exact);
    }
    if candidates.len() > 1 && candidates.iter().any(|c| !c.is_default) {
        candidates.retain(|c| !c.is_default);
    }
    candidates
}

enum InterceptorStatus {
    Ready(Vec<usize>),
    Pending(Arc<ComponentDeclaration>),
}

/// Ahead-of-time graph builder: declarations and roots in, ordered
/// initialization plan out. The whole build is atomic: it either returns
/// the complete [ResolvedGraph] or the first unrecoverable error.
#[derive(Clone)]
pub struct GraphBuilder {
    options: BuilderOptions,
    catalog: Arc<TypeCatalog>,
    pools: DeclarationPools,
    roots: Vec<Arc<ComponentDeclaration>>,
    extensions: Vec<Arc<dyn ExtensionResolver>>,
    hints: Vec<Arc<dyn HintSource>>,
    stack: Vec<Frame>,
    resolved: Vec<ResolvedComponent>,
    by_decl: IndexMap<DeclId, usize>,
    proxies: ProxyMemo,
}

impl GraphBuilder {
    pub fn new(catalog: TypeCatalog) -> Self {
        GraphBuilder {
            options: BuilderOptions::default(),
            catalog: Arc::new(catalog),
            pools: DeclarationPools::default(),
            roots: Vec::new(),
            extensions: Vec::new(),
            hints: Vec::new(),
            stack: Vec::new(),
            resolved: Vec::new(),
            by_decl: IndexMap::new(),
            proxies: ProxyMemo::default(),
        }
    }

    pub fn with_options(mut self, options: BuilderOptions) -> Self {
        self.options = options;
        self
    }

    /// Register an extension consulted when nothing else matches a claim.
    pub fn extension(mut self, ext: Arc<dyn ExtensionResolver>) -> Self {
        self.extensions.push(ext);
        self
    }

    /// Register a hint source consulted on final failure.
    pub fn hint_source(mut self, hints: Arc<dyn HintSource>) -> Self {
        self.hints.push(hints);
        self
    }

    /// Add a declaration to the universe.
    pub fn declare(&mut self, decl: ComponentDeclaration) -> Result<DeclId, BuildError> {
        Ok(self.pools.add(decl)?.id)
    }

    /// Add a declaration and mark it as a program entry point.
    pub fn declare_root(&mut self, decl: ComponentDeclaration) -> Result<DeclId, BuildError> {
        if decl.is_template() {
            return Err(BuildError::InvalidDeclaration(format!(
                "root {} cannot be a template",
                decl.ty
            )));
        }
        let decl = self.pools.add(decl)?;
        self.roots.push(decl.clone());
        Ok(decl.id)
    }

    /// Mark an already-declared component as a root.
    pub fn mark_root(&mut self, id: DeclId) -> Result<(), BuildError> {
        match self.pools.find(id) {
            Some(decl) if !decl.is_template() => {
                let decl = decl.clone();
                self.roots.push(decl);
                Ok(())
            }
            Some(decl) => Err(BuildError::InvalidDeclaration(format!(
                "root {} cannot be a template",
                decl.ty
            ))),
            None => Err(BuildError::InvalidDeclaration(format!(
                "unknown declaration {id}"
            ))),
        }
    }

    /// Resolve the full graph. Consumes the builder: success and failure
    /// are both terminal.
    pub fn build(mut self) -> Result<ResolvedGraph, BuildError> {
        if self.roots.is_empty() {
            return Err(BuildError::EmptyRoots);
        }
        debug!(roots = self.roots.len(), "starting graph resolution");
        for i in (0..self.roots.len()).rev() {
            self.stack.push(Frame::Root(i));
        }
        self.run_loop()?;
        self.finish()
    }

    fn run_loop(&mut self) -> Result<(), BuildError> {
        while let Some(frame) = self.stack.pop() {
            match frame {
                Frame::Root(i) => {
                    let decl = self.roots[i].clone();
                    if !self.by_decl.contains_key(&decl.id) {
                        self.stack.push(Frame::Component(ComponentFrame::new(decl)));
                    }
                }
                Frame::Component(frame) => self.advance(frame)?,
            }
        }
        Ok(())
    }

    fn advance(&mut self, mut frame: ComponentFrame) -> Result<(), BuildError> {
        if self.by_decl.contains_key(&frame.decl.id) {
            return Ok(());
        }
        while frame.cursor < frame.decl.claims.len() {
            let claim = frame.decl.claims[frame.cursor].clone();
            match self.resolve_claim(&frame, &claim)? {
                ClaimOutcome::Done(dep) => {
                    frame.deps.push(dep);
                    frame.cursor += 1;
                }
                ClaimOutcome::Park(pushes) => {
                    self.stack.push(Frame::Component(frame));
                    for push in pushes {
                        self.stack.push(Frame::Component(push));
                    }
                    return Ok(());
                }
                ClaimOutcome::Adopted => return Ok(()),
            }
        }
        match self.interceptor_status(&frame)? {
            InterceptorStatus::Pending(decl) => {
                self.stack.push(Frame::Component(frame));
                self.stack.push(Frame::Component(ComponentFrame::new(decl)));
            }
            InterceptorStatus::Ready(interceptors) => self.commit(frame, interceptors),
        }
        Ok(())
    }

    fn commit(&mut self, frame: ComponentFrame, interceptors: Vec<usize>) {
        let ComponentFrame { decl, deps, .. } = frame;
        let index = self.resolved.len();
        debug!(component = %decl.ty, index, "resolved component");
        self.by_decl.insert(decl.id, index);
        self.resolved.push(ResolvedComponent {
            index,
            ty: decl.ty.clone(),
            tags: decl.tags.clone(),
            declaration: decl,
            interceptors,
            dependencies: deps,
        });
    }

    fn resolve_claim(
        &mut self,
        frame: &ComponentFrame,
        claim: &DependencyClaim,
    ) -> Result<ClaimOutcome, BuildError> {
        if claim.kind.is_all() {
            return self.resolve_all(frame, claim);
        }
        if claim.kind == ClaimKind::TypeRef {
            trace!(claim = %claim, "claim is a type reference");
            return Ok(ClaimOutcome::Done(ComponentDependency::TypeOf {
                claim: claim.clone(),
            }));
        }
        if let Some(dep) = self.match_resolved(claim)? {
            trace!(claim = %claim, "claim satisfied by resolved component");
            return Ok(ClaimOutcome::Done(dep));
        }
        if let Some(outcome) = self.match_declared(frame, claim)? {
            return Ok(outcome);
        }
        if let Some(outcome) = self.match_templates(frame, claim)? {
            return Ok(outcome);
        }
        if claim.kind.is_nullable() {
            trace!(claim = %claim, "nullable claim resolved as absent");
            return Ok(ClaimOutcome::Done(ComponentDependency::Null {
                claim: claim.clone(),
            }));
        }
        if let Some(outcome) = self.synthesize_optional(claim)? {
            return Ok(outcome);
        }
        if let Some(outcome) = self.auto_construct(claim)? {
            return Ok(outcome);
        }
        if let Some(outcome) = self.consult_extensions(claim)? {
            return Ok(outcome);
        }
        Err(self.unresolved(frame, claim))
    }

    /// Collection claims: every declared matching component, resolved one
    /// at a time, then enumerated in declaration order. Empty is legal.
    fn resolve_all(
        &mut self,
        frame: &ComponentFrame,
        claim: &DependencyClaim,
    ) -> Result<ClaimOutcome, BuildError> {
        let mut elements = Vec::new();
        for decl in self.pools.concrete().to_vec() {
            let Some(kind) = self.match_declaration(claim, &decl) else {
                continue;
            };
            let wrapped = kind == MatchKind::Wrapped;
            if let Some(&index) = self.by_decl.get(&decl.id) {
                elements.push(AllOfElement {
                    target: ComponentRef::Resolved(index),
                    wrapped,
                });
            } else if self.in_progress(decl.id, frame) {
                if claim.kind.is_deferred() {
                    elements.push(AllOfElement {
                        target: ComponentRef::Deferred(decl.id),
                        wrapped,
                    });
                } else {
                    let index = self.break_cycle(frame, claim, &decl)?;
                    elements.push(AllOfElement {
                        target: ComponentRef::Resolved(index),
                        wrapped: false,
                    });
                }
            } else {
                return Ok(ClaimOutcome::Park(vec![ComponentFrame::new(decl)]));
            }
        }
        trace!(claim = %claim, count = elements.len(), "collection claim satisfied");
        Ok(ClaimOutcome::Done(ComponentDependency::AllOf {
            claim: claim.clone(),
            elements,
        }))
    }

    /// Candidates among already-resolved components.
    fn match_resolved(
        &self,
        claim: &DependencyClaim,
    ) -> Result<Option<ComponentDependency>, BuildError> {
        let mut candidates = Vec::new();
        for component in &self.resolved {
            // Proxies substitute at cycle points only, never as general
            // candidates: a proxy and its target must not compete.
            if component.declaration.origin == DeclarationOrigin::PromisedProxy {
                continue;
            }
            if !tags_match(&claim.tags, &component.tags) {
                continue;
            }
            let Some(kind) = self.catalog.match_produced(&claim.ty, &component.ty) else {
                continue;
            };
            if claim.kind.is_deferred() && kind == MatchKind::Wrapped {
                continue;
            }
            candidates.push(Candidate {
                value: (component.index, kind),
                kind,
                is_default: component.declaration.is_default,
                label: component.ty.to_string(),
            });
        }
        let mut survivors = shortlist(candidates);
        match survivors.len() {
            0 => Ok(None),
            1 => {
                let (index, kind) = survivors.remove(0).value;
                Ok(Some(self.single_dep(claim, index, kind)))
            }
            _ => Err(self.duplicate(claim, &survivors)),
        }
    }

    /// Candidates among declared but not yet resolved components. This is
    /// where cycles surface: the winner may be a frame already in progress.
    fn match_declared(
        &mut self,
        frame: &ComponentFrame,
        claim: &DependencyClaim,
    ) -> Result<Option<ClaimOutcome>, BuildError> {
        let mut candidates = Vec::new();
        for decl in self.pools.concrete() {
            if self.by_decl.contains_key(&decl.id) {
                continue;
            }
            let Some(kind) = self.match_declaration(claim, decl) else {
                continue;
            };
            candidates.push(Candidate {
                value: decl.clone(),
                kind,
                is_default: decl.is_default,
                label: decl.ty.to_string(),
            });
        }
        let mut survivors = shortlist(candidates);
        match survivors.len() {
            0 => Ok(None),
            1 => {
                let decl = survivors.remove(0).value;
                if self.in_progress(decl.id, frame) {
                    if claim.kind.is_deferred() {
                        trace!(claim = %claim, target = %decl.ty, "deferred handle to in-progress component");
                        return Ok(Some(ClaimOutcome::Done(self.deferred_dep(claim, decl.id))));
                    }
                    let index = self.break_cycle(frame, claim, &decl)?;
                    return Ok(Some(ClaimOutcome::Done(ComponentDependency::Target {
                        claim: claim.clone(),
                        index,
                    })));
                }
                trace!(claim = %claim, target = %decl.ty, "resolving declared component first");
                Ok(Some(ClaimOutcome::Park(vec![ComponentFrame::new(decl)])))
            }
            _ => Err(self.duplicate(claim, &survivors)),
        }
    }

    /// Template candidates. A single survivor instantiates in place;
    /// residual ambiguity forks the entire engine per candidate.
    fn match_templates(
        &mut self,
        frame: &ComponentFrame,
        claim: &DependencyClaim,
    ) -> Result<Option<ClaimOutcome>, BuildError> {
        let mut candidates = Vec::new();
        for template in self.pools.templates() {
            if !tags_match(&claim.tags, &template.tags) {
                continue;
            }
            let Some(m) = match_template(&self.catalog, template, &claim.ty) else {
                continue;
            };
            let kind = if m.exact {
                MatchKind::Exact
            } else {
                MatchKind::Assignable
            };
            candidates.push(Candidate {
                value: (template.clone(), m),
                kind,
                is_default: template.is_default,
                label: template.ty.to_string(),
            });
        }
        let mut survivors = shortlist(candidates);
        match survivors.len() {
            0 => Ok(None),
            1 => {
                let (template, m) = survivors.remove(0).value;
                let decl = self.pools.add(instantiate(&template, &m))?;
                debug!(template = %template.ty, instance = %decl.ty, "instantiated template");
                Ok(Some(ClaimOutcome::Park(vec![ComponentFrame::new(decl)])))
            }
            _ => {
                let forks = survivors.into_iter().map(|c| c.value).collect();
                self.fork_templates(frame, claim, forks).map(Some)
            }
        }
    }

    /// Explore template ambiguity: one deep, independent copy of the whole
    /// engine per candidate, run to completion. Exactly one fork may
    /// succeed; a failing fork never touches this engine's state.
    fn fork_templates(
        &mut self,
        frame: &ComponentFrame,
        claim: &DependencyClaim,
        candidates: Vec<(Arc<ComponentDeclaration>, TemplateMatch)>,
    ) -> Result<ClaimOutcome, BuildError> {
        debug!(claim = %claim, forks = candidates.len(), "forking on ambiguous templates");
        let mut winners: Vec<(String, GraphBuilder)> = Vec::new();
        let mut failures: Vec<BuildError> = Vec::new();
        for (template, m) in candidates {
            let mut fork = self.clone();
            match fork.pools.add(instantiate(&template, &m)) {
                Err(err) => failures.push(err),
                Ok(decl) => {
                    fork.stack.push(Frame::Component(frame.clone()));
                    fork.stack.push(Frame::Component(ComponentFrame::new(decl)));
                    match fork.run_loop() {
                        Ok(()) => winners.push((template.ty.to_string(), fork)),
                        Err(err) => failures.push(err),
                    }
                }
            }
        }
        if winners.len() == 1 {
            let (label, winner) = winners.remove(0);
            debug!(template = %label, "adopted successful fork");
            *self = winner;
            return Ok(ClaimOutcome::Adopted);
        }
        if winners.is_empty() {
            return Err(match failures.into_iter().next() {
                Some(err) => err,
                None => self.unresolved(frame, claim),
            });
        }
        Err(BuildError::Duplicate(DuplicateDependency {
            claim: claim.clone(),
            candidates: winners.into_iter().map(|(label, _)| label).collect(),
        }))
    }

    /// Optional-shaped claims synthesize a wrapper over a nullable claim
    /// for the inner type.
    fn synthesize_optional(
        &mut self,
        claim: &DependencyClaim,
    ) -> Result<Option<ClaimOutcome>, BuildError> {
        let Some(inner) = self.catalog.as_optional(&claim.ty) else {
            return Ok(None);
        };
        let inner_claim = DependencyClaim::nullable(inner.clone()).with_tags(claim.tags.clone());
        let decl = ComponentDeclaration::new(DeclarationOrigin::OptionalWrapper, claim.ty.clone())
            .with_claim(inner_claim)
            .tagged(claim.tags.clone());
        let decl = self.pools.add(decl)?;
        debug!(component = %decl.ty, "synthesized optional wrapper");
        Ok(Some(ClaimOutcome::Park(vec![ComponentFrame::new(decl)])))
    }

    /// Concrete class types with a usable public constructor synthesize
    /// their own declaration.
    fn auto_construct(
        &mut self,
        claim: &DependencyClaim,
    ) -> Result<Option<ClaimOutcome>, BuildError> {
        if !claim.tags.is_empty() || !claim.ty.is_ground() {
            return Ok(None);
        }
        let TypeExpr::Named { name, args } = &claim.ty else {
            return Ok(None);
        };
        let Some(info) = self.catalog.get(name) else {
            return Ok(None);
        };
        if info.openness == Openness::Interface || info.params.len() != args.len() {
            return Ok(None);
        }
        let Some(ctor) = info.constructor.clone() else {
            return Ok(None);
        };
        let subst: Substitution = info
            .params
            .iter()
            .cloned()
            .zip(args.iter().cloned())
            .collect();
        let claims = ctor
            .iter()
            .map(|c| DependencyClaim {
                ty: c.ty.substitute(&subst),
                tags: c.tags.clone(),
                kind: c.kind,
            })
            .collect();
        let decl = ComponentDeclaration::new(DeclarationOrigin::ClassConstructor, claim.ty.clone())
            .with_claims(claims);
        let decl = self.pools.add(decl)?;
        debug!(component = %decl.ty, "synthesized constructor declaration");
        Ok(Some(ClaimOutcome::Park(vec![ComponentFrame::new(decl)])))
    }

    /// Last resort before failure: ask each extension to synthesize a
    /// declaration. A synthesized declaration only enters the pool when it
    /// can actually satisfy the claim, keeping idempotent extensions from
    /// growing the pool on every retry.
    fn consult_extensions(
        &mut self,
        claim: &DependencyClaim,
    ) -> Result<Option<ClaimOutcome>, BuildError> {
        for ext in self.extensions.clone() {
            let Some(mut candidate) = ext.resolve(&claim.ty, &claim.tags) else {
                continue;
            };
            candidate.origin = DeclarationOrigin::Extension;
            let useful = if candidate.is_template() {
                match_template(&self.catalog, &candidate, &claim.ty).is_some()
            } else {
                self.match_declaration(claim, &candidate).is_some()
            };
            if !useful {
                continue;
            }
            let decl = self.pools.add(candidate)?;
            debug!(component = %decl.ty, "extension synthesized declaration");
            return Ok(Some(ClaimOutcome::Park(Vec::new())));
        }
        Ok(None)
    }

    /// Type and tag satisfaction of a claim by one concrete declaration.
    fn match_declaration(
        &self,
        claim: &DependencyClaim,
        decl: &ComponentDeclaration,
    ) -> Option<MatchKind> {
        if decl.is_template() || !tags_match(&claim.tags, &decl.tags) {
            return None;
        }
        let kind = self.catalog.match_produced(&claim.ty, &decl.ty)?;
        if claim.kind.is_deferred() && kind == MatchKind::Wrapped {
            return None;
        }
        Some(kind)
    }

    fn single_dep(
        &self,
        claim: &DependencyClaim,
        index: usize,
        kind: MatchKind,
    ) -> ComponentDependency {
        match claim.kind {
            ClaimKind::PromiseOf | ClaimKind::NullablePromiseOf => ComponentDependency::PromiseOf {
                claim: claim.clone(),
                target: ComponentRef::Resolved(index),
            },
            ClaimKind::ValueOf | ClaimKind::NullableValueOf => ComponentDependency::ValueOf {
                claim: claim.clone(),
                target: ComponentRef::Resolved(index),
            },
            _ if kind == MatchKind::Wrapped => ComponentDependency::WrappedTarget {
                claim: claim.clone(),
                index,
            },
            _ => ComponentDependency::Target {
                claim: claim.clone(),
                index,
            },
        }
    }

    fn deferred_dep(&self, claim: &DependencyClaim, target: DeclId) -> ComponentDependency {
        match claim.kind {
            ClaimKind::ValueOf | ClaimKind::NullableValueOf => ComponentDependency::ValueOf {
                claim: claim.clone(),
                target: ComponentRef::Deferred(target),
            },
            _ => ComponentDependency::PromiseOf {
                claim: claim.clone(),
                target: ComponentRef::Deferred(target),
            },
        }
    }

    /// Whether a declaration has an open frame on the stack.
    fn in_progress(&self, id: DeclId, frame: &ComponentFrame) -> bool {
        frame.decl.id == id
            || self.stack.iter().any(|f| match f {
                Frame::Component(cf) => cf.decl.id == id,
                Frame::Root(_) => false,
            })
    }

    /// Substitute a memoized promised proxy for a direct reference at a
    /// cycle point, or fail when the requested type cannot be subtyped.
    fn break_cycle(
        &mut self,
        frame: &ComponentFrame,
        claim: &DependencyClaim,
        target: &Arc<ComponentDeclaration>,
    ) -> Result<usize, BuildError> {
        if !breakable(&self.catalog, &claim.ty) {
            return Err(BuildError::Circular(CircularDependency {
                chain: self.cycle_chain(frame, target),
            }));
        }
        if let Some(decl) = self.proxies.get(&claim.ty, &claim.tags) {
            let decl = decl.clone();
            if let Some(&index) = self.by_decl.get(&decl.id) {
                return Ok(index);
            }
            return Ok(self.commit_proxy(decl, target.id));
        }
        let id = self.pools.reserve_id();
        let decl = Arc::new(proxy_declaration(id, &claim.ty, &claim.tags));
        self.proxies
            .insert(claim.ty.clone(), claim.tags.clone(), decl.clone());
        debug!(requested = %claim.ty, target = %target.ty, "breaking cycle with promised proxy");
        Ok(self.commit_proxy(decl, target.id))
    }

    /// A proxy resolves immediately: its only dependency is a deferred
    /// handle to the cyclic target, patched once the graph is complete.
    fn commit_proxy(&mut self, decl: Arc<ComponentDeclaration>, target: DeclId) -> usize {
        let index = self.resolved.len();
        self.by_decl.insert(decl.id, index);
        self.resolved.push(ResolvedComponent {
            index,
            ty: decl.ty.clone(),
            tags: decl.tags.clone(),
            interceptors: Vec::new(),
            dependencies: vec![ComponentDependency::PromisedProxyParam {
                claim: decl.claims[0].clone(),
                target: ComponentRef::Deferred(target),
            }],
            declaration: decl,
        });
        index
    }

    /// Interceptors matching the finished component, resolved as ordinary
    /// components before the target commits.
    fn interceptor_status(
        &self,
        frame: &ComponentFrame,
    ) -> Result<InterceptorStatus, BuildError> {
        if frame.decl.is_interceptor || frame.decl.origin == DeclarationOrigin::PromisedProxy {
            return Ok(InterceptorStatus::Ready(Vec::new()));
        }
        let mut found = Vec::new();
        for decl in self.pools.concrete() {
            if !decl.is_interceptor {
                continue;
            }
            let Some(target) = self.catalog.interceptor_target(&decl.ty) else {
                continue;
            };
            if !self.catalog.assignable(target, &frame.decl.ty) {
                continue;
            }
            match self.by_decl.get(&decl.id) {
                Some(&index) => found.push(index),
                None => {
                    if self.in_progress(decl.id, frame) {
                        return Err(BuildError::Circular(CircularDependency {
                            chain: self.cycle_chain(frame, decl),
                        }));
                    }
                    return Ok(InterceptorStatus::Pending(decl.clone()));
                }
            }
        }
        Ok(InterceptorStatus::Ready(found))
    }

    fn duplicate<T>(&self, claim: &DependencyClaim, survivors: &[Candidate<T>]) -> BuildError {
        BuildError::Duplicate(DuplicateDependency {
            claim: claim.clone(),
            candidates: survivors.iter().map(|c| c.label.clone()).collect(),
        })
    }

    fn unresolved(&self, frame: &ComponentFrame, claim: &DependencyClaim) -> BuildError {
        let hints = self
            .hints
            .iter()
            .flat_map(|h| h.hints(&claim.ty, &claim.tags))
            .collect_vec();
        BuildError::Unresolved(UnresolvedDependency {
            claim: claim.clone(),
            chain: self.trace_chain(frame, Some(claim)),
            hints,
        })
    }

    /// The live causal chain, outermost first.
    fn trace_chain(
        &self,
        frame: &ComponentFrame,
        failing: Option<&DependencyClaim>,
    ) -> Vec<ClaimTrace> {
        let mut chain: Vec<ClaimTrace> = self
            .stack
            .iter()
            .filter_map(|f| match f {
                Frame::Component(cf) => Some(ClaimTrace {
                    component: cf.decl.ty.clone(),
                    claim: cf.decl.claims.get(cf.cursor).cloned(),
                }),
                Frame::Root(_) => None,
            })
            .collect();
        chain.push(ClaimTrace {
            component: frame.decl.ty.clone(),
            claim: failing.cloned(),
        });
        chain
    }

    /// The cycle path: from the re-entered frame through the current one,
    /// closing on the re-entered type.
    fn cycle_chain(
        &self,
        frame: &ComponentFrame,
        target: &Arc<ComponentDeclaration>,
    ) -> Vec<TypeExpr> {
        let mut chain = Vec::new();
        let mut entered = false;
        for f in &self.stack {
            if let Frame::Component(cf) = f {
                if cf.decl.id == target.id {
                    entered = true;
                }
                if entered {
                    chain.push(cf.decl.ty.clone());
                }
            }
        }
        chain.push(frame.decl.ty.clone());
        chain.push(target.ty.clone());
        chain
    }

    /// Patch deferred references now that every declaration has an index,
    /// then seal the result.
    fn finish(self) -> Result<ResolvedGraph, BuildError> {
        let by_decl = self.by_decl;
        let mut components = self.resolved;
        for component in &mut components {
            for dep in &mut component.dependencies {
                dep.patch_deferred(&by_decl);
            }
        }
        debug!(components = components.len(), "graph resolution finished");
        Ok(ResolvedGraph::new(
            components,
            by_decl,
            self.options.batch_size,
        ))
    }
}
