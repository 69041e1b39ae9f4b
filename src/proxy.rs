//! Promised-proxy synthesis for cycle breaking.
//!
//! When resolving a claim would re-enter a component already in progress,
//! the engine substitutes a synthesized proxy: a subtype of the requested
//! type holding a deferred handle to the real component, forwarding every
//! access to it once the whole graph is constructed. Proxies are memoized
//! per canonical type+tag identity and live outside the candidate pools, so
//! they are only ever reached through a cycle point.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::declare::{
    ComponentDeclaration, DeclId, DeclarationOrigin, DependencyClaim,
};
use crate::types::{TagSet, TypeCatalog, TypeExpr};

/// Memoized proxy declarations, keyed by canonical type+tag identity.
/// Owned by the engine instance so fork isolation holds.
#[derive(Debug, Clone, Default)]
pub(crate) struct ProxyMemo {
    entries: IndexMap<(TypeExpr, TagSet), Arc<ComponentDeclaration>>,
}

impl ProxyMemo {
    pub fn get(&self, ty: &TypeExpr, tags: &TagSet) -> Option<&Arc<ComponentDeclaration>> {
        self.entries.get(&(ty.clone(), tags.clone()))
    }

    pub fn insert(&mut self, ty: TypeExpr, tags: TagSet, decl: Arc<ComponentDeclaration>) {
        self.entries.insert((ty, tags), decl);
    }
}

/// A cycle is breakable only when the requested type can be subtyped.
pub(crate) fn breakable(catalog: &TypeCatalog, requested: &TypeExpr) -> bool {
    catalog.proxyable(requested)
}

/// Build the proxy declaration: same produced type and tags as the request,
/// with a single promise claim through which the real component is reached.
pub(crate) fn proxy_declaration(
    id: DeclId,
    requested: &TypeExpr,
    tags: &TagSet,
) -> ComponentDeclaration {
    let mut decl = ComponentDeclaration::new(DeclarationOrigin::PromisedProxy, requested.clone());
    decl.id = id;
    decl.tags = tags.clone();
    decl.claims = vec![DependencyClaim::promise_of(requested.clone()).with_tags(tags.clone())];
    decl
}
