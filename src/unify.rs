//! Structural unification for template matching.
//!
//! A template declaration produces a type with free parameters. Matching a
//! ground claim type against it is a recursive descent over the two trees,
//! binding parameters as they are encountered and rejecting on any
//! structural mismatch or conflicting binding. Assignable matches go through
//! the catalog's supertype patterns, which keeps the "exactly equal beats
//! merely assignable" ranking observable by the caller.

use crate::declare::{ComponentDeclaration, DeclId, DependencyClaim};
use crate::types::{Substitution, TypeCatalog, TypeExpr};

/// A successful match of a claim type against a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateMatch {
    pub substitution: Substitution,
    /// True when the substituted produced type equals the claim type, false
    /// when the match went through a supertype pattern.
    pub exact: bool,
}

/// Unify a pattern (which may contain free parameters) against a ground
/// type, producing the parameter bindings.
pub fn unify(pattern: &TypeExpr, ground: &TypeExpr) -> Option<Substitution> {
    let mut subst = Substitution::new();
    unify_into(pattern, ground, &mut subst).then_some(subst)
}

fn unify_into(pattern: &TypeExpr, ground: &TypeExpr, subst: &mut Substitution) -> bool {
    match (pattern, ground) {
        (TypeExpr::Param(name), _) => {
            if !ground.is_ground() {
                return false;
            }
            match subst.get(name) {
                Some(bound) => bound == ground,
                None => {
                    subst.insert(name.clone(), ground.clone());
                    true
                }
            }
        }
        (
            TypeExpr::Named { name: pn, args: pa },
            TypeExpr::Named { name: gn, args: ga },
        ) => {
            pn == gn
                && pa.len() == ga.len()
                && pa
                    .iter()
                    .zip(ga.iter())
                    .all(|(p, g)| unify_into(p, g, subst))
        }
        (TypeExpr::Named { .. }, TypeExpr::Param(_)) => false,
    }
}

/// Match a ground claim type against a template declaration.
///
/// Tries the produced type directly, then each declared supertype pattern.
/// A match is rejected unless every declared parameter ends up bound: an
/// unbound parameter would leak into the instantiated copy's claims.
pub fn match_template(
    catalog: &TypeCatalog,
    template: &ComponentDeclaration,
    claim_ty: &TypeExpr,
) -> Option<TemplateMatch> {
    if !template.is_template() || !claim_ty.is_ground() {
        return None;
    }
    if let Some(substitution) = unify(&template.ty, claim_ty) {
        if fully_bound(template, &substitution) {
            return Some(TemplateMatch {
                substitution,
                exact: true,
            });
        }
    }
    for sup in catalog.supertype_patterns(&template.ty) {
        if let Some(substitution) = unify_assignable(catalog, &sup, claim_ty) {
            if fully_bound(template, &substitution) {
                return Some(TemplateMatch {
                    substitution,
                    exact: false,
                });
            }
        }
    }
    None
}

fn unify_assignable(
    catalog: &TypeCatalog,
    pattern: &TypeExpr,
    claim_ty: &TypeExpr,
) -> Option<Substitution> {
    if let Some(subst) = unify(pattern, claim_ty) {
        return Some(subst);
    }
    for sup in catalog.supertype_patterns(pattern) {
        if let Some(subst) = unify_assignable(catalog, &sup, claim_ty) {
            return Some(subst);
        }
    }
    None
}

fn fully_bound(template: &ComponentDeclaration, subst: &Substitution) -> bool {
    template.type_params.iter().all(|p| subst.contains_key(p))
}

/// Copy a template with its parameters substituted, yielding a concrete
/// declaration ready for pooling.
pub fn instantiate(template: &ComponentDeclaration, m: &TemplateMatch) -> ComponentDeclaration {
    ComponentDeclaration {
        id: DeclId(0),
        ty: template.ty.substitute(&m.substitution),
        tags: template.tags.clone(),
        origin: template.origin,
        type_params: Vec::new(),
        claims: template
            .claims
            .iter()
            .map(|c| DependencyClaim {
                ty: c.ty.substitute(&m.substitution),
                tags: c.tags.clone(),
                kind: c.kind,
            })
            .collect(),
        is_interceptor: template.is_interceptor,
        is_default: template.is_default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declare::DeclarationOrigin;

    fn ty(input: &str) -> TypeExpr {
        TypeExpr::parse(input).expect("test type")
    }

    #[test]
    fn unify_binds_parameter() {
        let subst = unify(&TypeExpr::param("T"), &ty("Int")).unwrap();
        assert_eq!(subst.get("T"), Some(&ty("Int")));
    }

    #[test]
    fn unify_nested_generics() {
        let pattern = TypeExpr::generic(
            "Map",
            vec![
                TypeExpr::named("String"),
                TypeExpr::generic("List", vec![TypeExpr::param("T")]),
            ],
        );
        let subst = unify(&pattern, &ty("Map<String, List<Int>>")).unwrap();
        assert_eq!(subst.get("T"), Some(&ty("Int")));
    }

    #[test]
    fn unify_rejects_conflicting_bindings() {
        let pattern = TypeExpr::generic(
            "Pair",
            vec![TypeExpr::param("T"), TypeExpr::param("T")],
        );
        assert!(unify(&pattern, &ty("Pair<Int, Int>")).is_some());
        assert!(unify(&pattern, &ty("Pair<Int, String>")).is_none());
    }

    #[test]
    fn unify_rejects_arity_and_name_mismatch() {
        let pattern = TypeExpr::generic("List", vec![TypeExpr::param("T")]);
        assert!(unify(&pattern, &ty("Set<Int>")).is_none());
        assert!(unify(&pattern, &ty("List")).is_none());
    }

    fn box_template() -> ComponentDeclaration {
        ComponentDeclaration::new(
            DeclarationOrigin::ModuleMethod,
            TypeExpr::generic("Box", vec![TypeExpr::param("T")]),
        )
        .template(["T"])
    }

    #[test]
    fn template_match_direct_is_exact() {
        let catalog = TypeCatalog::new();
        let m = match_template(&catalog, &box_template(), &ty("Box<Int>")).unwrap();
        assert!(m.exact);
        assert_eq!(m.substitution.get("T"), Some(&ty("Int")));
    }

    #[test]
    fn template_match_via_supertype_is_not_exact() {
        let catalog = TypeCatalog::new()
            .generic_interface("Source", &["T"])
            .declare_type("Channel", crate::types::Openness::Open, vec!["T".to_string()])
            .implements(
                "Channel",
                TypeExpr::generic("Source", vec![TypeExpr::param("T")]),
            );
        let template = ComponentDeclaration::new(
            DeclarationOrigin::ModuleMethod,
            TypeExpr::generic("Channel", vec![TypeExpr::param("T")]),
        )
        .template(["T"]);

        let m = match_template(&catalog, &template, &ty("Source<Int>")).unwrap();
        assert!(!m.exact);
        assert_eq!(m.substitution.get("T"), Some(&ty("Int")));
    }

    #[test]
    fn template_match_requires_all_parameters_bound() {
        // The claim only determines T; U stays unbound and the match fails.
        let template = ComponentDeclaration::new(
            DeclarationOrigin::ModuleMethod,
            TypeExpr::generic("Box", vec![TypeExpr::param("T")]),
        )
        .with_claim(DependencyClaim::one(TypeExpr::generic(
            "List",
            vec![TypeExpr::param("U")],
        )))
        .template(["T", "U"]);

        let catalog = TypeCatalog::new();
        assert!(match_template(&catalog, &template, &ty("Box<Int>")).is_none());
    }

    #[test]
    fn instantiate_substitutes_claims() {
        let template = ComponentDeclaration::new(
            DeclarationOrigin::ModuleMethod,
            TypeExpr::generic("Box", vec![TypeExpr::param("T")]),
        )
        .with_claim(DependencyClaim::one(TypeExpr::generic(
            "Factory",
            vec![TypeExpr::param("T")],
        )))
        .template(["T"]);

        let catalog = TypeCatalog::new();
        let m = match_template(&catalog, &template, &ty("Box<Int>")).unwrap();
        let inst = instantiate(&template, &m);
        assert_eq!(inst.ty, ty("Box<Int>"));
        assert_eq!(inst.claims[0].ty, ty("Factory<Int>"));
        assert!(!inst.is_template());
    }
}
