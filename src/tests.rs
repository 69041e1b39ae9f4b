use std::sync::Arc;

use pretty_assertions::assert_eq;
use proptest::prelude::*;

use super::*;

fn ty(input: &str) -> TypeExpr {
    TypeExpr::parse(input).expect("test type")
}

fn module(produced: &str) -> ComponentDeclaration {
    ComponentDeclaration::new(DeclarationOrigin::ModuleMethod, ty(produced))
}

#[test]
fn cycle_broken_through_interface() {
    let catalog = TypeCatalog::new()
        .interface("Greeter")
        .open_class("GreeterImpl")
        .implements("GreeterImpl", TypeExpr::named("Greeter"))
        .open_class("Registry");

    let mut builder = GraphBuilder::new(catalog);
    builder
        .declare(module("Registry").with_claim(DependencyClaim::one(ty("Greeter"))))
        .unwrap();
    builder
        .declare_root(module("GreeterImpl").with_claim(DependencyClaim::one(ty("Registry"))))
        .unwrap();

    let graph = builder.build().unwrap();
    assert_eq!(graph.len(), 3);
    assert_eq!(graph.verify(), Vec::<String>::new());

    let proxy = &graph.components()[0];
    assert_eq!(proxy.declaration.origin, DeclarationOrigin::PromisedProxy);
    assert_eq!(proxy.ty, ty("Greeter"));
    match &proxy.dependencies[0] {
        ComponentDependency::PromisedProxyParam { target, .. } => {
            assert_eq!(*target, ComponentRef::Resolved(2));
        }
        other => panic!("unexpected proxy dependency {other:?}"),
    }

    let registry = &graph.components()[1];
    assert_eq!(registry.ty, ty("Registry"));
    match &registry.dependencies[0] {
        ComponentDependency::Target { index, .. } => assert_eq!(*index, 0),
        other => panic!("cycle point should reference the proxy, got {other:?}"),
    }
}

#[test]
fn proxy_is_memoized_per_requested_type() {
    let catalog = TypeCatalog::new()
        .interface("Greeter")
        .open_class("GreeterImpl")
        .implements("GreeterImpl", TypeExpr::named("Greeter"))
        .open_class("Registry")
        .open_class("Auditor");

    let mut builder = GraphBuilder::new(catalog);
    builder
        .declare(module("Registry").with_claim(DependencyClaim::one(ty("Greeter"))))
        .unwrap();
    builder
        .declare(module("Auditor").with_claim(DependencyClaim::one(ty("Greeter"))))
        .unwrap();
    builder
        .declare_root(
            module("GreeterImpl")
                .with_claim(DependencyClaim::one(ty("Registry")))
                .with_claim(DependencyClaim::one(ty("Auditor"))),
        )
        .unwrap();

    let graph = builder.build().unwrap();
    let proxies: Vec<_> = graph
        .components()
        .iter()
        .filter(|c| c.declaration.origin == DeclarationOrigin::PromisedProxy)
        .collect();
    assert_eq!(proxies.len(), 1);

    let target_of = |name: &str| match &graph.find(&ty(name), &TagSet::new()).unwrap().dependencies[0]
    {
        ComponentDependency::Target { index, .. } => *index,
        other => panic!("unexpected dependency {other:?}"),
    };
    assert_eq!(target_of("Registry"), proxies[0].index);
    assert_eq!(target_of("Auditor"), proxies[0].index);
}

#[test]
fn unbreakable_cycle_through_final_class() {
    let catalog = TypeCatalog::new().final_class("Alpha").final_class("Beta");
    let mut builder = GraphBuilder::new(catalog);
    builder
        .declare(module("Beta").with_claim(DependencyClaim::one(ty("Alpha"))))
        .unwrap();
    builder
        .declare_root(module("Alpha").with_claim(DependencyClaim::one(ty("Beta"))))
        .unwrap();

    match builder.build() {
        Err(BuildError::Circular(err)) => {
            assert!(err.chain.contains(&ty("Alpha")));
            assert!(err.chain.contains(&ty("Beta")));
        }
        other => panic!("expected a circular-dependency failure, got {other:?}"),
    }
}

#[test]
fn all_claim_with_no_candidates_is_empty() {
    let mut builder = GraphBuilder::new(TypeCatalog::new());
    builder
        .declare_root(module("Host").with_claim(DependencyClaim::all(ty("Plugin"))))
        .unwrap();

    let graph = builder.build().unwrap();
    assert_eq!(graph.len(), 1);
    match &graph.components()[0].dependencies[0] {
        ComponentDependency::AllOf { elements, .. } => assert!(elements.is_empty()),
        other => panic!("unexpected dependency {other:?}"),
    }
}

#[test]
fn all_claim_collects_direct_and_wrapped_candidates() {
    let mut builder = GraphBuilder::new(TypeCatalog::new());
    builder.declare(module("Config")).unwrap();
    builder.declare(module("Wrapped<Config>")).unwrap();
    builder
        .declare_root(module("Host").with_claim(DependencyClaim::all(ty("Config"))))
        .unwrap();

    let graph = builder.build().unwrap();
    let host = graph.find(&ty("Host"), &TagSet::new()).unwrap();
    match &host.dependencies[0] {
        ComponentDependency::AllOf { elements, .. } => {
            assert_eq!(elements.len(), 2);
            assert!(!elements[0].wrapped);
            assert!(elements[1].wrapped);
            assert_ne!(elements[0].target, elements[1].target);
        }
        other => panic!("unexpected dependency {other:?}"),
    }
}

#[test]
fn optional_claim_synthesizes_wrapper() {
    let mut builder = GraphBuilder::new(TypeCatalog::new());
    builder.declare(module("String")).unwrap();
    builder
        .declare_root(module("App").with_claim(DependencyClaim::one(ty("Optional<String>"))))
        .unwrap();

    let graph = builder.build().unwrap();
    assert_eq!(graph.len(), 3);

    let wrapper = graph.find(&ty("Optional<String>"), &TagSet::new()).unwrap();
    assert_eq!(wrapper.declaration.origin, DeclarationOrigin::OptionalWrapper);
    match &wrapper.dependencies[0] {
        ComponentDependency::Target { index, claim } => {
            assert_eq!(*index, graph.find(&ty("String"), &TagSet::new()).unwrap().index);
            assert_eq!(claim.kind, ClaimKind::NullableOne);
        }
        other => panic!("optional should be present, got {other:?}"),
    }
}

#[test]
fn nullable_claim_with_no_candidate_is_absent() {
    let mut builder = GraphBuilder::new(TypeCatalog::new());
    builder
        .declare_root(module("App").with_claim(DependencyClaim::nullable(ty("Missing"))))
        .unwrap();

    let graph = builder.build().unwrap();
    assert_eq!(graph.len(), 1);
    assert!(matches!(
        graph.components()[0].dependencies[0],
        ComponentDependency::Null { .. }
    ));
}

#[test]
fn ambiguous_templates_are_duplicates() {
    let boxed = TypeExpr::generic("Box", vec![TypeExpr::param("T")]);
    let mut builder = GraphBuilder::new(TypeCatalog::new());
    builder
        .declare(ComponentDeclaration::new(DeclarationOrigin::ModuleMethod, boxed.clone()).template(["T"]))
        .unwrap();
    builder
        .declare(ComponentDeclaration::new(DeclarationOrigin::ModuleMethod, boxed).template(["T"]))
        .unwrap();
    builder
        .declare_root(module("App").with_claim(DependencyClaim::one(ty("Box<Int>"))))
        .unwrap();

    match builder.build() {
        Err(BuildError::Duplicate(err)) => assert_eq!(err.candidates.len(), 2),
        other => panic!("expected a duplicate-candidate failure, got {other:?}"),
    }
}

#[test]
fn failing_fork_leaves_the_survivor() {
    let holder = TypeExpr::generic("Holder", vec![TypeExpr::param("T")]);
    let mut builder = GraphBuilder::new(TypeCatalog::new());
    // This candidate needs a dependency nobody can provide.
    builder
        .declare(
            ComponentDeclaration::new(DeclarationOrigin::ModuleMethod, holder.clone())
                .with_claim(DependencyClaim::one(ty("Missing")))
                .template(["T"]),
        )
        .unwrap();
    builder
        .declare(ComponentDeclaration::new(DeclarationOrigin::ModuleMethod, holder).template(["T"]))
        .unwrap();
    builder
        .declare_root(module("App").with_claim(DependencyClaim::one(ty("Holder<Int>"))))
        .unwrap();

    let graph = builder.build().unwrap();
    assert_eq!(graph.len(), 2);
    let holder = graph.find(&ty("Holder<Int>"), &TagSet::new()).unwrap();
    assert!(holder.dependencies.is_empty());
}

#[test]
fn single_template_instantiates_without_forking() {
    let mut builder = GraphBuilder::new(TypeCatalog::new());
    builder
        .declare(
            ComponentDeclaration::new(
                DeclarationOrigin::ModuleMethod,
                TypeExpr::generic("Cache", vec![TypeExpr::param("T")]),
            )
            .template(["T"]),
        )
        .unwrap();
    builder
        .declare_root(
            module("App")
                .with_claim(DependencyClaim::one(ty("Cache<Int>")))
                .with_claim(DependencyClaim::one(ty("Cache<Int>"))),
        )
        .unwrap();

    let graph = builder.build().unwrap();
    // The instance is pooled, so the second claim reuses it.
    assert_eq!(graph.len(), 2);
}

#[test]
fn default_candidate_yields_to_non_default() {
    let catalog = TypeCatalog::new()
        .interface("Greeter")
        .open_class("ImplA")
        .implements("ImplA", TypeExpr::named("Greeter"))
        .open_class("ImplB")
        .implements("ImplB", TypeExpr::named("Greeter"));

    let mut builder = GraphBuilder::new(catalog);
    builder.declare(module("ImplA")).unwrap();
    builder.declare(module("ImplB").default_candidate()).unwrap();
    builder
        .declare_root(module("App").with_claim(DependencyClaim::one(ty("Greeter"))))
        .unwrap();

    let graph = builder.build().unwrap();
    assert_eq!(graph.len(), 2);
    assert!(graph.find(&ty("ImplA"), &TagSet::new()).is_some());
    assert!(graph.find(&ty("ImplB"), &TagSet::new()).is_none());
}

#[test]
fn equally_ranked_candidates_are_duplicates() {
    let catalog = TypeCatalog::new()
        .interface("Greeter")
        .open_class("ImplA")
        .implements("ImplA", TypeExpr::named("Greeter"))
        .open_class("ImplB")
        .implements("ImplB", TypeExpr::named("Greeter"));

    let mut builder = GraphBuilder::new(catalog);
    builder.declare(module("ImplA")).unwrap();
    builder.declare(module("ImplB")).unwrap();
    builder
        .declare_root(module("App").with_claim(DependencyClaim::one(ty("Greeter"))))
        .unwrap();

    assert!(matches!(builder.build(), Err(BuildError::Duplicate(_))));
}

#[test]
fn exact_match_beats_wrapper() {
    let mut builder = GraphBuilder::new(TypeCatalog::new());
    builder.declare(module("Config")).unwrap();
    builder.declare(module("Wrapped<Config>")).unwrap();
    builder
        .declare_root(module("App").with_claim(DependencyClaim::one(ty("Config"))))
        .unwrap();

    let graph = builder.build().unwrap();
    let app = graph.find(&ty("App"), &TagSet::new()).unwrap();
    assert!(matches!(
        app.dependencies[0],
        ComponentDependency::Target { .. }
    ));
}

#[test]
fn wrapper_satisfies_unwrapped_claim() {
    let mut builder = GraphBuilder::new(TypeCatalog::new());
    builder.declare(module("Wrapped<Config>")).unwrap();
    builder
        .declare_root(module("App").with_claim(DependencyClaim::one(ty("Config"))))
        .unwrap();

    let graph = builder.build().unwrap();
    let app = graph.find(&ty("App"), &TagSet::new()).unwrap();
    match &app.dependencies[0] {
        ComponentDependency::WrappedTarget { index, .. } => {
            assert_eq!(graph.components()[*index].ty, ty("Wrapped<Config>"));
        }
        other => panic!("expected a wrapped reference, got {other:?}"),
    }
}

#[test]
fn tags_partition_the_universe() {
    let mut builder = GraphBuilder::new(TypeCatalog::new());
    builder.declare(module("Config").tagged(["prod"])).unwrap();
    builder
        .declare_root(module("App").with_claim(DependencyClaim::one(ty("Config"))))
        .unwrap();
    assert!(matches!(builder.build(), Err(BuildError::Unresolved(_))));

    let mut builder = GraphBuilder::new(TypeCatalog::new());
    builder.declare(module("Config").tagged(["prod"])).unwrap();
    builder
        .declare_root(module("App").with_claim(DependencyClaim::one(ty("Config")).tagged(["prod"])))
        .unwrap();
    assert_eq!(builder.build().unwrap().len(), 2);
}

#[test]
fn interceptor_is_attached_to_matching_component() {
    let catalog = TypeCatalog::new()
        .interface("Greeter")
        .open_class("GreeterImpl")
        .implements("GreeterImpl", TypeExpr::named("Greeter"));

    let mut builder = GraphBuilder::new(catalog);
    builder.declare(module("GreeterImpl")).unwrap();
    builder
        .declare(module("Interceptor<Greeter>").interceptor())
        .unwrap();
    builder
        .declare_root(module("App").with_claim(DependencyClaim::one(ty("Greeter"))))
        .unwrap();

    let graph = builder.build().unwrap();
    let interceptor = graph.find(&ty("Interceptor<Greeter>"), &TagSet::new()).unwrap();
    let greeter = graph.find(&ty("GreeterImpl"), &TagSet::new()).unwrap();
    assert_eq!(greeter.interceptors, vec![interceptor.index]);
    assert!(interceptor.index < greeter.index);
    // The requesting component is not assignable to Greeter and stays clean.
    let app = graph.find(&ty("App"), &TagSet::new()).unwrap();
    assert!(app.interceptors.is_empty());
}

#[test]
fn promise_claim_defers_and_is_patched() {
    let mut builder = GraphBuilder::new(TypeCatalog::new());
    builder
        .declare(module("Beta").with_claim(DependencyClaim::promise_of(ty("Alpha"))))
        .unwrap();
    builder
        .declare_root(module("Alpha").with_claim(DependencyClaim::one(ty("Beta"))))
        .unwrap();

    let graph = builder.build().unwrap();
    assert_eq!(graph.len(), 2);
    assert_eq!(graph.verify(), Vec::<String>::new());

    let beta = graph.find(&ty("Beta"), &TagSet::new()).unwrap();
    let alpha = graph.find(&ty("Alpha"), &TagSet::new()).unwrap();
    assert!(beta.index < alpha.index);
    match &beta.dependencies[0] {
        // A forward reference: legal because access is deferred.
        ComponentDependency::PromiseOf { target, .. } => {
            assert_eq!(*target, ComponentRef::Resolved(alpha.index));
        }
        other => panic!("unexpected dependency {other:?}"),
    }
}

#[test]
fn constructor_declarations_are_synthesized() {
    let catalog = TypeCatalog::new()
        .final_class("Config")
        .constructor("Config", Vec::new())
        .final_class("Service")
        .constructor("Service", vec![DependencyClaim::one(TypeExpr::named("Config"))]);

    let mut builder = GraphBuilder::new(catalog);
    builder
        .declare_root(module("App").with_claim(DependencyClaim::one(ty("Service"))))
        .unwrap();

    let graph = builder.build().unwrap();
    assert_eq!(graph.len(), 3);
    let service = graph.find(&ty("Service"), &TagSet::new()).unwrap();
    assert_eq!(service.declaration.origin, DeclarationOrigin::ClassConstructor);
    let config = graph.find(&ty("Config"), &TagSet::new()).unwrap();
    assert!(config.index < service.index);
}

struct KnownTypes;

impl ExtensionResolver for KnownTypes {
    fn resolve(&self, requested: &TypeExpr, tags: &TagSet) -> Option<ComponentDeclaration> {
        (requested.head() == Some("External") && tags.is_empty()).then(|| {
            ComponentDeclaration::new(DeclarationOrigin::Extension, requested.clone())
        })
    }
}

#[test]
fn extension_synthesizes_missing_declaration() {
    let mut builder = GraphBuilder::new(TypeCatalog::new()).extension(Arc::new(KnownTypes));
    builder
        .declare_root(module("App").with_claim(DependencyClaim::one(ty("External"))))
        .unwrap();

    let graph = builder.build().unwrap();
    assert_eq!(graph.len(), 2);
    let external = graph.find(&ty("External"), &TagSet::new()).unwrap();
    assert_eq!(external.declaration.origin, DeclarationOrigin::Extension);
}

#[test]
fn hints_enrich_the_failure() {
    let hints = RegexHints::new()
        .suggest("^Database", TagSet::new(), "register the database module")
        .unwrap();
    let mut builder = GraphBuilder::new(TypeCatalog::new()).hint_source(Arc::new(hints));
    builder
        .declare_root(module("App").with_claim(DependencyClaim::one(ty("DatabaseClient"))))
        .unwrap();

    match builder.build() {
        Err(BuildError::Unresolved(err)) => {
            assert_eq!(err.hints, vec!["register the database module".to_string()]);
            assert!(!err.chain.is_empty());
        }
        other => panic!("expected an unresolved failure, got {other:?}"),
    }
}

#[test]
fn empty_root_set_is_rejected() {
    assert!(matches!(
        GraphBuilder::new(TypeCatalog::new()).build(),
        Err(BuildError::EmptyRoots)
    ));
}

#[test]
fn marking_the_same_root_twice_resolves_once() {
    let mut builder = GraphBuilder::new(TypeCatalog::new());
    let id = builder.declare(module("App")).unwrap();
    builder.mark_root(id).unwrap();
    builder.mark_root(id).unwrap();

    let graph = builder.build().unwrap();
    assert_eq!(graph.len(), 1);
    assert_eq!(graph.index_of(id), Some(0));
}

#[test]
fn shared_dependency_resolves_once() {
    let mut builder = GraphBuilder::new(TypeCatalog::new());
    builder.declare(module("Config")).unwrap();
    builder
        .declare(module("Left").with_claim(DependencyClaim::one(ty("Config"))))
        .unwrap();
    builder
        .declare(module("Right").with_claim(DependencyClaim::one(ty("Config"))))
        .unwrap();
    builder
        .declare_root(
            module("App")
                .with_claim(DependencyClaim::one(ty("Left")))
                .with_claim(DependencyClaim::one(ty("Right"))),
        )
        .unwrap();

    let graph = builder.build().unwrap();
    assert_eq!(graph.len(), 4);
    let configs = graph
        .components()
        .iter()
        .filter(|c| c.ty == ty("Config"))
        .count();
    assert_eq!(configs, 1);
}

#[test]
fn independent_roots_fill_batches_in_input_order() {
    let mut builder = GraphBuilder::new(TypeCatalog::new());
    for i in 0..1500 {
        builder.declare_root(module(&format!("Svc{i}"))).unwrap();
    }

    let graph = builder.build().unwrap();
    assert_eq!(graph.len(), 1500);
    assert_eq!(graph.components()[42].ty, ty("Svc42"));

    let batches = graph.batches();
    assert_eq!(batches.len(), 3);
    assert!(batches.iter().all(|b| b.components.len() == BATCH_SIZE));
    assert_eq!(batches[2].components[499].index, 1499);
}

fn demo_builder() -> GraphBuilder {
    let catalog = TypeCatalog::new()
        .interface("Greeter")
        .open_class("GreeterImpl")
        .implements("GreeterImpl", TypeExpr::named("Greeter"))
        .open_class("Registry")
        .final_class("Config")
        .constructor("Config", Vec::new());

    let mut builder = GraphBuilder::new(catalog);
    builder
        .declare(module("Registry").with_claim(DependencyClaim::one(ty("Greeter"))))
        .unwrap();
    builder.declare(module("Wrapped<Config>")).unwrap();
    builder
        .declare_root(
            module("GreeterImpl")
                .with_claim(DependencyClaim::one(ty("Registry")))
                .with_claim(DependencyClaim::all(ty("Config")))
                .with_claim(DependencyClaim::nullable(ty("Absent")))
                .with_claim(DependencyClaim::type_ref(ty("Registry"))),
        )
        .unwrap();
    builder
}

#[test]
fn resolution_is_deterministic() {
    let snapshot = |graph: &ResolvedGraph| {
        graph
            .components()
            .iter()
            .map(|c| (c.index, c.ty.to_string(), format!("{:?}", c.dependencies)))
            .collect::<Vec<_>>()
    };
    let first = demo_builder().build().unwrap();
    let second = demo_builder().build().unwrap();
    assert_eq!(snapshot(&first), snapshot(&second));
    assert_eq!(first.verify(), Vec::<String>::new());
}

fn dummy_components(n: usize) -> Vec<ResolvedComponent> {
    (0..n)
        .map(|index| {
            let decl = Arc::new(ComponentDeclaration::new(
                DeclarationOrigin::ModuleMethod,
                TypeExpr::named(format!("C{index}")),
            ));
            ResolvedComponent {
                index,
                ty: decl.ty.clone(),
                tags: TagSet::new(),
                declaration: decl,
                interceptors: Vec::new(),
                dependencies: Vec::new(),
            }
        })
        .collect()
}

fn type_expr_strategy() -> impl Strategy<Value = TypeExpr> {
    let leaf = "[A-Z][a-z]{0,6}".prop_map(|n| TypeExpr::named(n));
    leaf.prop_recursive(3, 16, 4, |inner| {
        ("[A-Z][a-z]{0,6}", proptest::collection::vec(inner, 1..4))
            .prop_map(|(name, args)| TypeExpr::generic(name, args))
    })
}

proptest! {
    #[test]
    fn batches_partition_the_list(n in 0usize..600, size in 1usize..50) {
        let list = dummy_components(n);
        let parts = batches(&list, size);
        let total: usize = parts.iter().map(|b| b.components.len()).sum();
        prop_assert_eq!(total, n);
        let mut expected = 0..;
        for (i, batch) in parts.iter().enumerate() {
            prop_assert_eq!(batch.index, i);
            if i + 1 < parts.len() {
                prop_assert_eq!(batch.components.len(), size);
            }
            for component in batch.components {
                prop_assert_eq!(component.index, expected.next().unwrap());
            }
        }
    }

    #[test]
    fn type_display_parse_roundtrip(expr in type_expr_strategy()) {
        let rendered = expr.to_string();
        prop_assert_eq!(TypeExpr::parse(&rendered), Some(expr));
    }
}
