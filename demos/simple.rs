use ikebana::*;

// Model a small application: a logger interface with one implementation, a
// dated logger built on top of it, and an entry point pulling both in.

fn main() -> Result<(), BuildError> {
    let catalog = TypeCatalog::new()
        .interface("Logger")
        .open_class("ConsoleLogger")
        .implements("ConsoleLogger", TypeExpr::named("Logger"))
        .interface("DateLogger")
        .open_class("DateLoggerImpl")
        .implements("DateLoggerImpl", TypeExpr::named("DateLogger"));

    let mut builder = GraphBuilder::new(catalog);

    builder.declare(ComponentDeclaration::new(
        DeclarationOrigin::ModuleMethod,
        TypeExpr::named("ConsoleLogger"),
    ))?;
    builder.declare(
        ComponentDeclaration::new(
            DeclarationOrigin::ClassConstructor,
            TypeExpr::named("DateLoggerImpl"),
        )
        .with_claim(DependencyClaim::one(TypeExpr::named("Logger"))),
    )?;
    builder.declare_root(
        ComponentDeclaration::new(DeclarationOrigin::ClassConstructor, TypeExpr::named("App"))
            .with_claim(DependencyClaim::one(TypeExpr::named("DateLogger")))
            .with_claim(DependencyClaim::nullable(TypeExpr::named("Metrics"))),
    )?;

    let graph = builder.build()?;

    for component in graph.components() {
        println!("{:>3}: {}", component.index, component.ty);
        for dep in &component.dependencies {
            println!("       <- {}", dep.claim());
        }
    }
    println!("{} components in {} batch(es)", graph.len(), graph.batches().len());

    Ok(())
}
