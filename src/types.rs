//! Type expressions and the nominal type catalog.
//!
//! The resolver never inspects real language types: the front-end hands it a
//! closed tree of type expressions plus a [TypeCatalog] recording the nominal
//! facts resolution depends on (openness, supertype patterns, constructor
//! signatures, and which generic heads act as optional or value-wrapper
//! shapes). Everything else is structural.

use std::collections::BTreeSet;
use std::fmt;

use indexmap::IndexMap;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::declare::DependencyClaim;

/// Tags attached to declarations and requested by claims.
pub type TagSet = BTreeSet<String>;

/// Mapping from template parameter names to ground type expressions.
pub type Substitution = IndexMap<String, TypeExpr>;

/// A type expression: either a free template parameter or a (possibly
/// generic) named type application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeExpr {
    /// A free template parameter, bound during instantiation.
    Param(String),
    /// A concrete type application, e.g. `Map<String, Int>`.
    Named { name: String, args: Vec<TypeExpr> },
}

impl TypeExpr {
    pub fn named(name: impl Into<String>) -> Self {
        TypeExpr::Named {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn generic(name: impl Into<String>, args: Vec<TypeExpr>) -> Self {
        TypeExpr::Named {
            name: name.into(),
            args,
        }
    }

    pub fn param(name: impl Into<String>) -> Self {
        TypeExpr::Param(name.into())
    }

    /// The head name of a named application, `None` for a parameter.
    pub fn head(&self) -> Option<&str> {
        match self {
            TypeExpr::Param(_) => None,
            TypeExpr::Named { name, .. } => Some(name),
        }
    }

    pub fn args(&self) -> &[TypeExpr] {
        match self {
            TypeExpr::Param(_) => &[],
            TypeExpr::Named { args, .. } => args,
        }
    }

    /// A type is ground when it contains no free parameters.
    pub fn is_ground(&self) -> bool {
        match self {
            TypeExpr::Param(_) => false,
            TypeExpr::Named { args, .. } => args.iter().all(TypeExpr::is_ground),
        }
    }

    pub fn free_params(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_params(&mut out);
        out
    }

    fn collect_params(&self, out: &mut BTreeSet<String>) {
        match self {
            TypeExpr::Param(name) => {
                out.insert(name.clone());
            }
            TypeExpr::Named { args, .. } => {
                for arg in args {
                    arg.collect_params(out);
                }
            }
        }
    }

    /// Replace bound parameters; unbound parameters are left in place.
    pub fn substitute(&self, subst: &Substitution) -> TypeExpr {
        match self {
            TypeExpr::Param(name) => subst.get(name).cloned().unwrap_or_else(|| self.clone()),
            TypeExpr::Named { name, args } => TypeExpr::Named {
                name: name.clone(),
                args: args.iter().map(|a| a.substitute(subst)).collect(),
            },
        }
    }

    /// Parse a ground type expression such as `Map<String, List<Int>>`.
    ///
    /// Intended for tests and demos; parameters cannot be written in this
    /// notation, use [TypeExpr::param] directly.
    pub fn parse(input: &str) -> Option<TypeExpr> {
        static TOKENS: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_.]*|[<>,]").expect("static token pattern"));
        let tokens: Vec<&str> = TOKENS.find_iter(input).map(|m| m.as_str()).collect();
        let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
        if tokens.concat() != compact {
            return None;
        }
        let mut pos = 0;
        let ty = parse_type(&tokens, &mut pos)?;
        (pos == tokens.len()).then_some(ty)
    }
}

fn parse_type(tokens: &[&str], pos: &mut usize) -> Option<TypeExpr> {
    let name = *tokens.get(*pos)?;
    if matches!(name, "<" | ">" | ",") {
        return None;
    }
    *pos += 1;
    let mut args = Vec::new();
    if tokens.get(*pos) == Some(&"<") {
        *pos += 1;
        loop {
            args.push(parse_type(tokens, pos)?);
            match tokens.get(*pos) {
                Some(&",") => *pos += 1,
                Some(&">") => {
                    *pos += 1;
                    break;
                }
                _ => return None,
            }
        }
    }
    Some(TypeExpr::Named {
        name: name.to_string(),
        args,
    })
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Param(name) => write!(f, "{name}"),
            TypeExpr::Named { name, args } if args.is_empty() => write!(f, "{name}"),
            TypeExpr::Named { name, args } => {
                write!(f, "{}<{}>", name, args.iter().join(", "))
            }
        }
    }
}

/// Whether a nominal type can be subclassed or implemented.
///
/// Cycle breaking synthesizes a forwarding subtype, so only `Interface` and
/// `Open` types can sit at a broken cycle point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Openness {
    Interface,
    Open,
    Final,
}

/// Nominal facts about one type name.
#[derive(Debug, Clone)]
pub struct TypeInfo {
    pub openness: Openness,
    /// Declared type parameters, in order.
    pub params: Vec<String>,
    /// Supertype patterns written over `params`.
    pub implements: Vec<TypeExpr>,
    /// Public constructor signature, if the type can be auto-constructed.
    pub constructor: Option<Vec<DependencyClaim>>,
}

/// The universe of nominal type facts supplied by the front-end.
#[derive(Debug, Clone)]
pub struct TypeCatalog {
    types: IndexMap<String, TypeInfo>,
    wrappers: BTreeSet<String>,
    optional_name: String,
    interceptor_name: String,
}

impl Default for TypeCatalog {
    fn default() -> Self {
        TypeCatalog {
            types: IndexMap::new(),
            wrappers: BTreeSet::from(["Wrapped".to_string()]),
            optional_name: "Optional".to_string(),
            interceptor_name: "Interceptor".to_string(),
        }
    }
}

/// How a produced type satisfied a requested type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Structurally equal to the request.
    Exact,
    /// Assignable through a declared supertype.
    Assignable,
    /// A wrapper whose inner type satisfies the request.
    Wrapped,
}

impl TypeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interface(self, name: impl Into<String>) -> Self {
        self.declare_type(name, Openness::Interface, Vec::new())
    }

    pub fn generic_interface(self, name: impl Into<String>, params: &[&str]) -> Self {
        let params = params.iter().map(|p| p.to_string()).collect();
        self.declare_type(name, Openness::Interface, params)
    }

    pub fn open_class(self, name: impl Into<String>) -> Self {
        self.declare_type(name, Openness::Open, Vec::new())
    }

    pub fn final_class(self, name: impl Into<String>) -> Self {
        self.declare_type(name, Openness::Final, Vec::new())
    }

    pub fn declare_type(
        mut self,
        name: impl Into<String>,
        openness: Openness,
        params: Vec<String>,
    ) -> Self {
        self.types.insert(
            name.into(),
            TypeInfo {
                openness,
                params,
                implements: Vec::new(),
                constructor: None,
            },
        );
        self
    }

    /// Record that `name` is assignable to `supertype`. The pattern may
    /// reference the subject's own type parameters.
    pub fn implements(mut self, name: &str, supertype: TypeExpr) -> Self {
        self.entry(name).implements.push(supertype);
        self
    }

    /// Record a usable public constructor for `name`. The claims may
    /// reference the subject's own type parameters.
    pub fn constructor(mut self, name: &str, params: Vec<DependencyClaim>) -> Self {
        self.entry(name).constructor = Some(params);
        self
    }

    /// Register an additional single-argument wrapper head.
    pub fn wrapper(mut self, name: impl Into<String>) -> Self {
        self.wrappers.insert(name.into());
        self
    }

    fn entry(&mut self, name: &str) -> &mut TypeInfo {
        self.types.entry(name.to_string()).or_insert(TypeInfo {
            openness: Openness::Open,
            params: Vec::new(),
            implements: Vec::new(),
            constructor: None,
        })
    }

    pub fn get(&self, name: &str) -> Option<&TypeInfo> {
        self.types.get(name)
    }

    pub fn openness(&self, ty: &TypeExpr) -> Option<Openness> {
        self.get(ty.head()?).map(|info| info.openness)
    }

    /// Whether a forwarding subtype of `ty` can be synthesized. Unknown
    /// types are treated as closed.
    pub fn proxyable(&self, ty: &TypeExpr) -> bool {
        matches!(
            self.openness(ty),
            Some(Openness::Interface) | Some(Openness::Open)
        )
    }

    /// `Some(inner)` when `ty` is the optional shape `Optional<inner>`.
    pub fn as_optional<'a>(&self, ty: &'a TypeExpr) -> Option<&'a TypeExpr> {
        match ty {
            TypeExpr::Named { name, args } if *name == self.optional_name && args.len() == 1 => {
                Some(&args[0])
            }
            _ => None,
        }
    }

    /// `Some(inner)` when `ty` is a registered wrapper application.
    pub fn unwrapped<'a>(&self, ty: &'a TypeExpr) -> Option<&'a TypeExpr> {
        match ty {
            TypeExpr::Named { name, args } if self.wrappers.contains(name) && args.len() == 1 => {
                Some(&args[0])
            }
            _ => None,
        }
    }

    /// `Some(target)` when `ty` is the interceptor shape `Interceptor<target>`.
    pub fn interceptor_target<'a>(&self, ty: &'a TypeExpr) -> Option<&'a TypeExpr> {
        match ty {
            TypeExpr::Named { name, args } if *name == self.interceptor_name && args.len() == 1 => {
                Some(&args[0])
            }
            _ => None,
        }
    }

    /// Supertype patterns of `ty` with its own arguments substituted in.
    /// Catalog supertype graphs are acyclic by construction in front-ends.
    pub fn supertype_patterns(&self, ty: &TypeExpr) -> Vec<TypeExpr> {
        let TypeExpr::Named { name, args } = ty else {
            return Vec::new();
        };
        let Some(info) = self.get(name) else {
            return Vec::new();
        };
        if info.params.len() != args.len() {
            return Vec::new();
        }
        let subst: Substitution = info
            .params
            .iter()
            .cloned()
            .zip(args.iter().cloned())
            .collect();
        info.implements.iter().map(|p| p.substitute(&subst)).collect()
    }

    /// Nominal assignability: equality, or a declared supertype chain.
    pub fn assignable(&self, target: &TypeExpr, produced: &TypeExpr) -> bool {
        if target == produced {
            return true;
        }
        self.supertype_patterns(produced)
            .iter()
            .any(|sup| self.assignable(target, sup))
    }

    /// Full satisfaction check used by claim matching: equality first, then
    /// nominal assignability, then the structural wrapper unwrap.
    pub fn match_produced(&self, target: &TypeExpr, produced: &TypeExpr) -> Option<MatchKind> {
        if target == produced {
            return Some(MatchKind::Exact);
        }
        if self
            .supertype_patterns(produced)
            .iter()
            .any(|sup| self.assignable(target, sup))
        {
            return Some(MatchKind::Assignable);
        }
        if let Some(inner) = self.unwrapped(produced) {
            if self.assignable(target, inner) {
                return Some(MatchKind::Wrapped);
            }
        }
        None
    }
}
