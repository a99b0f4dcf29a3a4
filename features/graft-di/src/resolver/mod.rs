use crate::{
    errors::{DiError, ErrorKind},
    token::TokenKey,
    types::Instance,
};

pub mod arc;
pub mod multi;

/// Extracts a typed value out of a resolved dependency
///
/// `resolved` is `None` when an optional dependency was not found.
pub trait Resolver: Sized {
    fn from_resolved(token: TokenKey, resolved: Option<&Instance>) -> Result<Self, DiError>;
}

/// Position of a dependency: an index for positional deps, a key for named deps
pub trait DepIndex: std::fmt::Display {
    fn position(&self, deps: &Deps) -> Option<usize>;
}
impl DepIndex for usize {
    fn position(&self, deps: &Deps) -> Option<usize> {
        (*self < deps.entries.len()).then_some(*self)
    }
}
impl DepIndex for &str {
    fn position(&self, deps: &Deps) -> Option<usize> {
        deps.entries
            .iter()
            .position(|entry| entry.name == Some(*self))
    }
}

pub(crate) struct ResolvedDep {
    pub(crate) name: Option<&'static str>,
    pub(crate) token: TokenKey,
    pub(crate) value: Option<Instance>,
}

/// Resolved dependencies handed to a constructor, in declaration order
///
/// ```
/// use std::sync::Arc;
/// use graft_di::{Container, Provider, Token};
///
/// let name: Token<String> = Token::new("name");
/// let greeting: Token<String> = Token::new("greeting");
///
/// let di = Container::new();
/// di.register(Provider::value(&name, "graft".to_string())).unwrap();
/// di.register(
///     Provider::factory(&greeting, |deps| {
///         let name: Arc<String> = deps.get(0)?;
///         Ok(format!("hello {name}"))
///     })
///     .deps([&name]),
/// )
/// .unwrap();
///
/// assert_eq!(*di.get(&greeting).unwrap(), "hello graft");
/// ```
pub struct Deps {
    pub(crate) entries: Vec<ResolvedDep>,
}
impl Deps {
    pub(crate) fn empty() -> Self {
        Deps {
            entries: Vec::new(),
        }
    }

    /// Extracts the dependency at `at` as `R`
    pub fn get<R: Resolver>(&self, at: impl DepIndex) -> Result<R, DiError> {
        let Some(position) = at.position(self) else {
            return Err(DiError::new(
                ErrorKind::WrongFormat,
                format!("Dependency '{at}' is not declared"),
            ));
        };
        let entry = &self.entries[position];
        R::from_resolved(entry.token, entry.value.as_ref())
    }

    /// Raw value at `at`, `None` if missing or undeclared
    pub fn instance(&self, at: impl DepIndex) -> Option<&Instance> {
        at.position(self)
            .and_then(|position| self.entries[position].value.as_ref())
    }

    /// Keys of named dependencies, in declaration order
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().filter_map(|entry| entry.name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
