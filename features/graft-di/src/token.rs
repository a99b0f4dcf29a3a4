use std::{
    fmt::Debug,
    hash::{Hash, Hasher},
    marker::PhantomData,
    sync::LazyLock,
};

use crate::{container::Container, types::next_id};

/// Lifecycle of a provided value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Scope {
    /// Cached per container, rebuilt by every child container
    #[default]
    Request,
    /// Cached once by the root container and shared with all children
    Singleton,
    /// Never cached, the factory runs on every resolution
    Transient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TokenOptions {
    /// Every provider for this token must be registered with `multi`
    pub multi: bool,
    /// Scope used when a provider does not set one
    pub scope: Option<Scope>,
}

/// Untyped identity of a token
///
/// Equality and hashing only look at the id, two tokens with the same name are distinct.
#[derive(Clone, Copy)]
pub struct TokenKey {
    id: u64,
    name: &'static str,
}
impl TokenKey {
    pub fn name(&self) -> &'static str {
        self.name
    }
}
impl PartialEq for TokenKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for TokenKey {}
impl Hash for TokenKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
impl Debug for TokenKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}
impl std::fmt::Display for TokenKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

/// A typed dependency contract
///
/// Created once where the contract is declared and shared by reference (or copy) afterwards.
/// ```
/// use graft_di::{Scope, Token};
///
/// let port: Token<u16> = Token::new("port");
/// let plugins: Token<String> = Token::multi("plugins").with_scope(Scope::Singleton);
/// assert_ne!(port.key(), plugins.key());
/// ```
pub struct Token<T> {
    key: TokenKey,
    options: TokenOptions,
    _marker: PhantomData<fn() -> T>,
}
impl<T> Clone for Token<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Token<T> {}
impl<T> Debug for Token<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("key", &self.key)
            .field("options", &self.options)
            .finish()
    }
}

impl<T> Token<T> {
    pub fn new(name: &'static str) -> Self {
        Self::with_options(name, TokenOptions::default())
    }

    /// A token which aggregates all of its providers into a list
    pub fn multi(name: &'static str) -> Self {
        Self::with_options(
            name,
            TokenOptions {
                multi: true,
                scope: None,
            },
        )
    }

    pub fn with_options(name: &'static str, options: TokenOptions) -> Self {
        Token {
            key: TokenKey { id: next_id(), name },
            options,
            _marker: PhantomData,
        }
    }

    /// Sets the default scope, keeping the identity
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.options.scope = Some(scope);
        self
    }

    pub fn key(&self) -> TokenKey {
        self.key
    }

    pub fn name(&self) -> &'static str {
        self.key.name
    }

    pub fn options(&self) -> TokenOptions {
        self.options
    }

    /// Required dependency on this token
    pub fn dep(&self) -> Dep {
        Dep {
            key: self.key,
            optional: false,
            multi: self.options.multi,
        }
    }

    /// Optional dependency on this token, resolves to nothing (or an empty list) if missing
    pub fn optional(&self) -> Dep {
        Dep {
            optional: true,
            ..self.dep()
        }
    }
}

/// Dependency descriptor: which token, and how to treat its absence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dep {
    pub key: TokenKey,
    pub optional: bool,
    pub multi: bool,
}
impl<T> From<&Token<T>> for Dep {
    fn from(token: &Token<T>) -> Self {
        token.dep()
    }
}
impl<T> From<Token<T>> for Dep {
    fn from(token: Token<T>) -> Self {
        token.dep()
    }
}

/// Declared dependencies of a provider or module, in declaration order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepsShape {
    /// Passed to the constructor by position
    List(Vec<Dep>),
    /// Passed to the constructor by name
    Named(Vec<(&'static str, Dep)>),
}
impl Default for DepsShape {
    fn default() -> Self {
        DepsShape::List(Vec::new())
    }
}
impl DepsShape {
    pub fn list(deps: impl IntoIterator<Item = impl Into<Dep>>) -> Self {
        DepsShape::List(deps.into_iter().map(Into::into).collect())
    }

    pub fn named(deps: impl IntoIterator<Item = (&'static str, Dep)>) -> Self {
        DepsShape::Named(deps.into_iter().collect())
    }

    pub fn len(&self) -> usize {
        match self {
            DepsShape::List(deps) => deps.len(),
            DepsShape::Named(deps) => deps.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Resolves to the container the resolution runs in (the nearest child, if any)
pub static DI_TOKEN: LazyLock<Token<Container>> = LazyLock::new(|| Token::new("di"));

/// Bound to `true` in every child container
pub static IS_DI_CHILD_CONTAINER_TOKEN: LazyLock<Token<bool>> =
    LazyLock::new(|| Token::new("isDiChildContainer"));
