use std::{future::Future, panic::Location, sync::Arc};

use futures::{future::BoxFuture, FutureExt};

use crate::{
    errors::DiError,
    resolver::Deps,
    token::{Dep, DepsShape, Scope, Token, TokenKey, TokenOptions},
    types::{DynError, Injectable, Instance},
};

/// Synchronous constructor of a record
pub(crate) type Constructor = Arc<dyn Fn(&Deps) -> Result<Instance, DynError> + Send + Sync>;

/// Deferred constructor, resolved once by the lazy resolution pass
pub(crate) type Importer =
    Arc<dyn Fn() -> BoxFuture<'static, Result<Constructor, DynError>> + Send + Sync>;

/// A type which knows its own dependencies and how to build itself from them
///
/// This is the "class" strategy of a [Provider] and the way modules declare
/// the value they instantiate at the end of the bootstrap.
pub trait Component: Injectable + Sized {
    /// Returns the dependencies the constructor expects, in order
    fn dependencies() -> DepsShape {
        DepsShape::default()
    }

    /// Constructs a new instance from its resolved dependencies
    fn construct(deps: &Deps) -> Result<Self, DynError>;
}

#[derive(Clone)]
pub(crate) enum Strategy {
    Value(Instance),
    Construct(Constructor),
    Lazy { importer: Importer, value: bool },
}

/// Declarative binding of a token to a way of producing its value
///
/// Providers are compiled into records when registered and are not kept afterwards.
#[derive(Clone)]
pub struct Provider {
    pub(crate) token: TokenKey,
    pub(crate) token_options: TokenOptions,
    pub(crate) scope: Option<Scope>,
    pub(crate) multi: bool,
    pub(crate) eager: bool,
    pub(crate) deps: Option<DepsShape>,
    pub(crate) strategy: Strategy,
    pub(crate) declared_at: &'static Location<'static>,
}
impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let strategy = match &self.strategy {
            Strategy::Value(_) => "value",
            Strategy::Construct(_) => "factory",
            Strategy::Lazy { .. } => "lazy",
        };
        f.debug_struct("Provider")
            .field("token", &self.token)
            .field("strategy", &strategy)
            .field("scope", &self.scope)
            .field("multi", &self.multi)
            .field("eager", &self.eager)
            .field("declared_at", &self.declared_at)
            .finish()
    }
}

pub(crate) fn constructor<T, F>(factory: F) -> Constructor
where
    T: Injectable,
    F: Fn(&Deps) -> Result<T, DynError> + Send + Sync + 'static,
{
    Arc::new(move |deps: &Deps| factory(deps).map(Instance::new))
}

impl Provider {
    #[track_caller]
    fn with_strategy<T>(token: &Token<T>, strategy: Strategy, deps: Option<DepsShape>) -> Self {
        Provider {
            token: token.key(),
            token_options: token.options(),
            scope: None,
            multi: false,
            eager: false,
            deps,
            strategy,
            declared_at: Location::caller(),
        }
    }

    /// Binds an already existing value
    #[track_caller]
    pub fn value<T: Injectable>(token: &Token<T>, value: T) -> Self {
        Self::with_strategy(token, Strategy::Value(Instance::new(value)), None)
    }

    /// Binds a factory, called with the resolved dependencies declared through [Provider::deps]
    #[track_caller]
    pub fn factory<T, F>(token: &Token<T>, factory: F) -> Self
    where
        T: Injectable,
        F: Fn(&Deps) -> Result<T, DynError> + Send + Sync + 'static,
    {
        Self::with_strategy(
            token,
            Strategy::Construct(constructor(factory)),
            Some(DepsShape::default()),
        )
    }

    /// Binds a [Component], using its declared dependencies unless overridden
    #[track_caller]
    pub fn class<C: Component>(token: &Token<C>) -> Self {
        Self::with_strategy(
            token,
            Strategy::Construct(constructor(C::construct)),
            Some(C::dependencies()),
        )
    }

    /// Binds a value which is only available once `importer` completes
    #[track_caller]
    pub fn lazy_value<T, F, Fut>(token: &Token<T>, importer: F) -> Self
    where
        T: Injectable,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, DynError>> + Send + 'static,
    {
        let importer: Importer = Arc::new(move || {
            let import = importer();
            async move {
                let value = Instance::new(import.await?);
                let resolved: Constructor =
                    Arc::new(move |_: &Deps| Ok::<_, DynError>(value.clone()));
                Ok::<_, DynError>(resolved)
            }
            .boxed()
        });

        Self::with_strategy(
            token,
            Strategy::Lazy {
                importer,
                value: true,
            },
            None,
        )
    }

    /// Binds a factory which is only available once `importer` completes
    #[track_caller]
    pub fn lazy_factory<T, F, Fut, G>(token: &Token<T>, importer: F) -> Self
    where
        T: Injectable,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<G, DynError>> + Send + 'static,
        G: Fn(&Deps) -> Result<T, DynError> + Send + Sync + 'static,
    {
        let importer: Importer = Arc::new(move || {
            let import = importer();
            async move { Ok::<_, DynError>(constructor(import.await?)) }.boxed()
        });

        Self::with_strategy(
            token,
            Strategy::Lazy {
                importer,
                value: false,
            },
            Some(DepsShape::default()),
        )
    }

    /// Binds a [Component] which may only be constructed once `importer` completes
    #[track_caller]
    pub fn lazy_class<C, F, Fut>(token: &Token<C>, importer: F) -> Self
    where
        C: Component,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), DynError>> + Send + 'static,
    {
        let importer: Importer = Arc::new(move || {
            let import = importer();
            async move {
                import.await?;
                Ok::<_, DynError>(constructor(C::construct))
            }
            .boxed()
        });

        Self::with_strategy(
            token,
            Strategy::Lazy {
                importer,
                value: false,
            },
            Some(C::dependencies()),
        )
    }

    /// Binds a value produced by a module loader
    pub(crate) fn from_instance(
        token: TokenKey,
        token_options: TokenOptions,
        instance: Instance,
        declared_at: &'static Location<'static>,
    ) -> Self {
        Provider {
            token,
            token_options,
            scope: None,
            multi: false,
            eager: false,
            deps: None,
            strategy: Strategy::Value(instance),
            declared_at,
        }
    }

    /// Positional dependencies, passed to the constructor in this order
    pub fn deps(mut self, deps: impl IntoIterator<Item = impl Into<Dep>>) -> Self {
        self.deps = Some(DepsShape::list(deps));
        self
    }

    /// Named dependencies, looked up by key in the constructor
    pub fn named_deps(mut self, deps: impl IntoIterator<Item = (&'static str, Dep)>) -> Self {
        self.deps = Some(DepsShape::named(deps));
        self
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Adds this provider to the list of values of its token
    pub fn multi(mut self) -> Self {
        self.multi = true;
        self
    }

    /// Resolves the token right after registration
    pub fn eager(mut self) -> Self {
        self.eager = true;
        self
    }

    pub fn token(&self) -> TokenKey {
        self.token
    }

    pub fn declared_at(&self) -> &'static Location<'static> {
        self.declared_at
    }

    pub(crate) fn is_lazy(&self) -> bool {
        matches!(self.strategy, Strategy::Lazy { .. })
    }

    pub(crate) fn is_multi(&self) -> bool {
        self.multi || self.token_options.multi
    }

    /// Scope of the compiled record: provider, then token, then [Scope::Request]
    pub(crate) fn effective_scope(&self) -> Scope {
        self.scope
            .or(self.token_options.scope)
            .unwrap_or_default()
    }

    /// Structural checks, skipped in production settings
    pub(crate) fn validate(&self) -> Result<(), DiError> {
        let value = matches!(
            self.strategy,
            Strategy::Value(_) | Strategy::Lazy { value: true, .. }
        );
        if value && self.deps.as_ref().is_some_and(|deps| !deps.is_empty()) {
            return Err(DiError::wrong_format(
                format_args!("value provider for \"{}\" declares dependencies", self.token),
                self.declared_at,
            ));
        }
        if self.eager && self.is_lazy() {
            return Err(DiError::wrong_format(
                format_args!("lazy provider for \"{}\" can not be eager", self.token),
                self.declared_at,
            ));
        }
        Ok(())
    }

    /// A multi token only accepts multi providers
    pub(crate) fn check_token_match(&self) -> Result<(), DiError> {
        if self.token_options.multi && !self.multi {
            return Err(DiError::require_multi(self.token, self.declared_at));
        }
        Ok(())
    }
}
