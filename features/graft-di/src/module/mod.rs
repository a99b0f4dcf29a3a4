use std::{fmt::Debug, future::Future, panic::Location, sync::Arc};

use futures::{future::BoxFuture, FutureExt};

use crate::{
    container::Container,
    provider::{constructor, Component, Constructor, Provider},
    token::{Dep, DepsShape, Token},
    types::{next_id, DynError, Injectable, Instance},
};

pub mod lazy;
pub(crate) mod walk;

/// Process unique identity of a module declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleId(u64);

pub(crate) type Activation = Arc<dyn Fn(&Container) -> BoxFuture<'static, bool> + Send + Sync>;
pub(crate) type LoadProviders =
    Arc<dyn Fn() -> BoxFuture<'static, Result<Vec<Provider>, DynError>> + Send + Sync>;

pub(crate) struct ModuleDefinition {
    pub(crate) id: ModuleId,
    pub(crate) name: String,
    pub(crate) providers: Vec<Provider>,
    pub(crate) imports: Vec<ModuleRef>,
    pub(crate) loader: Option<ModuleLoader>,
    pub(crate) can_activate: Option<Activation>,
    pub(crate) lazy: bool,
    pub(crate) deps: DepsShape,
    pub(crate) instantiate: Option<Constructor>,
}

/// A named bundle of providers, imports, an optional loader and an activation predicate
///
/// Cloning yields the same declaration, two separately built modules are always distinct
/// even if they share a name.
/// ```
/// use graft_di::{Module, Provider, Token};
///
/// let port: Token<u16> = Token::new("port");
/// let http = Module::builder("HttpModule")
///     .provider(Provider::value(&port, 8080))
///     .build();
/// let app = Module::builder("AppModule").import(&http).build();
/// assert_eq!(app.name(), "AppModule");
/// ```
#[derive(Clone)]
pub struct Module(pub(crate) Arc<ModuleDefinition>);
impl Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("id", &self.0.id)
            .field("name", &self.0.name)
            .field("providers", &self.0.providers.len())
            .field("imports", &self.0.imports.len())
            .field("lazy", &self.0.lazy)
            .finish()
    }
}

impl Module {
    pub fn builder(name: impl Into<String>) -> ModuleBuilder {
        ModuleBuilder {
            name: name.into(),
            providers: Vec::new(),
            imports: Vec::new(),
            loader: None,
            can_activate: None,
            lazy: false,
            deps: DepsShape::default(),
            instantiate: None,
        }
    }

    pub fn id(&self) -> ModuleId {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn is_lazy(&self) -> bool {
        self.0.lazy
    }

    /// Adds providers to this module without creating a new module identity
    ///
    /// Loader, activation and instantiation stay those of this module.
    pub fn extend(&self, providers: impl IntoIterator<Item = Provider>) -> ExtendedModule {
        ExtendedModule {
            module: self.clone(),
            providers: providers.into_iter().collect(),
            imports: Vec::new(),
        }
    }
}

/// A module with additional providers and imports
#[derive(Clone, Debug)]
pub struct ExtendedModule {
    pub(crate) module: Module,
    pub(crate) providers: Vec<Provider>,
    pub(crate) imports: Vec<ModuleRef>,
}
impl ExtendedModule {
    pub fn import(mut self, module: impl Into<ModuleRef>) -> Self {
        self.imports.push(module.into());
        self
    }

    pub fn main_module(&self) -> &Module {
        &self.module
    }
}

/// A module as it appears in an import list
#[derive(Clone, Debug)]
pub enum ModuleRef {
    Module(Module),
    Extended(ExtendedModule),
}
impl ModuleRef {
    /// The declaration this reference points at
    pub fn module(&self) -> &Module {
        match self {
            ModuleRef::Module(module) => module,
            ModuleRef::Extended(extended) => &extended.module,
        }
    }
}
impl From<Module> for ModuleRef {
    fn from(module: Module) -> Self {
        ModuleRef::Module(module)
    }
}
impl From<&Module> for ModuleRef {
    fn from(module: &Module) -> Self {
        ModuleRef::Module(module.clone())
    }
}
impl From<ExtendedModule> for ModuleRef {
    fn from(extended: ExtendedModule) -> Self {
        ModuleRef::Extended(extended)
    }
}

/// Asynchronous provider source of a module, run before activation predicates
#[derive(Clone)]
pub struct ModuleLoader {
    pub(crate) load: LoadProviders,
    pub(crate) throw_on_error: bool,
}
impl Debug for ModuleLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleLoader")
            .field("throw_on_error", &self.throw_on_error)
            .finish()
    }
}

impl ModuleLoader {
    /// Loads a list of providers, registered as soon as the loader completes
    pub fn providers<F, Fut>(load: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<Provider>, DynError>> + Send + 'static,
    {
        ModuleLoader {
            load: Arc::new(move || load().boxed()),
            throw_on_error: false,
        }
    }

    /// Loads a single value and binds it to `provide_in`
    #[track_caller]
    pub fn value<T, F, Fut>(provide_in: &Token<T>, load: F) -> Self
    where
        T: Injectable,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, DynError>> + Send + 'static,
    {
        let token = provide_in.key();
        let options = provide_in.options();
        let declared_at = Location::caller();

        Self::providers(move || {
            let load = load();
            async move {
                let value = Instance::new(load.await?);
                Ok::<_, DynError>(vec![Provider::from_instance(
                    token,
                    options,
                    value,
                    declared_at,
                )])
            }
        })
    }

    /// Aborts the bootstrap if this loader fails, instead of only logging the failure
    pub fn throw_on_error(mut self) -> Self {
        self.throw_on_error = true;
        self
    }
}

pub struct ModuleBuilder {
    name: String,
    providers: Vec<Provider>,
    imports: Vec<ModuleRef>,
    loader: Option<ModuleLoader>,
    can_activate: Option<Activation>,
    lazy: bool,
    deps: DepsShape,
    instantiate: Option<Constructor>,
}

impl ModuleBuilder {
    pub fn provider(mut self, provider: Provider) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn providers(mut self, providers: impl IntoIterator<Item = Provider>) -> Self {
        self.providers.extend(providers);
        self
    }

    pub fn import(mut self, module: impl Into<ModuleRef>) -> Self {
        self.imports.push(module.into());
        self
    }

    pub fn imports<M: Into<ModuleRef>>(mut self, modules: impl IntoIterator<Item = M>) -> Self {
        self.imports.extend(modules.into_iter().map(Into::into));
        self
    }

    pub fn loader(mut self, loader: ModuleLoader) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Activation predicate, evaluated after all loaders ran
    pub fn can_activate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Container) -> bool + Send + Sync + 'static,
    {
        self.can_activate = Some(Arc::new(move |di: &Container| {
            futures::future::ready(predicate(di)).boxed()
        }));
        self
    }

    pub fn can_activate_async<F, Fut>(mut self, predicate: F) -> Self
    where
        F: Fn(Container) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.can_activate = Some(Arc::new(move |di: &Container| predicate(di.clone()).boxed()));
        self
    }

    /// Excludes the module from the eager bootstrap, see [lazy::LazyModules]
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    /// Dependencies resolved when the module is instantiated
    pub fn deps(mut self, deps: impl IntoIterator<Item = impl Into<Dep>>) -> Self {
        self.deps = DepsShape::list(deps);
        self
    }

    /// Instantiates `M` from its declared dependencies at the end of the bootstrap
    pub fn component<M: Component>(mut self) -> Self {
        self.deps = M::dependencies();
        self.instantiate = Some(constructor(M::construct));
        self
    }

    pub fn build(self) -> Module {
        Module(Arc::new(ModuleDefinition {
            id: ModuleId(next_id()),
            name: self.name,
            providers: self.providers,
            imports: self.imports,
            loader: self.loader,
            can_activate: self.can_activate,
            lazy: self.lazy,
            deps: self.deps,
            instantiate: self.instantiate,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modules_are_distinct_by_declaration() {
        let a = Module::builder("Same").build();
        let b = Module::builder("Same").build();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id(), a.clone().id());
    }

    #[test]
    fn extension_keeps_the_main_module() {
        let port: Token<u16> = Token::new("port");
        let base = Module::builder("Base").build();
        let extended = base.extend([Provider::value(&port, 1)]);

        let reference = ModuleRef::from(extended);
        assert_eq!(reference.module().id(), base.id());
    }
}
