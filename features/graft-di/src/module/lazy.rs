use std::{
    collections::{HashMap, HashSet},
    future::Future,
    sync::{Arc, LazyLock, Mutex},
};

use futures::{future::BoxFuture, FutureExt};

use crate::{
    container::Container,
    errors::ModuleError,
    initiator::DiInitiator,
    module::{ExtendedModule, Module, ModuleId, ModuleRef},
    types::{lock, DynError},
};

/// Exports of a dynamically imported unit, by name
pub type ModuleNamespace = HashMap<&'static str, ModuleRef>;

type NamespaceImporter =
    Arc<dyn Fn() -> BoxFuture<'static, Result<ModuleNamespace, DynError>> + Send + Sync>;

/// Reference to a module which is only known once `importer` completes
#[derive(Clone)]
pub struct LazyModuleRef {
    importer: NamespaceImporter,
    export_name: &'static str,
}
impl std::fmt::Debug for LazyModuleRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyModuleRef")
            .field("export_name", &self.export_name)
            .finish()
    }
}

/// Declares a module living in the `export_name` export of whatever `importer` yields
pub fn define_lazy_module<F, Fut>(importer: F, export_name: &'static str) -> LazyModuleRef
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ModuleNamespace, DynError>> + Send + 'static,
{
    LazyModuleRef {
        importer: Arc::new(move || importer().boxed()),
        export_name,
    }
}

impl LazyModuleRef {
    pub fn export_name(&self) -> &'static str {
        self.export_name
    }

    async fn import(&self) -> Result<ModuleRef, ModuleError> {
        let import = (self.importer)();
        let mut namespace = import.await.map_err(|error| ModuleError::LazyImportFailed {
            export: self.export_name,
            error: Arc::new(error),
        })?;

        namespace
            .remove(self.export_name)
            .ok_or(ModuleError::LazyExportMissing(self.export_name))
    }
}

/// Anything [LazyModules::load] accepts
#[derive(Clone, Debug)]
pub enum LoadTarget {
    Module(ModuleRef),
    Lazy(LazyModuleRef),
}
impl From<ModuleRef> for LoadTarget {
    fn from(module: ModuleRef) -> Self {
        LoadTarget::Module(module)
    }
}
impl From<Module> for LoadTarget {
    fn from(module: Module) -> Self {
        LoadTarget::Module(module.into())
    }
}
impl From<&Module> for LoadTarget {
    fn from(module: &Module) -> Self {
        LoadTarget::Module(module.into())
    }
}
impl From<ExtendedModule> for LoadTarget {
    fn from(module: ExtendedModule) -> Self {
        LoadTarget::Module(module.into())
    }
}
impl From<LazyModuleRef> for LoadTarget {
    fn from(lazy: LazyModuleRef) -> Self {
        LoadTarget::Lazy(lazy)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    /// Loaded before, nothing was done
    AlreadyLoaded,
    /// The module did not pass activation, it may be loaded again later
    Inactive,
}

/// Tracks which lazy modules were loaded
///
/// A module is loaded at most once per tracker. [LazyModules::global] is shared by the
/// whole process, separate trackers are mostly useful in tests.
#[derive(Debug, Default)]
pub struct LazyModules {
    loaded: Mutex<HashSet<ModuleId>>,
}

impl LazyModules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> &'static LazyModules {
        static GLOBAL: LazyLock<LazyModules> = LazyLock::new(LazyModules::new);
        &GLOBAL
    }

    /// Imports the module if needed, then runs loaders, activation, provider registration,
    /// the lazy resolution pass and instantiation for it and its imports
    pub async fn load(
        &self,
        di: &Container,
        target: impl Into<LoadTarget>,
    ) -> Result<LoadOutcome, ModuleError> {
        let module = match target.into() {
            LoadTarget::Module(module) => module,
            LoadTarget::Lazy(lazy) => lazy.import().await?,
        };

        let id = module.module().id();
        if self.is_loaded(id) {
            return Ok(LoadOutcome::AlreadyLoaded);
        }

        tracing::debug!("Loading lazy module {}", module.module().name());
        if !DiInitiator::new(di.clone()).load_module(&module).await? {
            return Ok(LoadOutcome::Inactive);
        }

        lock(&self.loaded).insert(id);
        Ok(LoadOutcome::Loaded)
    }

    pub fn is_loaded(&self, id: ModuleId) -> bool {
        lock(&self.loaded).contains(&id)
    }

    /// Forgets every loaded module
    pub fn reset(&self) {
        lock(&self.loaded).clear();
    }
}
