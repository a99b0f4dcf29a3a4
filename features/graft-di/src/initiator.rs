use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use crate::{
    builder::DiBuilder,
    container::Container,
    errors::{DiError, ModuleError},
    lazy::resolve_lazy_providers,
    module::{
        walk::{walk_modules, CollectedModule},
        Module, ModuleId, ModuleRef,
    },
    provider::Provider,
    types::DynError,
};

/// Runs the module pipeline against a container
pub(crate) struct DiInitiator {
    di: Container,
}

impl DiInitiator {
    pub(crate) fn new(di: Container) -> DiInitiator {
        DiInitiator { di }
    }

    /// Full bootstrap of a [DiBuilder]
    pub(crate) async fn initiate(self, blueprint: DiBuilder) -> Result<Container, ModuleError> {
        let DiBuilder {
            initial_providers,
            modules,
            providers,
            ..
        } = blueprint;

        tracing::debug!(
            "Initializing container with {} root modules, {} initial and {} providers",
            modules.len(),
            initial_providers.len(),
            providers.len()
        );

        self.register_all(initial_providers)?;

        let collected = walk_modules(&modules, false, self.di.settings());
        tracing::debug!("Collected {} modules", collected.len());

        self.run_loaders(&collected).await?;

        let roots: Vec<ModuleId> = modules.iter().map(|root| root.module().id()).collect();
        let active = self.apply_activation(collected, &roots).await;

        // Registered after loaders so they can override loaded defaults
        self.register_all(providers)?;

        let to_instantiate = self.register_module_providers(&active)?;
        resolve_lazy_providers(&self.di).await?;
        self.instantiate_modules(&to_instantiate)?;

        tracing::debug!("Container initialized");
        Ok(self.di)
    }

    /// Loads a single module (and whatever it imports) into an existing container
    ///
    /// Returns false if the module did not pass activation.
    pub(crate) async fn load_module(&self, target: &ModuleRef) -> Result<bool, ModuleError> {
        let collected = walk_modules(std::slice::from_ref(target), true, self.di.settings());
        self.run_loaders(&collected).await?;

        let target_id = target.module().id();
        let active = self.apply_activation(collected, &[target_id]).await;
        if !active.iter().any(|entry| entry.module.id() == target_id) {
            tracing::debug!("Module {} is not active", target.module().name());
            return Ok(false);
        }

        let to_instantiate = self.register_module_providers(&active)?;
        resolve_lazy_providers(&self.di).await?;
        self.instantiate_modules(&to_instantiate)?;
        Ok(true)
    }

    fn register_all(&self, providers: Vec<Provider>) -> Result<(), ModuleError> {
        for provider in providers {
            self.di.register(provider)?;
        }
        Ok(())
    }

    /// Awaits every loader once, in collection order
    async fn run_loaders(&self, modules: &[CollectedModule]) -> Result<(), ModuleError> {
        for entry in modules {
            let Some(loader) = &entry.module.0.loader else {
                continue;
            };

            let loaded = async {
                let providers = (loader.load)().await?;
                for provider in providers {
                    self.di.register(provider)?;
                }
                Ok::<_, DynError>(())
            }
            .await;

            if let Err(error) = loaded {
                tracing::error!(
                    "Error while using module loader in {}: {error}",
                    entry.module.name()
                );
                if loader.throw_on_error {
                    return Err(ModuleError::LoaderFailed {
                        module: entry.module.name().to_string(),
                        error: Arc::new(error),
                    });
                }
            }
        }
        Ok(())
    }

    /// Keeps the modules reachable from `roots` through modules whose predicate passed
    async fn apply_activation(
        &self,
        modules: Vec<CollectedModule>,
        roots: &[ModuleId],
    ) -> Vec<CollectedModule> {
        let mut passed = HashSet::new();
        for entry in &modules {
            let active = match &entry.module.0.can_activate {
                Some(can_activate) => can_activate(&self.di).await,
                None => true,
            };
            if active {
                passed.insert(entry.module.id());
            } else {
                tracing::debug!("Module {} is deactivated", entry.module.name());
            }
        }

        let imports: HashMap<ModuleId, Vec<ModuleId>> = modules
            .iter()
            .map(|entry| {
                let ids = entry.imports.iter().map(|import| import.module().id());
                (entry.module.id(), ids.collect())
            })
            .collect();

        let mut reachable = HashSet::new();
        let mut stack: Vec<ModuleId> = roots.to_vec();
        while let Some(id) = stack.pop() {
            if !passed.contains(&id) || !reachable.insert(id) {
                continue;
            }
            if let Some(imports) = imports.get(&id) {
                stack.extend(imports.iter().copied());
            }
        }

        modules
            .into_iter()
            .filter(|entry| reachable.contains(&entry.module.id()))
            .collect()
    }

    /// Registers providers of all active modules, returns the modules to instantiate
    fn register_module_providers(
        &self,
        modules: &[CollectedModule],
    ) -> Result<Vec<Module>, ModuleError> {
        let mut to_instantiate = Vec::with_capacity(modules.len());
        for entry in modules {
            tracing::debug!(
                "Registering {} providers of module {}",
                entry.providers.len(),
                entry.module.name()
            );
            self.register_all(entry.providers.clone())?;
            to_instantiate.push(entry.module.clone());
        }
        Ok(to_instantiate)
    }

    fn instantiate_modules(&self, modules: &[Module]) -> Result<(), ModuleError> {
        for module in modules {
            let deps = self.di.get_of_deps(&module.0.deps)?;
            if let Some(instantiate) = &module.0.instantiate {
                instantiate(&deps).map_err(DiError::from_factory)?;
                tracing::debug!("Instantiated module {}", module.name());
            }
        }
        Ok(())
    }
}
