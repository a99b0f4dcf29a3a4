use std::collections::{HashMap, HashSet};

use crate::{
    module::{ExtendedModule, Module, ModuleId, ModuleRef},
    provider::Provider,
    settings::Settings,
};

/// A module reached by the walk, with the providers and imports of all its extensions
pub(crate) struct CollectedModule {
    pub(crate) module: Module,
    pub(crate) providers: Vec<Provider>,
    pub(crate) imports: Vec<ModuleRef>,
}
impl CollectedModule {
    fn new(module: &Module) -> Self {
        CollectedModule {
            module: module.clone(),
            providers: module.0.providers.clone(),
            imports: module.0.imports.clone(),
        }
    }

    fn merge(&mut self, extension: &ExtendedModule) {
        self.providers.extend(extension.providers.iter().cloned());
        self.imports.extend(extension.imports.iter().cloned());
    }
}

/// Depth first walk of the import graph, imports before importers
///
/// Every declaration is collected once. Lazy modules are skipped unless `include_lazy`.
pub(crate) fn walk_modules(
    roots: &[ModuleRef],
    include_lazy: bool,
    settings: Settings,
) -> Vec<CollectedModule> {
    let mut walker = Walker {
        include_lazy,
        settings,
        collected: Vec::new(),
        index: HashMap::new(),
        visiting: HashSet::new(),
        pending: HashMap::new(),
        names: HashMap::new(),
    };
    for root in roots {
        walker.visit(root);
    }
    walker.collected
}

struct Walker {
    include_lazy: bool,
    settings: Settings,
    collected: Vec<CollectedModule>,
    /// Position of every collected module
    index: HashMap<ModuleId, usize>,
    /// Modules whose imports are being walked
    visiting: HashSet<ModuleId>,
    /// Extensions reached while their module was being walked
    pending: HashMap<ModuleId, Vec<ExtendedModule>>,
    names: HashMap<String, ModuleId>,
}

impl Walker {
    fn visit(&mut self, reference: &ModuleRef) {
        let module = reference.module();
        let id = module.id();
        if module.is_lazy() && !self.include_lazy {
            tracing::trace!("Skipping lazy module {}", module.name());
            return;
        }

        if let Some(&position) = self.index.get(&id) {
            if let ModuleRef::Extended(extension) = reference {
                self.collected[position].merge(extension);
                for import in &extension.imports {
                    self.visit(import);
                }
            }
            return;
        }

        // Reached again through its own imports, which an extension can introduce
        if self.visiting.contains(&id) {
            if let ModuleRef::Extended(extension) = reference {
                self.pending.entry(id).or_default().push(extension.clone());
                for import in &extension.imports {
                    self.visit(import);
                }
            }
            return;
        }

        if let Some(other) = self.names.get(module.name()) {
            if *other != id && self.settings.warn_duplicate_modules {
                tracing::warn!(
                    "Module {} has already been initialized. Possibly duplicate dependencies",
                    module.name()
                );
            }
        }
        self.names.insert(module.name().to_string(), id);

        let mut entry = CollectedModule::new(module);
        if let ModuleRef::Extended(extension) = reference {
            entry.merge(extension);
        }
        self.visiting.insert(id);
        for import in entry.imports.clone() {
            self.visit(&import);
        }
        self.visiting.remove(&id);
        for extension in self.pending.remove(&id).unwrap_or_default() {
            entry.merge(&extension);
        }

        self.index.insert(id, self.collected.len());
        self.collected.push(entry);
    }
}
