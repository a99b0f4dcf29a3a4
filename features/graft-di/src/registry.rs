use std::{
    collections::HashMap,
    sync::{LazyLock, Mutex},
};

use crate::{container::Container, errors::RegistryError, types::lock};

/// Containers by name
///
/// [ContainerRegistry::global] is shared by the whole process. Tests should prefer their own
/// instance, or call [ContainerRegistry::reset].
#[derive(Debug, Default)]
pub struct ContainerRegistry {
    containers: Mutex<HashMap<String, Container>>,
}

impl ContainerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> &'static ContainerRegistry {
        static GLOBAL: LazyLock<ContainerRegistry> = LazyLock::new(ContainerRegistry::new);
        &GLOBAL
    }

    /// Returns the container registered under `name`, creating it if needed
    ///
    /// A new container is a child of the container named `parent`, if given.
    /// With `strict`, an existing container with this name is an error.
    pub fn create(
        &self,
        name: &str,
        parent: Option<&str>,
        strict: bool,
    ) -> Result<Container, RegistryError> {
        let mut containers = lock(&self.containers);
        if let Some(existing) = containers.get(name) {
            if strict {
                return Err(RegistryError::AlreadyExists(name.to_string()));
            }
            return Ok(existing.clone());
        }

        let container = match parent {
            Some(parent) => containers
                .get(parent)
                .ok_or_else(|| RegistryError::NotFound(parent.to_string()))?
                .child(),
            None => Container::new(),
        };
        tracing::debug!("Created container '{name}'");
        containers.insert(name.to_string(), container.clone());
        Ok(container)
    }

    pub fn get(&self, name: &str) -> Result<Container, RegistryError> {
        lock(&self.containers)
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub fn has(&self, name: &str) -> bool {
        lock(&self.containers).contains_key(name)
    }

    pub fn remove(&self, name: &str) -> Result<(), RegistryError> {
        lock(&self.containers)
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub fn reset(&self) {
        lock(&self.containers).clear();
    }

    pub fn keys(&self) -> Vec<String> {
        lock(&self.containers).keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{provider::Provider, token::Token};

    #[test]
    fn create_returns_the_existing_container() {
        let registry = ContainerRegistry::new();
        let first = registry.create("app", None, false).unwrap();
        let second = registry.create("app", None, false).unwrap();
        assert!(first.same_as(&second));

        assert_eq!(
            registry.create("app", None, true).unwrap_err(),
            RegistryError::AlreadyExists("app".to_string())
        );
    }

    #[test]
    fn children_are_created_from_named_parents() {
        let port: Token<u16> = Token::new("port");
        let registry = ContainerRegistry::new();
        let root = registry.create("root", None, false).unwrap();
        root.register(Provider::value(&port, 80)).unwrap();

        let child = registry.create("request", Some("root"), false).unwrap();
        assert!(child.is_child());
        assert_eq!(*child.get(&port).unwrap(), 80);

        assert_eq!(
            registry.create("orphan", Some("missing"), false).unwrap_err(),
            RegistryError::NotFound("missing".to_string())
        );
        assert!(!registry.has("orphan"));
    }

    #[test]
    fn remove_and_reset() {
        let registry = ContainerRegistry::new();
        registry.create("a", None, false).unwrap();
        registry.create("b", None, false).unwrap();

        let mut keys = registry.keys();
        keys.sort();
        assert_eq!(keys, ["a", "b"]);

        registry.remove("a").unwrap();
        assert_eq!(
            registry.remove("a").unwrap_err(),
            RegistryError::NotFound("a".to_string())
        );
        assert!(registry.get("a").is_err());

        registry.reset();
        assert!(registry.keys().is_empty());
    }
}
