use std::{any::type_name, ops::Deref, sync::Arc};

use graft_di::{Container, Dep, DiError, ErrorKind, Instance, Resolver, TokenKey};

use crate::provider::{ConfigProvider, CONFIG_PROVIDER_TOKEN};

/// A wrapper type to allow for config injections
///
/// This provides a simple way to retrieve configs from the config registry,
/// and inject them on a factory as a dependency
///
/// # Example
/// ```rust
/// use graft_config::{config::Config, provider::ConfigProvider};
/// use graft_di::{Container, Provider, Token};
///
/// pub struct HttpConfig {
///     port: u16,
/// }
///
/// let mut configs = ConfigProvider::new();
/// configs.add_config(HttpConfig { port: 8080 }).unwrap();
///
/// let address: Token<String> = Token::new("address");
/// let di = Container::new();
/// di.register(configs.into_provider()).unwrap();
/// di.register(
///     Provider::factory(&address, |deps| {
///         let config: Config<HttpConfig> = deps.get(0)?;
///         Ok(format!("0.0.0.0:{}", config.port))
///     })
///     .deps([Config::<HttpConfig>::dep()]),
/// )
/// .unwrap();
///
/// assert_eq!(*di.get(&address).unwrap(), "0.0.0.0:8080");
/// ```
pub struct Config<T> {
    inner: Arc<T>,
}
impl<T> Deref for Config<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
impl<T> Clone for Config<T> {
    fn clone(&self) -> Self {
        Config {
            inner: self.inner.clone(),
        }
    }
}
impl<T> Config<T> {
    pub fn inner(&self) -> Arc<T> {
        self.inner.clone()
    }

    pub fn into_inner(self) -> Arc<T> {
        self.inner
    }
}

impl<T: Send + Sync + 'static> Config<T> {
    /// Dependency to declare on providers which extract a `Config<T>`
    pub fn dep() -> Dep {
        CONFIG_PROVIDER_TOKEN.dep()
    }

    /// Resolves the config from a container
    pub fn from_container(di: &Container) -> Result<Self, DiError> {
        di.get_as(Self::dep())
    }

    /// Activation predicate for modules, false if the config is not registered
    pub fn activate_when<F>(predicate: F) -> impl Fn(&Container) -> bool + Send + Sync + 'static
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        move |di: &Container| match Self::from_container(di) {
            Ok(config) => predicate(&config),
            Err(error) => {
                tracing::debug!("Config {} unavailable: {error}", type_name::<T>());
                false
            }
        }
    }
}

impl<T: Send + Sync + 'static> Resolver for Config<T> {
    fn from_resolved(token: TokenKey, resolved: Option<&Instance>) -> Result<Self, DiError> {
        let config_provider: Arc<ConfigProvider> = Resolver::from_resolved(token, resolved)?;
        let missing = || {
            DiError::new(
                ErrorKind::NotFound,
                format!("Config '{}' is not registered", type_name::<T>()),
            )
        };

        let config = config_provider
            .get_config::<T>()
            .map_err(|_| missing())?
            .ok_or_else(missing)?;

        Ok(Config { inner: config })
    }
}

#[cfg(test)]
mod tests {
    use futures::executor::block_on;
    use graft_di::{DiBuilder, Module, Provider, Settings, Token};

    use super::*;

    struct FeatureConfig {
        enabled: bool,
    }

    fn container_with(enabled: Option<bool>) -> Container {
        let mut configs = ConfigProvider::new();
        configs
            .maybe_add_config(enabled.map(|enabled| FeatureConfig { enabled }))
            .unwrap();

        let di = Container::with_settings(Settings::development());
        di.register(configs.into_provider()).unwrap();
        di
    }

    #[test]
    fn configs_are_resolved_from_the_container() {
        let di = container_with(Some(true));
        assert!(Config::<FeatureConfig>::from_container(&di).unwrap().enabled);
    }

    #[test]
    fn missing_configs_are_not_found() {
        let di = container_with(None);
        let error = Config::<FeatureConfig>::from_container(&di).err().unwrap();
        assert_eq!(error.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn activation_follows_the_config() {
        let feature: Token<u8> = Token::new("feature");
        let build = |enabled: Option<bool>| {
            let mut configs = ConfigProvider::new();
            configs
                .maybe_add_config(enabled.map(|enabled| FeatureConfig { enabled }))
                .unwrap();
            let module = Module::builder("Feature")
                .can_activate(Config::<FeatureConfig>::activate_when(|config| config.enabled))
                .provider(Provider::value(&feature, 1))
                .build();

            block_on(
                DiBuilder::new()
                    .settings(Settings::development())
                    .initial_provider(configs.into_provider())
                    .module(module)
                    .build(),
            )
            .unwrap()
        };

        assert!(build(Some(true)).has(&feature));
        assert!(!build(Some(false)).has(&feature));
        assert!(!build(None).has(&feature));
    }
}
