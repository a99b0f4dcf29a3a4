use crate::{
    container::Container,
    errors::ModuleError,
    initiator::DiInitiator,
    module::ModuleRef,
    provider::Provider,
    settings::Settings,
};

//////////////////////////////////////////////////////////////////////
///
/// Bootstrapping a container consists of two parts.
/// 1. The DiBuilder where one declares root modules and loose providers
/// 2. The initiator which walks the modules, runs their loaders and activation
///    predicates, registers the providers, resolves lazy providers and finally
///    instantiates the modules
///
/// ```
/// use graft_di::{DiBuilder, Module, Provider, Token};
///
/// let port: Token<u16> = Token::new("port");
/// let http = Module::builder("HttpModule")
///     .provider(Provider::value(&port, 8080))
///     .build();
///
/// let di = futures::executor::block_on(DiBuilder::new().module(&http).build()).unwrap();
/// assert_eq!(*di.get(&port).unwrap(), 8080);
/// ```
pub struct DiBuilder {
    /// Registered before any module is touched
    pub(crate) initial_providers: Vec<Provider>,
    pub(crate) modules: Vec<ModuleRef>,
    /// Registered after module loaders, before module providers
    pub(crate) providers: Vec<Provider>,
    pub(crate) settings: Option<Settings>,
}
impl Default for DiBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DiBuilder {
    pub fn new() -> Self {
        DiBuilder {
            initial_providers: Vec::new(),
            modules: Vec::new(),
            providers: Vec::new(),
            settings: None,
        }
    }
}
impl DiBuilder {
    pub fn initial_provider(mut self, provider: Provider) -> Self {
        self.initial_providers.push(provider);
        self
    }

    pub fn initial_providers(mut self, providers: impl IntoIterator<Item = Provider>) -> Self {
        self.initial_providers.extend(providers);
        self
    }

    pub fn module(mut self, module: impl Into<ModuleRef>) -> Self {
        self.modules.push(module.into());
        self
    }

    pub fn modules<M: Into<ModuleRef>>(mut self, modules: impl IntoIterator<Item = M>) -> Self {
        self.modules.extend(modules.into_iter().map(Into::into));
        self
    }

    pub fn provider(mut self, provider: Provider) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn providers(mut self, providers: impl IntoIterator<Item = Provider>) -> Self {
        self.providers.extend(providers);
        self
    }

    /// Settings of the created container, [Settings::from_env] if not set
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Creates a root container and runs the bootstrap against it
    pub async fn build(self) -> Result<Container, ModuleError> {
        let settings = self.settings.unwrap_or_else(Settings::from_env);
        DiInitiator::new(Container::with_settings(settings))
            .initiate(self)
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use futures::executor::block_on;

    use super::*;
    use crate::{
        errors::ErrorKind,
        module::{Module, ModuleLoader},
        provider::Component,
        resolver::Deps,
        token::{DepsShape, Token},
        types::DynError,
    };

    fn builder() -> DiBuilder {
        DiBuilder::new().settings(Settings::development())
    }

    #[test]
    fn deactivated_modules_take_their_imports_with_them() {
        let from_m: Token<u8> = Token::new("from_m");
        let from_n: Token<u8> = Token::new("from_n");
        let n = Module::builder("N")
            .provider(Provider::value(&from_n, 1))
            .build();
        let m = Module::builder("M")
            .provider(Provider::value(&from_m, 1))
            .import(&n)
            .can_activate(|_| false)
            .build();

        let di = block_on(builder().module(&m).build()).unwrap();
        assert!(!di.has(&from_m));
        assert!(!di.has(&from_n));
    }

    #[test]
    fn imports_reachable_through_an_active_path_survive() {
        let from_m: Token<u8> = Token::new("from_m");
        let from_n: Token<u8> = Token::new("from_n");
        let n = Module::builder("N")
            .provider(Provider::value(&from_n, 1))
            .build();
        let m = Module::builder("M")
            .provider(Provider::value(&from_m, 1))
            .import(&n)
            .can_activate(|_| false)
            .build();
        let other = Module::builder("Other").import(&n).build();

        let di = block_on(builder().module(&m).module(&other).build()).unwrap();
        assert!(!di.has(&from_m));
        assert!(di.has(&from_n));
    }

    #[test]
    fn activation_sees_loaded_providers() {
        let flag: Token<bool> = Token::new("flag");
        let feature: Token<&'static str> = Token::new("feature");
        let flag_check = flag;
        let m = Module::builder("Feature")
            .loader(ModuleLoader::value(&flag, || async { Ok(true) }))
            .can_activate(move |di| di.get(&flag_check).is_ok_and(|flag| *flag))
            .provider(Provider::value(&feature, "on"))
            .build();

        let di = block_on(builder().module(&m).build()).unwrap();
        assert_eq!(*di.get(&feature).unwrap(), "on");
    }

    #[test]
    fn async_activation_is_awaited() {
        let feature: Token<u8> = Token::new("feature");
        let m = Module::builder("Async")
            .can_activate_async(|_| async { false })
            .provider(Provider::value(&feature, 1))
            .build();

        let di = block_on(builder().module(&m).build()).unwrap();
        assert!(!di.has(&feature));
    }

    #[test]
    fn providers_override_loaded_values() {
        let level: Token<&'static str> = Token::new("level");
        let m = Module::builder("Logging")
            .loader(ModuleLoader::providers(move || async move {
                Ok(vec![Provider::value(&level, "debug")])
            }))
            .build();

        let di = block_on(
            builder()
                .module(&m)
                .provider(Provider::value(&level, "warn"))
                .build(),
        )
        .unwrap();
        assert_eq!(*di.get(&level).unwrap(), "warn");
    }

    #[test]
    fn loader_failures_are_fatal_only_when_requested() {
        let quiet = Module::builder("Quiet")
            .loader(ModuleLoader::providers(|| async {
                Err::<Vec<Provider>, DynError>("offline".into())
            }))
            .build();
        assert!(block_on(builder().module(&quiet).build()).is_ok());

        let strict = Module::builder("Strict")
            .loader(
                ModuleLoader::providers(|| async {
                    Err::<Vec<Provider>, DynError>("offline".into())
                })
                .throw_on_error(),
            )
            .build();
        let error = block_on(builder().module(&strict).build()).unwrap_err();
        assert!(matches!(error, ModuleError::LoaderFailed { ref module, .. } if module == "Strict"));
    }

    #[test]
    fn initial_providers_are_visible_to_loaders_and_modules() {
        let base: Token<u32> = Token::new("base");
        let derived: Token<u32> = Token::new("derived");
        let m = Module::builder("Derived")
            .provider(
                Provider::factory(&derived, |deps| Ok(*deps.get::<Arc<u32>>(0)? * 10))
                    .deps([&base]),
            )
            .build();

        let di = block_on(
            builder()
                .initial_provider(Provider::value(&base, 4))
                .module(&m)
                .build(),
        )
        .unwrap();
        assert_eq!(*di.get(&derived).unwrap(), 40);
    }

    static STARTED: AtomicUsize = AtomicUsize::new(0);
    static GREETING: std::sync::LazyLock<Token<String>> =
        std::sync::LazyLock::new(|| Token::new("greeting"));

    struct AppModule;
    impl Component for AppModule {
        fn dependencies() -> DepsShape {
            DepsShape::list([&*GREETING])
        }

        fn construct(deps: &Deps) -> Result<Self, DynError> {
            let greeting: Arc<String> = deps.get(0)?;
            assert_eq!(*greeting, "hello");
            STARTED.fetch_add(1, Ordering::SeqCst);
            Ok(AppModule)
        }
    }

    #[test]
    fn modules_are_instantiated_once_with_their_deps() {
        let base = Module::builder("App")
            .component::<AppModule>()
            .provider(Provider::value(&*GREETING, "hello".to_string()))
            .build();
        let extended = base.extend([]);

        block_on(builder().module(&base).module(extended).build()).unwrap();
        assert_eq!(STARTED.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn lazy_providers_are_ready_after_build() {
        let port: Token<u16> = Token::new("port");
        let m = Module::builder("Lazy")
            .provider(Provider::lazy_value(&port, || async { Ok(9000) }))
            .build();

        let di = block_on(builder().module(&m).build()).unwrap();
        assert_eq!(*di.get(&port).unwrap(), 9000);
    }

    #[test]
    fn missing_module_deps_fail_the_bootstrap() {
        let missing: Token<u8> = Token::new("missing");
        let m = Module::builder("Needy").deps([&missing]).build();

        let error = block_on(builder().module(&m).build()).unwrap_err();
        assert!(matches!(error, ModuleError::Di(ref error) if error.kind() == ErrorKind::NotFound));
    }
}
