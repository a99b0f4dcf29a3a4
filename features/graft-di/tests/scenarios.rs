use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, LazyLock,
};

use futures::executor::block_on;
use graft_di::{
    create_child_container, define_lazy_module, Component, Container, ContainerRegistry, Deps,
    DepsShape, DiBuilder, DynError, ErrorKind, LazyModules, LoadOutcome, Module, ModuleError,
    ModuleNamespace, Provider, Scope, Settings, Token, DI_TOKEN,
};

fn builder() -> DiBuilder {
    DiBuilder::new().settings(Settings::development())
}

static DATABASE_URL: LazyLock<Token<String>> = LazyLock::new(|| Token::new("database_url"));
static REPOSITORY: LazyLock<Token<Repository>> = LazyLock::new(|| Token::new("repository"));

struct Repository {
    url: Arc<String>,
}
impl Component for Repository {
    fn dependencies() -> DepsShape {
        DepsShape::named([("url", DATABASE_URL.dep())])
    }

    fn construct(deps: &Deps) -> Result<Self, DynError> {
        Ok(Repository {
            url: deps.get("url")?,
        })
    }
}

#[test]
fn lazy_class_is_a_real_instance_after_bootstrap() {
    let module = Module::builder("Storage")
        .provider(Provider::value(&*DATABASE_URL, "postgres://db".to_string()))
        .provider(Provider::lazy_class(&*REPOSITORY, || async { Ok(()) }))
        .build();

    let di = block_on(builder().module(&module).build()).unwrap();
    let repository = di.get(&*REPOSITORY).unwrap();
    assert_eq!(*repository.url, "postgres://db");
}

#[test]
fn request_containers_override_per_request_values() {
    let user: Token<&'static str> = Token::new("user");
    let greeting: Token<String> = Token::new("greeting");
    let connections: Token<AtomicUsize> = Token::new("connections").with_scope(Scope::Singleton);

    let module = Module::builder("Web")
        .provider(Provider::value(&user, "anonymous"))
        .provider(Provider::factory(&connections, |_| Ok(AtomicUsize::new(0))))
        .provider(
            Provider::factory(&greeting, |deps| {
                let user: Arc<&'static str> = deps.get(0)?;
                let connections: Arc<AtomicUsize> = deps.get(1)?;
                connections.fetch_add(1, Ordering::SeqCst);
                Ok(format!("hello {user}"))
            })
            .deps([user.dep(), connections.dep()]),
        )
        .build();
    let root = block_on(builder().module(&module).build()).unwrap();

    let alice = create_child_container(&root, [Provider::value(&user, "alice")]).unwrap();
    let bob = create_child_container(&root, [Provider::value(&user, "bob")]).unwrap();

    assert_eq!(*alice.get(&greeting).unwrap(), "hello alice");
    assert_eq!(*bob.get(&greeting).unwrap(), "hello bob");
    assert_eq!(*root.get(&greeting).unwrap(), "hello anonymous");

    // One shared singleton counted every request
    assert!(Arc::ptr_eq(
        &alice.get(&connections).unwrap(),
        &root.get(&connections).unwrap()
    ));
    assert_eq!(root.get(&connections).unwrap().load(Ordering::SeqCst), 3);
}

#[test]
fn factories_can_resolve_the_current_container() {
    let name: Token<&'static str> = Token::new("name");
    let lookup: Token<&'static str> = Token::new("lookup");

    let root = Container::with_settings(Settings::development());
    root.register(Provider::value(&name, "root")).unwrap();
    root.register(
        Provider::factory(&lookup, move |deps| {
            let di: Arc<Container> = deps.get(0)?;
            Ok(*di.get(&name)?)
        })
        .deps([&*DI_TOKEN]),
    )
    .unwrap();

    let child = root.child();
    child.register(Provider::value(&name, "child")).unwrap();
    assert_eq!(*child.get(&lookup).unwrap(), "child");
    assert_eq!(*root.get(&lookup).unwrap(), "root");
}

#[test]
fn multi_bindings_collect_across_modules() {
    let routes: Token<&'static str> = Token::multi("routes");
    let users = Module::builder("Users")
        .provider(Provider::value(&routes, "/users").multi())
        .build();
    let orders = Module::builder("Orders")
        .provider(Provider::value(&routes, "/orders").multi())
        .build();
    let app = Module::builder("App")
        .imports([&users, &orders])
        .provider(Provider::value(&routes, "/").multi())
        .build();

    let di = block_on(builder().module(&app).build()).unwrap();
    let all: Vec<&str> = di.get_all(&routes).unwrap().iter().map(|r| **r).collect();
    assert_eq!(all, ["/users", "/orders", "/"]);
}

#[test]
fn bootstrap_errors_name_the_failing_chain() {
    let secret: Token<String> = Token::new("secret");
    let client: Token<String> = Token::new("client");
    let module = Module::builder("Api")
        .provider(
            Provider::factory(&client, |deps| Ok(deps.get::<Arc<String>>(0)?.to_string()))
                .deps([&secret])
                .eager(),
        )
        .build();

    let error = match block_on(builder().module(&module).build()) {
        Err(ModuleError::Di(error)) => error,
        other => panic!("unexpected result {other:?}"),
    };
    assert_eq!(error.kind(), ErrorKind::NotFound);
    assert_eq!(error.message(), "Token not found \"secret\" at \"client\"");
}

#[test]
fn lazy_modules_extend_a_running_container() {
    static INSTANTIATED: AtomicUsize = AtomicUsize::new(0);
    struct ReportsModule;
    impl Component for ReportsModule {
        fn dependencies() -> DepsShape {
            DepsShape::list([&*DATABASE_URL])
        }

        fn construct(_deps: &Deps) -> Result<Self, DynError> {
            INSTANTIATED.fetch_add(1, Ordering::SeqCst);
            Ok(ReportsModule)
        }
    }

    let reports: Token<&'static str> = Token::new("reports");
    let lazy = Module::builder("Reports")
        .lazy()
        .component::<ReportsModule>()
        .provider(Provider::lazy_value(&reports, || async { Ok("weekly") }))
        .build();
    let app = Module::builder("App")
        .provider(Provider::value(&*DATABASE_URL, "postgres://db".to_string()))
        .import(&lazy)
        .build();

    let di = block_on(builder().module(&app).build()).unwrap();
    assert!(!di.has(&reports));

    let exported = lazy.clone();
    let reference = define_lazy_module(
        move || {
            let exported = exported.clone();
            async move { Ok(ModuleNamespace::from([("Reports", exported.into())])) }
        },
        "Reports",
    );
    let modules = LazyModules::new();
    assert_eq!(block_on(modules.load(&di, reference)).unwrap(), LoadOutcome::Loaded);
    assert_eq!(block_on(modules.load(&di, &lazy)).unwrap(), LoadOutcome::AlreadyLoaded);

    assert_eq!(*di.get(&reports).unwrap(), "weekly");
    assert_eq!(INSTANTIATED.load(Ordering::SeqCst), 1);
}

#[test]
fn named_containers_share_a_registry() {
    let registry = ContainerRegistry::new();
    let tenant: Token<&'static str> = Token::new("tenant");

    let root = registry.create("root", None, true).unwrap();
    root.register(Provider::value(&tenant, "acme")).unwrap();
    registry.create("worker", Some("root"), true).unwrap();

    let worker = registry.get("worker").unwrap();
    assert_eq!(*worker.get(&tenant).unwrap(), "acme");
}
