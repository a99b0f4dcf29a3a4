use std::sync::{Arc, LazyLock};

use graft_di::{
    Component, Container, Deps, DepsShape, DiBuilder, DynError, Module, ModuleLoader, Provider,
    Scope, Token,
};
use tracing_subscriber::EnvFilter;

static GREETING: LazyLock<Token<String>> = LazyLock::new(|| Token::new("greeting"));
static VISITS: LazyLock<Token<Visits>> =
    LazyLock::new(|| Token::new("visits").with_scope(Scope::Singleton));
static REQUEST_ID: LazyLock<Token<u32>> = LazyLock::new(|| Token::new("request_id"));
static HANDLER: LazyLock<Token<Handler>> = LazyLock::new(|| Token::new("handler"));

#[derive(Debug, Default)]
struct Visits(std::sync::atomic::AtomicU32);

#[derive(Debug)]
struct Handler {
    greeting: Arc<String>,
    request_id: Arc<u32>,
}
impl Component for Handler {
    fn dependencies() -> DepsShape {
        DepsShape::list([GREETING.dep(), REQUEST_ID.dep()])
    }

    fn construct(deps: &Deps) -> Result<Self, DynError> {
        Ok(Handler {
            greeting: deps.get(0)?,
            request_id: deps.get(1)?,
        })
    }
}

struct AppModule;
impl Component for AppModule {
    fn dependencies() -> DepsShape {
        DepsShape::list([&*VISITS])
    }

    fn construct(_deps: &Deps) -> Result<Self, DynError> {
        tracing::info!("AppModule started");
        Ok(AppModule)
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("GRAFT_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let greetings = Module::builder("GreetingModule")
        .loader(ModuleLoader::value(&*GREETING, || async {
            Ok("hello from the loader".to_string())
        }))
        .build();
    let app = Module::builder("AppModule")
        .import(&greetings)
        .component::<AppModule>()
        .provider(Provider::value(&*VISITS, Visits::default()))
        .provider(Provider::value(&*REQUEST_ID, 0))
        .provider(Provider::class(&*HANDLER))
        .build();

    let di = match futures::executor::block_on(DiBuilder::new().module(&app).build()) {
        Ok(di) => di,
        Err(error) => {
            tracing::error!("Bootstrap failed: {error}");
            return;
        }
    };
    println!("{di:?}");

    for request_id in 1..=2 {
        if let Err(error) = handle_request(&di, request_id) {
            tracing::error!("Request {request_id} failed: {error}");
        }
    }
}

fn handle_request(di: &Container, request_id: u32) -> Result<(), DynError> {
    let request = di.child();
    request.register(Provider::value(&*REQUEST_ID, request_id))?;

    let handler = request.get(&*HANDLER)?;
    let visits = request.get(&*VISITS)?;
    let count = visits.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
    println!(
        "{} (request {}, visit {count})",
        handler.greeting, handler.request_id
    );
    Ok(())
}
