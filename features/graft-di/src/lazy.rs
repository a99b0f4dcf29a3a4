use std::sync::Arc;

use futures::future::try_join_all;

use crate::{container::Container, errors::ModuleError, provider::Importer, record::Record};

/// Resolves every deferred record registered in `di`
///
/// Members of multi tokens are included. All importers run concurrently and the first
/// failure aborts the pass, leaving every record of this pass deferred.
/// Returns the number of records which became ready.
pub async fn resolve_lazy_providers(di: &Container) -> Result<usize, ModuleError> {
    let deferred: Vec<(Arc<Record>, Importer)> = di
        .local_records()
        .into_iter()
        .flat_map(|record| {
            let members = record.members();
            std::iter::once(record).chain(members)
        })
        .filter_map(|record| {
            let importer = record.importer()?;
            Some((record, importer))
        })
        .collect();

    if deferred.is_empty() {
        return Ok(0);
    }
    tracing::debug!("Resolving {} lazy providers", deferred.len());

    let imports = deferred.iter().map(|(record, importer)| {
        let token = record.token;
        let import = importer();
        async move {
            import.await.map_err(|error| {
                tracing::error!("Lazy provider for {token:?} failed to resolve: {error}");
                ModuleError::LazyResolutionFailed {
                    token: token.name(),
                    error: Arc::new(error),
                }
            })
        }
    });
    let constructors = try_join_all(imports).await?;

    let mut resolved = 0;
    for ((record, _), constructor) in deferred.iter().zip(constructors) {
        if record.resolve_deferred(constructor) {
            resolved += 1;
        }
    }

    tracing::debug!("Resolved {resolved} lazy providers");
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        LazyLock, Mutex,
    };

    use futures::{
        channel::oneshot,
        executor::block_on,
        future::{BoxFuture, FutureExt},
    };

    use super::*;
    use crate::{
        errors::ErrorKind,
        provider::{Component, Provider},
        resolver::Deps,
        settings::Settings,
        token::{DepsShape, Token},
        types::DynError,
    };

    fn container() -> Container {
        Container::with_settings(Settings::development())
    }

    #[derive(Debug)]
    struct Greeter {
        name: Arc<String>,
    }
    impl Component for Greeter {
        fn dependencies() -> DepsShape {
            DepsShape::list([&*NAME])
        }

        fn construct(deps: &Deps) -> Result<Self, DynError> {
            Ok(Greeter {
                name: deps.get(0)?,
            })
        }
    }
    static NAME: LazyLock<Token<String>> = LazyLock::new(|| Token::new("name"));

    #[test]
    fn lazy_class_resolves_to_a_real_instance() {
        let greeter: Token<Greeter> = Token::new("greeter");
        let di = container();
        di.register(Provider::value(&*NAME, "graft".to_string())).unwrap();
        di.register(Provider::lazy_class(&greeter, || async { Ok(()) }))
            .unwrap();

        assert_eq!(di.get(&greeter).unwrap_err().kind(), ErrorKind::LazyPending);
        assert_eq!(block_on(resolve_lazy_providers(&di)).unwrap(), 1);
        assert_eq!(*di.get(&greeter).unwrap().name, "graft");
    }

    #[test]
    fn lazy_values_and_factories_are_resolved_together() {
        let port: Token<u16> = Token::new("port");
        let url: Token<String> = Token::new("url");
        let di = container();
        di.register(Provider::lazy_value(&port, || async { Ok(8080) }))
            .unwrap();
        di.register(
            Provider::lazy_factory(&url, || async {
                Ok(|deps: &Deps| {
                    let port: Arc<u16> = deps.get(0)?;
                    Ok::<_, DynError>(format!("http://localhost:{port}"))
                })
            })
            .deps([&port]),
        )
        .unwrap();

        assert_eq!(block_on(resolve_lazy_providers(&di)).unwrap(), 2);
        assert_eq!(*di.get(&url).unwrap(), "http://localhost:8080");
    }

    #[test]
    fn importers_run_once() {
        let port: Token<u16> = Token::new("port");
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let di = container();
        di.register(Provider::lazy_value(&port, move || {
            counted.fetch_add(1, Ordering::SeqCst);
            async { Ok(1) }
        }))
        .unwrap();

        assert_eq!(block_on(resolve_lazy_providers(&di)).unwrap(), 1);
        assert_eq!(block_on(resolve_lazy_providers(&di)).unwrap(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    type Mailbox = Arc<Mutex<Option<(oneshot::Sender<u16>, oneshot::Receiver<u16>)>>>;

    /// Importer sending `value` to its peer, then yielding what the peer sent
    fn exchange(
        value: u16,
        mailbox: Mailbox,
    ) -> impl Fn() -> BoxFuture<'static, Result<u16, DynError>> + Send + Sync + 'static {
        move || {
            let mailbox = mailbox.lock().unwrap().take();
            async move {
                let (outbox, inbox) = mailbox.ok_or("imported twice")?;
                outbox.send(value).map_err(|_| "peer dropped")?;
                Ok::<_, DynError>(inbox.await?)
            }
            .boxed()
        }
    }

    #[test]
    fn importers_are_awaited_concurrently() {
        let left: Token<u16> = Token::new("left");
        let right: Token<u16> = Token::new("right");
        let (to_right, from_left) = oneshot::channel();
        let (to_left, from_right) = oneshot::channel();

        let di = container();
        di.register(Provider::lazy_value(
            &left,
            exchange(1, Arc::new(Mutex::new(Some((to_right, from_right))))),
        ))
        .unwrap();
        di.register(Provider::lazy_value(
            &right,
            exchange(2, Arc::new(Mutex::new(Some((to_left, from_left))))),
        ))
        .unwrap();

        // Each importer waits for the other one, a sequential pass never finishes
        assert_eq!(block_on(resolve_lazy_providers(&di)).unwrap(), 2);
        assert_eq!(*di.get(&left).unwrap(), 2);
        assert_eq!(*di.get(&right).unwrap(), 1);
    }

    #[test]
    fn multi_members_are_resolved() {
        let plugins: Token<&'static str> = Token::multi("plugins");
        let di = container();
        di.register(Provider::value(&plugins, "eager").multi()).unwrap();
        di.register(Provider::lazy_value(&plugins, || async { Ok("lazy") }).multi())
            .unwrap();

        block_on(resolve_lazy_providers(&di)).unwrap();
        let all: Vec<&str> = di.get_all(&plugins).unwrap().iter().map(|v| **v).collect();
        assert_eq!(all, ["eager", "lazy"]);
    }

    #[test]
    fn failed_import_aborts_the_pass() {
        let port: Token<u16> = Token::new("port");
        let di = container();
        di.register(Provider::lazy_value(&port, || async {
            Err::<u16, DynError>("chunk missing".into())
        }))
        .unwrap();

        let error = block_on(resolve_lazy_providers(&di)).unwrap_err();
        assert!(matches!(
            error,
            ModuleError::LazyResolutionFailed { token: "port", .. }
        ));
        assert_eq!(di.get(&port).unwrap_err().kind(), ErrorKind::LazyPending);
    }
}
