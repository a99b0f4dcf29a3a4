use std::{
    collections::{HashMap, HashSet},
    fmt::Debug,
    sync::{Arc, Condvar, LazyLock, Mutex, PoisonError, RwLock, Weak},
    thread::{self, ThreadId},
};

use crate::{
    errors::{DiError, ErrorKind},
    provider::Provider,
    record::{Record, RecordId, Seed},
    resolver::{multi::MultiValue, Deps, ResolvedDep, Resolver},
    settings::Settings,
    token::{Dep, DepsShape, Scope, Token, TokenKey, DI_TOKEN, IS_DI_CHILD_CONTAINER_TOKEN},
    types::{lock, read, write, Injectable, Instance},
};

/// Cache entry of a record
#[derive(Clone)]
enum Slot {
    NotYet,
    /// Construction started on the given thread
    ///
    /// The same thread seeing this again means the record depends on itself, other threads
    /// wait for the value.
    InProgress(ThreadId),
    Ready(Instance),
}

enum Claim {
    Ready(Instance),
    Build,
}

/// Releases a claimed slot if its factory panics, so waiting threads do not hang
struct ClaimGuard<'a> {
    container: &'a Container,
    record: &'a Record,
}
impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.container.settle(self.record, Slot::NotYet);
        }
    }
}

/// Thread waiting for a value -> thread building it
static WAITING: LazyLock<Mutex<HashMap<ThreadId, ThreadId>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Records that `waiter` waits for `owner`, unless `owner` transitively waits for `waiter`
fn start_waiting(waiter: ThreadId, owner: ThreadId) -> bool {
    let mut waiting = lock(&WAITING);
    let mut current = owner;
    loop {
        if current == waiter {
            return false;
        }
        match waiting.get(&current) {
            Some(next) => current = *next,
            None => break,
        }
    }
    waiting.insert(waiter, owner);
    true
}

/// Registry of records and cache of their values
///
/// Cloning is cheap and yields a handle to the same container.
///
/// A child container (see [Container::child]) reads records from its root. Singletons and
/// plain values are cached by the root and shared, request scoped values are rebuilt and
/// cached by every child.
#[derive(Clone)]
pub struct Container(Arc<ContainerInner>);
struct ContainerInner {
    records: RwLock<HashMap<TokenKey, Arc<Record>>>,
    values: Mutex<HashMap<RecordId, Slot>>,
    /// Signalled whenever a slot leaves [Slot::InProgress]
    settled: Condvar,
    /// Transient records under construction, per thread
    constructing: Mutex<HashSet<(RecordId, ThreadId)>>,
    /// Records shared from another container by [Container::borrow_token]
    borrowed: Mutex<HashSet<RecordId>>,
    root: Option<Container>,
    fallback: Option<Container>,
    settings: Settings,
}
impl Drop for ContainerInner {
    // Singletons of a child are cached by its root, keyed by records only the child knows
    fn drop(&mut self) {
        let Some(root) = &self.root else {
            return;
        };
        let borrowed = self.borrowed.get_mut().unwrap_or_else(PoisonError::into_inner);
        let records = self.records.get_mut().unwrap_or_else(PoisonError::into_inner);

        // Evicted values are dropped after the lock is released
        let mut evicted = Vec::new();
        let mut values = lock(&root.0.values);
        for record in records.values().filter(|record| !borrowed.contains(&record.id)) {
            for member in record.members() {
                evicted.extend(values.remove(&member.id));
            }
            evicted.extend(values.remove(&record.id));
        }
        drop(values);
        drop(evicted);
    }
}
impl Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let records = read(&self.0.records);
        let values = lock(&self.0.values);
        let mut map = f.debug_struct("Container");
        for (token, record) in records.iter() {
            let state = match values.get(&record.id) {
                Some(Slot::Ready(_)) => "ready",
                Some(Slot::InProgress(_)) => "in progress",
                Some(Slot::NotYet) | None => "not yet",
            };
            map.field(token.name(), &state);
        }
        map.finish()
    }
}
impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl Container {
    /// Creates a root container, using [Settings::from_env]
    pub fn new() -> Self {
        Self::create(None, None, Settings::from_env())
    }

    pub fn with_settings(settings: Settings) -> Self {
        Self::create(None, None, settings)
    }

    /// Creates a root container and registers `providers`
    pub fn with_providers(providers: impl IntoIterator<Item = Provider>) -> Result<Self, DiError> {
        let container = Self::new();
        for provider in providers {
            container.register(provider)?;
        }
        Ok(container)
    }

    /// Creates a root container which looks up unknown tokens in `fallback`
    pub fn with_fallback(fallback: &Container) -> Self {
        Self::create(None, Some(fallback.clone()), fallback.0.settings)
    }

    /// Creates a child of this container
    pub fn child(&self) -> Container {
        Self::create(Some(self.clone()), None, self.0.settings)
    }

    /// Creates a child of this container which looks up unknown tokens in `fallback`
    pub fn child_with_fallback(&self, fallback: &Container) -> Container {
        Self::create(Some(self.clone()), Some(fallback.clone()), self.0.settings)
    }

    fn create(root: Option<Container>, fallback: Option<Container>, settings: Settings) -> Self {
        let container = Container(Arc::new(ContainerInner {
            records: RwLock::new(HashMap::new()),
            values: Mutex::new(HashMap::new()),
            settled: Condvar::new(),
            constructing: Mutex::new(HashSet::new()),
            borrowed: Mutex::new(HashSet::new()),
            root,
            fallback,
            settings,
        }));

        // Resolving the container must not keep it alive, so the binding holds a weak
        // reference and is never cached
        let weak: Weak<ContainerInner> = Arc::downgrade(&container.0);
        let itself = Provider::factory(&*DI_TOKEN, move |_| {
            weak.upgrade()
                .map(Container)
                .ok_or_else(|| "the container was dropped".into())
        })
        .scope(Scope::Transient);
        container.insert(itself);

        if container.is_child() {
            container.insert(Provider::value(&*IS_DI_CHILD_CONTAINER_TOKEN, true));
        }
        container
    }

    pub fn settings(&self) -> Settings {
        self.0.settings
    }

    pub fn is_child(&self) -> bool {
        self.0.root.is_some()
    }

    pub fn root(&self) -> Option<&Container> {
        self.0.root.as_ref()
    }

    /// True if both handles point at the same container
    pub fn same_as(&self, other: &Container) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

// Registration
impl Container {
    /// Compiles and registers a provider
    ///
    /// Eager providers are resolved right away.
    pub fn register(&self, provider: Provider) -> Result<(), DiError> {
        if self.0.settings.validate_providers {
            provider.validate()?;
        }
        provider.check_token_match()?;

        let eager = provider.eager.then(|| Dep {
            key: provider.token,
            optional: false,
            multi: provider.token_options.multi,
        });

        self.process_provider(provider)?;

        if let Some(dep) = eager {
            self.resolve(&dep)?;
        }
        Ok(())
    }

    fn process_provider(&self, provider: Provider) -> Result<(), DiError> {
        if !provider.is_multi() {
            self.insert(provider);
            return Ok(());
        }

        let token = provider.token;
        // A child may start its own list, but never over a singular binding of its root
        if let Some(root) = &self.0.root {
            if root
                .get_record(token)
                .is_some_and(|inherited| !inherited.is_aggregate())
            {
                return Err(DiError::mixed_multi(token, provider.declared_at));
            }
        }

        let aggregate = {
            let mut records = write(&self.0.records);
            match records.get(&token) {
                Some(existing) if existing.is_aggregate() => existing.clone(),
                Some(_) => return Err(DiError::mixed_multi(token, provider.declared_at)),
                None => {
                    let aggregate = Record::aggregate(&provider);
                    records.insert(token, aggregate.clone());
                    aggregate
                }
            }
        };
        lock(&self.0.values)
            .entry(aggregate.id)
            .or_insert(Slot::NotYet);

        let (record, seed) = Record::compile(provider);
        self.seed(&record, seed);
        aggregate.push_member(record);

        tracing::trace!("Registered multi provider for {token:?}");
        Ok(())
    }

    /// Registers a singular record, replacing any previous one
    fn insert(&self, provider: Provider) {
        let token = provider.token;
        let (record, seed) = Record::compile(provider);
        self.seed(&record, seed);

        let replaced = write(&self.0.records).insert(token, record);
        if let Some(replaced) = replaced {
            let stale = lock(&self.0.values).remove(&replaced.id);
            drop(stale);
        }
        tracing::trace!("Registered provider for {token:?}");
    }

    fn seed(&self, record: &Record, seed: Seed) {
        let slot = match seed {
            Seed::NotYet => Slot::NotYet,
            Seed::Value(instance) => Slot::Ready(instance),
        };
        lock(&self.0.values).insert(record.id, slot);
    }

    /// Shares the record of `token` from another container, with a fresh cache entry here
    ///
    /// Does nothing if this container already knows the token or `from` does not.
    pub fn borrow_token<T>(&self, from: &Container, token: &Token<T>) {
        let key = token.key();
        if self.get_record(key).is_some() {
            return;
        }
        let Some(record) = from.get_record(key) else {
            return;
        };

        {
            let mut values = lock(&self.0.values);
            for member in record.members() {
                values.insert(member.id, Slot::NotYet);
            }
            values.insert(record.id, Slot::NotYet);
        }
        lock(&self.0.borrowed).insert(record.id);
        write(&self.0.records).insert(key, record);
    }
}

// Resolution
impl Container {
    /// Resolves the value of `token`
    ///
    /// For multi tokens use [Container::get_all].
    pub fn get<T: Injectable>(&self, token: &Token<T>) -> Result<Arc<T>, DiError> {
        self.get_as(token.dep())
    }

    /// Resolves the value of `token`, `None` if no provider is known
    pub fn get_optional<T: Injectable>(&self, token: &Token<T>) -> Result<Option<Arc<T>>, DiError> {
        self.get_as(token.optional())
    }

    /// Resolves all values of a multi token, in registration order
    pub fn get_all<T: Injectable>(&self, token: &Token<T>) -> Result<Vec<Arc<T>>, DiError> {
        self.get_as(token.dep())
    }

    /// Resolves a dependency descriptor and extracts it as `R`
    pub fn get_as<R: Resolver>(&self, dep: impl Into<Dep>) -> Result<R, DiError> {
        let dep = dep.into();
        let resolved = self.resolve(&dep)?;
        R::from_resolved(dep.key, resolved.as_ref())
    }

    /// Resolves a dependency descriptor
    ///
    /// Looks the token up locally, then in the fallback chain. A missing optional
    /// dependency resolves to `None` (an empty list if multi).
    pub fn resolve(&self, dep: &Dep) -> Result<Option<Instance>, DiError> {
        let Some(record) = self.get_record(dep.key) else {
            if let Some(fallback) = &self.0.fallback {
                if fallback.has_key(dep.key) {
                    return fallback.resolve(dep);
                }
            }

            if dep.optional {
                return Ok(dep.multi.then(|| Instance::new(MultiValue::new())));
            }
            return Err(DiError::not_found(dep.key));
        };

        self.hydrate(&record, dep.key, dep.optional)
    }

    /// Resolves every dependency of `deps`, in declaration order
    pub fn get_of_deps(&self, deps: &DepsShape) -> Result<Deps, DiError> {
        let entries = match deps {
            DepsShape::List(deps) => deps
                .iter()
                .map(|dep| self.resolve_entry(None, dep))
                .collect::<Result<Vec<_>, _>>()?,
            DepsShape::Named(deps) => deps
                .iter()
                .map(|(name, dep)| self.resolve_entry(Some(*name), dep))
                .collect::<Result<Vec<_>, _>>()?,
        };
        Ok(Deps { entries })
    }

    fn resolve_entry(&self, name: Option<&'static str>, dep: &Dep) -> Result<ResolvedDep, DiError> {
        Ok(ResolvedDep {
            name,
            token: dep.key,
            value: self.resolve(dep)?,
        })
    }

    /// True if the token is known here, in the root or in the fallback chain
    pub fn has<T>(&self, token: &Token<T>) -> bool {
        self.has_key(token.key())
    }

    pub fn has_key(&self, key: TokenKey) -> bool {
        self.get_record(key).is_some()
            || self
                .0
                .fallback
                .as_ref()
                .is_some_and(|fallback| fallback.has_key(key))
    }
}

// Hydration
impl Container {
    /// Own record, then the root's
    pub(crate) fn get_record(&self, key: TokenKey) -> Option<Arc<Record>> {
        let local = read(&self.0.records).get(&key).cloned();
        match (local, &self.0.root) {
            (Some(record), _) => Some(record),
            (None, Some(root)) => root.get_record(key),
            (None, None) => None,
        }
    }

    /// Records registered or borrowed by this container itself
    pub(crate) fn local_records(&self) -> Vec<Arc<Record>> {
        read(&self.0.records).values().cloned().collect()
    }

    fn get_value(&self, record: &Record) -> Slot {
        let local = lock(&self.0.values).get(&record.id).cloned();
        local.unwrap_or_else(|| self.inherited_value(record))
    }

    /// Value of a record without a local cache entry
    fn inherited_value(&self, record: &Record) -> Slot {
        match &self.0.root {
            // Singletons and values live in the root only
            Some(root) if record.scope == Scope::Singleton || record.is_static_value() => {
                root.get_value(record)
            }
            _ => Slot::NotYet,
        }
    }

    /// Returns the cached value, or marks the record as built by this thread
    ///
    /// Waits while another thread builds the record. Fails if this thread is already
    /// building it, directly or through a thread waiting for this one.
    fn claim(&self, record: &Record, token: TokenKey) -> Result<Claim, DiError> {
        let current = thread::current().id();
        let mut values = lock(&self.0.values);
        loop {
            let slot = match values.get(&record.id) {
                Some(slot) => slot.clone(),
                None => self.inherited_value(record),
            };

            match slot {
                Slot::Ready(instance) => return Ok(Claim::Ready(instance)),
                Slot::NotYet => {
                    values.insert(record.id, Slot::InProgress(current));
                    return Ok(Claim::Build);
                }
                Slot::InProgress(owner) => {
                    if owner == current || !start_waiting(current, owner) {
                        return Err(DiError::circular(token, record.declared_at));
                    }
                    tracing::trace!("Waiting for {token:?} built by {owner:?}");
                    values = self
                        .0
                        .settled
                        .wait(values)
                        .unwrap_or_else(PoisonError::into_inner);
                    lock(&WAITING).remove(&current);
                }
            }
        }
    }

    fn settle(&self, record: &Record, slot: Slot) {
        lock(&self.0.values).insert(record.id, slot);
        self.0.settled.notify_all();
    }

    /// Request scoped records are built by this container, everything else by the root
    fn hydrate(
        &self,
        record: &Arc<Record>,
        token: TokenKey,
        optional: bool,
    ) -> Result<Option<Instance>, DiError> {
        match &self.0.root {
            Some(root) if record.scope != Scope::Request => {
                root.hydrate_here(record, token, optional)
            }
            _ => self.hydrate_here(record, token, optional),
        }
    }

    fn hydrate_deps(&self, record: &Record) -> Result<Deps, DiError> {
        let Some(deps) = record.deps() else {
            return Ok(Deps::empty());
        };

        match &self.0.root {
            Some(root) if record.scope != Scope::Request => root.get_of_deps(deps),
            _ => self.get_of_deps(deps),
        }
    }

    fn hydrate_here(
        &self,
        record: &Arc<Record>,
        token: TokenKey,
        optional: bool,
    ) -> Result<Option<Instance>, DiError> {
        if record.scope == Scope::Transient {
            let key = (record.id, thread::current().id());
            if !lock(&self.0.constructing).insert(key) {
                return Err(DiError::circular(token, record.declared_at));
            }
            let built = self.construct(record, token);
            lock(&self.0.constructing).remove(&key);

            return match built {
                Ok(instance) => Ok(Some(instance)),
                Err(error) => Self::recover(record, token, optional, error),
            };
        }

        if let Claim::Ready(instance) = self.claim(record, token)? {
            return Ok(Some(instance));
        }

        let _guard = ClaimGuard {
            container: self,
            record,
        };
        match self.construct(record, token) {
            Ok(instance) => {
                self.settle(record, Slot::Ready(instance.clone()));
                Ok(Some(instance))
            }
            Err(error) => {
                // Not poisoned, a later resolution may succeed
                self.settle(record, Slot::NotYet);
                Self::recover(record, token, optional, error)
            }
        }
    }

    fn construct(&self, record: &Arc<Record>, token: TokenKey) -> Result<Instance, DiError> {
        if record.is_aggregate() {
            let mut values = MultiValue::new();
            for member in record.members() {
                values.extend(self.hydrate(&member, token, false)?);
            }
            return Ok(Instance::new(values));
        }

        tracing::trace!("Constructing {token:?} ({:?})", record.scope);
        let deps = self.hydrate_deps(record)?;
        record.invoke(&deps)
    }

    fn recover(
        record: &Record,
        token: TokenKey,
        optional: bool,
        error: DiError,
    ) -> Result<Option<Instance>, DiError> {
        // Members already annotated the error with this token
        if record.is_aggregate() {
            return Err(error);
        }
        if optional && error.kind() == ErrorKind::NotFound {
            return Ok(None);
        }
        Err(error.annotate(token, record.declared_at))
    }
}

/// Creates a child of `root` and registers `providers` in it
pub fn create_child_container(
    root: &Container,
    providers: impl IntoIterator<Item = Provider>,
) -> Result<Container, DiError> {
    let child = root.child();
    for provider in providers {
        child.register(provider)?;
    }
    Ok(child)
}
