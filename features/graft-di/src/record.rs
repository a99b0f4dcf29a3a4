use std::{
    panic::Location,
    sync::{Arc, RwLock},
};

use crate::{
    errors::DiError,
    provider::{Constructor, Importer, Provider, Strategy},
    resolver::Deps,
    token::{DepsShape, Scope, TokenKey},
    types::{next_id, read, write, DynError, Instance},
};

/// Identity of a record, used as key of the value cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct RecordId(u64);

/// How a singular record produces its value
pub(crate) enum FactoryState {
    Ready(Constructor),
    /// Waiting for the lazy resolution pass
    Deferred(Importer),
}

pub(crate) enum RecordKind {
    Singular {
        deps: DepsShape,
        factory: RwLock<FactoryState>,
        static_value: bool,
    },
    /// Values of a multi token, in registration order
    Aggregate { members: RwLock<Vec<Arc<Record>>> },
}

/// Compiled provider, shared by reference between containers
pub(crate) struct Record {
    pub(crate) id: RecordId,
    pub(crate) token: TokenKey,
    pub(crate) scope: Scope,
    pub(crate) declared_at: Option<&'static Location<'static>>,
    pub(crate) kind: RecordKind,
}

/// Initial cache content of a freshly compiled record
pub(crate) enum Seed {
    NotYet,
    Value(Instance),
}

impl Record {
    /// Compiles a provider, returning the record and its initial cache entry
    pub(crate) fn compile(provider: Provider) -> (Arc<Record>, Seed) {
        let scope = provider.effective_scope();
        let deps = provider.deps.unwrap_or_default();

        let (factory, static_value, seed) = match provider.strategy {
            Strategy::Value(instance) => {
                let value = instance.clone();
                let factory: Constructor =
                    Arc::new(move |_: &Deps| Ok::<_, DynError>(value.clone()));
                (FactoryState::Ready(factory), true, Seed::Value(instance))
            }
            Strategy::Construct(constructor) => {
                (FactoryState::Ready(constructor), false, Seed::NotYet)
            }
            Strategy::Lazy { importer, value } => {
                (FactoryState::Deferred(importer), value, Seed::NotYet)
            }
        };

        let record = Record {
            id: RecordId(next_id()),
            token: provider.token,
            scope,
            declared_at: Some(provider.declared_at),
            kind: RecordKind::Singular {
                deps,
                factory: RwLock::new(factory),
                static_value,
            },
        };
        (Arc::new(record), seed)
    }

    /// Empty aggregate for a multi token
    pub(crate) fn aggregate(provider: &Provider) -> Arc<Record> {
        Arc::new(Record {
            id: RecordId(next_id()),
            token: provider.token,
            scope: provider.effective_scope(),
            declared_at: Some(provider.declared_at),
            kind: RecordKind::Aggregate {
                members: RwLock::new(Vec::new()),
            },
        })
    }

    pub(crate) fn is_aggregate(&self) -> bool {
        matches!(self.kind, RecordKind::Aggregate { .. })
    }

    /// True for value bindings, which children read from their root
    pub(crate) fn is_static_value(&self) -> bool {
        matches!(
            self.kind,
            RecordKind::Singular {
                static_value: true,
                ..
            }
        )
    }

    pub(crate) fn is_deferred(&self) -> bool {
        match &self.kind {
            RecordKind::Singular { factory, .. } => {
                matches!(*read(factory), FactoryState::Deferred(_))
            }
            RecordKind::Aggregate { .. } => false,
        }
    }

    /// Declared dependencies, empty for aggregates
    pub(crate) fn deps(&self) -> Option<&DepsShape> {
        match &self.kind {
            RecordKind::Singular { deps, .. } => Some(deps),
            RecordKind::Aggregate { .. } => None,
        }
    }

    /// Snapshot of the members of an aggregate
    pub(crate) fn members(&self) -> Vec<Arc<Record>> {
        match &self.kind {
            RecordKind::Aggregate { members } => read(members).clone(),
            RecordKind::Singular { .. } => Vec::new(),
        }
    }

    pub(crate) fn push_member(&self, member: Arc<Record>) {
        if let RecordKind::Aggregate { members } = &self.kind {
            write(members).push(member);
        }
    }

    /// Runs the factory of a singular record
    pub(crate) fn invoke(&self, deps: &Deps) -> Result<Instance, DiError> {
        let RecordKind::Singular { factory, .. } = &self.kind else {
            return Ok(Instance::new(Vec::<Instance>::new()));
        };

        // Clone the constructor out so the factory runs without holding the lock
        let constructor = match &*read(factory) {
            FactoryState::Ready(constructor) => constructor.clone(),
            FactoryState::Deferred(_) => return Err(DiError::lazy_pending(self.token)),
        };
        constructor(deps).map_err(DiError::from_factory)
    }

    /// Importer of a deferred record
    pub(crate) fn importer(&self) -> Option<Importer> {
        match &self.kind {
            RecordKind::Singular { factory, .. } => match &*read(factory) {
                FactoryState::Deferred(importer) => Some(importer.clone()),
                FactoryState::Ready(_) => None,
            },
            RecordKind::Aggregate { .. } => None,
        }
    }

    /// One shot transition from deferred to ready
    ///
    /// Returns false if the record was already resolved.
    pub(crate) fn resolve_deferred(&self, constructor: Constructor) -> bool {
        let RecordKind::Singular { factory, .. } = &self.kind else {
            return false;
        };

        let mut factory = write(factory);
        if matches!(*factory, FactoryState::Ready(_)) {
            return false;
        }
        *factory = FactoryState::Ready(constructor);
        true
    }
}
