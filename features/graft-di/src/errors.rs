use std::{panic::Location, sync::Arc};

use thiserror::Error;

use crate::{token::TokenKey, types::DynError};

/// Tag for every failure raised by the container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No record for the token anywhere in the container chain
    NotFound,
    /// The token was requested again while it was being built
    CircularDep,
    /// The token is multi but the provider is not
    RequireMulti,
    /// Multi and non-multi providers registered for the same token
    MixedMulti,
    /// Malformed provider
    WrongFormat,
    /// The stored value is not of the requested type
    Downcast,
    /// A factory returned an error
    Factory,
    /// A lazy provider was resolved before the lazy resolution pass
    LazyPending,
}

/// Error raised by registration or resolution
///
/// The message accumulates the chain of tokens whose construction failed, innermost first:
/// `Token not found "dep" at "service" < "module"`.
#[derive(Error, Debug, Clone)]
#[error("{message}{}", caused_by(.declared_at))]
pub struct DiError {
    kind: ErrorKind,
    message: String,
    chain: Vec<&'static str>,
    declared_at: Option<&'static Location<'static>>,
    cause: Option<Arc<DynError>>,
}

fn caused_by(declared_at: &Option<&'static Location<'static>>) -> String {
    match declared_at {
        Some(location) => format!("\n---- caused by: ----\nprovider declared at {location}"),
        None => String::new(),
    }
}

impl DiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        DiError {
            kind,
            message: message.into(),
            chain: Vec::new(),
            declared_at: None,
            cause: None,
        }
    }

    pub(crate) fn not_found(token: TokenKey) -> Self {
        Self::new(ErrorKind::NotFound, format!("Token not found \"{token}\""))
    }

    pub(crate) fn circular(token: TokenKey, declared_at: Option<&'static Location<'static>>) -> Self {
        DiError {
            declared_at,
            ..Self::new(ErrorKind::CircularDep, format!("Circular dep for \"{token}\""))
        }
    }

    pub(crate) fn require_multi(token: TokenKey, declared_at: &'static Location<'static>) -> Self {
        DiError {
            declared_at: Some(declared_at),
            ..Self::new(
                ErrorKind::RequireMulti,
                format!("Token \"{token}\" require multi providers"),
            )
        }
    }

    pub(crate) fn mixed_multi(token: TokenKey, declared_at: &'static Location<'static>) -> Self {
        DiError {
            declared_at: Some(declared_at),
            ..Self::new(
                ErrorKind::MixedMulti,
                format!("Mixed multi-provider for \"{token}\""),
            )
        }
    }

    pub(crate) fn wrong_format(
        message: impl std::fmt::Display,
        declared_at: &'static Location<'static>,
    ) -> Self {
        DiError {
            declared_at: Some(declared_at),
            ..Self::new(ErrorKind::WrongFormat, format!("Invalid provider: {message}"))
        }
    }

    pub(crate) fn downcast(required: &'static str, actual: &'static str) -> Self {
        Self::new(
            ErrorKind::Downcast,
            format!("Failed to downcast, required: '{required}' actual: '{actual}'"),
        )
    }

    pub(crate) fn lazy_pending(token: TokenKey) -> Self {
        Self::new(
            ErrorKind::LazyPending,
            format!("Lazy provider for \"{token}\" was used before lazy providers were resolved"),
        )
    }

    /// Wraps the error of a user factory
    ///
    /// Errors raised by the container itself (e.g. a failed `Deps::get`) keep their kind.
    pub(crate) fn from_factory(error: DynError) -> Self {
        match error.downcast::<DiError>() {
            Ok(error) => *error,
            Err(error) => DiError {
                message: format!("Factory failed: {error}"),
                cause: Some(Arc::new(error)),
                ..Self::new(ErrorKind::Factory, String::new())
            },
        }
    }

    /// Adds the token whose construction was interrupted to the message
    pub(crate) fn annotate(
        mut self,
        token: TokenKey,
        declared_at: Option<&'static Location<'static>>,
    ) -> Self {
        if self.chain.is_empty() {
            self.message = format!("{} at \"{token}\"", self.message);
        } else {
            self.message = format!("{} < \"{token}\"", self.message);
        }
        self.chain.push(token.name());

        // Only the innermost declaration site is reported
        if self.declared_at.is_none() {
            self.declared_at = declared_at;
        }
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Tokens involved in the failing resolution, innermost first
    pub fn chain(&self) -> &[&'static str] {
        &self.chain
    }

    /// Where the provider at fault was declared
    pub fn declared_at(&self) -> Option<&'static Location<'static>> {
        self.declared_at
    }

    /// The user error behind a [ErrorKind::Factory] failure
    pub fn cause(&self) -> Option<&DynError> {
        self.cause.as_deref()
    }
}

/// Errors while bootstrapping modules
#[derive(Error, Debug, Clone)]
pub enum ModuleError {
    #[error(transparent)]
    Di(#[from] DiError),
    /// A module loader failed and the module opted into `throw_on_error`
    #[error("Loader of module '{module}' failed - error: {error}")]
    LoaderFailed {
        module: String,
        error: Arc<DynError>,
    },
    /// A lazy provider could not be imported
    #[error("Lazy provider for '{token}' failed to resolve - error: {error}")]
    LazyResolutionFailed {
        token: &'static str,
        error: Arc<DynError>,
    },
    /// A lazy module could not be imported
    #[error("Lazy module '{export}' failed to import - error: {error}")]
    LazyImportFailed {
        export: &'static str,
        error: Arc<DynError>,
    },
    #[error("Lazy module export \"{0}\" not found in dynamically imported module")]
    LazyExportMissing(&'static str),
}

/// Errors of the named container registry
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Container with name '{0}' already exists")]
    AlreadyExists(String),
    #[error("Container with name '{0}' not found")]
    NotFound(String),
}
