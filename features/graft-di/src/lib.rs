//! Token based dependency injection
//!
//! Values are bound to typed [Token]s through [Provider]s and resolved lazily by a
//! [Container]. Containers form a hierarchy: a child shares the singletons of its root
//! and rebuilds request scoped values. [Module]s bundle providers and are bootstrapped
//! by the [DiBuilder].
//!
//! ```
//! use std::sync::Arc;
//! use graft_di::{Container, Provider, Token};
//!
//! let a: Token<u32> = Token::new("a");
//! let b: Token<u32> = Token::new("b");
//!
//! let root = Container::new();
//! root.register(Provider::value(&a, 1)).unwrap();
//! root.register(
//!     Provider::factory(&b, |deps| Ok(*deps.get::<Arc<u32>>(0)? + 1)).deps([&a]),
//! )
//! .unwrap();
//! assert_eq!(*root.get(&b).unwrap(), 2);
//!
//! let child = root.child();
//! child.register(Provider::value(&a, 5)).unwrap();
//! assert_eq!(*child.get(&b).unwrap(), 6);
//! assert_eq!(*root.get(&b).unwrap(), 2);
//! ```

mod builder;
mod container;
mod errors;
mod initiator;
mod lazy;
mod module;
mod provider;
mod record;
mod registry;
mod resolver;
mod settings;
mod token;
mod types;

pub use builder::DiBuilder;
pub use container::{create_child_container, Container};
pub use errors::{DiError, ErrorKind, ModuleError, RegistryError};
pub use lazy::resolve_lazy_providers;
pub use module::{
    lazy::{
        define_lazy_module, LazyModuleRef, LazyModules, LoadOutcome, LoadTarget, ModuleNamespace,
    },
    ExtendedModule, Module, ModuleBuilder, ModuleId, ModuleLoader, ModuleRef,
};
pub use provider::{Component, Provider};
pub use registry::ContainerRegistry;
pub use resolver::{DepIndex, Deps, Resolver};
pub use settings::{Settings, ENV_VAR};
pub use token::{
    Dep, DepsShape, Scope, Token, TokenKey, TokenOptions, DI_TOKEN, IS_DI_CHILD_CONTAINER_TOKEN,
};
pub use types::{DynError, Injectable, Instance, TypeInfo};
