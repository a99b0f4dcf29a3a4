use std::{any::type_name, sync::Arc};

use crate::{
    errors::DiError,
    resolver::Resolver,
    token::TokenKey,
    types::{Injectable, Instance},
};

impl<T: Injectable> Resolver for Arc<T> {
    fn from_resolved(token: TokenKey, resolved: Option<&Instance>) -> Result<Self, DiError> {
        let Some(resolved) = resolved else {
            return Err(DiError::not_found(token));
        };

        resolved
            .downcast::<T>()
            .map_err(|actual_type| DiError::downcast(type_name::<T>(), actual_type))
    }
}

impl<Resolvable: Resolver> Resolver for Option<Resolvable> {
    fn from_resolved(token: TokenKey, resolved: Option<&Instance>) -> Result<Self, DiError> {
        match resolved {
            // An optional dependency which was not found does not fail
            None => Ok(None),
            Some(resolved) => Resolvable::from_resolved(token, Some(resolved)).map(Some),
        }
    }
}
