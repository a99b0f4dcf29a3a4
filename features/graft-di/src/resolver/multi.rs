use std::{any::type_name, sync::Arc};

use crate::{
    errors::{DiError, ErrorKind},
    resolver::Resolver,
    token::TokenKey,
    types::{Injectable, Instance},
};

/// Stored value of a multi token
pub(crate) type MultiValue = Vec<Instance>;

/// All values of a multi token, in registration order
impl<T: Injectable> Resolver for Vec<Arc<T>> {
    fn from_resolved(token: TokenKey, resolved: Option<&Instance>) -> Result<Self, DiError> {
        let Some(resolved) = resolved else {
            return Ok(Vec::new());
        };

        let values = resolved.downcast::<MultiValue>().map_err(|actual_type| {
            DiError::new(
                ErrorKind::Downcast,
                format!("Token \"{token}\" is not multi, it holds '{actual_type}'"),
            )
        })?;

        values
            .iter()
            .map(|value| {
                value
                    .downcast::<T>()
                    .map_err(|actual_type| DiError::downcast(type_name::<T>(), actual_type))
            })
            .collect()
    }
}
