//! Role-based permission checks.
//!
//! Roles come from profile flags (see [`Role::from_flags`]). Each role has a
//! static set of `(Resource, Operation)` grants; a caller holds a permission
//! if any of their roles grants it. `*All` operations imply the matching
//! `*Own` operation.
//!
//! Handlers either call [`has_permission`] / [`can_modify`] directly, or use
//! the [`RequiresPermission`] extractor for routes gated on a single grant:
//!
//! ```ignore
//! async fn list_reports(
//!     RequiresPermission(user, ..): RequiresPermission<resource::Reports, operation::ReadAll>,
//! ) -> Result<Json<...>> { ... }
//! ```

use std::marker::PhantomData;

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{
    AppState,
    api::models::profiles::{CurrentUser, Role},
    errors::Error,
    types::{Operation, Permission, Resource, UserId},
};

const MEMBER: &[(Resource, Operation)] = &[
    (Resource::Profiles, Operation::ReadAll),
    (Resource::Profiles, Operation::UpdateOwn),
    (Resource::Bookmarks, Operation::CreateOwn),
    (Resource::Bookmarks, Operation::ReadOwn),
    (Resource::Bookmarks, Operation::UpdateOwn),
    (Resource::Bookmarks, Operation::DeleteOwn),
    (Resource::Collections, Operation::CreateOwn),
    (Resource::Collections, Operation::ReadOwn),
    (Resource::Collections, Operation::UpdateOwn),
    (Resource::Collections, Operation::DeleteOwn),
    (Resource::AffiliateLinks, Operation::CreateOwn),
    (Resource::AffiliateLinks, Operation::ReadOwn),
    (Resource::AffiliateLinks, Operation::UpdateOwn),
    (Resource::AffiliateLinks, Operation::DeleteOwn),
    (Resource::Reports, Operation::CreateOwn),
    (Resource::Notifications, Operation::ReadOwn),
    (Resource::Notifications, Operation::UpdateOwn),
    (Resource::ApiKeys, Operation::CreateOwn),
    (Resource::ApiKeys, Operation::ReadOwn),
    (Resource::ApiKeys, Operation::DeleteOwn),
    (Resource::Webhooks, Operation::CreateOwn),
    (Resource::Webhooks, Operation::ReadOwn),
    (Resource::Webhooks, Operation::UpdateOwn),
    (Resource::Webhooks, Operation::DeleteOwn),
    (Resource::Analytics, Operation::ReadOwn),
    (Resource::Trending, Operation::ReadAll),
];

const MODERATOR: &[(Resource, Operation)] = &[
    (Resource::Reports, Operation::ReadAll),
    (Resource::Reports, Operation::UpdateAll),
    (Resource::Bookmarks, Operation::ReadAll),
    (Resource::Bookmarks, Operation::UpdateAll),
    (Resource::Collections, Operation::ReadAll),
    (Resource::Collections, Operation::UpdateAll),
];

const ADMIN: &[(Resource, Operation)] = &[
    (Resource::Profiles, Operation::UpdateAll),
    (Resource::Reports, Operation::ReadAll),
    (Resource::Reports, Operation::UpdateAll),
    (Resource::Bookmarks, Operation::ReadAll),
    (Resource::Bookmarks, Operation::UpdateAll),
    (Resource::Bookmarks, Operation::DeleteAll),
    (Resource::Collections, Operation::ReadAll),
    (Resource::Collections, Operation::UpdateAll),
    (Resource::Collections, Operation::DeleteAll),
    (Resource::AffiliateLinks, Operation::ReadAll),
    (Resource::AffiliateLinks, Operation::UpdateAll),
    (Resource::AffiliateLinks, Operation::DeleteAll),
    (Resource::Analytics, Operation::ReadAll),
    (Resource::Trending, Operation::UpdateAll),
    (Resource::Webhooks, Operation::UpdateAll),
    (Resource::System, Operation::SystemAccess),
];

fn grants(role: Role) -> &'static [(Resource, Operation)] {
    match role {
        Role::Member => MEMBER,
        Role::Moderator => MODERATOR,
        Role::Admin => ADMIN,
    }
}

/// The unrestricted counterpart of an `*Own` operation
fn all_variant(operation: Operation) -> Option<Operation> {
    match operation {
        Operation::CreateOwn => Some(Operation::CreateAll),
        Operation::ReadOwn => Some(Operation::ReadAll),
        Operation::UpdateOwn => Some(Operation::UpdateAll),
        Operation::DeleteOwn => Some(Operation::DeleteAll),
        _ => None,
    }
}

/// The restricted counterpart of an `*All` operation
fn own_variant(operation: Operation) -> Option<Operation> {
    match operation {
        Operation::CreateAll => Some(Operation::CreateOwn),
        Operation::ReadAll => Some(Operation::ReadOwn),
        Operation::UpdateAll => Some(Operation::UpdateOwn),
        Operation::DeleteAll => Some(Operation::DeleteOwn),
        _ => None,
    }
}

pub fn role_has_permission(role: Role, resource: Resource, operation: Operation) -> bool {
    let granted = |op: Operation| grants(role).iter().any(|&(r, o)| r == resource && o == op);
    granted(operation) || all_variant(operation).is_some_and(granted)
}

pub fn has_permission(user: &CurrentUser, resource: Resource, operation: Operation) -> bool {
    user.roles.iter().any(|&role| role_has_permission(role, resource, operation))
}

/// Whether `user` may apply `operation` (an `*All` operation) to a row owned
/// by `owner_id`: either they hold the `*All` grant, or they own the row and
/// hold the matching `*Own` grant.
pub fn can_modify(user: &CurrentUser, resource: Resource, operation: Operation, owner_id: UserId) -> bool {
    if has_permission(user, resource, operation) {
        return true;
    }
    user.id == owner_id && own_variant(operation).is_some_and(|own| has_permission(user, resource, own))
}

pub fn require_permission(user: &CurrentUser, resource: Resource, operation: Operation) -> Result<(), Error> {
    if has_permission(user, resource, operation) {
        Ok(())
    } else {
        Err(Error::InsufficientPermissions {
            required: Permission::Allow(resource, operation),
            action: operation,
            resource: resource.to_string(),
        })
    }
}

/// Type-level resources for [`RequiresPermission`]
pub mod resource {
    use crate::types::Resource;

    pub trait ResourceMarker: Send + Sync + 'static {
        const RESOURCE: Resource;
    }

    macro_rules! resources {
        ($($name:ident),* $(,)?) => {
            $(
                pub struct $name;
                impl ResourceMarker for $name {
                    const RESOURCE: Resource = Resource::$name;
                }
            )*
        };
    }

    resources!(Profiles, Bookmarks, Collections, AffiliateLinks, Reports, Notifications, ApiKeys, Webhooks, Analytics, Trending, System);
}

/// Type-level operations for [`RequiresPermission`]
pub mod operation {
    use crate::types::Operation;

    pub trait OperationMarker: Send + Sync + 'static {
        const OPERATION: Operation;
    }

    macro_rules! operations {
        ($($name:ident),* $(,)?) => {
            $(
                pub struct $name;
                impl OperationMarker for $name {
                    const OPERATION: Operation = Operation::$name;
                }
            )*
        };
    }

    operations!(CreateAll, CreateOwn, ReadAll, ReadOwn, UpdateAll, UpdateOwn, DeleteAll, DeleteOwn, SystemAccess);
}

/// Extractor that authenticates the caller and requires one permission.
pub struct RequiresPermission<R, O>(pub CurrentUser, pub PhantomData<(R, O)>);

impl<R, O> FromRequestParts<AppState> for RequiresPermission<R, O>
where
    R: resource::ResourceMarker,
    O: operation::OperationMarker,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        require_permission(&user, R::RESOURCE, O::OPERATION)?;
        Ok(RequiresPermission(user, PhantomData))
    }
}
