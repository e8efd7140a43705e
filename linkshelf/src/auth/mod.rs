//! Authentication and authorization.
//!
//! Two credential types are accepted on every authenticated route:
//!
//! - **Session cookie**: a signed JWT issued by `/authentication/login` and
//!   `/authentication/register`, stored in an HTTP-only cookie.
//! - **API key**: `Authorization: Bearer ls_...`, created per profile via
//!   `/api/v1/api-keys`. Only the SHA-256 hash is stored.
//!
//! Whichever succeeds, the profile row is re-read so role and suspension
//! changes apply immediately. Authorization is role based (member, moderator,
//! admin) with ownership checks for `*Own` operations; see [`permissions`].
//!
//! # Modules
//!
//! - [`api_keys`]: key generation and hashing
//! - [`current_user`]: `CurrentUser` and `MaybeCurrentUser` extractors
//! - [`password`]: Argon2 hashing and password policy
//! - [`permissions`]: role grants and the `RequiresPermission` extractor
//! - [`session`]: JWT creation, verification and cookies
//! - [`utils`]: username and display name helpers

pub mod api_keys;
pub mod current_user;
pub mod password;
pub mod permissions;
pub mod session;
pub mod utils;
