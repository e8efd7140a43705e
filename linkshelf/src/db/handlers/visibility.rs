//! Row visibility for content owned by profiles.

use sqlx::{Postgres, QueryBuilder};

use crate::types::UserId;

/// Who is looking at a row. Anonymous callers have no id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Viewer {
    pub id: Option<UserId>,
    /// Moderators and admins see private and hidden rows
    pub privileged: bool,
}

impl Viewer {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn profile(id: UserId, privileged: bool) -> Self {
        Self { id: Some(id), privileged }
    }

    /// Whether a row with these attributes is visible, mirroring the SQL predicate.
    pub fn can_see(&self, owner_id: UserId, is_public: bool, is_hidden: bool) -> bool {
        self.id == Some(owner_id) || (is_public && !is_hidden) || self.privileged
    }
}

/// Append `AND (<alias>.owner_id = viewer OR (<alias>.is_public AND NOT <alias>.is_hidden) OR privileged)`.
/// `hidden_column` is false for tables without an `is_hidden` flag.
pub(crate) fn push_visibility(query: &mut QueryBuilder<'_, Postgres>, alias: &str, viewer: Viewer, hidden_column: bool) {
    query.push(format!(" AND ({alias}.owner_id = "));
    query.push_bind(viewer.id);
    if hidden_column {
        query.push(format!(" OR ({alias}.is_public AND NOT {alias}.is_hidden) OR "));
    } else {
        query.push(format!(" OR {alias}.is_public OR "));
    }
    query.push_bind(viewer.privileged);
    query.push(")");
}
