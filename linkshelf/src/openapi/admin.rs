//! Moderation and administration API served at `/admin/api/v1`.

use utoipa::OpenApi;

use crate::api;

#[derive(OpenApi)]
#[openapi(paths(
    api::handlers::profiles::admin_list_profiles,
    api::handlers::profiles::admin_update_profile,
    api::handlers::reports::list_reports,
    api::handlers::reports::resolve_report,
    api::handlers::dashboard::get_admin_dashboard,
    api::handlers::trending::refresh_trending,
    api::handlers::webhooks::process_webhooks,
))]
pub struct AdminApiDoc;
