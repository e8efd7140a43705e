//! OpenAPI documentation.
//!
//! [`ApiDoc`] covers the root routes (authentication, short links) and nests
//! the member API at `/api/v1` and the admin API at `/admin/api/v1`. It is
//! served as JSON at `/api-docs/openapi.json` and rendered at `/docs`.

pub mod admin;
pub mod user;

use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::api;
pub use admin::AdminApiDoc;
pub use user::UserApiDoc;

/// Session cookie and API key schemes referenced by every protected path.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.security_schemes.insert(
            "CookieAuth".to_string(),
            SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::with_description(
                "linkshelf_session",
                "Session JWT set by `POST /authentication/login`",
            ))),
        );
        components.security_schemes.insert(
            "BearerAuth".to_string(),
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("API Key")
                    .description(Some(
                        "API key authentication. Include your key in the `Authorization` header:\n\n\
                        ```\nAuthorization: Bearer ls_...\n```",
                    ))
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(title = "Linkshelf", description = "Social bookmarking with collections, affiliate links and moderation"),
    modifiers(&SecurityAddon),
    paths(
        api::handlers::auth::get_registration_info,
        api::handlers::auth::register,
        api::handlers::auth::get_login_info,
        api::handlers::auth::login,
        api::handlers::auth::logout,
        api::handlers::auth::complete_onboarding,
        api::handlers::auth::request_password_reset,
        api::handlers::auth::confirm_password_reset,
        api::handlers::auth::change_password,
        api::handlers::affiliate_links::follow_short_link,
    ),
    nest(
        (path = "/api/v1", api = UserApiDoc),
        (path = "/admin/api/v1", api = AdminApiDoc),
    ),
    tags(
        (name = "authentication", description = "Registration, login and password management"),
        (name = "profiles", description = "Profiles and follows"),
        (name = "bookmarks", description = "Saved links"),
        (name = "collections", description = "Ordered groups of bookmarks"),
        (name = "affiliate_links", description = "Short links with click tracking"),
        (name = "reports", description = "Reporting content for moderation"),
        (name = "notifications", description = "In-app notifications and the live stream"),
        (name = "feed", description = "Personalized feed"),
        (name = "trending", description = "Trending tags"),
        (name = "dashboard", description = "Own activity"),
        (name = "webhooks", description = "Outbound event delivery"),
        (name = "api_keys", description = "Bearer credentials"),
        (name = "config", description = "Instance configuration"),
        (name = "admin", description = "Moderation and administration"),
    )
)]
pub struct ApiDoc;
