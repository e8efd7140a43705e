//! Public instance configuration.

use axum::{Json, extract::State};

use crate::{AppState, api::models::config::ConfigResponse};

/// Site name, description and whether sign-up is open. No session needed.
#[utoipa::path(
    get,
    path = "/config",
    tag = "config",
    responses((status = 200, description = "Instance configuration", body = ConfigResponse))
)]
#[tracing::instrument(skip_all)]
pub async fn get_config(State(state): State<AppState>) -> Json<ConfigResponse> {
    Json(ConfigResponse::from(&state.config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_app;
    use sqlx::PgPool;

    #[sqlx::test]
    async fn test_get_config_is_public(pool: PgPool) {
        let (server, _bg) = create_test_app(pool).await;
        let config: ConfigResponse = server.get("/api/v1/config").await.json();
        assert_eq!(config.site_name, "Linkshelf");
        assert!(config.registration_enabled);
    }
}
