//! Member API served at `/api/v1`.

use utoipa::OpenApi;

use crate::api;

#[derive(OpenApi)]
#[openapi(paths(
    api::handlers::config::get_config,
    api::handlers::profiles::get_me,
    api::handlers::profiles::update_me,
    api::handlers::profiles::get_profile,
    api::handlers::profiles::follow,
    api::handlers::profiles::unfollow,
    api::handlers::profiles::list_followers,
    api::handlers::profiles::list_following,
    api::handlers::profiles::list_profile_bookmarks,
    api::handlers::profiles::list_profile_collections,
    api::handlers::bookmarks::list_bookmarks,
    api::handlers::bookmarks::create_bookmark,
    api::handlers::bookmarks::get_bookmark,
    api::handlers::bookmarks::update_bookmark,
    api::handlers::bookmarks::delete_bookmark,
    api::handlers::collections::list_collections,
    api::handlers::collections::create_collection,
    api::handlers::collections::get_collection,
    api::handlers::collections::update_collection,
    api::handlers::collections::delete_collection,
    api::handlers::collections::list_collection_items,
    api::handlers::collections::add_collection_item,
    api::handlers::collections::remove_collection_item,
    api::handlers::affiliate_links::list_affiliate_links,
    api::handlers::affiliate_links::create_affiliate_link,
    api::handlers::affiliate_links::get_affiliate_link,
    api::handlers::affiliate_links::update_affiliate_link,
    api::handlers::affiliate_links::delete_affiliate_link,
    api::handlers::affiliate_links::get_affiliate_link_stats,
    api::handlers::reports::create_report,
    api::handlers::notifications::list_notifications,
    api::handlers::notifications::unread_count,
    api::handlers::notifications::mark_read,
    api::handlers::notifications::mark_all_read,
    api::handlers::notifications::stream_notifications,
    api::handlers::feed::get_feed,
    api::handlers::trending::list_trending,
    api::handlers::dashboard::get_dashboard,
    api::handlers::webhooks::list_webhooks,
    api::handlers::webhooks::create_webhook,
    api::handlers::webhooks::get_webhook,
    api::handlers::webhooks::update_webhook,
    api::handlers::webhooks::delete_webhook,
    api::handlers::webhooks::rotate_secret,
    api::handlers::api_keys::list_api_keys,
    api::handlers::api_keys::create_api_key,
    api::handlers::api_keys::delete_api_key,
))]
pub struct UserApiDoc;
