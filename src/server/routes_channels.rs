//! Channel guide and now-playing routes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use channelcast_common::ChannelId;
use chrono::Utc;

use super::AppContext;

pub fn channel_routes() -> Router<AppContext> {
    Router::new()
        .route("/channels", get(list_channels))
        .route("/channels/:number", get(get_channel_state))
}

/// Guide of every channel with its current and next video.
async fn list_channels(State(ctx): State<AppContext>) -> impl IntoResponse {
    Json(ctx.scheduler.guide(Utc::now()))
}

/// What a channel is playing right now and how far in.
async fn get_channel_state(
    State(ctx): State<AppContext>,
    Path(number): Path<String>,
) -> impl IntoResponse {
    let Ok(channel) = number.parse::<ChannelId>() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "Invalid channel number"})),
        )
            .into_response();
    };

    match ctx.scheduler.now_playing(channel, Utc::now()) {
        Some(state) => Json(state).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "Channel not found or nothing playing"})),
        )
            .into_response(),
    }
}
