//! Live channel streams.
//!
//! `GET /live/:number` attaches the connection to the channel's broadcaster
//! and streams fragmented MP4 until the client goes away. There is no
//! content length and no range support.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use channelcast_common::ChannelId;
use std::convert::Infallible;
use tokio_stream::{wrappers::ReceiverStream, StreamExt};
use tokio_util::sync::CancellationToken;

use super::AppContext;
use crate::broadcast::ViewerSink;

pub fn live_routes() -> Router<AppContext> {
    Router::new().route("/live/:number", get(live_stream))
}

async fn live_stream(State(ctx): State<AppContext>, Path(number): Path<String>) -> Response {
    let Ok(channel) = number.parse::<ChannelId>() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "Invalid channel number"})),
        )
            .into_response();
    };

    let Some(broadcaster) = ctx.scheduler.broadcaster(channel) else {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "channel offline"})),
        )
            .into_response();
    };

    // Cancelled when the response body is dropped, i.e. the client left.
    let done = CancellationToken::new();
    let (sink, rx) = ViewerSink::channel(ctx.config.broadcast.viewer_buffer, done.clone());
    let disconnect = done.drop_guard();

    tokio::spawn(async move {
        if let Err(e) = broadcaster.attach_viewer(sink).await {
            tracing::debug!(channel = %channel, error = %e, "Viewer rejected");
        }
    });

    let stream = ReceiverStream::new(rx).map(move |bytes| {
        let _ = &disconnect;
        Ok::<_, Infallible>(bytes)
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "video/mp4")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(stream))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
