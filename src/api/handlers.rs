use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::stream::{self, Stream};
use std::convert::Infallible;
use std::sync::Arc;

use crate::session::{SessionMode, SessionRequest};

use super::types::{parse_account_address, ChainStatus, HealthResponse, TrackerParams};
use super::AppState;

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let chains = state
        .registry
        .all()
        .iter()
        .map(|chain| ChainStatus {
            chain_id: chain.chain_id,
            name: chain.name.clone(),
            token_type: chain.token_type.clone(),
        })
        .collect();

    Json(HealthResponse {
        status: "ok".to_string(),
        chains,
    })
}

/// Long-lived event stream: token deployments (default) or market stats,
/// one JSON object per SSE data frame. The stream stays open until the
/// client disconnects; dropping the response tears the session down.
pub async fn tracker(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TrackerParams>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let request = SessionRequest {
        mode: SessionMode::parse(params.mode.as_deref()),
        chain_id: params.parsed_chain_id(),
        account: parse_account_address(params.address.as_deref()),
    };

    tracing::info!(
        mode = ?request.mode,
        chain_id = request.chain_id,
        account = request.account.is_some(),
        "Tracker session opened"
    );

    let session = state.sessions.open(request);
    let stream = stream::unfold(session, |mut session| async move {
        loop {
            let event = session.next_event().await?;
            match Event::default().json_data(&event) {
                Ok(frame) => return Some((Ok::<_, Infallible>(frame), session)),
                Err(err) => {
                    tracing::error!(error = %err, "Failed to encode stream event, skipping");
                }
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
