//! Transcript ingress.
//!
//! `on_committed_segment` is the sole entry point from the upstream
//! speech pipeline. It enqueues synthesis and kicks off the text-channel
//! translation fan-out, then returns. It never blocks on remote I/O.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use tracing::{debug, warn};

use lingcast_session::{CommittedSegment, Session, assert_language_limit};
use lingcast_translate::{PartialSink, RequestClass};
use lingcast_transport::ServerMessage;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct IngressParams {
    /// Owning tenant; informational, sessions are created at attach.
    pub tenant: Option<String>,
}

/// `POST /v1/sessions/{session_id}/segments`
pub async fn on_committed_segment(
    Path(session_id): Path<String>,
    Query(_params): Query<IngressParams>,
    State(state): State<AppState>,
    Json(segment): Json<CommittedSegment>,
) -> impl IntoResponse {
    if !state.settings.streaming.enabled {
        return (StatusCode::SERVICE_UNAVAILABLE, "streaming disabled").into_response();
    }
    let Some(session) = state.registry.get(&session_id) else {
        debug!(session_id, "segment for unknown session dropped");
        return (StatusCode::NOT_FOUND, "no such session").into_response();
    };

    state.orchestrators.enqueue(&session, segment.clone());

    // Text channel: fan the translation out to every subscribed
    // language in the background.
    let state = state.clone();
    tokio::spawn(async move {
        fan_out_text(&state, &session, segment).await;
    });

    StatusCode::ACCEPTED.into_response()
}

/// `POST /v1/sessions/{session_id}/end`
pub async fn end_session(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    state.orchestrators.end_session(&session_id);
    match state.registry.end_session(&session_id) {
        Some(_) => StatusCode::OK,
        None => StatusCode::NOT_FOUND,
    }
}

/// Translates the segment for every language subscribed on the session
/// and broadcasts deltas and finals on the text channel.
async fn fan_out_text(state: &AppState, session: &Arc<Session>, segment: CommittedSegment) {
    let mut langs = session.hub().languages();
    if !langs.contains(&segment.target_lang) {
        langs.push(segment.target_lang.clone());
    }
    if let Err(e) = assert_language_limit(session.entitlements(), langs.len() as u32) {
        warn!(
            session_id = session.session_id(),
            requested = langs.len(),
            "trimming translation fan-out: {e}"
        );
        let allowed = session.entitlements().limits.max_simultaneous_languages as usize;
        langs.truncate(allowed);
    }

    let class = if segment.is_final {
        RequestClass::Final
    } else {
        RequestClass::Partial
    };

    let calls = langs.into_iter().map(|lang| {
        let state = state.clone();
        let session = session.clone();
        let segment = segment.clone();
        async move {
            if lang == segment.source_lang {
                session.hub().broadcast_control(
                    &ServerMessage::TranslationDone {
                        seq_id: segment.seq_id,
                        lang: lang.clone(),
                        text: segment.text.clone(),
                    },
                    Some(&lang),
                );
                return;
            }

            let sink: PartialSink = {
                let session = session.clone();
                let lang = lang.clone();
                let seq_id = segment.seq_id;
                Arc::new(move |accumulated: &str, _is_final: bool| {
                    session.hub().broadcast_control(
                        &ServerMessage::TranslationDelta {
                            seq_id,
                            lang: lang.clone(),
                            text: accumulated.to_string(),
                        },
                        Some(&lang),
                    );
                })
            };

            match state
                .pool
                .translate(&segment.text, &segment.source_lang, &lang, class, Some(sink))
                .await
            {
                Ok(translated) => {
                    session.hub().broadcast_control(
                        &ServerMessage::TranslationDone {
                            seq_id: segment.seq_id,
                            lang: lang.clone(),
                            text: translated,
                        },
                        Some(&lang),
                    );
                }
                Err(e) => {
                    warn!(
                        session_id = session.session_id(),
                        lang, "text translation failed: {e}"
                    );
                }
            }
        }
    });
    futures::future::join_all(calls).await;
}
