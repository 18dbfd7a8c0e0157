//! C11: thin local HTTP adapter in front of the façade (§4.11, §6.5). Owns
//! no state of its own — every route maps directly onto a `SessionFacade`
//! method. Grounded on the teacher's `server.rs` axum `Router` +
//! `CorsLayer::permissive()` + `State<ServerContext>` shape, with the
//! remote-backend routes (`/auth`, `/devices`, `/update`) dropped since
//! there is no cloud backend left to proxy to.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use log::info;
use serde::Deserialize;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tower_http::cors::CorsLayer;

use crate::events::Event;
use crate::facade::{SessionFacade, StatusSnapshot};
use crate::interruption::InterruptionEvent;

#[derive(Clone)]
struct ServerContext {
    facade: SessionFacade,
}

pub async fn start_server(facade: SessionFacade, local_port: u16) {
    let context = ServerContext { facade };

    let app = Router::new()
        .route("/status", get(get_status))
        .route("/start", post(start_recording))
        .route("/pause", post(pause_recording))
        .route("/resume", post(resume_recording))
        .route("/reset", post(reset_recording))
        .route("/stop", post(stop_recording))
        .route("/interrupt", post(post_interrupt))
        .route("/waveform/config", post(configure_waveform))
        .route("/speech/config", post(configure_speech_detection))
        .route("/vad/config", post(configure_advanced_vad))
        .route("/events", get(sse_events))
        .layer(CorsLayer::permissive())
        .with_state(context);

    let bind_addr = format!("127.0.0.1:{local_port}");
    info!("local command surface listening on http://{bind_addr}");
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("local command surface port should be bindable");
    axum::serve(listener, app)
        .await
        .expect("local command surface should not exit");
}

async fn get_status(State(ctx): State<ServerContext>) -> Json<StatusSnapshot> {
    Json(ctx.facade.status())
}

async fn start_recording(State(ctx): State<ServerContext>) -> impl IntoResponse {
    respond(ctx.facade.start())
}

async fn pause_recording(State(ctx): State<ServerContext>) -> impl IntoResponse {
    respond(ctx.facade.pause())
}

async fn resume_recording(State(ctx): State<ServerContext>) -> impl IntoResponse {
    respond(ctx.facade.resume())
}

async fn reset_recording(State(ctx): State<ServerContext>) -> impl IntoResponse {
    respond(ctx.facade.reset())
}

async fn stop_recording(State(ctx): State<ServerContext>) -> impl IntoResponse {
    match ctx.facade.stop() {
        Ok(path) => (StatusCode::OK, Json(serde_json::json!({ "path": path }))).into_response(),
        Err(e) => (
            StatusCode::from(e.propagation()),
            Json(serde_json::json!({ "error": e.kind_name(), "message": e.to_string() })),
        )
            .into_response(),
    }
}

#[derive(Deserialize)]
struct InterruptRequest {
    kind: String,
}

async fn post_interrupt(
    State(ctx): State<ServerContext>,
    Json(req): Json<InterruptRequest>,
) -> impl IntoResponse {
    let event = match req.kind.as_str() {
        "focus_gain" => InterruptionEvent::FocusGain,
        "focus_loss_permanent" => InterruptionEvent::FocusLossPermanent,
        "focus_loss_transient" => InterruptionEvent::FocusLossTransient,
        "focus_loss_duck" => InterruptionEvent::FocusLossDuck,
        "route_change_headphone_disconnect" => InterruptionEvent::RouteChangeHeadphoneDisconnect,
        "route_change_other" => InterruptionEvent::RouteChangeOther,
        "phone_call_begin" => InterruptionEvent::PhoneCallBegin,
        "phone_call_end" => InterruptionEvent::PhoneCallEnd,
        other => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": "UnknownInterruptionKind", "kind": other })),
            )
                .into_response();
        }
    };
    ctx.facade.handle_interruption(event);
    StatusCode::NO_CONTENT.into_response()
}

#[derive(Deserialize)]
struct WaveformConfigRequest {
    debounce_s: Option<f64>,
    bars: Option<u32>,
}

async fn configure_waveform(
    State(ctx): State<ServerContext>,
    Json(req): Json<WaveformConfigRequest>,
) -> impl IntoResponse {
    ctx.facade.configure_waveform(req.debounce_s, req.bars);
    StatusCode::NO_CONTENT
}

#[derive(Deserialize)]
struct SpeechDetectionRequest {
    enabled: bool,
    threshold: Option<f64>,
    vad: Option<bool>,
    calibration_ms: Option<u64>,
}

async fn configure_speech_detection(
    State(ctx): State<ServerContext>,
    Json(req): Json<SpeechDetectionRequest>,
) -> impl IntoResponse {
    ctx.facade
        .configure_speech_detection(req.enabled, req.threshold, req.vad, req.calibration_ms);
    StatusCode::NO_CONTENT
}

#[derive(Deserialize)]
struct AdvancedVadRequest {
    enabled: bool,
    window: Option<usize>,
    voice_filter: Option<bool>,
}

async fn configure_advanced_vad(
    State(ctx): State<ServerContext>,
    Json(req): Json<AdvancedVadRequest>,
) -> impl IntoResponse {
    ctx.facade
        .configure_advanced_vad(req.enabled, req.window, req.voice_filter);
    StatusCode::NO_CONTENT
}

fn respond(result: crate::error::EngineResult<()>) -> impl IntoResponse {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => (
            StatusCode::from(e.propagation()),
            Json(serde_json::json!({ "error": e.kind_name(), "message": e.to_string() })),
        )
            .into_response(),
    }
}

impl From<crate::error::Propagation> for StatusCode {
    fn from(p: crate::error::Propagation) -> Self {
        match p {
            crate::error::Propagation::Local => StatusCode::CONFLICT,
            crate::error::Propagation::Surface => StatusCode::UNPROCESSABLE_ENTITY,
            crate::error::Propagation::Fatal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// §6.5: `GET /events` streams every façade event as a server-sent event so
/// a driver or test harness can observe state without polling `/status`.
async fn sse_events(
    State(ctx): State<ServerContext>,
) -> Sse<impl Stream<Item = Result<SseEvent, std::convert::Infallible>>> {
    let (async_tx, async_rx) = tokio::sync::mpsc::unbounded_channel::<Event>();
    let (bridge_tx, bridge_rx) = crossbeam_channel::unbounded::<Event>();

    ctx.facade.on_event(Box::new(move |event: &Event| {
        let _ = bridge_tx.send(event.clone());
    }));

    // The façade's listeners are plain synchronous closures invoked from
    // whichever thread emits the event; bridge them onto the tokio runtime
    // via a blocking task so the SSE stream can stay purely async.
    tokio::task::spawn_blocking(move || {
        while let Ok(event) = bridge_rx.recv() {
            if async_tx.send(event).is_err() {
                break;
            }
        }
    });

    let stream = UnboundedReceiverStream::new(async_rx).map(|event| {
        let json = serde_json::to_string(&event).unwrap_or_default();
        Ok(SseEvent::default().data(json))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
