use std::convert::Infallible;
use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use paperlens_core::events::StageEvent;
use paperlens_core::input::{load_records, pick_or_synthesize, sort_newest};
use paperlens_core::{
    EventEmitter, OutputStore, PipelineError, PipelineEvent, RunOptions, Stage, StreamOptions,
    SummarizationPipeline, SummaryMode, stream_one,
};

use crate::models::{BadRequest, SummarizeRequest, sse_event};
use crate::state::AppState;

pub async fn stream(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SummarizeRequest>,
) -> Response {
    if req.arxiv_id.trim().is_empty() {
        let body = BadRequest {
            ok: false,
            error: "arxiv_id is required".into(),
        };
        return (StatusCode::BAD_REQUEST, Json(body)).into_response();
    }

    let (tx, rx) = mpsc::channel::<PipelineEvent>(64);

    tokio::spawn(async move {
        let watch = tx.clone();
        let cancel = CancellationToken::new();
        let arxiv_id = req.arxiv_id.clone();

        // Race the run against the client going away
        tokio::select! {
            _ = run(state, req, tx, cancel.clone()) => {}
            _ = watch.closed() => {
                cancel.cancel();
                tracing::info!(arxiv_id = %arxiv_id, "client disconnected, run cancelled");
            }
        }
    });

    let events = ReceiverStream::new(rx).map(|event| Ok::<_, Infallible>(sse_event(&event)));
    Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response()
}

async fn run(
    state: Arc<AppState>,
    req: SummarizeRequest,
    tx: mpsc::Sender<PipelineEvent>,
    cancel: CancellationToken,
) {
    let mut emitter = EventEmitter::new(tx);
    if let Err(e) = handle(&state, &req, &mut emitter, &cancel).await {
        // stream_one reports its own failures; this covers setup errors
        if !e.is_disconnect() && !emitter.is_terminated() {
            tracing::warn!(arxiv_id = %req.arxiv_id, error = %e, "stream setup failed");
            let _ = emitter.error(&e.to_string()).await;
        }
    }
}

async fn handle(
    state: &AppState,
    req: &SummarizeRequest,
    emitter: &mut EventEmitter,
    cancel: &CancellationToken,
) -> Result<(), PipelineError> {
    emitter
        .stage(StageEvent::new(
            Stage::LoadRecords,
            format!("Loading records from {}", req.input_path.display()),
        ))
        .await?;

    let config = req.resolve(&state.config);
    let records = sort_newest(load_records(&req.input_path, &config.document_host)?);
    let paper = pick_or_synthesize(&records, &req.arxiv_id, &config.document_host)?;
    emitter
        .stage(
            StageEvent::new(Stage::PaperSelected, format!("Selected: {}", paper.arxiv_id))
                .with_paper(&paper),
        )
        .await?;

    let mode: SummaryMode = req.mode.parse()?;
    let chat = (state.chat)(&config)?;
    let opts = StreamOptions {
        run: RunOptions {
            model_override: req.model_override(),
            ..RunOptions::from_config(&config, mode)
        },
        save: req.save,
    };
    let pipeline = SummarizationPipeline::new(
        Arc::new(config),
        Arc::clone(&state.transport),
        Arc::clone(&state.pdf),
        chat,
    );
    let store = OutputStore::new(&req.output_dir);

    stream_one(&pipeline, &paper, &opts, &store, emitter, cancel).await?;
    Ok(())
}
