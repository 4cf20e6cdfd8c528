//! Servidor web Axum com WebSocket para ajuste e acompanhamento do JST em tempo real

use axum::{
    extract::{
        rejection::JsonRejection,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use jst_core::{
    estimate::Estimates, AggregateConfig, AggregateReport, DocumentTermMatrix, GibbsSampler, JstError,
    Lexicon, MultiRunAggregator, RunConfig, SamplerEvent, Sentiment, Vocabulary,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_ADDR: &str = "0.0.0.0:3000";

#[derive(Deserialize)]
struct DocumentIn {
    id: String,
    /// Tokens já normalizados (caixa baixa, stemizados) pelo chamador.
    tokens: Vec<String>,
}

#[derive(Deserialize)]
struct LexiconEntryIn {
    term: String,
    sentiment: Sentiment,
    #[serde(default)]
    weight: Option<f64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FitRequest {
    documents: Vec<DocumentIn>,
    #[serde(default)]
    lexicon: Vec<LexiconEntryIn>,
    #[serde(default)]
    config: RunConfig,
    /// Quantas palavras listar por (sentimento, tópico).
    #[serde(default = "default_top_n")]
    top_n: usize,
}

fn default_top_n() -> usize {
    10
}

#[derive(Deserialize)]
struct AggregateRequest {
    #[serde(flatten)]
    fit: FitRequest,
    #[serde(default)]
    aggregate: AggregateConfig,
}

#[derive(Serialize)]
struct TopicTerms {
    sentiment: Sentiment,
    topic: usize,
    terms: Vec<(String, f64)>,
}

#[derive(Serialize)]
struct FitResponse {
    seed: u64,
    iterations: usize,
    doc_ids: Vec<String>,
    estimates: Estimates,
    topics: Vec<TopicTerms>,
}

/// Matriz, vocabulário e léxico montados a partir da requisição.
struct Prepared {
    matrix: DocumentTermMatrix,
    vocab: Vocabulary,
    lexicon: Lexicon,
}

fn prepare(req: &FitRequest) -> Result<Prepared, JstError> {
    let docs: Vec<(String, Vec<&str>)> = req
        .documents
        .iter()
        .map(|d| (d.id.clone(), d.tokens.iter().map(|t| t.as_str()).collect()))
        .collect();
    let (matrix, vocab) = DocumentTermMatrix::from_tokenized(&docs)?;
    let lexicon = Lexicon::from_weighted_terms(
        &vocab,
        req.lexicon.iter().map(|e| {
            (
                e.term.as_str(),
                e.sentiment,
                e.weight.unwrap_or(jst_core::lexicon::DEFAULT_LEXICON_WEIGHT),
            )
        }),
    )?;
    Ok(Prepared { matrix, vocab, lexicon })
}

fn topic_terms(estimates: &Estimates, config: &RunConfig, vocab: &Vocabulary, n: usize) -> Vec<TopicTerms> {
    let mut out = Vec::new();
    for (si, &sentiment) in config.num_sentiments.labels().iter().enumerate() {
        for topic in 0..config.num_topics {
            out.push(TopicTerms {
                sentiment,
                topic,
                terms: estimates.top_terms(si, topic, n, vocab),
            });
        }
    }
    out
}

/// Ajuste síncrono de uma execução (roda fora do runtime async).
fn fit_blocking(req: FitRequest, tx: Option<std::sync::mpsc::Sender<SamplerEvent>>) -> Result<FitResponse, JstError> {
    let prepared = prepare(&req)?;
    let mut sampler = GibbsSampler::new(&req.config, &prepared.matrix, &prepared.lexicon)?;
    let estimates = match &tx {
        Some(tx) => sampler.run_streaming(tx, None)?,
        None => sampler.run()?,
    };
    Ok(FitResponse {
        seed: sampler.seed(),
        iterations: sampler.iteration(),
        doc_ids: prepared.matrix.doc_ids().to_vec(),
        topics: topic_terms(&estimates, &req.config, &prepared.vocab, req.top_n),
        estimates,
    })
}

fn aggregate_blocking(req: AggregateRequest) -> Result<AggregateReport, JstError> {
    let prepared = prepare(&req.fit)?;
    MultiRunAggregator::new(&prepared.matrix, &prepared.lexicon, req.fit.config, req.aggregate).run()
}

/// Converte erros do motor em respostas HTTP.
fn error_response(err: JstError) -> Response {
    let status = match &err {
        JstError::InvalidConfig(_) | JstError::DimensionMismatch { .. } | JstError::Data(_) => {
            StatusCode::BAD_REQUEST
        }
        JstError::RunFailed { source, .. } if matches!(**source, JstError::Data(_)) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!(%err, "requisição rejeitada");
    (status, Json(serde_json::json!({ "error": err.to_string() }))).into_response()
}

/// Corpo JSON que não desserializa (inclusive opções inválidas como `numSentiments`).
fn rejection_response(rejection: JsonRejection) -> Response {
    let message = rejection.body_text();
    warn!(error = %message, "corpo da requisição rejeitado");
    (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": message }))).into_response()
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let addr = std::env::var("JST_WEB_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🚀 Servidor JST iniciado em http://{addr}");
    axum::serve(listener, router()).await
}

fn router() -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/fit", post(fit_handler))
        .route("/aggregate", post(aggregate_handler))
        .route("/ws", get(ws_handler))
        .layer(cors)
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Ajuste de uma execução via HTTP POST (sem streaming)
async fn fit_handler(body: Result<Json<FitRequest>, JsonRejection>) -> Response {
    let Json(req) = match body {
        Ok(req) => req,
        Err(rejection) => return rejection_response(rejection),
    };
    info!(
        documents = req.documents.len(),
        topics = req.config.num_topics,
        iters = req.config.num_iters,
        "ajuste solicitado"
    );
    match tokio::task::spawn_blocking(move || fit_blocking(req, None)).await {
        Ok(Ok(resp)) => Json(resp).into_response(),
        Ok(Err(e)) => error_response(e),
        Err(join) => {
            warn!(error = %join, "tarefa de ajuste abortada");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Lote multi-execução com resumo de incerteza de pi
async fn aggregate_handler(body: Result<Json<AggregateRequest>, JsonRejection>) -> Response {
    let Json(req) = match body {
        Ok(req) => req,
        Err(rejection) => return rejection_response(rejection),
    };
    info!(
        documents = req.fit.documents.len(),
        repetitions = req.aggregate.repetitions,
        "agregação solicitada"
    );
    match tokio::task::spawn_blocking(move || aggregate_blocking(req)).await {
        Ok(Ok(report)) => Json(report).into_response(),
        Ok(Err(e)) => error_response(e),
        Err(join) => {
            warn!(error = %join, "tarefa de agregação abortada");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Upgrade HTTP → WebSocket
async fn ws_handler(ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(handle_websocket)
}

/// Lógica do WebSocket: recebe uma requisição de ajuste e envia os eventos do amostrador
async fn handle_websocket(mut socket: WebSocket) {
    info!("WebSocket conectado");

    while let Some(Ok(msg)) = socket.recv().await {
        match msg {
            Message::Text(text) => {
                let req = match serde_json::from_str::<FitRequest>(&text) {
                    Ok(req) => req,
                    Err(e) => {
                        let event = SamplerEvent::Error {
                            message: format!("requisição inválida: {e}"),
                        };
                        if let Ok(json) = serde_json::to_string(&event) {
                            let _ = socket.send(Message::Text(json)).await;
                        }
                        continue;
                    }
                };

                info!(documents = req.documents.len(), "ajuste via WebSocket");

                let (tx_std, rx_std) = std::sync::mpsc::channel::<SamplerEvent>();

                // O amostrador é síncrono: roda em thread separada
                let handle = tokio::task::spawn_blocking(move || fit_blocking(req, Some(tx_std)));
                let outcome = handle.await;

                let mut events: Vec<SamplerEvent> = rx_std.try_iter().collect();
                match outcome {
                    Ok(Err(e)) => events.push(SamplerEvent::Error { message: e.to_string() }),
                    Err(join) => events.push(SamplerEvent::Error { message: join.to_string() }),
                    Ok(Ok(_)) => {}
                }

                for event in &events {
                    if let Ok(json) = serde_json::to_string(event) {
                        if socket.send(Message::Text(json)).await.is_err() {
                            return; // cliente desconectou
                        }
                    }
                }
            }
            Message::Close(_) => {
                info!("WebSocket desconectado");
                return;
            }
            Message::Ping(payload) => {
                let _ = socket.send(Message::Pong(payload)).await;
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn request_json() -> &'static str {
        r#"{
            "documents": [
                {"id": "discurso1", "tokens": ["bom", "progresso", "bom", "emprego"]},
                {"id": "discurso2", "tokens": ["crise", "ruim", "desemprego", "ruim"]}
            ],
            "lexicon": [
                {"term": "bom", "sentiment": "positive"},
                {"term": "ruim", "sentiment": "negative", "weight": 0.8}
            ],
            "config": {"numTopics": 2, "numIters": 20, "seed": 3},
            "topN": 3
        }"#
    }

    #[test]
    fn test_fit_request_roundtrip() {
        let req: FitRequest = serde_json::from_str(request_json()).unwrap();
        let resp = fit_blocking(req, None).unwrap();
        assert_eq!(resp.doc_ids, vec!["discurso1", "discurso2"]);
        assert_eq!(resp.seed, 3);
        // 3 sentimentos x 2 tópicos
        assert_eq!(resp.topics.len(), 6);
        assert!(resp.topics.iter().all(|t| t.terms.len() == 3));
    }

    #[test]
    fn test_streaming_fit_emits_done() {
        let req: FitRequest = serde_json::from_str(request_json()).unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        fit_blocking(req, Some(tx)).unwrap();
        let events: Vec<SamplerEvent> = rx.try_iter().collect();
        assert!(matches!(events.last(), Some(SamplerEvent::Done { .. })));
    }

    #[test]
    fn test_aggregate_request_defaults() {
        let json = r#"{
            "documents": [{"id": "a", "tokens": ["bom", "dia"]}],
            "config": {"numTopics": 1, "numIters": 5, "seed": 1, "ncores": 1},
            "aggregate": {"repetitions": 3}
        }"#;
        let req: AggregateRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.aggregate.confidence_level, 0.95);
        let report = aggregate_blocking(req).unwrap();
        assert_eq!(report.runs_completed, 3);
    }

    #[tokio::test]
    async fn test_health_route() {
        let resp = router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_fit_route_rejects_zero_topics() {
        let body = r#"{"documents": [{"id": "a", "tokens": ["bom"]}], "config": {"numTopics": 0}}"#;
        let resp = router()
            .oneshot(
                Request::post("/fit")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(json["error"].as_str().unwrap().contains("numTopics"));
    }

    #[tokio::test]
    async fn test_invalid_sentiment_count_is_bad_request_json() {
        let body = r#"{"documents": [{"id": "a", "tokens": ["bom"]}], "config": {"numTopics": 2, "numSentiments": 5}}"#;
        for route in ["/fit", "/aggregate"] {
            let resp = router()
                .oneshot(
                    Request::post(route)
                        .header("content-type", "application/json")
                        .body(Body::from(body))
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{route}");
            let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
            let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
            assert!(json["error"].as_str().unwrap().contains("numSentiments"), "{json}");
        }
    }

    #[test]
    fn test_invalid_config_maps_to_bad_request() {
        let resp = error_response(JstError::InvalidConfig("numTopics".into()));
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
