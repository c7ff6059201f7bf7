//! HTTP surface of the gateway.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use policy::CallerContext;
use runtime::{Error, GatewayRequest, GatewayResponse, ModelError};
use tokio::net::TcpListener;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::app::Gateway;

/// Header carrying the authenticated caller's id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Shared state of all request handlers.
pub struct AppState {
    pub gateway: Gateway,
    pub request_timeout: Duration,
    /// Cancelled on shutdown; every request token is a child of it.
    pub shutdown: CancellationToken,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/gateway", post(handle_gateway))
        .route("/health", get(health))
        .with_state(state)
}

/// Serve until the shutdown token is cancelled, then drain in-flight requests.
pub async fn serve(state: Arc<AppState>, listener: TcpListener) -> std::io::Result<()> {
    let shutdown = state.shutdown.clone();
    info!(addr = ?listener.local_addr()?, "gateway listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    info!("gateway stopped");
    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

async fn handle_gateway(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<GatewayRequest>, JsonRejection>,
) -> (StatusCode, Json<GatewayResponse>) {
    let request_id = Uuid::new_v4();
    let span = info_span!("request", %request_id);

    async move {
        let Json(request) = match payload {
            Ok(request) => request,
            Err(rejection) => {
                warn!(error = %rejection, "rejected payload");
                return (
                    StatusCode::BAD_REQUEST,
                    Json(GatewayResponse::failure("invalid request payload")),
                );
            }
        };

        let ctx = caller_context(&headers);
        let cancel = state.shutdown.child_token();
        let deadline = Instant::now() + state.request_timeout;

        let result = match request.validate() {
            Ok(text) => state.gateway.run(text, &ctx, deadline, &cancel).await,
            Err(err) => Err(err),
        };

        let status = status_for(&result);
        match &result {
            Ok(completion) => info!(rounds = completion.rounds, "request completed"),
            Err(err) => warn!(error = %err, status = status.as_u16(), "request failed"),
        }
        (status, Json(GatewayResponse::from_result(&result)))
    }
    .instrument(span)
    .await
}

fn caller_context(headers: &HeaderMap) -> CallerContext {
    headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(CallerContext::user)
        .unwrap_or_default()
}

fn status_for<T>(result: &Result<T, Error>) -> StatusCode {
    match result {
        Ok(_) => StatusCode::OK,
        Err(Error::EmptyRequest) => StatusCode::BAD_REQUEST,
        Err(Error::Cancelled) => {
            StatusCode::from_u16(499).unwrap_or(StatusCode::SERVICE_UNAVAILABLE)
        }
        Err(Error::Model(ModelError::Timeout)) => StatusCode::GATEWAY_TIMEOUT,
        Err(Error::Model(_)) => StatusCode::BAD_GATEWAY,
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use serde_json::{Value, json};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Harness {
        url: String,
        shutdown: CancellationToken,
        model: MockServer,
        toolbox: MockServer,
    }

    async fn start() -> Harness {
        start_with(|_| {}).await
    }

    async fn start_with(customize: impl FnOnce(&mut Config)) -> Harness {
        let model = MockServer::start().await;
        let toolbox = MockServer::start().await;

        let mut config = Config::default().with_env(|key| match key {
            "OPENAI_API_KEY" => Some("sk-test".into()),
            _ => None,
        });
        config.model.base_url = model.uri();
        config.toolbox.base_url = toolbox.uri();
        config.orchestrator.retry_max_attempts = 1;
        customize(&mut config);

        let shutdown = CancellationToken::new();
        let state = Arc::new(AppState {
            gateway: crate::app::build(&config).unwrap(),
            request_timeout: config.request_timeout(),
            shutdown: shutdown.clone(),
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(serve(state, listener));

        Harness {
            url,
            shutdown,
            model,
            toolbox,
        }
    }

    fn completion(message: Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({"choices": [{"message": message}]}))
    }

    async fn post(harness: &Harness, user: Option<&str>, body: &str) -> (u16, Value) {
        let mut request = reqwest::Client::new()
            .post(format!("{}/gateway", harness.url))
            .header("content-type", "application/json")
            .body(body.to_string());
        if let Some(user) = user {
            request = request.header(USER_ID_HEADER, user);
        }
        let response = request.send().await.unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }

    #[tokio::test]
    async fn answers_with_tool_results_for_the_header_user() {
        let harness = start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(completion(json!({
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {"name": "get_balances", "arguments": "{\"userId\":\"999\"}"}
                }]
            })))
            .up_to_n_times(1)
            .mount(&harness.model)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(completion(json!({"content": "You hold 0.5 BTC."})))
            .mount(&harness.model)
            .await;
        Mock::given(method("GET"))
            .and(path("/balances"))
            .and(query_param("userId", "42"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"data":["BTC: 0.5"]}"#))
            .expect(1)
            .mount(&harness.toolbox)
            .await;

        let (status, body) = post(
            &harness,
            Some("42"),
            r#"{"requestText":"what is my balance?"}"#,
        )
        .await;

        assert_eq!(status, 200);
        assert_eq!(body, json!({"responseText": "You hold 0.5 BTC."}));
    }

    #[tokio::test]
    async fn configured_route_overrides_the_default() {
        let harness = start_with(|config| {
            config
                .toolbox
                .routes
                .insert("get_exchange_pairs".into(), "/v2/pairs".into());
        })
        .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(completion(json!({
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {"name": "get_exchange_pairs", "arguments": "{}"}
                }]
            })))
            .up_to_n_times(1)
            .mount(&harness.model)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(completion(json!({"content": "BTC/USDT is listed."})))
            .mount(&harness.model)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/pairs"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"data":["BTC/USDT"]}"#))
            .expect(1)
            .mount(&harness.toolbox)
            .await;

        let (status, body) = post(&harness, None, r#"{"requestText":"which pairs?"}"#).await;

        assert_eq!(status, 200);
        assert_eq!(body, json!({"responseText": "BTC/USDT is listed."}));
    }

    #[tokio::test]
    async fn blank_and_malformed_requests_are_bad_requests() {
        let harness = start().await;

        let (status, body) = post(&harness, None, r#"{"requestText":"   "}"#).await;
        assert_eq!(status, 400);
        assert!(body["error"].is_string());

        let (status, body) = post(&harness, None, "not json").await;
        assert_eq!(status, 400);
        assert_eq!(body, json!({"error": "invalid request payload"}));

        assert!(harness.model.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn provider_failure_is_bad_gateway() {
        let harness = start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&harness.model)
            .await;

        let (status, body) = post(&harness, None, r#"{"requestText":"hi"}"#).await;
        assert_eq!(status, 502);
        assert_eq!(body, json!({"error": runtime::gateway::UNAVAILABLE}));
    }

    #[tokio::test]
    async fn shutdown_cancels_in_flight_requests() {
        let harness = start().await;
        Mock::given(method("POST"))
            .respond_with(completion(json!({"content": "late"})).set_delay(Duration::from_secs(10)))
            .mount(&harness.model)
            .await;

        let shutdown = harness.shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            shutdown.cancel();
        });

        let (status, body) = post(&harness, None, r#"{"requestText":"hi"}"#).await;
        assert_eq!(status, 499);
        assert_eq!(body, json!({"error": runtime::gateway::CANCELLED}));
    }

    #[tokio::test]
    async fn health_is_ok() {
        let harness = start().await;
        let response = reqwest::get(format!("{}/health", harness.url)).await.unwrap();
        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(response.text().await.unwrap(), "ok");
    }

    #[test]
    fn status_mapping() {
        let ok: Result<(), Error> = Ok(());
        assert_eq!(status_for(&ok), StatusCode::OK);
        assert_eq!(
            status_for::<()>(&Err(Error::Model(ModelError::Timeout))),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_for::<()>(&Err(Error::Model(ModelError::RateLimited("slow down".into())))),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for::<()>(&Err(Error::RoundLimitExceeded {
                max_rounds: 3,
                partial: None
            })),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(status_for::<()>(&Err(Error::Cancelled)).as_u16(), 499);
    }

    #[test]
    fn identity_comes_from_header() {
        let mut headers = HeaderMap::new();
        assert!(caller_context(&headers).is_empty());

        headers.insert(USER_ID_HEADER, " 7 ".parse().unwrap());
        assert_eq!(caller_context(&headers), CallerContext::user("7"));
    }
}
