use axum::{
    Json, Router,
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use std::sync::Arc;

use avrofilter_config::Config;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::context::strip_identity_headers;
use crate::filter::AvroFilter;
use crate::middleware::avro_filter;

/// Reverse proxy that forwards everything to the object store and filters
/// Avro object reads on the way back.
pub struct ProxyServer {
    pub filter: Arc<AvroFilter>,
    pub client: reqwest::Client,
    pub upstream: String,
    /// Whether inbound identity headers come from a trusted auth layer
    pub trusted_identity_headers: bool,
}

#[derive(Clone)]
struct AppState {
    server: Arc<ProxyServer>,
}

// Meaningful for a single connection only; never forwarded
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

impl ProxyServer {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let filter = AvroFilter::from_config(&config.filter)?;
        let client = reqwest::Client::builder().build()?;

        Ok(Self {
            filter: Arc::new(filter),
            client,
            upstream: config.proxy.upstream.trim_end_matches('/').to_string(),
            trusted_identity_headers: config.proxy.trusted_identity_headers,
        })
    }

    pub fn router(self) -> Router {
        let filter = Arc::clone(&self.filter);
        let trusted = self.trusted_identity_headers;
        let app_state = AppState {
            server: Arc::new(self),
        };

        let mut router = Router::new()
            .route("/_avrofilter/info", get(handle_info))
            .fallback(handle_forward)
            .layer(middleware::from_fn_with_state(filter, avro_filter));

        // runs before the filter sees the request
        if !trusted {
            router = router.layer(middleware::from_fn(untrusted_identity));
        }

        router.layer(TraceLayer::new_for_http()).with_state(app_state)
    }

    pub async fn serve(config: Config) -> anyhow::Result<()> {
        let app = Self::new(&config)?.router();

        let addr = format!("{}:{}", config.proxy.host, config.proxy.port);
        let listener = TcpListener::bind(&addr).await?;

        info!(
            "avrofilter proxy listening on {}, upstream {}",
            addr, config.proxy.upstream
        );
        if !config.proxy.trusted_identity_headers {
            warn!("identity headers from clients are ignored; every caller is treated as roleless");
        }

        axum::serve(listener, app).await?;

        Ok(())
    }
}

/// Callers get no roles unless an auth layer in front of us vouches for them
async fn untrusted_identity(mut req: Request, next: Next) -> Response {
    strip_identity_headers(req.headers_mut());
    next.run(req).await
}

/// GET /_avrofilter/info - What is protected, without revealing who may see it
async fn handle_info(State(state): State<AppState>) -> Json<serde_json::Value> {
    let policy = state.server.filter.policy();
    let mut datatypes: Vec<&str> = policy.datatypes().map(|d| d.as_str()).collect();
    datatypes.sort_unstable();

    Json(serde_json::json!({
        "name": "avrofilter",
        "version": env!("CARGO_PKG_VERSION"),
        "upstream": state.server.upstream,
        "protected_datatypes": datatypes,
    }))
}

/// Everything else goes to the upstream object store
async fn handle_forward(State(state): State<AppState>, req: Request) -> Response {
    match forward(&state.server, req).await {
        Ok(response) => response,
        Err(e) => {
            warn!("upstream request failed: {}", e);
            (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
        }
    }
}

async fn forward(server: &ProxyServer, req: Request) -> anyhow::Result<Response> {
    let (parts, body) = req.into_parts();

    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = format!("{}{}", server.upstream, path);

    let mut headers = parts.headers;
    let has_body = headers.contains_key(header::CONTENT_LENGTH)
        || headers.contains_key(header::TRANSFER_ENCODING);
    strip_hop_by_hop(&mut headers);
    headers.remove(header::HOST);

    let mut request = server.client.request(parts.method, url).headers(headers);
    if has_body {
        request = request.body(reqwest::Body::wrap_stream(body.into_data_stream()));
    }
    let upstream = request.send().await?;

    let status = upstream.status();
    let mut headers = upstream.headers().clone();
    strip_hop_by_hop(&mut headers);

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", HeaderValue::from_static("close"));
        headers.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        headers.insert("x-roles", HeaderValue::from_static("role1"));

        strip_hop_by_hop(&mut headers);

        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key("x-roles"));
    }

    #[test]
    fn test_new_trims_upstream() {
        let mut config = Config::default();
        config.proxy.upstream = "http://swift.internal:8080/".to_string();
        let server = ProxyServer::new(&config).unwrap();
        assert_eq!(server.upstream, "http://swift.internal:8080");
        assert!(!server.trusted_identity_headers);
    }

    #[test]
    fn test_new_rejects_bad_policy() {
        let mut config = Config::default();
        config
            .filter
            .retain_keys
            .insert("role1".to_string(), "flowtuple::x".to_string());
        assert!(ProxyServer::new(&config).is_err());
    }
}
