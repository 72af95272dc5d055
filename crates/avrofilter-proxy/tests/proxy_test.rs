//! End-to-end tests: client -> avrofilter proxy -> stub object store

use std::collections::BTreeMap;

use avrofilter_codec::{
    AvroBinaryCodec, BlockCodec, ContainerReader, ContainerWriter, ParsedSchema, Record, Value,
};
use avrofilter_config::Config;
use avrofilter_proxy::{FilterOutcome, PassReason, ProxyServer};
use axum::{
    Router,
    body::Body,
    extract::Request,
    http::{StatusCode, header},
    response::Response,
    routing::get,
};
use tokio::net::TcpListener;
use tower::ServiceExt;

const SCHEMA: &str = r#"{
  "type": "record",
  "name": "flowtuple",
  "namespace": "org.caida",
  "fields": [
    {"name": "src_ip", "type": "string"},
    {"name": "dest_ip", "type": "string"},
    {"name": "netacq_continent", "type": ["null", "string"], "default": null},
    {"name": "netacq_country", "type": ["null", "string"], "default": null},
    {"name": "packet_cnt", "type": "long"}
  ]
}"#;

const AVRO_TYPE: &str = "application/vnd.caida.flowtuple.avro";

fn flowtuples(codec: BlockCodec) -> Vec<u8> {
    let schema = ParsedSchema::parse_str(SCHEMA).unwrap();
    let mut writer = ContainerWriter::new(schema, codec, &AvroBinaryCodec, [0x5a; 16]).unwrap();
    for i in 0..50i64 {
        writer
            .append(&Record::new(vec![
                ("src_ip".to_string(), Value::String(format!("198.51.100.{}", i))),
                ("dest_ip".to_string(), Value::String(format!("203.0.113.{}", i))),
                (
                    "netacq_continent".to_string(),
                    Value::Union(1, Box::new(Value::String("OC".to_string()))),
                ),
                ("netacq_country".to_string(), Value::Union(0, Box::new(Value::Null))),
                ("packet_cnt".to_string(), Value::Long(i * 3)),
            ]))
            .unwrap();
        if i % 10 == 9 {
            writer.flush().unwrap();
        }
    }
    writer.finish().unwrap()
}

fn object_response(body: Vec<u8>) -> Response {
    Response::builder()
        .header(header::CONTENT_TYPE, AVRO_TYPE)
        .header(header::ETAG, "\"0123456789abcdef\"")
        .header(header::CONTENT_LENGTH, body.len())
        .body(Body::from(body))
        .unwrap()
}

/// Serve a tiny object store on an ephemeral port and return its base URL
async fn spawn_upstream() -> String {
    let app = Router::new()
        .route(
            "/v1/AUTH_test/flows/plain.avro",
            get(|| async { object_response(flowtuples(BlockCodec::Null)) }),
        )
        .route(
            "/v1/AUTH_test/flows/deflate.avro",
            get(|| async { object_response(flowtuples(BlockCodec::Deflate)) }),
        )
        .route(
            "/v1/AUTH_test/flows/truncated.avro",
            get(|| async {
                let mut data = flowtuples(BlockCodec::Null);
                data.truncate(data.len() - 7);
                object_response(data)
            }),
        )
        .route(
            "/v1/AUTH_test/flows/notes.txt",
            get(|| async { ([(header::CONTENT_TYPE, "text/plain")], "hello") }),
        );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn config(upstream: String) -> Config {
    let mut config = Config::default();
    config.proxy.upstream = upstream;
    config.proxy.trusted_identity_headers = true;
    config.filter.nostrip_roles = "ops".to_string();
    config.filter.retain_keys = BTreeMap::from([
        (
            "role1".to_string(),
            "flowtuple:netacq_continent, flowtuple:netacq_country".to_string(),
        ),
        ("role2".to_string(), "flowtuple:dest_ip".to_string()),
    ]);
    config
}

async fn proxy() -> Router {
    let upstream = spawn_upstream().await;
    ProxyServer::new(&config(upstream)).unwrap().router()
}

fn get_as(uri: &str, roles: &str) -> Request {
    Request::builder()
        .uri(uri)
        .header("x-identity-status", "Confirmed")
        .header("x-roles", roles)
        .body(Body::empty())
        .unwrap()
}

async fn read_body(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

#[tokio::test]
async fn test_role1_sees_geo_but_not_dest_ip() {
    let app = proxy().await;

    for object in ["plain.avro", "deflate.avro"] {
        let response = app
            .clone()
            .oneshot(get_as(&format!("/v1/AUTH_test/flows/{}", object), "role1"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::ETAG).is_none());
        assert!(response.headers().get(header::CONTENT_LENGTH).is_none());

        let body = read_body(response).await;
        let reader = ContainerReader::new(&body, &AvroBinaryCodec).unwrap();
        assert_eq!(
            reader.schema().field_names().unwrap(),
            vec!["src_ip", "netacq_continent", "netacq_country", "packet_cnt"]
        );

        let records = reader.read_all().unwrap();
        assert_eq!(records.len(), 50);
        assert_eq!(records[7].get("packet_cnt"), Some(&Value::Long(21)));
        assert_eq!(
            records[7].get("src_ip"),
            Some(&Value::String("198.51.100.7".to_string()))
        );
    }
}

#[tokio::test]
async fn test_union_of_roles_sees_everything() {
    let app = proxy().await;
    let response = app
        .oneshot(get_as("/v1/AUTH_test/flows/plain.avro", "role1,role2"))
        .await
        .unwrap();

    assert!(response.headers().get(header::ETAG).is_some());
    assert_eq!(
        response.extensions().get::<FilterOutcome>(),
        Some(&FilterOutcome::PassedThrough(PassReason::NothingForbidden))
    );
    assert_eq!(read_body(response).await, flowtuples(BlockCodec::Null));
}

#[tokio::test]
async fn test_no_strip_roles_bypass() {
    let app = proxy().await;

    for role in ["admin", "ops"] {
        let response = app
            .clone()
            .oneshot(get_as("/v1/AUTH_test/flows/deflate.avro", role))
            .await
            .unwrap();
        assert!(response.headers().get(header::ETAG).is_some());
        assert_eq!(read_body(response).await, flowtuples(BlockCodec::Deflate));
    }
}

#[tokio::test]
async fn test_roleless_caller_loses_all_protected_fields() {
    let app = proxy().await;
    let response = app
        .oneshot(get_as("/v1/AUTH_test/flows/plain.avro", ""))
        .await
        .unwrap();

    let body = read_body(response).await;
    let reader = ContainerReader::new(&body, &AvroBinaryCodec).unwrap();
    assert_eq!(
        reader.schema().field_names().unwrap(),
        vec!["src_ip", "packet_cnt"]
    );
}

#[tokio::test]
async fn test_client_roles_ignored_by_default() {
    let upstream = spawn_upstream().await;
    let mut config = config(upstream);
    config.proxy.trusted_identity_headers = false;
    let app = ProxyServer::new(&config).unwrap().router();

    let response = app
        .oneshot(get_as("/v1/AUTH_test/flows/plain.avro", "admin"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(header::ETAG).is_none());
    let body = read_body(response).await;
    let reader = ContainerReader::new(&body, &AvroBinaryCodec).unwrap();
    assert_eq!(
        reader.schema().field_names().unwrap(),
        vec!["src_ip", "packet_cnt"]
    );
}

#[tokio::test]
async fn test_unrelated_objects_untouched() {
    let app = proxy().await;
    let response = app
        .oneshot(get_as("/v1/AUTH_test/flows/notes.txt", "role1"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_body(response).await, b"hello".to_vec());
}

#[tokio::test]
async fn test_truncated_object_never_completes() {
    let app = proxy().await;
    let response = app
        .oneshot(get_as("/v1/AUTH_test/flows/truncated.avro", "role2"))
        .await
        .unwrap();

    // Header was fine, so the response started; the body must fail
    assert_eq!(response.status(), StatusCode::OK);
    let result = axum::body::to_bytes(response.into_body(), usize::MAX).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_missing_object_status_forwarded() {
    let app = proxy().await;
    let response = app
        .oneshot(get_as("/v1/AUTH_test/flows/absent.avro", "role1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_info_endpoint() {
    let app = proxy().await;
    let response = app
        .oneshot(
            Request::builder()
                .uri("/_avrofilter/info")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let info: serde_json::Value = serde_json::from_slice(&read_body(response).await).unwrap();
    assert_eq!(info["name"], "avrofilter");
    assert_eq!(info["protected_datatypes"], serde_json::json!(["flowtuple"]));
}

#[tokio::test]
async fn test_unreachable_upstream_is_bad_gateway() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let app = ProxyServer::new(&config(format!("http://{}", addr)))
        .unwrap()
        .router();
    let response = app
        .oneshot(get_as("/v1/AUTH_test/flows/plain.avro", "role1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}
