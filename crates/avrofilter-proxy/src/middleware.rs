use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures_util::{StreamExt, stream};
use tracing::{debug, warn};

use crate::context::RequestContext;
use crate::filter::{AvroFilter, Decision, FilterOutcome, PassReason};

/// Strip forbidden fields from Avro object reads on their way out.
///
/// Use with `axum::middleware::from_fn_with_state(Arc<AvroFilter>, avro_filter)`.
pub async fn avro_filter(
    State(filter): State<Arc<AvroFilter>>,
    req: Request,
    next: Next,
) -> Response {
    let ctx = RequestContext::from_parts(req.method(), req.uri().path(), req.headers());

    if !ctx.is_object_read {
        return passed(next.run(req).await, PassReason::NotObjectRead);
    }

    // Privileged callers get the object as stored, without even looking at it
    if filter.has_no_strip_role(ctx.role_names()) {
        debug!(roles = ?ctx.roles, "no-strip role, passing through");
        return passed(next.run(req).await, PassReason::NoStripRole);
    }

    let response = next.run(req).await;

    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());

    let forbidden = match filter.decide(ctx.role_names(), content_type) {
        Decision::PassThrough(reason) => {
            debug!(?reason, ?content_type, "response left untouched");
            return passed(response, reason);
        }
        Decision::Redact(forbidden) => forbidden,
    };

    let outcome = FilterOutcome::Applied {
        datatype: forbidden.datatype().clone(),
        removed: forbidden.len(),
    };
    debug!(
        datatype = %forbidden.datatype(),
        fields = ?forbidden.fields(),
        "redacting response"
    );

    let (mut parts, body) = response.into_parts();
    parts.headers.remove(header::ETAG);
    parts.headers.remove(header::CONTENT_LENGTH);
    parts.extensions.insert(outcome);

    if ctx.is_head {
        return Response::from_parts(parts, body);
    }

    let mut redacted = filter.redact(body.into_data_stream(), &forbidden);

    // Header problems surface on the first item; report them before any byte is sent
    let first = match redacted.next().await {
        Some(Err(err)) => {
            warn!(error = %err, datatype = %forbidden.datatype(), "refusing response");
            return (StatusCode::INTERNAL_SERVER_ERROR, "avro redaction failed").into_response();
        }
        first => first,
    };

    let body = Body::from_stream(stream::iter(first).chain(redacted));
    Response::from_parts(parts, body)
}

fn passed(mut response: Response, reason: PassReason) -> Response {
    response
        .extensions_mut()
        .insert(FilterOutcome::PassedThrough(reason));
    response
}
