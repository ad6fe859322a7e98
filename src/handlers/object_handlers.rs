//! Read path for stored objects, so derived objects are reachable the way
//! they are from a website-hosted bucket: alias objects answer with a
//! permanent redirect to their fingerprinted target, everything else is
//! served with the headers the pipeline assigned.

use crate::{errors::AppError, routes::routes::AppState, services::store::ObjectStore};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    response::Response,
};

/// GET `/o/{bucket}/{*key}` — serve an object, or 301 to the fingerprinted
/// copy when the key is a redirect alias.
pub async fn get_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let fetched = state.store.fetch(&bucket, &key).await?;

    if let Some(location) = fetched.redirect_location.as_deref() {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::MOVED_PERMANENTLY;
        response.headers_mut().insert(
            header::LOCATION,
            HeaderValue::from_str(location)
                .map_err(|_| AppError::internal("stored redirect location is not a valid header"))?,
        );
        return Ok(response);
    }

    let mut response = Response::new(Body::from(fetched.body.clone()));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();

    let content_type = fetched
        .content_type
        .as_deref()
        .unwrap_or("application/octet-stream");
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&fetched.body.len().to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("0")),
    );
    if let Some(cache_control) = fetched.cache_control.as_deref() {
        if let Ok(value) = HeaderValue::from_str(cache_control) {
            headers.insert(header::CACHE_CONTROL, value);
        }
    }
    let quoted = format!("\"{}\"", fetched.etag);
    if let Ok(value) = HeaderValue::from_str(&quoted) {
        headers.insert(header::ETAG, value);
    }

    Ok(response)
}
