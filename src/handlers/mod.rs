mod download;
mod files;
mod pages;
mod stats;

use std::{net::SocketAddr, path::Path};

use axum::{
    Router,
    body::Body,
    http::{
        HeaderMap, HeaderValue,
        header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tokio_util::io::ReaderStream;
use tower_http::trace::TraceLayer;

use crate::{context::AppContext, error::ApiError};

pub use download::{suggested_filename, validate_url};

pub fn build_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/", get(pages::index))
        .route("/about", get(pages::about))
        .route("/how-it-works", get(pages::how_it_works))
        .route("/faq", get(pages::faq))
        .route("/terms", get(pages::terms))
        .route("/privacy", get(pages::privacy))
        .route("/contact", get(pages::contact))
        .route("/disclaimer", get(pages::disclaimer))
        .route("/dmca", get(pages::dmca))
        .route("/download", post(download::download))
        .route("/files", get(files::list_files))
        .route("/files/{name}", get(files::fetch_file))
        .route("/api/stats", get(stats::stats))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
}

fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    let check_header = |key: &str| {
        headers
            .get(key)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToString::to_string)
    };

    if let Some(forwarded) = check_header("x-forwarded-for") {
        let first_ip = forwarded
            .split(',')
            .next()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToString::to_string);

        if first_ip.is_some() {
            return first_ip;
        }
    }

    check_header("cf-connecting-ip").or_else(|| check_header("x-real-ip"))
}

fn client_ip_for_request(ctx: &AppContext, headers: &HeaderMap, addr: SocketAddr) -> String {
    if ctx.config.trust_proxy_headers {
        extract_client_ip(headers).unwrap_or_else(|| addr.ip().to_string())
    } else {
        addr.ip().to_string()
    }
}

/// Streams `path` back as an attachment named `download_name`.
async fn attachment_response(path: &Path, download_name: &str) -> Result<Response, ApiError> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|error| match error.kind() {
            std::io::ErrorKind::NotFound => ApiError::not_found("File not found."),
            _ => ApiError::internal(format!("Could not open file: {error}")),
        })?;
    let metadata = file
        .metadata()
        .await
        .map_err(|error| ApiError::internal(format!("Could not read file metadata: {error}")))?;

    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static(content_type_for_filename(download_name)),
    );
    headers.insert(CONTENT_LENGTH, HeaderValue::from(metadata.len()));
    headers.insert(
        CONTENT_DISPOSITION,
        HeaderValue::from_str(&build_content_disposition(download_name))
            .map_err(|_| ApiError::internal("Could not build the download header."))?,
    );

    let body = Body::from_stream(ReaderStream::new(file));
    Ok((headers, body).into_response())
}

fn content_type_for_filename(filename: &str) -> &'static str {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "mov" => "video/quicktime",
        "m4a" => "audio/mp4",
        "mp3" => "audio/mpeg",
        _ => "application/octet-stream",
    }
}

fn build_content_disposition(filename: &str) -> String {
    let safe_ascii = sanitize_ascii_filename(filename);
    format!(
        "attachment; filename=\"{safe_ascii}\"; filename*=UTF-8''{}",
        urlencoding::encode(filename)
    )
}

fn sanitize_ascii_filename(value: &str) -> String {
    let sanitized = value
        .chars()
        .map(|character| {
            if character.is_ascii_alphanumeric()
                || matches!(character, '.' | '-' | '_' | ' ' | '(' | ')')
            {
                character
            } else {
                '_'
            }
        })
        .collect::<String>();

    let compact = sanitized.trim();
    if compact.is_empty() {
        "download.bin".to_string()
    } else {
        compact.to_string()
    }
}
