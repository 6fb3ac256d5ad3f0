use std::{io::Write, net::SocketAddr};

use axum::{
    body::Bytes,
    extract::{ConnectInfo, Multipart, State},
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use tempfile::NamedTempFile;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use super::{attachment_response, client_ip_for_request};
use crate::{
    config::non_empty,
    context::AppContext,
    extract::{ExtractionConfig, QualityTier},
};

const FALLBACK_FILENAME: &str = "facebook_video.mp4";
const MAX_TITLE_CHARS: usize = 80;

#[derive(Debug, Default)]
struct DownloadForm {
    url: String,
    quality: Option<String>,
    cookies: Option<Bytes>,
}

pub(super) async fn download(
    State(ctx): State<AppContext>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    let form = match read_form(multipart).await {
        Ok(form) => form,
        Err(message) => return redirect_with_error(&message),
    };

    let url = match validate_url(&form.url) {
        Ok(url) => url,
        Err(message) => return redirect_with_error(message),
    };

    // Removed when dropped, whichever way this handler returns.
    let cookie_file = match form.cookies.as_deref() {
        Some(contents) => match write_cookie_file(contents) {
            Ok(file) => Some(file),
            Err(error) => {
                warn!("Could not store uploaded cookies: {error}");
                return redirect_with_error("Could not read the uploaded cookies file.");
            }
        },
        None => None,
    };

    let tier = QualityTier::parse(form.quality.as_deref());
    let output_path = ctx.config.downloads_dir.join(output_file_name());
    let config = ExtractionConfig::for_tier(
        tier,
        &output_path,
        cookie_file.as_ref().map(NamedTempFile::path),
    );

    info!("Download requested for {url:?} ({tier:?})");
    let media = match ctx.extractor.extract(url, &config).await {
        Ok(media) => media,
        Err(error) => {
            warn!("Extraction failed for {url:?}: {error}");
            return redirect_with_error(&error.user_message());
        }
    };

    let download_name = suggested_filename(media.title.as_deref());
    let response = match attachment_response(&media.path, &download_name).await {
        Ok(response) => response,
        Err(error) => {
            warn!("Could not serve {:?}: {}", media.path, error.message);
            return redirect_with_error(
                "The downloaded file is no longer available. Please try again.",
            );
        }
    };

    let requester = client_ip_for_request(&ctx, &headers, addr);
    if let Err(error) = ctx.usage.update(&requester).await {
        warn!("Usage record not updated: {}", error.message);
    }

    info!("Serving {:?} as {download_name:?}", media.path);
    response
}

async fn read_form(mut multipart: Multipart) -> Result<DownloadForm, String> {
    let mut form = DownloadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| format!("Could not read the submitted form: {error}"))?
    {
        let name = field.name().map(ToString::to_string);
        match name.as_deref() {
            Some("url") => {
                form.url = field
                    .text()
                    .await
                    .map_err(|error| format!("Could not read the URL field: {error}"))?;
            }
            Some("quality") => {
                form.quality = field.text().await.ok();
            }
            Some("cookies") => {
                let has_file = field.file_name().and_then(non_empty).is_some();
                let contents = field
                    .bytes()
                    .await
                    .map_err(|error| format!("Could not read the cookies file: {error}"))?;
                if has_file && !contents.is_empty() {
                    form.cookies = Some(contents);
                }
            }
            _ => {}
        }
    }

    Ok(form)
}

/// Accepts only absolute `http`/`https` URLs with a host.
pub fn validate_url(raw: &str) -> Result<&str, &'static str> {
    let url = non_empty(raw).ok_or("Please enter a URL.")?;
    let invalid = "Please provide a valid URL starting with http:// or https://";

    let lower = url.to_ascii_lowercase();
    if !(lower.starts_with("http://") || lower.starts_with("https://")) {
        return Err(invalid);
    }
    match Url::parse(url) {
        Ok(parsed) if parsed.host_str().is_some() => Ok(url),
        _ => Err(invalid),
    }
}

/// Builds the attachment name offered to the browser from a video title.
pub fn suggested_filename(title: Option<&str>) -> String {
    let Some(title) = title else {
        return FALLBACK_FILENAME.to_string();
    };

    let kept = title
        .chars()
        .filter(|&character| {
            character.is_ascii_alphanumeric() || matches!(character, ' ' | '-' | '_')
        })
        .collect::<String>();
    let stem = kept
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(MAX_TITLE_CHARS)
        .collect::<String>();
    let stem = stem.trim();

    if stem.is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        format!("{stem}.mp4")
    }
}

fn output_file_name() -> String {
    format!(
        "{}_{}.mp4",
        Utc::now().format("%Y%m%d%H%M%S"),
        Uuid::new_v4().simple()
    )
}

fn write_cookie_file(contents: &[u8]) -> std::io::Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("cookies-")
        .suffix(".txt")
        .tempfile()?;
    file.write_all(contents)?;
    file.flush()?;
    Ok(file)
}

fn redirect_with_error(message: &str) -> Response {
    Redirect::to(&format!("/?error={}", urlencoding::encode(message))).into_response()
}
