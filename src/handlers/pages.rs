//! Static informational pages and the download form.

use axum::{extract::Query, response::Html};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(super) struct IndexQuery {
    error: Option<String>,
}

const INDEX_FORM: &str = r#"<form method="post" action="/download" enctype="multipart/form-data">
  <label>Video URL <input type="url" name="url" placeholder="https://www.facebook.com/..." required></label>
  <label>Quality
    <select name="quality">
      <option value="best">Best available</option>
      <option value="hd">HD (720p)</option>
      <option value="sd">SD (480p)</option>
      <option value="low">Low (360p)</option>
    </select>
  </label>
  <label>Cookies file (optional) <input type="file" name="cookies" accept=".txt"></label>
  <button type="submit">Download</button>
</form>"#;

pub(super) async fn index(Query(query): Query<IndexQuery>) -> Html<String> {
    let notice = query
        .error
        .as_deref()
        .map(str::trim)
        .filter(|message| !message.is_empty())
        .map(|message| format!(r#"<p class="error">{}</p>"#, escape_html(message)))
        .unwrap_or_default();

    render("Video Downloader", &format!("{notice}\n{INDEX_FORM}"))
}

pub(super) async fn about() -> Html<String> {
    render(
        "About",
        "<p>Paste a link to a public social-media video and get an MP4 file back.</p>",
    )
}

pub(super) async fn how_it_works() -> Html<String> {
    render(
        "How it works",
        "<ol><li>Copy the video link.</li><li>Paste it into the form and pick a quality.</li>\
         <li>Press Download and save the file.</li></ol>",
    )
}

pub(super) async fn faq() -> Html<String> {
    render(
        "FAQ",
        "<h2>Why does a video fail?</h2><p>Private videos need a cookies file exported from a \
         logged-in browser session.</p><h2>How long are files kept?</h2><p>Ten days.</p>",
    )
}

pub(super) async fn terms() -> Html<String> {
    render(
        "Terms of Use",
        "<p>Only download content you own or have permission to save.</p>",
    )
}

pub(super) async fn privacy() -> Html<String> {
    render(
        "Privacy",
        "<p>Uploaded cookies are deleted as soon as the request finishes. Your network address is \
         kept only to count distinct visitors.</p>",
    )
}

pub(super) async fn contact() -> Html<String> {
    render("Contact", "<p>Reach the operator through the site's hosting provider.</p>")
}

pub(super) async fn disclaimer() -> Html<String> {
    render(
        "Disclaimer",
        "<p>This service is not affiliated with any social-media platform.</p>",
    )
}

pub(super) async fn dmca() -> Html<String> {
    render(
        "DMCA",
        "<p>Send takedown notices to the operator; downloaded files are removed automatically \
         after ten days.</p>",
    )
}

fn render(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!doctype html>\n<html lang=\"en\">\n<head><meta charset=\"utf-8\"><title>{title}</title></head>\n\
         <body>\n<nav><a href=\"/\">Home</a> <a href=\"/about\">About</a> <a href=\"/faq\">FAQ</a></nav>\n\
         <h1>{title}</h1>\n{body}\n</body>\n</html>\n"
    ))
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for character in value.chars() {
        match character {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_html("<script>alert('x')</script>"),
            "&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt;"
        );
    }

    #[tokio::test]
    async fn index_shows_escaped_error() {
        let Html(page) = index(Query(IndexQuery {
            error: Some("bad <url>".to_string()),
        }))
        .await;
        assert!(page.contains("bad &lt;url&gt;"));
        assert!(page.contains("name=\"quality\""));
    }
}
