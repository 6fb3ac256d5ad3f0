use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::extract::{ExtractedMedia, ExtractionConfig, ExtractionError, Extractor};

const PRINT_SEPARATOR: char = '\t';

/// Runs the `yt-dlp` binary as a subprocess.
#[derive(Debug, Clone)]
pub struct YtDlpExtractor {
    program: PathBuf,
}

impl YtDlpExtractor {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    async fn extract(
        &self,
        url: &str,
        config: &ExtractionConfig,
    ) -> Result<ExtractedMedia, ExtractionError> {
        let args = build_args(url, config);
        debug!("Running {:?} with {} argument(s)", self.program, args.len());

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .await
            .map_err(|error| {
                if error.kind() == ErrorKind::NotFound {
                    ExtractionError::ToolMissing(self.program.display().to_string())
                } else {
                    ExtractionError::Io(error)
                }
            })?;

        if !output.status.success() {
            let message = last_stderr_line(&output.stderr);
            warn!("yt-dlp failed for {url:?}: {message}");
            return Err(ExtractionError::from_message(message));
        }

        let printed = parse_printed(&output.stdout);
        let printed_path = printed.as_ref().map(|(path, _)| path.as_path());
        let path = resolve_output(&config.output_path, printed_path)
            .await
            .ok_or_else(|| {
                ExtractionError::Failed(
                    "the extractor finished without producing a file".to_string(),
                )
            })?;

        Ok(ExtractedMedia {
            path,
            title: printed.and_then(|(_, title)| title),
        })
    }
}

pub fn build_args(url: &str, config: &ExtractionConfig) -> Vec<String> {
    let mut args = vec![
        "-f".to_string(),
        config.format.clone(),
        "-o".to_string(),
        config.output_path.to_string_lossy().into_owned(),
        "--retries".to_string(),
        config.retries.to_string(),
        "--fragment-retries".to_string(),
        config.fragment_retries.to_string(),
        "--print".to_string(),
        format!("after_move:%(filepath)s{PRINT_SEPARATOR}%(title)s"),
    ];

    if config.quiet {
        args.push("--quiet".to_string());
        args.push("--no-warnings".to_string());
    }
    if config.no_playlist {
        args.push("--no-playlist".to_string());
    }
    if let Some(container) = &config.merge_output_format {
        args.push("--merge-output-format".to_string());
        args.push(container.clone());
    }
    for (name, value) in &config.http_headers {
        args.push("--add-header".to_string());
        args.push(format!("{name}:{value}"));
    }
    if let Some(cookies) = &config.cookie_file {
        args.push("--cookies".to_string());
        args.push(cookies.to_string_lossy().into_owned());
    }

    args.push("--".to_string());
    args.push(url.to_string());
    args
}

fn last_stderr_line(stderr: &[u8]) -> String {
    String::from_utf8_lossy(stderr)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .unwrap_or("yt-dlp could not complete the download")
        .to_string()
}

/// Reads the `filepath<TAB>title` line printed after the final move.
fn parse_printed(stdout: &[u8]) -> Option<(PathBuf, Option<String>)> {
    let line = String::from_utf8_lossy(stdout)
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .next_back()?
        .to_string();

    let (path, title) = match line.split_once(PRINT_SEPARATOR) {
        Some((path, title)) => (path, Some(title)),
        None => (line.as_str(), None),
    };
    let title = title
        .map(str::trim)
        .filter(|value| !value.is_empty() && *value != "NA")
        .map(ToString::to_string);

    Some((PathBuf::from(path.trim()), title))
}

async fn resolve_output(expected: &Path, printed: Option<&Path>) -> Option<PathBuf> {
    for candidate in printed.into_iter().chain(std::iter::once(expected)) {
        match tokio::fs::metadata(candidate).await {
            Ok(metadata) if metadata.is_file() => return Some(candidate.to_path_buf()),
            _ => continue,
        }
    }
    None
}
