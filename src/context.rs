use std::sync::Arc;

use crate::{config::Config, extract::Extractor, usage::UsageCounter, ytdlp::YtDlpExtractor};

/// Everything a request handler needs, built once at startup.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub extractor: Arc<dyn Extractor>,
    pub usage: Arc<UsageCounter>,
}

impl AppContext {
    pub fn new(config: Config, extractor: Arc<dyn Extractor>) -> Self {
        let usage = Arc::new(UsageCounter::new(config.stats_path.clone()));
        Self {
            config: Arc::new(config),
            extractor,
            usage,
        }
    }

    pub fn with_yt_dlp(config: Config) -> Self {
        let extractor = Arc::new(YtDlpExtractor::new(config.yt_dlp_path.clone()));
        Self::new(config, extractor)
    }
}
