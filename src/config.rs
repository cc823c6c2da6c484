// src/config.rs
use crate::api::{
    BrowserlessRenderer, GoogleSearch, OpenAiCompletions, PageRenderer, Services, WaybackReplayer,
};
use crate::arbitration::ArbitrationOptions;
use crate::cache::{CacheOptions, ResourceCache};
use crate::constants::{
    CACHE_MEMORY_ENTRIES, DEFAULT_ARCHIVE_TIMEOUT, DEFAULT_LEASE_TIMEOUT, DEFAULT_LLM_TIMEOUT,
    DEFAULT_MAX_WORKERS, DEFAULT_RENDER_TIMEOUT, DEFAULT_SEARCH_RESULTS, DEFAULT_SEARCH_TIMEOUT,
    MAX_SEARCH_RESULTS, MAX_WORKERS_CEILING,
};
use crate::error::AppError;
use crate::error_recovery::BackoffPolicy;
use crate::fetching::{FetchMode, FetchOptions};
use crate::scheduler::RunOptions;
use crate::types::{ApiKey, ArchiveTimestamp, ModelId, ValidatedUrl};
use crate::verification::VerifyOptions;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_BROWSERLESS_URL: &str = "http://localhost:3000";

/// Parsed command-line input.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct CommandLineInput {
    /// Root of the per-category dataset directories
    #[arg(long, default_value = "dataset")]
    pub dataset_dir: PathBuf,

    /// Markdown list of categories (defaults to <dataset-dir>/categories.md)
    #[arg(long)]
    pub categories: Option<PathBuf>,

    /// Index of the first category to process
    #[arg(long, default_value_t = 0)]
    pub start: usize,

    /// Number of categories to process (default: all)
    #[arg(long)]
    pub count: Option<usize>,

    /// Major dataset version to clean (default: highest present)
    #[arg(long)]
    pub major_version: Option<u32>,

    /// Minor version to read (default: highest of the major version)
    #[arg(long)]
    pub minor_version: Option<u32>,

    /// Candidates read per category (default: all)
    #[arg(long)]
    pub limit: Option<usize>,

    /// Resource cache directory (default: $XDG_CACHE_HOME/sitecurator)
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Concurrent candidate workers
    #[arg(long, default_value_t = DEFAULT_MAX_WORKERS)]
    pub max_workers: usize,

    #[arg(long, value_enum, default_value_t = FetchMode::Auto)]
    pub fetch_mode: FetchMode,

    /// Replay the latest capture at or before this time (YYYYMMDDhhmmss)
    #[arg(long)]
    pub archive_as_of: Option<String>,

    #[arg(long, default_value = DEFAULT_MODEL)]
    pub discovery_model: String,

    #[arg(long, default_value = DEFAULT_MODEL)]
    pub arbitration_model: String,

    #[arg(long, default_value_t = DEFAULT_LEASE_TIMEOUT.as_secs())]
    pub lease_timeout_secs: u64,

    /// Failed candidates tolerated before the run aborts (default: unlimited)
    #[arg(long)]
    pub max_run_failures: Option<usize>,

    /// Search results inspected per candidate
    #[arg(long, default_value_t = DEFAULT_SEARCH_RESULTS,
          value_parser = clap::value_parser!(u8).range(1..=MAX_SEARCH_RESULTS as i64))]
    pub search_results: u8,

    #[arg(long, default_value_t = DEFAULT_SEARCH_TIMEOUT.as_secs())]
    pub search_timeout_secs: u64,

    #[arg(long, default_value_t = DEFAULT_RENDER_TIMEOUT.as_secs())]
    pub render_timeout_secs: u64,

    #[arg(long, default_value_t = DEFAULT_ARCHIVE_TIMEOUT.as_secs())]
    pub archive_timeout_secs: u64,

    #[arg(long, default_value_t = DEFAULT_LLM_TIMEOUT.as_secs())]
    pub llm_timeout_secs: u64,

    /// Also write each resolved record's page to pages/<row>.html and its
    /// visible text to content/<row>.txt beside the snapshot
    #[arg(long, default_value_t = false)]
    pub export_pages: bool,

    /// Enable verbose logging (debug level)
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

/// Credentials and endpoints for the external services.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub search_api_key: ApiKey,
    pub search_engine_id: String,
    pub openai_api_key: ApiKey,
    pub openai_base_url: Option<String>,
    /// Absent in archival-only runs
    pub browserless_url: Option<ValidatedUrl>,
    pub browserless_token: Option<String>,
}

impl Credentials {
    /// Reads credentials through `lookup` (the process environment in
    /// production).
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        fetch_mode: FetchMode,
    ) -> Result<Self, AppError> {
        let required = |name: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| {
                    AppError::MissingConfiguration(format!(
                        "{} environment variable not set",
                        name
                    ))
                })
        };
        let optional = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let browserless_url = match fetch_mode {
            FetchMode::ArchivalOnly => None,
            FetchMode::Auto | FetchMode::LiveOnly => {
                let raw = optional("BROWSERLESS_URL")
                    .unwrap_or_else(|| DEFAULT_BROWSERLESS_URL.to_string());
                Some(ValidatedUrl::parse(&raw)?)
            }
        };

        Ok(Self {
            search_api_key: ApiKey::new(required("SEARCH_API_KEY")?)?,
            search_engine_id: required("SEARCH_ENGINE_ID")?,
            openai_api_key: ApiKey::new(required("OPENAI_API_KEY")?)?,
            openai_base_url: optional("OPENAI_BASE_URL"),
            browserless_url,
            browserless_token: optional("BROWSERLESS_TOKEN"),
        })
    }
}

/// Resolved run configuration, validated and ready to build every stage.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub dataset_dir: PathBuf,
    pub categories_file: PathBuf,
    pub start: usize,
    pub count: Option<usize>,
    pub major_version: Option<u32>,
    pub minor_version: Option<u32>,
    pub limit: Option<usize>,
    pub cache_dir: PathBuf,
    pub max_workers: usize,
    pub fetch_mode: FetchMode,
    pub archive_as_of: Option<ArchiveTimestamp>,
    pub discovery_model: ModelId,
    pub arbitration_model: ModelId,
    pub lease_timeout: Duration,
    pub max_run_failures: Option<usize>,
    pub search_results: u8,
    pub search_timeout: Duration,
    pub render_timeout: Duration,
    pub archive_timeout: Duration,
    pub llm_timeout: Duration,
    pub export_pages: bool,
    pub verbose: bool,
    pub credentials: Credentials,
}

impl PipelineConfig {
    /// Resolves a complete configuration from CLI input and the environment.
    pub fn resolve(cli: CommandLineInput) -> Result<Self, AppError> {
        Self::resolve_with(cli, |name| std::env::var(name).ok())
    }

    pub fn resolve_with(
        cli: CommandLineInput,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, AppError> {
        if cli.max_workers == 0 {
            return Err(AppError::InvalidInput(
                "--max-workers must be at least 1".to_string(),
            ));
        }
        let max_workers = if cli.max_workers > MAX_WORKERS_CEILING {
            log::warn!(
                "--max-workers {} capped at {}",
                cli.max_workers,
                MAX_WORKERS_CEILING
            );
            MAX_WORKERS_CEILING
        } else {
            cli.max_workers
        };

        let credentials = Credentials::from_lookup(&lookup, cli.fetch_mode)?;
        let archive_as_of = cli
            .archive_as_of
            .as_deref()
            .map(ArchiveTimestamp::parse)
            .transpose()?;
        let categories_file = cli
            .categories
            .unwrap_or_else(|| cli.dataset_dir.join("categories.md"));

        Ok(PipelineConfig {
            categories_file,
            dataset_dir: cli.dataset_dir,
            start: cli.start,
            count: cli.count,
            major_version: cli.major_version,
            minor_version: cli.minor_version,
            limit: cli.limit,
            cache_dir: cli.cache_dir.unwrap_or_else(ResourceCache::default_dir),
            max_workers,
            fetch_mode: cli.fetch_mode,
            archive_as_of,
            discovery_model: ModelId::new(cli.discovery_model)?,
            arbitration_model: ModelId::new(cli.arbitration_model)?,
            lease_timeout: Duration::from_secs(cli.lease_timeout_secs.max(1)),
            max_run_failures: cli.max_run_failures,
            search_results: cli.search_results,
            search_timeout: Duration::from_secs(cli.search_timeout_secs),
            render_timeout: Duration::from_secs(cli.render_timeout_secs),
            archive_timeout: Duration::from_secs(cli.archive_timeout_secs),
            llm_timeout: Duration::from_secs(cli.llm_timeout_secs),
            export_pages: cli.export_pages,
            verbose: cli.verbose,
            credentials,
        })
    }

    pub fn cache_options(&self) -> CacheOptions {
        CacheOptions {
            lease_timeout: self.lease_timeout,
            capacity: self.max_workers,
            memory_entries: CACHE_MEMORY_ENTRIES,
        }
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            mode: self.fetch_mode,
            render_timeout: self.render_timeout,
            archive_timeout: self.archive_timeout,
            archive_as_of: self.archive_as_of,
            retry: BackoffPolicy::default(),
        }
    }

    pub fn verify_options(&self) -> VerifyOptions {
        VerifyOptions {
            num_results: self.search_results,
            timeout: self.search_timeout,
            retry: BackoffPolicy::default(),
        }
    }

    pub fn arbitration_options(&self) -> ArbitrationOptions {
        ArbitrationOptions {
            model: self.arbitration_model.clone(),
            timeout: self.llm_timeout,
            retry: BackoffPolicy::default(),
        }
    }

    /// HTTP clients for every external service the run may call.
    pub fn build_services(&self) -> Result<Services, AppError> {
        let creds = &self.credentials;

        let mut llm = OpenAiCompletions::new(creds.openai_api_key.clone(), self.llm_timeout)?;
        if let Some(base) = &creds.openai_base_url {
            llm = llm.with_base_url(base);
        }

        let renderer = match &creds.browserless_url {
            Some(url) => Some(Arc::new(BrowserlessRenderer::new(
                url.as_str(),
                creds.browserless_token.as_deref(),
                self.render_timeout,
            )?) as Arc<dyn PageRenderer>),
            None => None,
        };

        Ok(Services {
            search: Arc::new(GoogleSearch::new(
                creds.search_api_key.clone(),
                creds.search_engine_id.clone(),
                self.search_timeout,
            )?),
            renderer,
            archive: Arc::new(WaybackReplayer::new(self.archive_timeout)?),
            llm: Arc::new(llm),
        })
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            max_workers: self.max_workers,
            max_run_failures: self.max_run_failures,
        }
    }
}
