// src/main.rs

use anyhow::Context;
use clap::Parser;
use log::LevelFilter;
use log4rs::{
    append::console::{ConsoleAppender, Target},
    append::file::FileAppender,
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
    filter::threshold::ThresholdFilter,
    Config,
};
use sitecurator::{
    load_categories, plan_run, render_summary, run_cleaning, AppError, CandidatePipeline,
    CommandLineInput, DatasetSource, DatasetWriter, DeliveryTarget, FetchStrategySelector,
    JournalWriter, LlmArbitrator, OutputReport, PipelineConfig, ResourceCache, RunPlan,
    RunReport, RunSummary, SearchVerifier, SnapshotDelivery,
};
use std::fs;
use std::sync::Arc;

/// Sets up logging configuration.
fn setup_logging(verbose: bool) -> anyhow::Result<()> {
    let log_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };

    let log_file_path = std::env::temp_dir().join("sitecurator.log");
    if let Some(parent) = log_file_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let pattern = if verbose {
        "{d(%Y-%m-%d %H:%M:%S)} [{l}] - {m}{n}"
    } else {
        "{m}{n}"
    };

    // stdout carries the summary table; logs go to stderr.
    let console_appender = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(pattern)))
        .build();

    let file_appender = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S)} [{l}] {t} - {m}{n}",
        )))
        .build(&log_file_path)?;

    let config = Config::builder()
        .appender(
            Appender::builder()
                .filter(Box::new(ThresholdFilter::new(log_level)))
                .build("console", Box::new(console_appender)),
        )
        .appender(Appender::builder().build("file", Box::new(file_appender)))
        .build(
            Root::builder()
                .appender("console")
                .appender("file")
                .build(LevelFilter::Debug),
        )?;

    log4rs::init_config(config)?;
    log::info!("Logging initialized. Log file: {}", log_file_path.display());
    Ok(())
}

/// Executes a cleaning run: plan, clean, journal, then deliver snapshots.
async fn execute_pipeline(config: &PipelineConfig) -> Result<(), AppError> {
    let run = CleaningRun::new(config);

    let mut plan = run.plan()?;
    let (report, cache) = run.clean(&mut plan).await?;
    run.finish(&plan, report, &cache).await
}

/// Orchestrates one cleaning run over the configured categories.
struct CleaningRun<'a> {
    config: &'a PipelineConfig,
}

impl<'a> CleaningRun<'a> {
    fn new(config: &'a PipelineConfig) -> Self {
        Self { config }
    }

    fn plan(&self) -> Result<RunPlan, AppError> {
        let categories = load_categories(
            &self.config.categories_file,
            self.config.start,
            self.config.count,
        )?;
        if categories.is_empty() {
            return Err(AppError::InvalidInput(format!(
                "no categories selected from {}",
                self.config.categories_file.display()
            )));
        }

        let source = DatasetSource::new(&self.config.dataset_dir)
            .with_version_pin(self.config.major_version, self.config.minor_version)
            .with_limit(self.config.limit);
        let plan = plan_run(&source, &categories);
        if plan.datasets.is_empty() {
            return Err(AppError::InvalidInput(format!(
                "none of the {} selected categories has a snapshot under {}",
                categories.len(),
                self.config.dataset_dir.display()
            )));
        }
        for (category, reason) in &plan.skipped {
            eprintln!("⚠️  Skipped {}: {}", category, reason);
        }
        Ok(plan)
    }

    async fn clean(
        &self,
        plan: &mut RunPlan,
    ) -> Result<(RunReport, Arc<ResourceCache>), AppError> {
        let config = self.config;
        log::info!(
            "Fetch mode {:?}, arbitration model {}, discovery model {}",
            config.fetch_mode,
            config.arbitration_model,
            config.discovery_model
        );

        let cache = Arc::new(ResourceCache::open(&config.cache_dir, config.cache_options()).await?);
        let services = config.build_services()?;

        let pipeline = CandidatePipeline::new(
            SearchVerifier::new(Arc::clone(&cache), services.search, config.verify_options()),
            LlmArbitrator::new(Arc::clone(&cache), services.llm, config.arbitration_options())?,
            FetchStrategySelector::new(
                Arc::clone(&cache),
                services.renderer,
                services.archive,
                config.fetch_options(),
            ),
        );

        let mut journal = JournalWriter::new(plan.journal_paths());
        let jobs = std::mem::take(&mut plan.jobs);
        let report = run_cleaning(
            Arc::new(pipeline),
            Arc::clone(&cache),
            jobs,
            config.run_options(),
            &mut journal,
        )
        .await?;

        log::info!(
            "Journaled {} records; cache: {}",
            journal.records_written(),
            report.cache
        );
        Ok((report, cache))
    }

    /// Prints the summary and, for a completed run, writes the snapshots.
    ///
    /// Records sharing a final URL within a category are curated first; the
    /// journals keep every record as it was cleaned.
    async fn finish(
        &self,
        plan: &RunPlan,
        mut report: RunReport,
        cache: &ResourceCache,
    ) -> Result<(), AppError> {
        let demoted = report.mark_duplicate_urls();
        if demoted > 0 {
            eprintln!("⚠️  {} records shared a final URL and were left unresolved", demoted);
        }
        let mut summary = RunSummary::from_records(&report.records, &plan.required_brands);

        if let Some(abort) = report.abort_error() {
            if let AppError::RunAborted {
                threshold,
                failures,
            } = &abort
            {
                summary = summary.with_abort(*threshold, *failures, report.pool.not_started);
            }
            print!("{}", render_summary(&summary));
            eprintln!("⚠️  Snapshots not written; completed records are in the journals.");
            return Err(abort);
        }

        let writer = DatasetWriter::new(plan.snapshot_targets());
        let delivery = writer.deliver(&report.records)?;
        self.report_completion(&delivery)?;

        if self.config.export_pages {
            let export = sitecurator::deliver(
                writer.plan_page_export(cache, &report.records).await?,
            )?;
            eprintln!("✓ Exported {} page files", export.written_paths().len());
            if !export.is_success() {
                return Err(AppError::DeliveryFailed {
                    failures: export.failed.iter().map(|f| f.error.clone()).collect(),
                });
            }
        }

        sitecurator::deliver(
            sitecurator::OutputPlan::new().with_operation(DeliveryTarget::PrintToStdout {
                content: render_summary(&summary),
            }),
        )?;
        Ok(())
    }

    fn report_completion(&self, report: &OutputReport) -> Result<(), AppError> {
        for path in report.written_paths() {
            eprintln!("✓ Wrote {}", path.display());
        }

        if !report.is_success() {
            return Err(AppError::DeliveryFailed {
                failures: report.failed.iter().map(|f| f.error.clone()).collect(),
            });
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CommandLineInput::parse();

    setup_logging(cli.verbose).context("failed to initialize logging")?;

    let config = PipelineConfig::resolve(cli)?;

    execute_pipeline(&config).await?;

    Ok(())
}
