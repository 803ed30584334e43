//! `autoapply` — CLI entry point for a single batch run of the
//! application pipeline.

use std::sync::Arc;

use anyhow::{Context, Result};
use autoapply_engine::{
    ApplicationConfig, ApplicationPipeline, AtsRegistry, BrowserBackend, CaptchaSolver,
    ExecutionMode, HttpRemoteClient, InterventionStore, NotificationHub, Orchestrator,
    PipelineOptions, RateLimiter, SessionManager, StateStore,
};
use clap::Parser;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "autoapply", about = "Run the automated job-application pipeline for one user")]
struct Cli {
    /// User to run the pipeline for.
    #[arg(long)]
    user_id: Uuid,

    /// Maximum number of jobs to attempt this run.
    #[arg(long)]
    max: Option<u32>,

    /// Seconds to wait between applications.
    #[arg(long)]
    delay: Option<u64>,

    /// Apply to exactly these jobs instead of scanning the inbox.
    #[arg(long, value_delimiter = ',')]
    job_ids: Option<Vec<Uuid>>,

    /// Allow the orchestrator to submit forms without pausing for review
    /// (`ExecutionMode::Auto`); without this flag jobs run in
    /// `ExecutionMode::SemiAuto`, which also submits but is not subject
    /// to the tighter auto-only daily cap.
    #[arg(long, conflicts_with = "assisted")]
    auto_submit: bool,

    /// Pause before every submit for human review (`ExecutionMode::Assisted`),
    /// independent of `--auto-submit`.
    #[arg(long, conflicts_with = "auto_submit")]
    assisted: bool,

    /// Base URL of the job board / user-profile API.
    #[arg(long, env = "AUTOAPPLY_API_URL", default_value = "http://localhost:8000/api")]
    api_url: String,

    /// Reserved for a future inbox re-scan before this run; currently a no-op.
    #[arg(long)]
    scan_email: bool,

    /// Browser-control backend to drive sessions with.
    #[arg(long, value_enum, default_value = "direct")]
    backend: BackendArg,

    /// Run the browser headless (default) or headed for debugging.
    #[arg(long, overrides_with = "no_headless")]
    headless: bool,
    #[arg(long, overrides_with = "headless")]
    no_headless: bool,

    /// Directory session state, interventions and reports are written under.
    #[arg(long, env = "AUTOAPPLY_STATE_DIR")]
    state_dir: Option<std::path::PathBuf>,

    /// Assume the user already has a connected LinkedIn session.
    #[arg(long)]
    linkedin_session: bool,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum BackendArg {
    Direct,
    DevtoolsMcp,
}

impl From<BackendArg> for BrowserBackend {
    fn from(value: BackendArg) -> Self {
        match value {
            BackendArg::Direct => Self::DirectAutomation,
            BackendArg::DevtoolsMcp => Self::DevtoolsMcp,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.scan_email {
        tracing::info!("--scan-email is not yet wired to an inbox scanner, skipping");
    }

    let state_dir = cli
        .state_dir
        .or_else(|| dirs::data_dir().map(|d| d.join("autoapply-engine")))
        .context("could not determine a default state directory; pass --state-dir")?;

    let headless = !cli.no_headless;
    let mut builder = ApplicationConfig::builder()
        .state_dir(state_dir)
        .backend(cli.backend.into())
        .headless(headless)
        .auto_submit(cli.auto_submit)
        .max_applications(cli.max.unwrap_or(5))
        .delay_between_apps_secs(cli.delay.unwrap_or(60));
    if let Ok(key) = std::env::var("AUTOAPPLY_CAPTCHA_API_KEY") {
        builder = builder.captcha_api_key(key);
    }
    let config = Arc::new(builder.build().context("invalid configuration")?);

    let sessions = Arc::new(SessionManager::new(config.clone()));
    sessions.clone().start_cleanup_task();

    let state_store = Arc::new(StateStore::new(config.state_dir().clone()));
    match state_store.recover_interrupted().await {
        Ok(0) => {}
        Ok(n) => tracing::warn!(count = n, "marked in-progress applications failed after an unclean shutdown"),
        Err(err) => tracing::warn!(%err, "failed to run interrupted-session recovery pass"),
    }
    let notifications = Arc::new(NotificationHub::new());
    let interventions = Arc::new(InterventionStore::new(notifications.clone()));
    let ats = Arc::new(AtsRegistry::new());
    let captcha = Arc::new(CaptchaSolver::new(
        config.captcha_api_key().map(str::to_owned),
        config.captcha_provider_url(),
    ));
    let rate_limiter =
        Arc::new(RateLimiter::new(config.max_applications_per_day(), config.max_auto_applications_per_day()));
    let remote = Arc::new(HttpRemoteClient::new(cli.api_url));

    let orchestrator = Arc::new(Orchestrator::new(
        config.clone(),
        sessions.clone(),
        state_store,
        interventions,
        notifications.clone(),
        ats,
        captcha,
    ));

    let pipeline =
        ApplicationPipeline::new(config.clone(), orchestrator, remote.clone(), remote, rate_limiter, notifications);

    let mode = if cli.assisted {
        ExecutionMode::Assisted
    } else if cli.auto_submit {
        ExecutionMode::Auto
    } else {
        ExecutionMode::SemiAuto
    };
    let report = pipeline
        .run(PipelineOptions {
            user_id: cli.user_id,
            max_applications: config.max_applications() as usize,
            job_ids: cli.job_ids,
            mode,
            cover_letter: None,
            has_linkedin_session: cli.linkedin_session,
        })
        .await?;

    let path = pipeline.save_report(&report).await?;
    tracing::info!(
        succeeded = report.success_count(),
        total = report.attempts.len(),
        report = %path.display(),
        "pipeline run finished"
    );

    sessions.close_all().await;
    Ok(())
}
