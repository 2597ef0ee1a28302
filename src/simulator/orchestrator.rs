/// Runs a whole load test: probe, sessions, reporter, final report.
use crate::error::AppError;
use crate::http::client::{ChatClient, ClientConfig};
use crate::report::{FinalReport, Reporter};
use crate::session::{SessionConfig, SessionReport, UserSession};
use crate::shutdown::{Shutdown, ShutdownListener};
use crate::simulator::config::LoadTestConfig;
use crate::stats::StatsAggregator;
use crate::transcript::Transcript;
use std::io::Write;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Drives one load test run against a single endpoint.
pub struct Orchestrator {
    config: LoadTestConfig,
    stats: Arc<StatsAggregator>,
}

impl Orchestrator {
    pub fn new(config: LoadTestConfig) -> Self {
        Self {
            config,
            stats: Arc::new(StatsAggregator::new()),
        }
    }

    pub fn config(&self) -> &LoadTestConfig {
        &self.config
    }

    /// Shared aggregator of this run.
    pub fn stats(&self) -> Arc<StatsAggregator> {
        self.stats.clone()
    }

    /// HTTP settings derived from the run configuration.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.config.base_url.clone(),
            timeout: self.config.request_timeout,
            probe_timeout: self.config.probe_timeout,
        }
    }

    /// Check that the endpoint answers its model listing.
    pub async fn probe<C>(&self, client: &C) -> Result<Vec<String>, AppError>
    where
        C: ChatClient + ?Sized,
    {
        match client.list_models().await {
            Ok(models) => {
                info!(server = client.base_url(), ?models, "server is reachable");
                Ok(models)
            }
            Err(e) => {
                error!(server = client.base_url(), error = %e, "server is not reachable");
                Err(e)
            }
        }
    }

    /// Run the load test to completion.
    ///
    /// Fails only when the log directory cannot be created or the endpoint
    /// does not pass the reachability probe; in both cases no session is
    /// started. Periodic reports go to `report_out`. Raising `shutdown`
    /// stops further session starts and ends running sessions at their next
    /// stopping check.
    pub async fn run<C, W>(
        &self,
        client: Arc<C>,
        report_out: W,
        shutdown: ShutdownListener,
    ) -> Result<FinalReport, AppError>
    where
        C: ChatClient + ?Sized + 'static,
        W: Write + Send + 'static,
    {
        let cfg = &self.config;

        std::fs::create_dir_all(&cfg.log_dir).map_err(|e| {
            AppError::Io(std::io::Error::other(format!(
                "Failed to create log directory {}: {}",
                cfg.log_dir.display(),
                e
            )))
        })?;

        self.probe(client.as_ref()).await?;

        info!(
            node = cfg.node_id,
            users = cfg.users,
            server = %cfg.base_url,
            duration_s = cfg.stop.duration.map(|d| d.as_secs()),
            log_dir = %cfg.log_dir.display(),
            "starting load test"
        );

        let started = Instant::now();
        let prompts = Arc::new(cfg.prompts.clone());

        let reporter_stop = Shutdown::new();
        let reporter = Reporter::new(self.stats.clone(), cfg.report_interval, cfg.node_id)
            .spawn(report_out, reporter_stop.listener());

        let mut handles = Vec::with_capacity(cfg.users);
        let mut stagger_wait = shutdown.clone();
        for index in 0..cfg.users {
            if shutdown.is_triggered() {
                info!(
                    started = index,
                    skipped = cfg.users - index,
                    "shutdown requested, not starting remaining sessions"
                );
                break;
            }

            let user_id = cfg.global_user_id(index);
            let transcript =
                match Transcript::create(&cfg.log_dir, cfg.node_id, user_id, &cfg.base_url) {
                    Ok(transcript) => transcript,
                    Err(e) => {
                        error!(user = user_id, error = %e, "cannot open transcript, session skipped");
                        continue;
                    }
                };

            let rng = match cfg.seed {
                Some(seed) => fastrand::Rng::with_seed(seed.wrapping_add(user_id)),
                None => fastrand::Rng::new(),
            };

            let session = UserSession::new(
                SessionConfig {
                    user_id,
                    node_id: cfg.node_id,
                    stop: cfg.stop.clone(),
                    pacing: cfg.pacing,
                    model: cfg.model.clone(),
                    temperature: cfg.temperature,
                    max_tokens: cfg.max_tokens,
                },
                client.clone(),
                self.stats.clone(),
                prompts.clone(),
                transcript,
            )
            .with_rng(rng)
            .with_shutdown(shutdown.clone());

            handles.push(tokio::spawn(session.run()));

            if index + 1 < cfg.users && !cfg.stagger.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(cfg.stagger) => {}
                    _ = stagger_wait.triggered() => {}
                }
            }
        }

        let sessions_started = handles.len();
        if sessions_started < cfg.users && !shutdown.is_triggered() {
            warn!(
                started = sessions_started,
                users = cfg.users,
                "not every session could be started"
            );
        }
        let reports = join_sessions(handles).await;

        reporter_stop.trigger();
        if let Err(e) = reporter.await {
            warn!(error = %e, "reporter task failed");
        }

        let failures: u64 = reports.iter().map(|r| r.failures).sum();
        info!(
            sessions = reports.len(),
            failures,
            elapsed_s = started.elapsed().as_secs_f64(),
            "all sessions finished"
        );

        Ok(FinalReport::new(
            cfg.node_id,
            cfg.users,
            &cfg.base_url,
            started.elapsed(),
            cfg.log_dir.clone(),
            shutdown.is_triggered(),
            self.stats.snapshot(),
        )
        .with_sessions_started(sessions_started))
    }
}

async fn join_sessions(
    handles: Vec<tokio::task::JoinHandle<SessionReport>>,
) -> Vec<SessionReport> {
    let mut reports = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.await {
            Ok(report) => reports.push(report),
            Err(e) => error!(error = %e, "session task failed"),
        }
    }
    reports
}
