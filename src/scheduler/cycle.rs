//! One check cycle over all targets.

use futures_util::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::alert::{AlertEvaluator, PendingAlert, CONSECUTIVE_FAILURE_WINDOW};
use crate::db::{CheckKind, DbError, HistoryEntry, LatestCheck, ResultStore, Target};
use crate::notify::Notifier;
use crate::probe::{ExpiryResult, ProbeError, Probers, TargetAddress};

/// Failure inside a single target's pipeline.
#[derive(Error, Debug)]
pub enum CheckError {
    #[error(transparent)]
    Probe(#[from] ProbeError),
    #[error(transparent)]
    Store(#[from] DbError),
    #[error("check panicked: {0}")]
    Panicked(String),
}

/// Summary of a finished cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub targets: usize,
    pub checked: usize,
    pub failed: usize,
    pub alerts: usize,
}

#[derive(Debug, Default)]
struct TargetOutcome {
    failed: bool,
    alerts: usize,
}

/// Runs HTTP, TLS and WHOIS checks for every target and raises alerts.
///
/// Targets are independent: a failure while checking one target becomes a
/// probe-failure alert for that target and never affects the others.
#[derive(Clone)]
pub struct CheckOrchestrator {
    store: Arc<dyn ResultStore>,
    probers: Probers,
    evaluator: Arc<AlertEvaluator>,
    notifier: Arc<dyn Notifier>,
    concurrency: usize,
}

impl CheckOrchestrator {
    pub fn new(
        store: Arc<dyn ResultStore>,
        probers: Probers,
        evaluator: AlertEvaluator,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            probers,
            evaluator: Arc::new(evaluator),
            notifier,
            concurrency: 1,
        }
    }

    /// Number of targets checked in parallel. Clamped to at least one.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Check every target once.
    ///
    /// Fails only if the target list itself cannot be loaded.
    pub async fn run_cycle(&self) -> Result<CycleReport, DbError> {
        let targets = self.store.list_targets()?;
        let mut report = CycleReport {
            targets: targets.len(),
            ..Default::default()
        };

        tracing::info!("Starting check cycle for {} targets", targets.len());

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        let mut running = HashMap::new();

        for target in targets {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(p) => p,
                Err(_) => break,
            };

            let this = self.clone();
            let url = target.url.clone();
            let handle = tasks.spawn(async move {
                let _permit = permit; // Hold permit until done
                this.check_target(&target).await
            });
            running.insert(handle.id(), url);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, outcome)) => {
                    report.checked += 1;
                    report.alerts += outcome.alerts;
                    if outcome.failed {
                        report.failed += 1;
                    }
                }
                Err(e) => {
                    let url = running.get(&e.id()).map(String::as_str).unwrap_or("unknown target");
                    tracing::error!("Check task for {} aborted: {}", url, e);
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            "Check cycle finished: {} checked, {} failed, {} alerts",
            report.checked,
            report.failed,
            report.alerts
        );

        Ok(report)
    }

    async fn check_target(&self, target: &Target) -> TargetOutcome {
        let mut outcome = TargetOutcome::default();

        if let Err((kind, err)) = self.run_checks(target, &mut outcome).await {
            tracing::warn!("{} check failed for {}: {}", kind, target.url, err);
            outcome.failed = true;
            let alert = self.evaluator.probe_failure(target, kind, &err);
            self.raise(target, alert, &mut outcome).await;
        }

        outcome
    }

    /// HTTP, then TLS, then WHOIS. Stops at the first failure.
    async fn run_checks(&self, target: &Target, outcome: &mut TargetOutcome) -> Result<(), (CheckKind, CheckError)> {
        let address = TargetAddress::parse(&target.url).map_err(|e| (CheckKind::Http, e.into()))?;

        isolate(self.check_http(target, outcome))
            .await
            .map_err(|e| (CheckKind::Http, e))?;
        isolate(self.check_tls(target, &address, outcome))
            .await
            .map_err(|e| (CheckKind::Ssl, e))?;
        isolate(self.check_domain(target, &address, outcome))
            .await
            .map_err(|e| (CheckKind::Domain, e))?;

        Ok(())
    }

    async fn check_http(&self, target: &Target, outcome: &mut TargetOutcome) -> Result<(), CheckError> {
        let result = self.probers.http.probe(&target.url).await?;
        tracing::debug!("HTTP {} for {} in {:?}", result.status_code, target.url, result.latency);

        self.store.append_history(&HistoryEntry {
            target_id: target.id,
            status_code: result.status_code,
            latency_ms: result.latency.as_millis() as i64,
            checked_at: result.checked_at,
        })?;

        if let Some(alert) = self.evaluator.evaluate_http(target, &result) {
            self.raise(target, alert, outcome).await;
        }

        // Reads back the row written above
        let recent = self.store.recent_history(target.id, CONSECUTIVE_FAILURE_WINDOW)?;
        if let Some(alert) = self.evaluator.evaluate_consecutive(target, &recent) {
            self.raise(target, alert, outcome).await;
        }

        Ok(())
    }

    async fn check_tls(
        &self,
        target: &Target,
        address: &TargetAddress,
        outcome: &mut TargetOutcome,
    ) -> Result<(), CheckError> {
        let result = self.probers.tls.probe(&address.host).await?;
        self.store.upsert_latest(&latest_check(target, CheckKind::Ssl, &result))?;

        if let Some(alert) = self.evaluator.evaluate_tls(target, &result) {
            self.raise(target, alert, outcome).await;
        }
        Ok(())
    }

    async fn check_domain(
        &self,
        target: &Target,
        address: &TargetAddress,
        outcome: &mut TargetOutcome,
    ) -> Result<(), CheckError> {
        let result = self.probers.domain.probe(&address.host).await?;
        self.store.upsert_latest(&latest_check(target, CheckKind::Domain, &result))?;

        if let Some(alert) = self.evaluator.evaluate_domain(target, &result) {
            self.raise(target, alert, outcome).await;
        }
        Ok(())
    }

    /// Persist the alert, then dispatch it. Neither step's failure undoes the other.
    async fn raise(&self, target: &Target, alert: PendingAlert, outcome: &mut TargetOutcome) {
        outcome.alerts += 1;
        tracing::info!("Alert [{}] {}", alert.kind, alert.message);

        if let Err(e) = self.store.create_alert(target.id, alert.kind.as_str(), &alert.message) {
            tracing::error!("Failed to store alert for {}: {}", target.url, e);
        }

        if let Err(e) = self
            .notifier
            .notify(alert.kind.as_str(), &alert.message, target)
            .await
        {
            tracing::error!("Failed to dispatch alert for {}: {}", target.url, e);
        }
    }
}

/// Turn a panic inside one check stage into an ordinary check failure.
async fn isolate<F>(stage: F) -> Result<(), CheckError>
where
    F: Future<Output = Result<(), CheckError>>,
{
    AssertUnwindSafe(stage)
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(CheckError::Panicked(panic_message(panic.as_ref()))))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn latest_check(target: &Target, kind: CheckKind, result: &ExpiryResult) -> LatestCheck {
    LatestCheck {
        target_id: target.id,
        kind,
        expires_at: result.expires_at(),
        days_to_expiry: result.days_to_expiry(),
        checked_at: result.checked_at(),
    }
}
