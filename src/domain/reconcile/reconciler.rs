use chrono::Utc;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::domain::dispatch::dispatcher::CommandDispatcher;
use crate::domain::graph::desired::DesiredConfig;
use crate::domain::ids::HostName;
use crate::domain::reconcile::delta::{compute_delta_filtered, InFlightChange};
use crate::domain::reconcile::plan::{build_plan, DeltaPlan, HostStream};
use crate::domain::reconcile::report::{ApplyReport, CommandOutcome, CommandReport, SkipReason};
use crate::domain::status::snapshot::ClusterSnapshot;
use crate::error::Result;

/// Drives a delta plan to completion over the command dispatcher.
///
/// Streams run concurrently, each stream strictly in order. A failed
/// command halts its own stream and skips the commands behind it, other
/// streams are unaffected. On cancellation the command in flight is
/// allowed to finish, everything not yet started is skipped. Nothing is
/// ever rolled back.
#[derive(Debug)]
pub struct Reconciler {
    dispatcher: Arc<CommandDispatcher>,
}

impl Reconciler {
    pub fn new(dispatcher: Arc<CommandDispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Computes the delta between the desired configuration and a live
    /// snapshot, plans it over the given hosts and applies it.
    ///
    /// Single-shot applies diff against a snapshot taken before anything
    /// was dispatched, so no change can be pending confirmation yet.
    pub async fn reconcile(
        &self,
        desired: &DesiredConfig,
        snapshot: &ClusterSnapshot,
        hosts: &[HostName],
        cancel: &CancellationToken,
    ) -> Result<ApplyReport> {
        self.reconcile_filtered(desired, snapshot, &HashSet::new(), hosts, cancel).await
    }

    /// Like [`Reconciler::reconcile`], for continuous drivers whose
    /// snapshot may predate acknowledged parameter changes. Changes listed
    /// in `in_flight` are not dispatched again.
    pub async fn reconcile_filtered(
        &self,
        desired: &DesiredConfig,
        snapshot: &ClusterSnapshot,
        in_flight: &HashSet<InFlightChange>,
        hosts: &[HostName],
        cancel: &CancellationToken,
    ) -> Result<ApplyReport> {
        let commands = compute_delta_filtered(desired, snapshot, in_flight);
        log::info!(
            "Reconciling desired revision {} against the snapshot taken at {}: {} command(s) to apply.",
            desired.revision(),
            snapshot.taken_at,
            commands.len()
        );

        let plan = build_plan(commands, hosts)?;
        Ok(self.apply(plan, cancel).await)
    }

    pub async fn apply(&self, plan: DeltaPlan, cancel: &CancellationToken) -> ApplyReport {
        let started_at = Utc::now();

        let stream_runs = plan.streams.into_iter().map(|stream| self.run_stream(stream, cancel));
        let per_stream = join_all(stream_runs).await;

        let report = ApplyReport {
            started_at,
            finished_at: Utc::now(),
            cancelled: cancel.is_cancelled(),
            commands: per_stream.into_iter().flatten().collect(),
        };
        log::info!(
            "Apply run finished: {} succeeded, {} failed, {} skipped.",
            report.succeeded(),
            report.failed(),
            report.skipped()
        );
        report
    }

    async fn run_stream(&self, stream: HostStream, cancel: &CancellationToken) -> Vec<CommandReport> {
        let mut reports = Vec::with_capacity(stream.commands.len());
        let mut halted = false;

        for command in stream.commands {
            let command_id = command.id;
            let command_line = command.render_line();

            let outcome = if cancel.is_cancelled() {
                CommandOutcome::Skipped {
                    reason: SkipReason::Cancelled,
                }
            } else if halted {
                CommandOutcome::Skipped {
                    reason: SkipReason::PriorFailure,
                }
            } else {
                match self.dispatcher.dispatch(command, &stream.host).await {
                    Ok(ack) => CommandOutcome::Succeeded { attempts: ack.attempts },
                    Err(error) => {
                        log::error!(
                            "Command '{}' on host '{}' failed, halting this stream: {}",
                            command_line,
                            stream.host,
                            error
                        );
                        halted = true;
                        CommandOutcome::Failed {
                            error: error.to_string(),
                        }
                    }
                }
            };

            reports.push(CommandReport {
                command_id,
                host: stream.host.clone(),
                command_line,
                outcome,
            });
        }

        reports
    }
}
