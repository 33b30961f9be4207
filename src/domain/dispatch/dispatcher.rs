use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::domain::dispatch::audit::{self, AuditEvent, AuditParameter};
use crate::domain::dispatch::connection::HostConnection;
use crate::domain::ids::HostName;
use crate::domain::reconcile::command::CrmCommand;
use crate::error::{Error, Result};

const WORKER_QUEUE_DEPTH: usize = 64;

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Backoff before the next try, where `attempt` counts the tries made
    /// so far. Doubles per attempt up to the cap, with up to 20% jitter so
    /// parallel retries do not align.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let base = self.initial_delay.saturating_mul(2u32.saturating_pow(exponent));
        let capped = base.min(self.max_delay);

        let jitter = rand::rng().random_range(0.0..=0.2);
        capped.mul_f64(1.0 + jitter)
    }
}

/// Acknowledgment of one executed command.
#[derive(Debug, Clone)]
pub struct Ack {
    pub command_id: Uuid,
    pub host: HostName,
    pub attempts: u32,
    pub elapsed: Duration,
    pub stdout: String,
}

struct Job {
    command: CrmCommand,
    reply: oneshot::Sender<Result<Ack>>,
}

/// Sends engine commands to cluster hosts, one at a time per host.
///
/// Each host gets a lazily started worker task owning a queue. Commands
/// to the same host execute strictly in dispatch order; different hosts
/// proceed concurrently. Transport failures are retried with backoff for
/// any command, while uncertain outcomes (timeout) and remote rejections
/// are only retried when the command is idempotent.
#[derive(Debug)]
pub struct CommandDispatcher {
    connection: Arc<dyn HostConnection>,
    policy: RetryPolicy,
    command_timeout: Duration,
    workers: Mutex<HashMap<HostName, mpsc::Sender<Job>>>,
}

impl CommandDispatcher {
    pub fn new(connection: Arc<dyn HostConnection>, policy: RetryPolicy, command_timeout: Duration) -> Self {
        Self {
            connection,
            policy,
            command_timeout,
            workers: Mutex::new(HashMap::new()),
        }
    }

    /// Queues a command on the host's serialized stream and waits for its
    /// acknowledgment.
    pub async fn dispatch(&self, command: CrmCommand, host: &HostName) -> Result<Ack> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let sender = self.worker_sender(host);

        sender.send(Job { command, reply: reply_tx }).await.map_err(|_| Error::ConnectionError {
            host: host.to_string(),
            reason: "dispatcher worker is gone".to_string(),
        })?;

        reply_rx.await.map_err(|_| Error::ConnectionError {
            host: host.to_string(),
            reason: "dispatcher worker dropped the command".to_string(),
        })?
    }

    fn worker_sender(&self, host: &HostName) -> mpsc::Sender<Job> {
        let mut workers = self.workers.lock().expect("Mutex poisoned");

        if let Some(sender) = workers.get(host) {
            return sender.clone();
        }

        let (tx, rx) = mpsc::channel(WORKER_QUEUE_DEPTH);
        tokio::spawn(worker_loop(
            self.connection.clone(),
            self.policy,
            self.command_timeout,
            host.clone(),
            rx,
        ));
        workers.insert(host.clone(), tx.clone());

        log::debug!("Started command worker for host '{}'.", host);
        tx
    }
}

async fn worker_loop(
    connection: Arc<dyn HostConnection>,
    policy: RetryPolicy,
    command_timeout: Duration,
    host: HostName,
    mut queue: mpsc::Receiver<Job>,
) {
    while let Some(job) = queue.recv().await {
        let started = Instant::now();
        let (result, attempts) = run_with_retries(connection.as_ref(), &policy, command_timeout, &host, &job.command).await;

        audit_dispatch(&job.command, &host, &result, attempts, started.elapsed());

        // The caller may have been cancelled while the command ran.
        let _ = job.reply.send(result);
    }

    log::debug!("Command worker for host '{}' shut down.", host);
}

/// Runs one command until it is acknowledged, an attempt is not worth
/// repeating, or the retry budget is spent. Returns the outcome together
/// with the number of attempts made.
async fn run_with_retries(
    connection: &dyn HostConnection,
    policy: &RetryPolicy,
    command_timeout: Duration,
    host: &HostName,
    command: &CrmCommand,
) -> (Result<Ack>, u32) {
    let argv = command.render_argv();
    let started = Instant::now();
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        match tokio::time::timeout(command_timeout, connection.execute(&argv, host)).await {
            // No acknowledgment within the bound. The command may or may
            // not have run, so only idempotent commands are resent.
            Err(_) => {
                if command.is_idempotent() && attempt < policy.max_attempts {
                    let delay = policy.delay_for(attempt);
                    log::warn!(
                        "Command '{}' on host '{}' got no acknowledgment (attempt {}), retrying in {:?}.",
                        command.render_line(),
                        host,
                        attempt,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }

                return (
                    Err(Error::TimeoutError {
                        command: command.render_line(),
                        host: host.to_string(),
                        attempts: attempt,
                    }),
                    attempt,
                );
            }
            // Transport failure, the command never reached the host.
            Ok(Err(error)) => {
                if error.is_transient() && attempt < policy.max_attempts {
                    let delay = policy.delay_for(attempt);
                    log::warn!(
                        "Command '{}' could not reach host '{}' (attempt {}), retrying in {:?}: {}",
                        command.render_line(),
                        host,
                        attempt,
                        delay,
                        error
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }

                return (Err(error), attempt);
            }
            Ok(Ok(output)) if output.success() => {
                return (
                    Ok(Ack {
                        command_id: command.id,
                        host: host.clone(),
                        attempts: attempt,
                        elapsed: started.elapsed(),
                        stdout: output.stdout,
                    }),
                    attempt,
                );
            }
            // The engine ran the command and rejected it.
            Ok(Ok(output)) => {
                if command.is_idempotent() && attempt < policy.max_attempts {
                    let delay = policy.delay_for(attempt);
                    log::warn!(
                        "Command '{}' on host '{}' exited with code {} (attempt {}), retrying in {:?}.",
                        command.render_line(),
                        host,
                        output.exit_code,
                        attempt,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }

                return (
                    Err(Error::RemoteError {
                        command: command.render_line(),
                        host: host.to_string(),
                        exit_code: output.exit_code,
                        stdout: output.stdout,
                        stderr: output.stderr,
                    }),
                    attempt,
                );
            }
        }
    }
}

/// Writes the audit record for one finished dispatch, to the CSV trail
/// and mirrored as a structured event on the audit log target.
fn audit_dispatch(command: &CrmCommand, host: &HostName, result: &Result<Ack>, attempts: u32, elapsed: Duration) {
    let line = command.render_line();
    let elapsed_ms = elapsed.as_millis() as i64;

    let (outcome, exit_code) = match result {
        Ok(_) => ("acknowledged", Some(0)),
        Err(Error::RemoteError { exit_code, .. }) => ("remote-error", Some(*exit_code)),
        Err(Error::TimeoutError { .. }) => ("timeout", None),
        Err(_) => ("connection-error", None),
    };

    let mut event = AuditEvent::new();
    event
        .set(AuditParameter::LogDescription, "Command dispatch finished")
        .set(AuditParameter::Host, host.to_string())
        .set(AuditParameter::CommandId, command.id.to_string())
        .set(AuditParameter::Command, command.label())
        .set(AuditParameter::Subject, command.subject())
        .set(AuditParameter::CommandLine, line.clone())
        .set(AuditParameter::Attempts, attempts)
        .set(AuditParameter::Outcome, outcome)
        .set(AuditParameter::ProcessingTime, elapsed_ms);
    if let Some(code) = exit_code {
        event.set(AuditParameter::ExitCode, code);
    }
    audit::record(event);

    tracing::info!(
        target: audit::AUDIT_TARGET,
        Host = %host,
        Command = command.label(),
        Subject = %command.subject(),
        CommandLine = %line,
        Attempts = attempts,
        Outcome = outcome,
        ProcessingTime = elapsed_ms,
    );
}
