//! Agent: polls local metrics and ships them to the hub
//!
//! ## Message Flow
//!
//! ```text
//! poll tick   → Agent::poll() → batch replaced under lock
//! report tick → Agent::current_batch() → WorkerPool::submit(send task)
//!                                         └─► Transport::send_metrics
//!                                             └─ ok → Agent::reset_counter()
//!     ↑
//!     └─── Commands (PollNow, ReportNow, Shutdown)
//! ```
//!
//! The first poll and report happen right after start. On shutdown the
//! timers stop and every queued send runs to completion before the actor
//! exits.

pub mod collector;
pub mod pool;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::time::{self, Instant};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::Metric;
use crate::codec::BatchEncoder;
use crate::codec::encryption::Encryptor;
use crate::config::{AgentConfig, TransportKind};
use crate::util::local_ip;

use self::collector::{Collector, POLL_COUNT};
use self::pool::WorkerPool;
use self::transport::{RestTransport, RpcTransport, Transport};

#[derive(Debug, Default)]
struct AgentState {
    batch: Vec<Metric>,
    poll_count: i64,
}

/// Owns the current batch and the poll counter
pub struct Agent {
    collector: Mutex<Collector>,
    state: Mutex<AgentState>,
}

impl Agent {
    pub fn new() -> Self {
        Self {
            collector: Mutex::new(Collector::new()),
            state: Mutex::new(AgentState::default()),
        }
    }

    /// Collect a fresh batch and bump the poll counter
    pub async fn poll(&self) {
        let gauges = self.collector.lock().await.collect();

        let mut state = self.state.lock().await;
        state.poll_count += 1;

        let mut batch = gauges;
        batch.push(Metric::counter(POLL_COUNT, state.poll_count));
        state.batch = batch;

        trace!("poll #{} collected {} metrics", state.poll_count, state.batch.len());
    }

    /// Copy of the latest batch
    pub async fn current_batch(&self) -> Vec<Metric> {
        self.state.lock().await.batch.clone()
    }

    /// Zero the poll counter after a delivered report
    ///
    /// The `PollCount` entry of the current batch is zeroed too, so a report
    /// firing before the next poll does not resend the delivered delta.
    pub async fn reset_counter(&self) {
        let mut state = self.state.lock().await;
        state.poll_count = 0;
        for metric in state.batch.iter_mut().filter(|m| m.id == POLL_COUNT) {
            metric.delta = Some(0);
        }
    }

    pub async fn poll_count(&self) -> i64 {
        self.state.lock().await.poll_count
    }
}

impl Default for Agent {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub enum AgentCommand {
    /// Poll immediately, bypassing the timer
    PollNow { respond_to: oneshot::Sender<()> },

    /// Queue a report immediately, bypassing the timer
    ReportNow { respond_to: oneshot::Sender<()> },

    /// Stop the timers, drain queued sends, then answer
    Shutdown { respond_to: oneshot::Sender<()> },
}

/// Intervals and pool size of a running agent
#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    pub poll_interval: Duration,
    pub report_interval: Duration,
    pub rate_limit: usize,
}

impl From<&AgentConfig> for Schedule {
    fn from(config: &AgentConfig) -> Self {
        Self {
            poll_interval: config.poll_period(),
            report_interval: config.report_period(),
            rate_limit: config.rate_limit,
        }
    }
}

pub struct AgentActor {
    agent: Arc<Agent>,
    transport: Arc<dyn Transport>,
    pool: WorkerPool,
    schedule: Schedule,
    command_rx: mpsc::Receiver<AgentCommand>,
}

impl AgentActor {
    pub fn new(
        agent: Arc<Agent>,
        transport: Arc<dyn Transport>,
        schedule: Schedule,
        command_rx: mpsc::Receiver<AgentCommand>,
    ) -> Self {
        Self {
            agent,
            transport,
            pool: WorkerPool::new(schedule.rate_limit),
            schedule,
            command_rx,
        }
    }

    #[instrument(skip(self), fields(rate_limit = self.schedule.rate_limit))]
    pub async fn run(mut self) {
        debug!("starting agent actor");

        self.agent.poll().await;
        self.report().await;

        let mut poll_ticker = time::interval_at(
            Instant::now() + self.schedule.poll_interval,
            self.schedule.poll_interval,
        );
        let mut report_ticker = time::interval_at(
            Instant::now() + self.schedule.report_interval,
            self.schedule.report_interval,
        );

        let mut shutdown_reply = None;
        loop {
            tokio::select! {
                _ = poll_ticker.tick() => self.agent.poll().await,

                _ = report_ticker.tick() => self.report().await,

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        AgentCommand::PollNow { respond_to } => {
                            self.agent.poll().await;
                            let _ = respond_to.send(());
                        }

                        AgentCommand::ReportNow { respond_to } => {
                            self.report().await;
                            let _ = respond_to.send(());
                        }

                        AgentCommand::Shutdown { respond_to } => {
                            debug!("received shutdown command");
                            shutdown_reply = Some(respond_to);
                            break;
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        self.pool.shutdown().await;
        info!("agent stopped, all queued reports delivered or failed");

        if let Some(respond_to) = shutdown_reply {
            let _ = respond_to.send(());
        }
    }

    /// Hand the current batch to the worker pool
    async fn report(&self) {
        let batch = self.agent.current_batch().await;
        if batch.is_empty() {
            trace!("nothing to report yet");
            return;
        }

        let agent = self.agent.clone();
        let transport = self.transport.clone();
        let submitted = self
            .pool
            .submit(async move {
                match transport.send_metrics(&batch).await {
                    Ok(()) => agent.reset_counter().await,
                    // the next report resends a fresh batch
                    Err(e) => error!("failed to deliver {} metrics: {}", batch.len(), e),
                }
            })
            .await;

        if let Err(e) = submitted {
            warn!("report dropped: {}", e);
        }
    }
}

/// Handle for controlling a running agent
#[derive(Clone)]
pub struct AgentHandle {
    sender: mpsc::Sender<AgentCommand>,
    agent: Arc<Agent>,
}

impl AgentHandle {
    /// Spawn the agent actor with the given transport
    pub fn spawn(schedule: Schedule, transport: Arc<dyn Transport>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let agent = Arc::new(Agent::new());

        let actor = AgentActor::new(agent.clone(), transport, schedule, cmd_rx);
        tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            agent,
        }
    }

    pub fn agent(&self) -> &Arc<Agent> {
        &self.agent
    }

    pub async fn poll_now(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(AgentCommand::PollNow { respond_to: tx })
            .await
            .context("failed to send PollNow command")?;
        rx.await.context("failed to receive response")
    }

    /// Queue a report; returns once the send task is queued, not delivered
    pub async fn report_now(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(AgentCommand::ReportNow { respond_to: tx })
            .await
            .context("failed to send ReportNow command")?;
        rx.await.context("failed to receive response")
    }

    /// Stop the agent and wait until queued reports have run
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(AgentCommand::Shutdown { respond_to: tx })
            .await
            .context("failed to send Shutdown command")?;
        rx.await.context("agent stopped without confirming shutdown")
    }
}

/// Build the transport selected by `config`
pub fn build_transport(config: &AgentConfig) -> Result<Arc<dyn Transport>> {
    match config.transport {
        TransportKind::Rest => {
            let encryptor = config
                .crypto_key
                .as_ref()
                .map(Encryptor::from_pem_file)
                .transpose()
                .context("failed to load public key")?;
            let encoder = BatchEncoder::new(config.hash_key.clone(), encryptor);
            let (signed, encrypted) = (encoder.signs(), encoder.encrypts());

            let transport = RestTransport::new(&config.address, encoder)?.with_real_ip(local_ip());
            info!(
                "reporting to {} (signed: {}, encrypted: {})",
                transport.url(),
                signed,
                encrypted
            );
            Ok(Arc::new(transport))
        }
        TransportKind::Grpc => {
            info!("reporting to {} over gRPC", config.address);
            Ok(Arc::new(RpcTransport::new(&config.address)?))
        }
    }
}
