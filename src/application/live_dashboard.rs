// Live dashboard - single scheduler for polling, streaming and UI commands
use crate::application::renderer::Renderer;
use crate::application::stream_manager::{
    BackoffPolicy, ConnectionState, DataSourceMode, StreamAction, StreamConnectionManager,
};
use crate::application::telemetry_client::TelemetryClient;
use crate::application::telemetry_source::{
    EventStream, HealthReport, StreamEvent, TelemetrySource, TrendsQuery, TrendsResponse,
};
use crate::domain::metric::MetricId;
use crate::domain::tank::TankCalibration;
use crate::domain::time_range::TimeRange;
use crate::error::{TelemetryError, TelemetryResult};
use crate::infrastructure::payload::{StreamMessage, parse_stream_message};
use futures::StreamExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};

/// Requests coming from the page: device picker, range buttons, unmount.
#[derive(Debug, Clone, PartialEq)]
pub enum DashboardCommand {
    SwitchDevice(String),
    SetRange(TimeRange),
    /// Re-read the device list; the answer goes to `Renderer::devices_changed`.
    RefreshDevices,
    Stop,
}

#[derive(Debug, Clone)]
pub struct DashboardOptions {
    pub device: String,
    pub metrics: Vec<MetricId>,
    pub step: Option<String>,
    pub poll_interval: Duration,
    /// Poll cadence once streaming is unavailable
    pub fallback_poll_interval: Duration,
    pub poll_timeout: Duration,
    pub health_interval: Option<Duration>,
    pub streaming: bool,
    /// Take the tank calibration from the backend instead of local settings
    pub backend_tank: bool,
    pub backoff: BackoffPolicy,
}

impl Default for DashboardOptions {
    fn default() -> Self {
        Self {
            device: "plt-404cca470da0".to_string(),
            metrics: MetricId::TRENDS.to_vec(),
            step: None,
            poll_interval: Duration::from_secs(30),
            fallback_poll_interval: Duration::from_secs(10),
            poll_timeout: Duration::from_secs(15),
            health_interval: Some(Duration::from_secs(30)),
            streaming: true,
            backend_tank: true,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Results of spawned network work, tagged so late arrivals can be recognised.
enum Completion {
    Poll {
        generation: u64,
        result: TelemetryResult<TrendsResponse>,
    },
    Connect {
        epoch: u64,
        result: TelemetryResult<EventStream>,
    },
    Health(TelemetryResult<HealthReport>),
    Tank(TelemetryResult<TankCalibration>),
    Devices(TelemetryResult<Vec<String>>),
}

enum Wake {
    Command(Option<DashboardCommand>),
    Completed(Completion),
    Stream(Option<TelemetryResult<StreamEvent>>),
    PollDue,
    ReconnectDue,
    HealthDue,
}

/// Owns the telemetry client, the stream state machine and the renderer.
///
/// Everything that mutates state runs on this one task, one wake-up at a time,
/// so poll results and stream messages never race on the windows.
pub struct LiveDashboard<S, R> {
    source: Arc<S>,
    renderer: R,
    client: TelemetryClient,
    stream_manager: StreamConnectionManager,
    options: DashboardOptions,
    completions_tx: mpsc::Sender<Completion>,
    completions_rx: mpsc::Receiver<Completion>,
    stream: Option<EventStream>,
    poll_task: Option<JoinHandle<()>>,
    connect_task: Option<JoinHandle<()>>,
    health_task: Option<JoinHandle<()>>,
    tank_task: Option<JoinHandle<()>>,
    devices_task: Option<JoinHandle<()>>,
    connect_epoch: u64,
    poll_failures: u32,
    next_poll: Instant,
    reconnect_at: Option<Instant>,
    next_health: Option<Instant>,
    reported: Option<(ConnectionState, DataSourceMode)>,
}

impl<S, R> LiveDashboard<S, R>
where
    S: TelemetrySource + 'static,
    R: Renderer,
{
    pub fn new(source: Arc<S>, client: TelemetryClient, renderer: R, options: DashboardOptions) -> Self {
        let (completions_tx, completions_rx) = mpsc::channel(32);
        Self {
            source,
            renderer,
            client,
            stream_manager: StreamConnectionManager::new(options.backoff),
            options,
            completions_tx,
            completions_rx,
            stream: None,
            poll_task: None,
            connect_task: None,
            health_task: None,
            tank_task: None,
            devices_task: None,
            connect_epoch: 0,
            poll_failures: 0,
            next_poll: Instant::now(),
            reconnect_at: None,
            next_health: None,
            reported: None,
        }
    }

    /// Run until `Stop` is received or every command sender is dropped.
    /// Returns the renderer so the caller can inspect or reuse it.
    pub async fn run(mut self, mut commands: mpsc::Receiver<DashboardCommand>) -> R {
        tracing::info!(
            device = %self.options.device,
            metrics = self.options.metrics.len(),
            streaming = self.options.streaming,
            "Starting live dashboard"
        );

        let device = self.options.device.clone();
        self.client.switch_device(&device);
        self.next_poll = Instant::now();
        self.next_health = self.options.health_interval.map(|_| Instant::now());
        if self.options.backend_tank {
            self.spawn_tank_settings();
        }
        self.spawn_devices();
        if self.options.streaming {
            let action = self.stream_manager.start();
            self.apply_stream_action(action);
        }
        self.report_connection();

        loop {
            let wake = tokio::select! {
                command = commands.recv() => Wake::Command(command),
                Some(done) = self.completions_rx.recv() => Wake::Completed(done),
                event = next_event(&mut self.stream) => Wake::Stream(event),
                _ = sleep_until(self.next_poll), if self.poll_task.is_none() => Wake::PollDue,
                _ = sleep_until_opt(self.reconnect_at) => Wake::ReconnectDue,
                _ = sleep_until_opt(self.next_health) => Wake::HealthDue,
            };

            match wake {
                Wake::Command(None) | Wake::Command(Some(DashboardCommand::Stop)) => break,
                Wake::Command(Some(DashboardCommand::SwitchDevice(device))) => self.switch_device(device),
                Wake::Command(Some(DashboardCommand::SetRange(range))) => self.set_range(range),
                Wake::Command(Some(DashboardCommand::RefreshDevices)) => self.spawn_devices(),
                Wake::Completed(done) => self.on_completion(done),
                Wake::Stream(event) => self.on_stream_event(event),
                Wake::PollDue => self.spawn_poll(),
                Wake::ReconnectDue => {
                    self.reconnect_at = None;
                    let action = self.stream_manager.on_backoff_elapsed();
                    self.apply_stream_action(action);
                }
                Wake::HealthDue => self.spawn_health(),
            }

            self.report_connection();
            self.client.flush(&mut self.renderer);
        }

        self.shutdown();
        self.renderer
    }

    fn switch_device(&mut self, device: String) {
        if self.client.device() == Some(device.as_str()) {
            return;
        }
        tracing::info!(from = ?self.client.device(), to = %device, "Switching device");

        abort(&mut self.poll_task);
        self.client.switch_device(&device);
        self.options.device = device;
        self.poll_failures = 0;
        self.next_poll = Instant::now();

        // The stream is bound to the old device; reopen it for the new one.
        let action = self.stream_manager.stop();
        self.apply_stream_action(action);
        if self.options.streaming {
            let action = self.stream_manager.start();
            self.apply_stream_action(action);
        }
    }

    fn set_range(&mut self, range: TimeRange) {
        if self.client.range() == range {
            return;
        }
        tracing::info!(minutes = range.minutes(), "Changing time range");

        abort(&mut self.poll_task);
        self.client.set_range(range);
        self.poll_failures = 0;
        self.next_poll = Instant::now();
    }

    fn trends_query(&self) -> TrendsQuery {
        TrendsQuery {
            device: self.options.device.clone(),
            metrics: self.options.metrics.clone(),
            range: self.client.range(),
            step: self.options.step.clone(),
        }
    }

    fn spawn_poll(&mut self) {
        let source = Arc::clone(&self.source);
        let tx = self.completions_tx.clone();
        let query = self.trends_query();
        let generation = self.client.generation();
        let timeout = self.options.poll_timeout;

        tracing::debug!(device = %query.device, minutes = query.range.minutes(), "Polling trends");
        self.poll_task = Some(tokio::spawn(async move {
            let result = with_timeout(timeout, source.fetch_trends(&query)).await;
            let _ = tx.send(Completion::Poll { generation, result }).await;
        }));
    }

    fn spawn_connect(&mut self) {
        abort(&mut self.connect_task);
        self.connect_epoch += 1;

        let source = Arc::clone(&self.source);
        let tx = self.completions_tx.clone();
        let device = self.options.device.clone();
        let epoch = self.connect_epoch;
        let timeout = self.options.poll_timeout;

        tracing::debug!(%device, epoch, "Opening event stream");
        self.connect_task = Some(tokio::spawn(async move {
            let result = with_timeout(timeout, source.open_stream(&device)).await;
            let _ = tx.send(Completion::Connect { epoch, result }).await;
        }));
    }

    fn spawn_health(&mut self) {
        self.next_health = None;
        let source = Arc::clone(&self.source);
        abort(&mut self.health_task);
        self.health_task = Some(self.spawn_request(
            async move { source.fetch_health().await },
            Completion::Health,
        ));
    }

    fn spawn_tank_settings(&mut self) {
        let source = Arc::clone(&self.source);
        abort(&mut self.tank_task);
        self.tank_task = Some(self.spawn_request(
            async move { source.fetch_tank_settings().await },
            Completion::Tank,
        ));
    }

    fn spawn_devices(&mut self) {
        let source = Arc::clone(&self.source);
        abort(&mut self.devices_task);
        self.devices_task = Some(self.spawn_request(
            async move { source.fetch_devices().await },
            Completion::Devices,
        ));
    }

    /// One-shot request whose result comes back as a completion.
    fn spawn_request<T, F>(&self, request: F, completion: fn(TelemetryResult<T>) -> Completion) -> JoinHandle<()>
    where
        T: Send + 'static,
        F: Future<Output = TelemetryResult<T>> + Send + 'static,
    {
        let tx = self.completions_tx.clone();
        let timeout = self.options.poll_timeout;
        tokio::spawn(async move {
            let result = with_timeout(timeout, request).await;
            let _ = tx.send(completion(result)).await;
        })
    }

    fn on_completion(&mut self, done: Completion) {
        match done {
            Completion::Poll { generation, result } => {
                if !self.client.is_current(generation) {
                    tracing::debug!(generation, "Discarding poll result for a superseded view");
                    return;
                }
                self.poll_task = None;
                self.on_poll_result(result);
            }
            Completion::Connect { epoch, result } => {
                if epoch != self.connect_epoch
                    || self.stream_manager.state() != &ConnectionState::Connecting
                {
                    tracing::debug!(epoch, "Discarding stale stream connection");
                    return;
                }
                self.connect_task = None;
                match result {
                    Ok(stream) => {
                        tracing::info!(device = %self.options.device, "Event stream connected");
                        self.stream_manager.on_open();
                        self.stream = Some(stream);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Event stream connection failed");
                        let action = self.stream_manager.on_failure();
                        self.apply_stream_action(action);
                    }
                }
            }
            Completion::Health(result) => {
                self.health_task = None;
                match result {
                    Ok(report) => self.renderer.health_changed(&report),
                    Err(e) => tracing::warn!(error = %e, "Health check failed"),
                }
                self.next_health = self.options.health_interval.map(|every| Instant::now() + every);
            }
            Completion::Tank(result) => {
                self.tank_task = None;
                match result {
                    Ok(tank) => {
                        tracing::info!(
                            max_distance = tank.max_distance,
                            min_distance = tank.min_distance,
                            alert_level = tank.alert_level,
                            "Using backend tank calibration"
                        );
                        self.client.set_tank(tank);
                        self.renderer.tank_changed(&tank);
                    }
                    Err(e) => tracing::warn!(
                        error = %e,
                        local = self.client.tank().is_some(),
                        "Tank settings unavailable, keeping local calibration"
                    ),
                }
            }
            Completion::Devices(result) => {
                self.devices_task = None;
                match result {
                    Ok(devices) => {
                        let current = self.options.device.as_str();
                        if !devices.is_empty() && !devices.iter().any(|d| d == current) {
                            tracing::warn!(device = %current, "Selected device is not in the backend's device list");
                        }
                        self.renderer.devices_changed(&devices);
                    }
                    Err(e) => tracing::warn!(error = %e, "Device list unavailable"),
                }
            }
        }
    }

    fn on_poll_result(&mut self, result: TelemetryResult<TrendsResponse>) {
        match result {
            Ok(mut response) => {
                self.poll_failures = 0;
                for metric in self.options.metrics.clone() {
                    match response.series.remove(&metric) {
                        Some(batch) if !batch.is_empty() => {
                            let report = self.client.ingest_batch(metric, &batch);
                            if report.skipped > 0 {
                                tracing::warn!(
                                    %metric,
                                    skipped = report.skipped,
                                    accepted = report.accepted,
                                    "Dropped malformed points from poll"
                                );
                            }
                        }
                        _ => {
                            tracing::debug!(%metric, "Poll returned no data");
                            self.client.mark_no_data(metric);
                        }
                    }
                }
                self.next_poll = Instant::now() + self.poll_interval();
            }
            Err(e) => {
                self.poll_failures += 1;
                let delay = self
                    .options
                    .backoff
                    .delay_for(self.poll_failures - 1)
                    .min(self.poll_interval());
                if e.is_transport() {
                    tracing::warn!(error = %e, failures = self.poll_failures, retry_in = ?delay, "Poll failed");
                } else {
                    tracing::error!(error = %e, failures = self.poll_failures, retry_in = ?delay, "Poll returned an unusable payload");
                }
                self.next_poll = Instant::now() + delay;
            }
        }
    }

    fn on_stream_event(&mut self, event: Option<TelemetryResult<StreamEvent>>) {
        match event {
            Some(Ok(event)) => self.on_stream_message(event),
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Event stream error");
                self.stream = None;
                let action = self.stream_manager.on_failure();
                self.apply_stream_action(action);
            }
            None => {
                tracing::info!("Event stream closed by server");
                self.stream = None;
                let action = self.stream_manager.on_failure();
                self.apply_stream_action(action);
            }
        }
    }

    fn on_stream_message(&mut self, event: StreamEvent) {
        if !self.stream_manager.accepts_messages() {
            return;
        }
        if event.data.trim().is_empty() {
            if let Some(retry_ms) = event.retry_ms {
                tracing::debug!(retry_ms, "Server suggested a reconnect delay");
            }
            return;
        }

        match parse_stream_message(&event.data) {
            Ok(StreamMessage::Samples { device, batches }) => {
                if device.as_deref().is_some_and(|d| Some(d) != self.client.device()) {
                    tracing::debug!(?device, "Ignoring stream message for another device");
                    return;
                }
                for (metric, batch) in batches {
                    self.client.ingest_batch(metric, &batch);
                }
            }
            Ok(StreamMessage::Status(status)) => {
                tracing::debug!(%status, "Stream status message");
            }
            Ok(StreamMessage::ServerError(message)) => {
                tracing::warn!(%message, "Server reported an error on the event stream");
            }
            Err(e) => {
                tracing::error!(error = %e, data = %event.data, "Dropping malformed stream message");
            }
        }
    }

    fn apply_stream_action(&mut self, action: StreamAction) {
        match action {
            StreamAction::Connect => self.spawn_connect(),
            StreamAction::Wait(delay) => {
                tracing::info!(delay = ?delay, "Reconnecting event stream after backoff");
                self.reconnect_at = Some(Instant::now() + delay);
            }
            StreamAction::FallBackToPolling => {
                tracing::warn!(
                    max_attempts = self.options.backoff.max_attempts,
                    "Event stream unavailable, falling back to polling"
                );
                self.reconnect_at = None;
                self.stream = None;
                let sooner = Instant::now() + self.poll_interval();
                if sooner < self.next_poll {
                    self.next_poll = sooner;
                }
            }
            StreamAction::Close => {
                abort(&mut self.connect_task);
                self.stream = None;
                self.reconnect_at = None;
            }
            StreamAction::Nothing => {}
        }
    }

    fn poll_interval(&self) -> Duration {
        if !self.options.streaming || self.stream_manager.mode() == DataSourceMode::PollingOnly {
            self.options.fallback_poll_interval
        } else {
            self.options.poll_interval
        }
    }

    fn report_connection(&mut self) {
        let current = (self.stream_manager.state().clone(), self.stream_manager.mode());
        if self.reported.as_ref() != Some(&current) {
            self.renderer.connection_changed(&current.0, current.1);
            self.reported = Some(current);
        }
    }

    fn shutdown(&mut self) {
        tracing::info!("Stopping live dashboard");
        abort(&mut self.poll_task);
        abort(&mut self.health_task);
        abort(&mut self.tank_task);
        abort(&mut self.devices_task);
        let action = self.stream_manager.stop();
        self.apply_stream_action(action);
        self.report_connection();
    }
}

fn abort(task: &mut Option<JoinHandle<()>>) {
    if let Some(handle) = task.take() {
        handle.abort();
    }
}

async fn with_timeout<T>(
    limit: Duration,
    request: impl Future<Output = TelemetryResult<T>>,
) -> TelemetryResult<T> {
    match tokio::time::timeout(limit, request).await {
        Ok(result) => result,
        Err(_) => Err(TelemetryError::Timeout(limit)),
    }
}

async fn next_event(stream: &mut Option<EventStream>) -> Option<TelemetryResult<StreamEvent>> {
    match stream {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
