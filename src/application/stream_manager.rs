// Stream connection state machine - reconnect with capped exponential backoff
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Backoff { attempt: u32, delay: Duration },
}

/// Which channel currently feeds live data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSourceMode {
    Streaming,
    /// Reconnect budget exhausted; only polls update the windows.
    PollingOnly,
}

/// Side effect the scheduler must carry out after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamAction {
    Connect,
    Wait(Duration),
    FallBackToPolling,
    Close,
    Nothing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
    /// Consecutive failures tolerated before falling back to polling
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

impl BackoffPolicy {
    /// `min(cap, base * 2^attempt)`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .unwrap_or(self.cap)
            .min(self.cap)
    }
}

#[derive(Debug, Clone)]
pub struct StreamConnectionManager {
    state: ConnectionState,
    mode: DataSourceMode,
    failures: u32,
    policy: BackoffPolicy,
}

impl StreamConnectionManager {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            mode: DataSourceMode::Streaming,
            failures: 0,
            policy,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn mode(&self) -> DataSourceMode {
        self.mode
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Messages are only ingested from an open connection.
    pub fn accepts_messages(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Begin connecting. No-op while an attempt is already under way or after
    /// the manager has fallen back to polling.
    pub fn start(&mut self) -> StreamAction {
        if self.state != ConnectionState::Disconnected || self.mode == DataSourceMode::PollingOnly {
            return StreamAction::Nothing;
        }
        self.failures = 0;
        self.state = ConnectionState::Connecting;
        StreamAction::Connect
    }

    pub fn on_open(&mut self) -> StreamAction {
        if self.state == ConnectionState::Connecting {
            self.state = ConnectionState::Connected;
            self.failures = 0;
        }
        StreamAction::Nothing
    }

    /// Transport error, failed connect or server-side close.
    pub fn on_failure(&mut self) -> StreamAction {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Connected => {}
            _ => return StreamAction::Nothing,
        }

        self.failures += 1;
        if self.failures > self.policy.max_attempts {
            self.state = ConnectionState::Disconnected;
            self.mode = DataSourceMode::PollingOnly;
            return StreamAction::FallBackToPolling;
        }

        let delay = self.policy.delay_for(self.failures - 1);
        self.state = ConnectionState::Backoff {
            attempt: self.failures,
            delay,
        };
        StreamAction::Wait(delay)
    }

    pub fn on_backoff_elapsed(&mut self) -> StreamAction {
        if let ConnectionState::Backoff { .. } = self.state {
            self.state = ConnectionState::Connecting;
            return StreamAction::Connect;
        }
        StreamAction::Nothing
    }

    /// Safe from any state; repeated calls are no-ops.
    pub fn stop(&mut self) -> StreamAction {
        if self.state == ConnectionState::Disconnected {
            return StreamAction::Nothing;
        }
        self.state = ConnectionState::Disconnected;
        StreamAction::Close
    }
}
