//! Connection configuration. A plain struct with a `Default` impl, the
//! idiomatic Rust analogue of `examples/original_source/options.go`'s
//! functional options -- Go reaches for `func(*Options)` closures because it
//! has no struct-update syntax; Rust doesn't need the indirection.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HubOptions {
    /// How long to wait without hearing from the peer before declaring the
    /// connection dead (`timeoutInterval`).
    pub timeout_interval: Duration,
    /// How often to send a Ping when the connection has otherwise been
    /// silent (`keepAliveInterval`). Must be smaller than `timeout_interval`.
    pub keep_alive_interval: Duration,
    /// Upper bound on how long the handshake exchange may take.
    pub handshake_timeout: Duration,
    /// Bounded channel capacity backing each inbound stream sink.
    pub stream_buffer_capacity: usize,
    /// How long `StreamClient` will block trying to enqueue one item before
    /// treating the consumer as stalled.
    pub chan_receive_timeout: Duration,
    /// Frames larger than this are a protocol violation, not buffered.
    pub maximum_receive_message_size: usize,
    /// Whether a caught handler panic's message is included verbatim in the
    /// Completion sent back to the caller.
    pub enable_detailed_errors: bool,
}

impl Default for HubOptions {
    fn default() -> Self {
        Self {
            timeout_interval: Duration::from_secs(30),
            keep_alive_interval: Duration::from_secs(15),
            handshake_timeout: Duration::from_secs(15),
            stream_buffer_capacity: 10,
            chan_receive_timeout: Duration::from_secs(5),
            maximum_receive_message_size: 32 * 1024,
            enable_detailed_errors: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("stream_buffer_capacity must be at least 1")]
    ZeroStreamBuffer,
    #[error("maximum_receive_message_size must be at least 1")]
    ZeroMessageSize,
    #[error("keep_alive_interval ({keep_alive:?}) must be less than timeout_interval ({timeout:?})")]
    KeepAliveExceedsTimeout {
        keep_alive: Duration,
        timeout: Duration,
    },
}

impl HubOptions {
    pub fn with_timeout_interval(mut self, value: Duration) -> Self {
        self.timeout_interval = value;
        self
    }

    pub fn with_keep_alive_interval(mut self, value: Duration) -> Self {
        self.keep_alive_interval = value;
        self
    }

    pub fn with_handshake_timeout(mut self, value: Duration) -> Self {
        self.handshake_timeout = value;
        self
    }

    pub fn with_stream_buffer_capacity(mut self, value: usize) -> Self {
        self.stream_buffer_capacity = value;
        self
    }

    pub fn with_chan_receive_timeout(mut self, value: Duration) -> Self {
        self.chan_receive_timeout = value;
        self
    }

    pub fn with_maximum_receive_message_size(mut self, value: usize) -> Self {
        self.maximum_receive_message_size = value;
        self
    }

    pub fn with_enable_detailed_errors(mut self, value: bool) -> Self {
        self.enable_detailed_errors = value;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stream_buffer_capacity == 0 {
            return Err(ConfigError::ZeroStreamBuffer);
        }
        if self.maximum_receive_message_size == 0 {
            return Err(ConfigError::ZeroMessageSize);
        }
        if self.keep_alive_interval >= self.timeout_interval {
            return Err(ConfigError::KeepAliveExceedsTimeout {
                keep_alive: self.keep_alive_interval,
                timeout: self.timeout_interval,
            });
        }
        Ok(())
    }
}
