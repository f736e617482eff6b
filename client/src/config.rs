use std::time::Duration;

/// Client runtime settings
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_addr: String,
    /// How often the latest board is fetched on top of pushes
    pub poll_interval: Duration,
    /// Delay between drop animation frames
    pub frame_delay: Duration,
    /// How long a request waits for its reply
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:8080".to_string(),
            poll_interval: Duration::from_millis(500),
            frame_delay: Duration::from_millis(30),
            request_timeout: Duration::from_millis(1000),
        }
    }
}
