use crate::constants::MAX_PAYLOAD_SIZE;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    // prefix of the takeover string handed to the content worker
    pub service_name: String,

    // how long the host waits for the service to acknowledge a handoff,
    // None blocks forever
    pub reply_timeout: Option<Duration>,

    // largest key table a receiver will read off the socket
    pub max_payload: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        return ServiceConfig {
            service_name: String::from("WebContent"),
            reply_timeout: Some(Duration::from_secs(5)),
            max_payload: MAX_PAYLOAD_SIZE,
        };
    }
}

impl ServiceConfig {
    pub fn with_service_name(mut self, name: &str) -> ServiceConfig {
        self.service_name = name.to_string();
        return self;
    }

    pub fn with_reply_timeout(mut self, timeout: Option<Duration>) -> ServiceConfig {
        self.reply_timeout = timeout;
        return self;
    }

    pub fn with_max_payload(mut self, max_payload: usize) -> ServiceConfig {
        self.max_payload = max_payload;
        return self;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setters_chain() {
        let config = ServiceConfig::default()
            .with_service_name("Renderer")
            .with_reply_timeout(None)
            .with_max_payload(128);
        assert_eq!(config.service_name, "Renderer");
        assert_eq!(config.reply_timeout, None);
        assert_eq!(config.max_payload, 128);

        let defaults = ServiceConfig::default();
        assert_eq!(defaults.service_name, "WebContent");
        assert_eq!(defaults.reply_timeout, Some(Duration::from_secs(5)));
        assert_eq!(defaults.max_payload, MAX_PAYLOAD_SIZE);
    }
}
