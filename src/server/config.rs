//! Endpoint Configuration

/// Region endpoint configuration
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Bind address
    pub bind: String,

    /// Port number
    pub port: u16,

    /// Region this endpoint serves
    pub region: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 7400,
            region: "us-east-2".to_string(),
        }
    }
}

impl EndpointConfig {
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_bind(mut self, bind: impl Into<String>) -> Self {
        self.bind = bind.into();
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// `bind:port`
    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}
