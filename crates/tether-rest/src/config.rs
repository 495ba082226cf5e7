pub const DEFAULT_MAX_BODY_BYTES: usize = 20 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Name stamped on provenance hops and crash messages.
    pub service: String,
    /// Origins matching this pattern are echoed back for CORS.
    pub cors: Option<String>,
    /// Log every request and response payload.
    pub verbose: bool,
    pub max_body_bytes: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            service: "service".to_string(),
            cors: None,
            verbose: false,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl DispatcherConfig {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            ..Self::default()
        }
    }

    pub fn with_cors(mut self, pattern: impl Into<String>) -> Self {
        self.cors = Some(pattern.into());
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_max_body_bytes(mut self, max: usize) -> Self {
        self.max_body_bytes = max;
        self
    }
}
