use std::time::Duration;

use envconfig::Envconfig;

#[derive(Envconfig, Clone, Debug)]
pub struct OperatorConfig {
    /// Namespace to watch. All namespaces when unset.
    /// Env: VALHALLA_OPERATOR_NAMESPACE
    #[envconfig(from = "VALHALLA_OPERATOR_NAMESPACE")]
    pub namespace: Option<String>,

    #[envconfig(from = "HTTP_PORT", default = "8080")]
    pub http_port: u16,

    #[envconfig(nested)]
    pub retry: RetryConfig,

    /// Fixed delay before retrying a pass whose status write hit a conflict.
    /// Env: VALHALLA_OPERATOR_STATUS_CONFLICT_REQUEUE_SECS
    #[envconfig(
        from = "VALHALLA_OPERATOR_STATUS_CONFLICT_REQUEUE_SECS",
        default = "2"
    )]
    pub status_conflict_requeue_secs: u64,

    #[envconfig(from = "VALHALLA_OPERATOR_ERROR_REQUEUE_SECS", default = "30")]
    pub error_requeue_secs: u64,

    /// Deadline of a single reconcile pass.
    /// Env: VALHALLA_OPERATOR_PASS_TIMEOUT_SECS
    #[envconfig(from = "VALHALLA_OPERATOR_PASS_TIMEOUT_SECS", default = "60")]
    pub pass_timeout_secs: u64,

    #[envconfig(nested)]
    pub images: ImagesConfig,
}

/// Bounded refetch-merge-write loop used when applying child resources.
#[derive(Envconfig, Clone, Debug)]
pub struct RetryConfig {
    #[envconfig(from = "VALHALLA_OPERATOR_CONFLICT_RETRIES", default = "5")]
    pub conflict_retries: u32,
    /// Base backoff; attempt n sleeps base * 2^(n-1).
    #[envconfig(from = "VALHALLA_OPERATOR_CONFLICT_BACKOFF_MS", default = "100")]
    pub conflict_backoff_ms: u64,
}

#[derive(Envconfig, Clone, Debug)]
pub struct ImagesConfig {
    #[envconfig(
        from = "VALHALLA_OPERATOR_WORKER_IMAGE",
        default = "itayankri/valhalla-worker:latest"
    )]
    pub worker: String,
    #[envconfig(
        from = "VALHALLA_OPERATOR_BUILDER_IMAGE",
        default = "itayankri/valhalla-builder:latest"
    )]
    pub builder: String,
    #[envconfig(
        from = "VALHALLA_OPERATOR_TRAFFIC_FETCHER_IMAGE",
        default = "itayankri/predicted-traffic-fetcher:latest"
    )]
    pub traffic_fetcher: String,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            conflict_retries: 5,
            conflict_backoff_ms: 100,
        }
    }
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            worker: "itayankri/valhalla-worker:latest".into(),
            builder: "itayankri/valhalla-builder:latest".into(),
            traffic_fetcher: "itayankri/predicted-traffic-fetcher:latest".into(),
        }
    }
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            http_port: 8080,
            retry: RetryConfig::default(),
            status_conflict_requeue_secs: 2,
            error_requeue_secs: 30,
            pass_timeout_secs: 60,
            images: ImagesConfig::default(),
        }
    }
}

impl RetryConfig {
    /// Sleep before retry `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.conflict_backoff_ms.saturating_mul(1u64 << shift))
    }
}

impl OperatorConfig {
    pub fn status_conflict_requeue(&self) -> Duration {
        Duration::from_secs(self.status_conflict_requeue_secs)
    }

    pub fn error_requeue(&self) -> Duration {
        Duration::from_secs(self.error_requeue_secs)
    }

    pub fn pass_timeout(&self) -> Duration {
        Duration::from_secs(self.pass_timeout_secs)
    }
}
