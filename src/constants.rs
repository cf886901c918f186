//! # Constants
//!
//! Default values for controller configuration.
//!
//! Everything here can be overridden through the configuration file or
//! environment variables, see [`crate::config`].

/// Default path of the controller configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/dcp/application-controller.yaml";

/// Default zone identifier when none is configured
pub const DEFAULT_ZONE_ID: &str = "zone";

/// Default interval between health polls of a running application (seconds)
pub const DEFAULT_POLL_OPERATIONAL_STATUS_INTERVAL_SECS: u64 = 5;

/// Default interval between sync attempts of deploy/undeploy jobs (seconds)
pub const DEFAULT_POLL_SYNC_STATUS_INTERVAL_SECS: u64 = 5;

/// Default deadline for a single deployment attempt (seconds)
pub const DEFAULT_SYNC_TIMEOUT_SECS: u64 = 300;

/// Default deadline for a single undeployment attempt (seconds)
pub const DEFAULT_UNDEPLOY_TIMEOUT_SECS: u64 = 300;

/// Attempts made by deploy and undeploy jobs when `max-retries` is unset
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Retry budget of the optimistic-concurrency status update loop
pub const DEFAULT_STATUS_UPDATE_RETRIES: u32 = 5;

/// Requeue interval while a job is active for an application (seconds)
pub const DEFAULT_RECONCILE_REQUEUE_SECS: u64 = 1;

/// Default requeue interval when the error backoff state cannot be read (seconds)
pub const DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS: u64 = 60;

/// Minimum backoff after a reconciliation error (seconds)
pub const DEFAULT_ERROR_BACKOFF_MIN_SECS: u64 = 1;

/// Maximum backoff after a reconciliation error (seconds)
pub const DEFAULT_ERROR_BACKOFF_MAX_SECS: u64 = 300;

/// Default HTTP port for metrics and probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default HTTP bind address for metrics and probes
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";

/// Server startup timeout (seconds)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Server readiness poll interval (milliseconds)
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Default log level when neither `RUST_LOG` nor the config file set one
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Finalizer placed on every AnyApplication handled by this controller
pub const FINALIZER_NAME: &str = "anyapplication.finalizers.hiro.io";

/// Field manager used for server-side apply and events
pub const FIELD_MANAGER: &str = "anyapplication-controller";

/// Label carrying the application instance id on managed resources
pub const INSTANCE_LABEL: &str = "dcp.hiro.io/instance";

/// Label carrying the deployed version on managed resources
pub const VERSION_LABEL: &str = "dcp.hiro.io/version";

/// Delay before the watch is restarted after an unrecoverable stream error (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Initial backoff when the API server storage is reinitializing (milliseconds)
pub const DEFAULT_WATCH_BACKOFF_MIN_MS: u64 = 500;

/// Maximum backoff when the API server storage is reinitializing (milliseconds)
pub const DEFAULT_WATCH_BACKOFF_MAX_MS: u64 = 30_000;
