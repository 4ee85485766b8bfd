//! Shared constants and invariants

pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 5000;

// Exchange retry budget: first attempt plus two retries
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 10;
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 1000;

// Refresh scheduling
pub const DEFAULT_REDUNDANCY: usize = 2;
pub const DEFAULT_STAGGER_SECONDS: u64 = 150;
pub const DEFAULT_FALLBACK_INTERVAL_SECONDS: u64 = 30;
pub const DEFAULT_SAFETY_MARGIN_SECONDS: u64 = 0;

// Credentials
pub const DEFAULT_TOKEN_FIELD: &str = "access_token";
pub const DEFAULT_SECRET_VERSION: &str = "1";
pub const EXPIRES_IN_FIELD: &str = "expires_in";

// Secret stores
pub const PROVIDER_GCP: &str = "GCP";
pub const PROVIDER_AWS: &str = "AWS";
pub const GCP_SECRET_MANAGER_API: &str = "https://secretmanager.googleapis.com";
pub const GCP_METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";
pub const AWS_SECRETS_EXTENSION_ENDPOINT: &str = "http://localhost:2773";
pub const AWS_SESSION_TOKEN_ENV: &str = "AWS_SESSION_TOKEN";

// Env-variable configuration layout
pub const CONF_ENV_FILE: &str = "./conf.env";
