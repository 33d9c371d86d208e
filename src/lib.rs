pub mod config;
pub mod config_validator;
pub mod error;
pub mod i18n;
pub mod metrics;
pub mod queue;
pub mod rate_limit_config;
pub mod rate_limiter;

pub use config::{Mode, TranslatorConfig};
pub use error::{I18nError, I18nResult, QueueError, RateLimitError, RateLimitResult};
pub use i18n::{RawNode, Translator};
pub use metrics::{HitMetrics, LimiterStats};
pub use queue::{QueueConfig, TaskHandle, TaskQueue};
pub use rate_limit_config::RateLimiterConfig;
pub use rate_limiter::RateLimiter;
