use std::time::Duration;

use crate::network::NetworkConfig;

/// Path prefix under which every plugin API is served.
pub const DEFAULT_API_PREFIX: &str = "/api/";

/// JSON body field carrying the actual payload of a POST.
pub const DEFAULT_DATA_FIELD: &str = "data";

/// Dispatcher configuration: how transport calls map onto API requests.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Prefix stripped from the request path to obtain the route.
    pub api_prefix: String,
    /// Top-level JSON field extracted into `ApiRequest::data`.
    pub data_field: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            data_field: DEFAULT_DATA_FIELD.to_string(),
        }
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval between two evaluations of the entry set.
    pub tick_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
        }
    }
}

/// Complete configuration of the hub process.
#[derive(Debug, Clone, Default)]
pub struct HubConfig {
    pub network: NetworkConfig,
    pub dispatcher: DispatcherConfig,
    pub scheduler: SchedulerConfig,
}
