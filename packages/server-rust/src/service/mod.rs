//! Service lifecycle and the plumbing shared by the hub's services.
//!
//! 1. **Lifecycle** (`registry`): `ManagedService`, `ServiceState`, `ServicesManager`
//! 2. **Configuration** (`config`): per-service settings aggregated in `HubConfig`
//! 3. **Middleware** (`middleware`): tower layers around the dispatcher
//! 4. **Background workers** (`worker`): the periodic tick loop

pub mod config;
pub mod middleware;
pub mod registry;
pub mod worker;

pub use config::{DispatcherConfig, HubConfig, SchedulerConfig};
pub use registry::{ManagedService, ServiceState, ServiceStatus, ServicesManager};
pub use worker::{BackgroundRunnable, BackgroundWorker};
