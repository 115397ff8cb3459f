use std::any::{Any, TypeId};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// ServiceStatus / ServiceState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    Stopped,
    Running,
}

impl ServiceStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
        }
    }
}

/// Name and status of a service, with guarded transitions.
///
/// `mark_running` / `mark_stopped` return `false` when the service is
/// already in the target status, so callers can make start/stop no-ops.
#[derive(Debug)]
pub struct ServiceState {
    name: &'static str,
    status: Mutex<ServiceStatus>,
}

impl ServiceState {
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            status: Mutex::new(ServiceStatus::Stopped),
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn status(&self) -> ServiceStatus {
        *self.status.lock()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status() == ServiceStatus::Running
    }

    /// Flips to `Running`. Returns `false` if it was already running.
    pub fn mark_running(&self) -> bool {
        self.transition(ServiceStatus::Running)
    }

    /// Flips to `Stopped`. Returns `false` if it was already stopped.
    pub fn mark_stopped(&self) -> bool {
        self.transition(ServiceStatus::Stopped)
    }

    fn transition(&self, target: ServiceStatus) -> bool {
        let mut status = self.status.lock();
        if *status == target {
            debug!(service = self.name, status = target.as_str(), "service already in target status");
            return false;
        }
        *status = target;
        info!(service = self.name, status = target.as_str(), "service status changed");
        true
    }
}

// ---------------------------------------------------------------------------
// ManagedService trait
// ---------------------------------------------------------------------------

/// Lifecycle-managed service. The dispatcher and the scheduler implement this.
///
/// `start` and `stop` must be idempotent: calling either while already in
/// the target status does nothing.
#[async_trait]
pub trait ManagedService: Send + Sync + Any {
    /// Returns the unique name of this service (e.g., `"dispatcher"`).
    fn name(&self) -> &'static str;

    fn status(&self) -> ServiceStatus;

    async fn start(&self) -> anyhow::Result<()>;

    async fn stop(&self) -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// ServicesManager
// ---------------------------------------------------------------------------

/// Starts and stops every registered service.
///
/// Services can be looked up by name or by concrete type. They are started
/// in registration order and stopped in reverse order.
pub struct ServicesManager {
    by_name: DashMap<&'static str, Arc<dyn ManagedService>>,
    by_type: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    start_order: RwLock<Vec<&'static str>>,
}

impl ServicesManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_name: DashMap::new(),
            by_type: DashMap::new(),
            start_order: RwLock::new(Vec::new()),
        }
    }

    /// Register a shared service. Registering a second service under the
    /// same name replaces the first one but keeps its position.
    pub fn register<T: ManagedService>(&self, service: Arc<T>) {
        let name = service.name();
        let previous = self.by_name.insert(name, service.clone());
        self.by_type.insert(TypeId::of::<T>(), service);
        if previous.is_none() {
            self.start_order.write().push(name);
        }
    }

    /// Retrieve a service by its concrete type.
    pub fn get<T: ManagedService>(&self) -> Option<Arc<T>> {
        self.by_type
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.value().clone().downcast::<T>().ok())
    }

    /// Retrieve a service by its name.
    pub fn get_by_name(&self, name: &str) -> Option<Arc<dyn ManagedService>> {
        self.by_name.get(name).map(|entry| entry.value().clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.start_order.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start all services in registration order.
    ///
    /// # Errors
    ///
    /// Returns the first `start()` error; later services are not started.
    pub async fn start_all(&self) -> anyhow::Result<()> {
        let order = self.start_order.read().clone();
        for name in &order {
            if let Some(service) = self.get_by_name(name) {
                service.start().await?;
            }
        }
        Ok(())
    }

    /// Stop all services in reverse registration order.
    ///
    /// Every service is asked to stop even if an earlier one fails.
    ///
    /// # Errors
    ///
    /// Returns the first `stop()` error encountered.
    pub async fn stop_all(&self) -> anyhow::Result<()> {
        let order = self.start_order.read().clone();
        let mut first_error = None;
        for name in order.iter().rev() {
            if let Some(service) = self.get_by_name(name) {
                if let Err(e) = service.stop().await {
                    tracing::error!(service = *name, error = %e, "service failed to stop");
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Default for ServicesManager {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    /// Test service that tracks lifecycle calls via atomic counters.
    struct TestService {
        state: ServiceState,
        start_counter: AtomicU32,
        stop_counter: AtomicU32,
        fail_stop: bool,
        /// Tracks global start/stop ordering across services.
        order_log: Arc<Mutex<Vec<String>>>,
    }

    impl TestService {
        fn new(name: &'static str, order_log: Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                state: ServiceState::new(name),
                start_counter: AtomicU32::new(0),
                stop_counter: AtomicU32::new(0),
                fail_stop: false,
                order_log,
            }
        }
    }

    #[async_trait]
    impl ManagedService for TestService {
        fn name(&self) -> &'static str {
            self.state.name()
        }

        fn status(&self) -> ServiceStatus {
            self.state.status()
        }

        async fn start(&self) -> anyhow::Result<()> {
            if self.state.mark_running() {
                self.start_counter.fetch_add(1, Ordering::SeqCst);
                self.order_log.lock().push(format!("start:{}", self.name()));
            }
            Ok(())
        }

        async fn stop(&self) -> anyhow::Result<()> {
            if self.fail_stop {
                anyhow::bail!("{} refused to stop", self.name());
            }
            if self.state.mark_stopped() {
                self.stop_counter.fetch_add(1, Ordering::SeqCst);
                self.order_log.lock().push(format!("stop:{}", self.name()));
            }
            Ok(())
        }
    }

    #[test]
    fn state_transitions_are_guarded() {
        let state = ServiceState::new("svc");
        assert_eq!(state.status(), ServiceStatus::Stopped);
        assert!(!state.mark_stopped());
        assert!(state.mark_running());
        assert!(!state.mark_running());
        assert!(state.is_running());
        assert!(state.mark_stopped());
        assert_eq!(state.status(), ServiceStatus::Stopped);
    }

    #[test]
    fn register_and_get_by_name_and_type() {
        let manager = ServicesManager::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        manager.register(Arc::new(TestService::new("scheduler", log)));

        assert_eq!(manager.get_by_name("scheduler").unwrap().name(), "scheduler");
        assert!(manager.get::<TestService>().is_some());
        assert!(manager.get_by_name("nonexistent").is_none());
        assert_eq!(manager.len(), 1);
    }

    #[tokio::test]
    async fn start_all_in_order_and_stop_all_in_reverse() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let manager = ServicesManager::new();
        manager.register(Arc::new(TestService::new("first", log.clone())));
        manager.register(Arc::new(TestService::new("second", log.clone())));
        manager.register(Arc::new(TestService::new("third", log.clone())));

        manager.start_all().await.unwrap();
        manager.stop_all().await.unwrap();

        let entries = log.lock().clone();
        assert_eq!(
            entries,
            vec![
                "start:first",
                "start:second",
                "start:third",
                "stop:third",
                "stop:second",
                "stop:first"
            ]
        );
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let service = Arc::new(TestService::new("svc", log));
        let manager = ServicesManager::new();
        manager.register(service.clone());

        manager.start_all().await.unwrap();
        manager.start_all().await.unwrap();

        assert_eq!(service.start_counter.load(Ordering::SeqCst), 1);
        assert_eq!(service.status(), ServiceStatus::Running);
    }

    #[tokio::test]
    async fn stop_all_continues_past_failures() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let manager = ServicesManager::new();
        let healthy = Arc::new(TestService::new("healthy", log.clone()));
        let mut failing = TestService::new("failing", log.clone());
        failing.fail_stop = true;
        manager.register(healthy.clone());
        manager.register(Arc::new(failing));

        manager.start_all().await.unwrap();
        let err = manager.stop_all().await.unwrap_err();

        assert!(err.to_string().contains("failing"));
        assert_eq!(healthy.stop_counter.load(Ordering::SeqCst), 1);
    }
}
