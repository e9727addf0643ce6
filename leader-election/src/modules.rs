//! Subsystems that only run on the leader.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// A subsystem started once this process becomes leader. `start` should run
/// until `ctx` is cancelled.
#[async_trait]
pub trait Module: Send + Sync {
    fn name(&self) -> &str;

    async fn start(&self, ctx: CancellationToken);
}

/// Modules to activate on leadership, in registration order.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: Vec<Arc<dyn Module>>,
    running: Mutex<JoinSet<()>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, module: Arc<dyn Module>) -> Self {
        self.modules.push(module);
        self
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Spawn every registered module on a child of `ctx`.
    pub async fn start_all(&self, ctx: CancellationToken) {
        let mut running = self.running.lock().await;
        for module in &self.modules {
            let module = Arc::clone(module);
            let token = ctx.child_token();
            tracing::info!(module = module.name(), "starting module");
            running.spawn(async move {
                module.start(token).await;
                tracing::info!(module = module.name(), "module stopped");
            });
        }
    }

    /// Wait for started modules to return. Callers cancel their context first.
    pub async fn join_all(&self) {
        let mut running = self.running.lock().await;
        while let Some(result) = running.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "module task panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    struct CountingModule {
        started: AtomicUsize,
        stopped: AtomicUsize,
    }

    #[async_trait]
    impl Module for CountingModule {
        fn name(&self) -> &str {
            "counting"
        }

        async fn start(&self, ctx: CancellationToken) {
            self.started.fetch_add(1, Ordering::SeqCst);
            ctx.cancelled().await;
            self.stopped.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn modules_run_until_context_cancelled() {
        let module = Arc::new(CountingModule {
            started: AtomicUsize::new(0),
            stopped: AtomicUsize::new(0),
        });
        let registry = ModuleRegistry::new().register(module.clone());
        assert_eq!(registry.len(), 1);

        let ctx = CancellationToken::new();
        registry.start_all(ctx.clone()).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(module.started.load(Ordering::SeqCst), 1);
        assert_eq!(module.stopped.load(Ordering::SeqCst), 0);

        ctx.cancel();
        tokio::time::timeout(Duration::from_secs(5), registry.join_all())
            .await
            .expect("modules should stop");
        assert_eq!(module.stopped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_registry_is_a_noop() {
        let registry = ModuleRegistry::new();
        assert!(registry.is_empty());
        registry.start_all(CancellationToken::new()).await;
        registry.join_all().await;
    }
}
