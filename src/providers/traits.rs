use anyhow::Result;
use async_trait::async_trait;

use crate::task_manager::TaskManager;

/// A service started by the coordinator through the [`TaskManager`].
///
/// # Example
///
/// ```no_run
/// use vision_pwmd::providers::ServiceProvider;
/// use vision_pwmd::task_manager::TaskManager;
/// use anyhow::Result;
///
/// struct Heartbeat;
///
/// #[async_trait::async_trait]
/// impl ServiceProvider for Heartbeat {
///     async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
///         task_manager.spawn_task("heartbeat", |token| async move {
///             token.cancelled().await;
///             Ok(())
///         });
///         Ok(())
///     }
///
///     fn name(&self) -> &'static str { "Heartbeat" }
/// }
/// ```
#[async_trait]
pub trait ServiceProvider: Send + Sync {
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()>;

    fn name(&self) -> &'static str;

    /// Higher numbers start first.
    fn priority(&self) -> i32 {
        0
    }

    /// A critical service failing to start aborts startup.
    fn is_critical(&self) -> bool {
        false
    }
}
