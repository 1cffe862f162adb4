use async_trait::async_trait;

/// The opaque session resource a code-executing agent depends on (§6.3).
/// The orchestrator never inspects it beyond this contract: it ensures a
/// resource is available before dispatch and releases it at session end,
/// treating everything else (which container runtime, what image) as the
/// concrete agent's business.
#[async_trait]
pub trait ContainerResource: Send + Sync {
    async fn ensure_running(&self) -> bool;
    async fn stop(&self) -> bool;
    async fn remove(&self) -> bool;
    async fn logs(&self, tail: usize) -> String;
}
