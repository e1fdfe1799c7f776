//! Gateway shared state.

use std::sync::Arc;

use tokio::sync::OnceCell;

use convoy_agent::init::{AgentService, RuntimeFactory, ToolDefinition};
use convoy_core::config::Config;
use convoy_core::store::RunStateStore;

/// Shared gateway state accessible from all request handlers.
pub struct GatewayState {
    pub config: Arc<Config>,
    pub store: Arc<dyn RunStateStore>,
    base_tools: Vec<ToolDefinition>,
    factory: RuntimeFactory,
    agent: OnceCell<Arc<AgentService>>,
}

impl GatewayState {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn RunStateStore>,
        base_tools: Vec<ToolDefinition>,
        factory: RuntimeFactory,
    ) -> Self {
        Self {
            config,
            store,
            base_tools,
            factory,
            agent: OnceCell::new(),
        }
    }

    /// The process-wide agent, built at most once. Concurrent first
    /// callers await the same in-flight initialization instead of
    /// racing to build it twice; MCP backend failures degrade rather
    /// than fail (see [`AgentService::initialize`]).
    pub async fn agent(&self) -> Arc<AgentService> {
        self.agent
            .get_or_init(|| async {
                Arc::new(
                    AgentService::initialize(&self.config, self.base_tools.clone(), &self.factory)
                        .await,
                )
            })
            .await
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_agent::scripted::EchoRuntime;
    use convoy_agent::AgentRuntime;
    use convoy_core::store::MemoryStateStore;

    fn test_state() -> Arc<GatewayState> {
        let factory: RuntimeFactory =
            Arc::new(|_tools| Arc::new(EchoRuntime::new("Basic Agent")) as Arc<dyn AgentRuntime>);
        Arc::new(GatewayState::new(
            Arc::new(Config::default()),
            Arc::new(MemoryStateStore::new()),
            Vec::new(),
            factory,
        ))
    }

    #[tokio::test]
    async fn test_agent_initialized_once_across_concurrent_callers() {
        let state = test_state();
        let (a, b) = tokio::join!(state.agent(), state.agent());
        assert!(Arc::ptr_eq(&a, &b));
    }
}
