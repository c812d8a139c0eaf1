use super::{Component, ComponentState, OwlwatchOrchestrator};
use std::collections::BTreeMap;
use tracing::{debug, warn};

impl OwlwatchOrchestrator {
    /// Record a lifecycle transition, returning the state it replaced
    pub async fn set_component_state(
        &self,
        component: Component,
        state: ComponentState,
    ) -> Option<ComponentState> {
        let previous = self.component_states.lock().await.insert(component, state);

        match (previous, state) {
            (Some(from), to) if from == to => {}
            (_, ComponentState::Failed) => warn!("Component '{}' failed", component),
            (Some(from), to) => debug!("Component '{}': {:?} -> {:?}", component, from, to),
            (None, to) => debug!("Component '{}' registered as {:?}", component, to),
        }
        previous
    }

    pub async fn get_component_state(&self, component: Component) -> Option<ComponentState> {
        self.component_states.lock().await.get(&component).copied()
    }

    pub async fn get_all_component_states(&self) -> BTreeMap<Component, ComponentState> {
        self.component_states.lock().await.clone()
    }

    /// Components that ended up in `Failed`
    pub async fn failed_components(&self) -> Vec<Component> {
        self.component_states
            .lock()
            .await
            .iter()
            .filter(|(_, state)| **state == ComponentState::Failed)
            .map(|(component, _)| *component)
            .collect()
    }
}
