use crate::entity::{Entity, EntityId};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

/// A state-change notification from the runtime event bus
#[derive(Debug, Clone, PartialEq)]
pub struct StateChanged {
    pub entity_id: EntityId,
    pub old_state: Option<Entity>,
    /// `None` when the entity was removed
    pub new_state: Option<Entity>,
}

#[async_trait]
pub trait StateListener: Send + Sync {
    async fn on_state_changed(&self, change: StateChanged);
}

/// Handle returned by [`StateBus::track`]; dropping it does not unsubscribe.
pub trait Subscription: Send + Sync {
    fn unsubscribe(self: Box<Self>);
}

/// Event bus delivering state changes for a fixed set of entities.
pub trait StateBus: Send + Sync {
    fn track(
        &self,
        entity_ids: HashSet<EntityId>,
        listener: Arc<dyn StateListener>,
    ) -> Box<dyn Subscription>;
}
