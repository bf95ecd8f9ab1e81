//! Wiring of the long-lived services.

use std::sync::Arc;
use tracing::info;

use crate::mirror::{DocumentStore, EventMirror, LostPersonMirror, MirrorState, PresenceMirror};
use crate::repository::CrowdRepository;
use crate::simulation::SimulationConfig;

/// Every long-lived service, built once at startup and passed to whoever
/// needs it.
#[derive(Clone)]
pub struct Services {
    pub crowd: CrowdRepository,
    pub events: EventMirror,
    pub lost: LostPersonMirror,
    pub presence: PresenceMirror,
}

impl Services {
    /// Build the repository and attach the mirrors to `store`.
    ///
    /// With no store the mirrors stay unavailable. Must be called inside a
    /// tokio runtime when a store is given.
    pub fn new(config: SimulationConfig, store: Option<Arc<dyn DocumentStore>>) -> Self {
        let services = Self {
            crowd: CrowdRepository::new(config),
            events: EventMirror::new(store.clone()),
            lost: LostPersonMirror::new(store.clone()),
            presence: PresenceMirror::new(store),
        };
        info!(remote = services.remote_available(), "Services ready");
        services
    }

    /// Whether the mirrors are attached to a remote store.
    pub fn remote_available(&self) -> bool {
        self.events.state() == MirrorState::Subscribed
    }
}
