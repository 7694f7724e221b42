use axum::extract::FromRef;
use std::sync::Arc;
use std::time::Instant;

use super::RequestsLoggingLevel;
use crate::platform::{DestinationPlatform, SourcePlatform};
use crate::transfer::TransferOrchestrator;
use crate::user::UserStore;

pub type GuardedUserStore = Arc<dyn UserStore>;
pub type GuardedSourcePlatform = Arc<dyn SourcePlatform>;
pub type GuardedDestinationPlatform = Arc<dyn DestinationPlatform>;
pub type GuardedOrchestrator = Arc<TransferOrchestrator>;

#[derive(Clone)]
pub struct ServerState {
    pub logging_level: RequestsLoggingLevel,
    pub start_time: Instant,
    pub user_store: GuardedUserStore,
    pub source: GuardedSourcePlatform,
    pub destination: GuardedDestinationPlatform,
    pub orchestrator: GuardedOrchestrator,
    pub hash: String,
}

impl FromRef<ServerState> for GuardedUserStore {
    fn from_ref(input: &ServerState) -> Self {
        input.user_store.clone()
    }
}

impl FromRef<ServerState> for GuardedSourcePlatform {
    fn from_ref(input: &ServerState) -> Self {
        input.source.clone()
    }
}

impl FromRef<ServerState> for GuardedDestinationPlatform {
    fn from_ref(input: &ServerState) -> Self {
        input.destination.clone()
    }
}

impl FromRef<ServerState> for GuardedOrchestrator {
    fn from_ref(input: &ServerState) -> Self {
        input.orchestrator.clone()
    }
}
