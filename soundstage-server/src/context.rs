use std::sync::Arc;

use soundstage_rooms::Registry;

use crate::relay::Relay;

/// Shared state every gateway connection operates on.
#[derive(Clone)]
pub struct ServerContext {
    pub registry: Arc<Registry>,
    pub relay: Arc<Relay>,
}
