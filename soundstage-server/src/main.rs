use std::{sync::Arc, time::Duration};

use log::info;
use soundstage_rooms::Registry;

use crate::{context::ServerContext, relay::Relay};

mod context;
mod gateway;
mod logging;
mod protocol;
mod relay;

/// How often expired rooms are reaped.
const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[tokio::main]
async fn main() {
    logging::init_logger();

    let context = ServerContext {
        registry: Arc::new(Registry::new()),
        relay: Relay::new(),
    };

    tokio::spawn(sweep_expired_rooms(context.clone()));

    gateway::run_server(context).await;
}

/// Reaps expired rooms on a fixed interval, independently of message
/// relay. Sessions of a reaped room are unbound but stay connected.
async fn sweep_expired_rooms(context: ServerContext) {
    let mut interval = tokio::time::interval(SWEEP_INTERVAL);

    loop {
        interval.tick().await;

        for room in context.registry.sweep_expired() {
            info!("Room {} ({}) expired", room.name, room.id);
            context.relay.close_room(room.id);
        }
    }
}
