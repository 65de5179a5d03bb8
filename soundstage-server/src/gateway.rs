use std::{
    env,
    net::{Ipv6Addr, SocketAddr},
};

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use log::{info, warn};
use soundstage_rooms::{DeviceId, DeviceUpdate, RoomId, RoomUpdate};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use crate::{
    context::ServerContext,
    protocol::{ClientMessage, ServerMessage},
    relay::{Binding, Session},
};

/// The default port the server will listen on.
pub const DEFAULT_PORT: u16 = 9050;

/// Starts the soundstage gateway
pub async fn run_server(context: ServerContext) {
    let port = env::var("SOUNDSTAGE_SERVER_PORT")
        .map(|x| x.parse::<u16>().expect("Port must be a number"))
        .unwrap_or(DEFAULT_PORT);

    let addr: SocketAddr = (Ipv6Addr::UNSPECIFIED, port).into();
    let listener = TcpListener::bind(&addr).await.expect("listens on address");

    info!("Listening on {addr}");

    axum::serve(listener, router(context).into_make_service())
        .await
        .expect("server runs");
}

pub fn router(context: ServerContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(gateway))
        .layer(cors)
        .with_state(context)
}

async fn gateway(ws: WebSocketUpgrade, State(context): State<ServerContext>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, context))
}

async fn handle_socket(socket: WebSocket, context: ServerContext) {
    let (mut sink, mut stream) = socket.split();
    let (session, mut outgoing) = context.relay.open();

    info!("New gateway connection {}", session.id);

    // Forward relayed messages to the socket until either side goes away.
    let writer = tokio::spawn(async move {
        while let Some(message) = outgoing.recv().await {
            let text = serde_json::to_string(&message).expect("message serializes");

            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(received) = stream.next().await {
        let message = match received {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(message) => message,
                Err(err) => {
                    // Malformed traffic never takes the connection down.
                    warn!("Ignoring malformed message: {err}");
                    continue;
                }
            },
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };

        handle_message(&context, &session, message);
    }

    disconnect(&context, &session);
    writer.abort();
}

fn handle_message(context: &ServerContext, session: &Session, message: ClientMessage) {
    if let ClientMessage::JoinRoom { room_id, device_id } = &message {
        join_room(context, session, *room_id, *device_id);
        return;
    }

    // Everything else is room-scoped; unbound sessions are ignored.
    let Some(Binding { room_id, device_id }) = session.binding() else {
        return;
    };

    let relay = &context.relay;

    match message {
        ClientMessage::JoinRoom { .. } => {}
        ClientMessage::AudioSync {
            action,
            timestamp,
            position,
        } => {
            relay.broadcast(
                room_id,
                ServerMessage::AudioSync {
                    action,
                    timestamp,
                    position,
                },
                Some(session.id),
            );
        }
        ClientMessage::DevicePosition { x, y, audio_role } => {
            // Durable state first, then fan out. The sender hears this one
            // too, so its own record view stays current without a round trip.
            persist_device(
                context,
                device_id,
                DeviceUpdate {
                    position_x: Some(x),
                    position_y: Some(y),
                    audio_role,
                    ..Default::default()
                },
            );

            relay.broadcast(
                room_id,
                ServerMessage::PositionUpdate {
                    device_id,
                    x,
                    y,
                    audio_role,
                },
                None,
            );
        }
        ClientMessage::VolumeChange { volume, is_muted } => {
            persist_device(
                context,
                device_id,
                DeviceUpdate {
                    volume: Some(volume),
                    is_muted: Some(is_muted),
                    ..Default::default()
                },
            );

            relay.broadcast(
                room_id,
                ServerMessage::DeviceUpdate {
                    device_id,
                    volume,
                    is_muted,
                },
                None,
            );
        }
        ClientMessage::ModeChange { mode } => {
            let update = RoomUpdate {
                audio_mode: Some(mode),
                ..Default::default()
            };

            if let Err(err) = context.registry.update_room(room_id, update) {
                warn!("Dropping mode change: {err}");
            }

            relay.broadcast(room_id, ServerMessage::ModeChange { mode }, None);
        }
        ClientMessage::CurrentSongUpdate {
            title,
            artist,
            thumbnail,
        } => {
            relay.broadcast(
                room_id,
                ServerMessage::CurrentSongUpdate {
                    title,
                    artist,
                    thumbnail,
                },
                Some(session.id),
            );
        }
        ClientMessage::AudioStreamData {
            buffer,
            timestamp,
            quality,
        } => {
            relay.broadcast(
                room_id,
                ServerMessage::AudioStreamData {
                    buffer,
                    timestamp,
                    quality,
                },
                Some(session.id),
            );
        }
        ClientMessage::StreamStarted { quality } => {
            relay.broadcast(
                room_id,
                ServerMessage::StreamStarted { quality },
                Some(session.id),
            );
        }
        ClientMessage::StreamStopped => {
            relay.broadcast(room_id, ServerMessage::StreamStopped, Some(session.id));
        }
        ClientMessage::StreamQualityChange { quality } => {
            relay.broadcast(
                room_id,
                ServerMessage::StreamQualityChange { quality },
                Some(session.id),
            );
        }
    }
}

fn join_room(context: &ServerContext, session: &Session, room_id: RoomId, device_id: DeviceId) {
    context.relay.bind(session, room_id, device_id);

    let update = DeviceUpdate {
        is_connected: Some(true),
        ..Default::default()
    };

    if let Err(err) = context.registry.update_device(device_id, update) {
        warn!("Joining device is not registered: {err}");
    }

    info!("Device {device_id} joined room {room_id}");

    context.relay.broadcast(
        room_id,
        ServerMessage::DeviceConnected { device_id },
        Some(session.id),
    );
}

/// The device record outlives the connection: it stays in its room,
/// flagged as disconnected, until removed explicitly or the room expires.
fn disconnect(context: &ServerContext, session: &Session) {
    let Some(Binding { room_id, device_id }) = context.relay.close(session.id) else {
        return;
    };

    let update = DeviceUpdate {
        is_connected: Some(false),
        ..Default::default()
    };

    if let Err(err) = context.registry.update_device(device_id, update) {
        warn!("Disconnecting device is not registered: {err}");
    }

    info!("Device {device_id} disconnected from room {room_id}");

    context.relay.broadcast(
        room_id,
        ServerMessage::DeviceDisconnected { device_id },
        Some(session.id),
    );
}

fn persist_device(context: &ServerContext, device_id: DeviceId, update: DeviceUpdate) {
    if let Err(err) = context.registry.update_device(device_id, update) {
        warn!("Dropping durable update: {err}");
    }
}
