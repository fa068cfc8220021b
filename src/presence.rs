//! In-process realtime fan-out and online tracking, one topic per room.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use async_trait::async_trait;
use log::{debug, info};
use tokio::sync::broadcast;

use crate::models::Message;
use crate::session::Session;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum PresenceEvent {
    Online { user_id: String, display_name: String },
    Offline { user_id: String, display_name: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    Presence(PresenceEvent),
    Chat(Message),
    PollOpened { poll_id: String, question: String, options: Vec<String>, multi_select: bool },
    PollClosed { poll_id: String, summary: String },
    Terminated { room_id: String },
}

impl fmt::Display for RoomEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomEvent::Presence(PresenceEvent::Online { display_name, .. }) => {
                write!(f, "* {display_name} is online")
            }
            RoomEvent::Presence(PresenceEvent::Offline { display_name, .. }) => {
                write!(f, "* {display_name} went offline")
            }
            RoomEvent::Chat(message) => {
                write!(f, "[{}] <{}> {}", message.kind.as_str(), message.author, message.body)
            }
            RoomEvent::PollOpened { poll_id, question, options, multi_select } => {
                write!(f, "* new poll {poll_id}: {question}")?;
                if *multi_select {
                    write!(f, " (pick any)")?;
                }
                for (i, option) in options.iter().enumerate() {
                    write!(f, "\n  {}. {}", i + 1, option)?;
                }
                write!(f, "\n  vote with /vote {poll_id} <number>")
            }
            RoomEvent::PollClosed { poll_id, summary } => {
                write!(f, "* poll {poll_id} has ended\n{summary}")
            }
            RoomEvent::Terminated { room_id } => write!(f, "* room {room_id} was closed by its owner"),
        }
    }
}

/// Publish/subscribe capability. Subscribers receive every event published
/// to the topic after they subscribed.
#[async_trait]
pub trait Realtime: Send + Sync {
    fn subscribe(&self, topic: &str) -> broadcast::Receiver<RoomEvent>;

    async fn publish(&self, topic: &str, event: RoomEvent);
}

#[derive(Default)]
pub struct PresenceHub {
    channels: Mutex<HashMap<String, broadcast::Sender<RoomEvent>>>,
    online: Mutex<HashMap<String, HashMap<String, String>>>,
}

impl PresenceHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<RoomEvent> {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Marks the session online in `room_id` and announces it.
    pub async fn track(&self, room_id: &str, session: &Session) {
        let newly_online = {
            let mut online = self.online.lock().unwrap_or_else(|e| e.into_inner());
            online
                .entry(room_id.to_string())
                .or_default()
                .insert(session.user_id.clone(), session.display_name.clone())
                .is_none()
        };
        if newly_online {
            self.publish(
                room_id,
                RoomEvent::Presence(PresenceEvent::Online {
                    user_id: session.user_id.clone(),
                    display_name: session.display_name.clone(),
                }),
            )
            .await;
        }
    }

    pub async fn untrack(&self, room_id: &str, session: &Session) {
        let was_online = {
            let mut online = self.online.lock().unwrap_or_else(|e| e.into_inner());
            match online.get_mut(room_id) {
                Some(users) => {
                    let removed = users.remove(&session.user_id).is_some();
                    if users.is_empty() {
                        online.remove(room_id);
                    }
                    removed
                }
                None => false,
            }
        };
        if was_online {
            self.publish(
                room_id,
                RoomEvent::Presence(PresenceEvent::Offline {
                    user_id: session.user_id.clone(),
                    display_name: session.display_name.clone(),
                }),
            )
            .await;
        }
    }

    /// Display names of everyone online in the room, sorted.
    pub fn online(&self, room_id: &str) -> Vec<String> {
        let online = self.online.lock().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = online
            .get(room_id)
            .map(|users| users.values().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Drops every trace of a room: online list and channel.
    pub fn close_topic(&self, room_id: &str) {
        self.online.lock().unwrap_or_else(|e| e.into_inner()).remove(room_id);
        self.channels.lock().unwrap_or_else(|e| e.into_inner()).remove(room_id);
        info!("Closed realtime topic {}", room_id);
    }
}

#[async_trait]
impl Realtime for PresenceHub {
    fn subscribe(&self, topic: &str) -> broadcast::Receiver<RoomEvent> {
        self.sender(topic).subscribe()
    }

    async fn publish(&self, topic: &str, event: RoomEvent) {
        // Nobody listening is not an error
        if self.sender(topic).send(event).is_err() {
            debug!("No subscribers on topic {}", topic);
        }
    }
}
