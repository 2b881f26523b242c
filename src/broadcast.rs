use crate::repository::{Database, InscriptionRecord, InscriptionRepository, TokenRecord, TokenRepository};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

const MIN_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    TokensSnapshot(Vec<TokenRecord>),
    NewInscribe(InscriptionRecord),
}

impl ServerMessage {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Clone)]
pub struct Broadcaster {
    sender: broadcast::Sender<Arc<str>>,
    capacity: usize,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, capacity }
    }

    pub fn for_window(window: usize) -> Self {
        Self::new(window.saturating_add(1).saturating_mul(4).max(MIN_CAPACITY))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<str>> {
        self.sender.subscribe()
    }

    pub fn observer_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn publish(&self, message: &ServerMessage) -> Result<usize> {
        let json: Arc<str> = message.to_json()?.into();
        // no receivers is not an error
        let delivered = self.sender.send(json).unwrap_or(0);
        Ok(delivered)
    }

    pub fn publish_pass(&self, db: &Database, window: usize) -> Result<()> {
        let max_window = self.capacity - 1;
        if window > max_window {
            warn!(
                "Recent window {} exceeds broadcast capacity, sending {}",
                window, max_window
            );
        }
        let window = window.min(max_window);
        let (tokens, mut recent) = {
            let conn = db.lock()?;
            (
                TokenRepository::new(&conn).all()?,
                InscriptionRepository::new(&conn).recent(window)?,
            )
        };
        recent.reverse();

        let observers = self.publish(&ServerMessage::TokensSnapshot(tokens))?;
        for inscription in recent {
            self.publish(&ServerMessage::NewInscribe(inscription))?;
        }
        debug!("Broadcast pass snapshot to {} observer(s)", observers);
        Ok(())
    }
}

pub fn snapshot_message(db: &Database) -> Result<ServerMessage> {
    let conn = db.lock()?;
    Ok(ServerMessage::TokensSnapshot(
        TokenRepository::new(&conn).all()?,
    ))
}
