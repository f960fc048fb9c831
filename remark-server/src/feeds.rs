use std::{collections::HashMap, sync::Arc};

use axum::extract::ws::Message;
use futures::{channel::mpsc, select, SinkExt, StreamExt};
use remark_api::{FeedMessage, PageId, Uuid};
use tokio::sync::RwLock;

/// Live viewers of each page, each one with the relayer channel of its
/// websocket
#[derive(Clone, Debug, Default)]
pub struct PageFeeds(
    Arc<RwLock<HashMap<PageId, HashMap<Uuid, mpsc::UnboundedSender<FeedMessage>>>>>,
);

impl PageFeeds {
    pub fn new() -> PageFeeds {
        PageFeeds::default()
    }

    pub async fn add_for_page<W, R>(self, page: PageId, mut write: W, read: R)
    where
        W: 'static + Send + Unpin + futures::Sink<Message>,
        <W as futures::Sink<Message>>::Error: Send,
        R: 'static + Send + Unpin + futures::Stream<Item = Result<Message, axum::Error>>,
    {
        // Note: if this were bounded, removing a viewer (write-lock) could deadlock with a
        // publish holding the read-lock while waiting for room in this viewer's channel
        let (sender, mut receiver) = mpsc::unbounded();
        let sender_id = Uuid::new_v4();

        self.0
            .write()
            .await
            .entry(page.clone())
            .or_insert_with(HashMap::new)
            .insert(sender_id, sender);
        tracing::debug!(?page, ?sender_id, "viewer joined page feed");

        let this = self.clone();
        let mut read = read.fuse();
        tokio::spawn(async move {
            macro_rules! remove_self {
                () => {{
                    this.remove(&page, sender_id).await;
                    return;
                }};
            }
            macro_rules! send_message {
                ( $msg:expr ) => {{
                    let msg: FeedMessage = $msg;
                    let json = match serde_json::to_vec(&msg) {
                        Ok(json) => json,
                        Err(err) => {
                            tracing::error!(?err, ?msg, "failed serializing message to json");
                            continue;
                        }
                    };
                    if write.send(Message::Binary(json)).await.is_err() {
                        remove_self!();
                    }
                }};
            }
            loop {
                select! {
                    msg = receiver.next() => match msg {
                        None => remove_self!(),
                        Some(msg) => send_message!(msg),
                    },
                    msg = read.next() => match msg {
                        None => remove_self!(),
                        Some(Ok(Message::Close(_))) => remove_self!(),
                        Some(Ok(Message::Text(msg))) if msg == "ping" => {
                            send_message!(FeedMessage::Pong);
                        }
                        Some(msg) => {
                            tracing::warn!("received unexpected message from viewer: {msg:?}");
                            remove_self!();
                        }
                    },
                }
            }
        });
    }

    async fn remove(&self, page: &PageId, sender_id: Uuid) {
        let mut feeds = self.0.write().await;
        if let Some(viewers) = feeds.get_mut(page) {
            viewers.remove(&sender_id);
            if viewers.is_empty() {
                feeds.remove(page);
            }
        }
        tracing::debug!(?page, ?sender_id, "viewer left page feed");
    }

    /// Queues `msg` for every current viewer of its page and returns without
    /// waiting for delivery. Viewers that went away are skipped.
    pub fn publish(&self, msg: FeedMessage) {
        let page = match msg.page_id() {
            Some(page) => page.clone(),
            None => return,
        };
        let this = self.clone();
        tokio::spawn(async move {
            if let Some(viewers) = this.0.read().await.get(&page) {
                for (id, s) in viewers {
                    if s.unbounded_send(msg.clone()).is_err() {
                        tracing::debug!(?page, viewer = ?id, "dropping event for a viewer that left");
                    }
                }
            }
        });
    }

    #[cfg(test)]
    pub async fn num_viewers(&self, page: &PageId) -> usize {
        self.0.read().await.get(page).map_or(0, HashMap::len)
    }
}
