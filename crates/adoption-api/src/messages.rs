//! Messaging and notifications

use reqwest::Method;

use crate::client::{cache_scope, segment, AdoptionClient, MESSAGES_TTL, NOTIFICATIONS_TTL};
use crate::error::Result;
use crate::types::{Conversation, Message, NewMessage, Notification, UnreadCount};

impl AdoptionClient {
    pub async fn conversations(&self, token: &str) -> Result<Vec<Conversation>> {
        let scope = cache_scope(token);
        self.cached_get(
            "messages/conversations",
            &[],
            Some(token),
            Some(&scope),
            MESSAGES_TTL,
        )
        .await
    }

    pub async fn conversation_messages(
        &self,
        token: &str,
        conversation_id: &str,
    ) -> Result<Vec<Message>> {
        let scope = cache_scope(token);
        let path = format!("messages/conversations/{}", segment(conversation_id));
        self.cached_get(&path, &[], Some(token), Some(&scope), MESSAGES_TTL)
            .await
    }

    pub async fn send_message(&self, token: &str, message: &NewMessage) -> Result<Message> {
        let sent = self
            .send_json(Method::POST, "messages", Some(message), Some(token))
            .await?;
        self.invalidate_scoped(&cache_scope(token), "messages");
        Ok(sent)
    }

    pub async fn notifications(&self, token: &str) -> Result<Vec<Notification>> {
        let scope = cache_scope(token);
        self.cached_get(
            "notifications",
            &[],
            Some(token),
            Some(&scope),
            NOTIFICATIONS_TTL,
        )
        .await
    }

    /// Never cached; this is what the unread poller calls
    pub async fn unread_count(&self, token: &str) -> Result<UnreadCount> {
        self.get_json("notifications/unread-count", &[], Some(token))
            .await
    }

    pub async fn mark_notification_read(&self, token: &str, notification_id: &str) -> Result<()> {
        let path = format!("notifications/{}/read", segment(notification_id));
        self.send_unit(Method::PUT, &path, None::<&()>, Some(token))
            .await?;
        self.invalidate_scoped(&cache_scope(token), "notifications");
        Ok(())
    }

    pub async fn mark_all_notifications_read(&self, token: &str) -> Result<()> {
        self.send_unit(Method::PUT, "notifications/read-all", None::<&()>, Some(token))
            .await?;
        self.invalidate_scoped(&cache_scope(token), "notifications");
        Ok(())
    }
}
