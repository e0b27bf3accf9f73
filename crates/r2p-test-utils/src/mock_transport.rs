//! Recording mock of the chat-platform transport.
//!
//! # Example
//!
//! ```rust,ignore
//! use r2p_test_utils::{DeleteBehavior, MockTransport};
//!
//! let transport = MockTransport::new().with_delete_behavior(DeleteBehavior::NotFound);
//! let id = transport.post_message(channel, &content).await?;
//! assert_eq!(transport.posts().len(), 1);
//! ```

use async_trait::async_trait;
use r2p_service::errors::R2pError;
use r2p_service::roster::RoleChange;
use r2p_service::services::{MessageContent, Transport};
use r2p_service::types::{ChannelId, MemberId, MessageId};
use std::sync::{Arc, Mutex};

/// How `delete_message` answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeleteBehavior {
    #[default]
    Succeed,
    NotFound,
    Forbidden,
    Fail,
}

/// A message accepted by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedMessage {
    pub id: MessageId,
    pub channel: ChannelId,
    pub content: MessageContent,
}

/// Mock transport for testing.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    posts: Vec<PostedMessage>,
    failed_posts: usize,
    deletes: Vec<MessageId>,
    role_changes: Vec<RoleChange>,
    fail_posts: bool,
    fail_roles: bool,
    delete_behavior: DeleteBehavior,
    next_id: u64,
}

impl MockTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every post fails with a transport error.
    #[must_use]
    pub fn with_failing_posts(self) -> Self {
        self.set_fail_posts(true);
        self
    }

    /// Every role change fails with a transport error.
    #[must_use]
    pub fn with_failing_roles(self) -> Self {
        self.inner.lock().unwrap().fail_roles = true;
        self
    }

    #[must_use]
    pub fn with_delete_behavior(self, behavior: DeleteBehavior) -> Self {
        self.inner.lock().unwrap().delete_behavior = behavior;
        self
    }

    /// Toggle post failures at runtime.
    pub fn set_fail_posts(&self, fail: bool) {
        self.inner.lock().unwrap().fail_posts = fail;
    }

    /// Successful posts in order.
    pub fn posts(&self) -> Vec<PostedMessage> {
        self.inner.lock().unwrap().posts.clone()
    }

    pub fn last_post(&self) -> Option<PostedMessage> {
        self.inner.lock().unwrap().posts.last().cloned()
    }

    /// Number of rejected post attempts.
    pub fn failed_posts(&self) -> usize {
        self.inner.lock().unwrap().failed_posts
    }

    /// Attempted deletions in order, including failed ones.
    pub fn deletes(&self) -> Vec<MessageId> {
        self.inner.lock().unwrap().deletes.clone()
    }

    /// Attempted role changes in order, including failed ones.
    pub fn role_changes(&self) -> Vec<RoleChange> {
        self.inner.lock().unwrap().role_changes.clone()
    }

    /// Wait until at least `count` posts succeeded and return them.
    pub async fn wait_for_posts(&self, count: usize) -> Vec<PostedMessage> {
        crate::settle_until(|| self.posts().len() >= count).await;
        self.posts()
    }

    /// Wait until at least `count` role changes were attempted.
    pub async fn wait_for_role_changes(&self, count: usize) -> Vec<RoleChange> {
        crate::settle_until(|| self.role_changes().len() >= count).await;
        self.role_changes()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn post_message(
        &self,
        channel: ChannelId,
        content: &MessageContent,
    ) -> Result<MessageId, R2pError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_posts {
            inner.failed_posts += 1;
            return Err(R2pError::Transport("mock post failure".to_string()));
        }

        inner.next_id += 1;
        let id = MessageId(format!("msg-{}", inner.next_id));
        inner.posts.push(PostedMessage {
            id: id.clone(),
            channel,
            content: content.clone(),
        });
        Ok(id)
    }

    async fn delete_message(&self, _channel: ChannelId, message: &MessageId) -> Result<(), R2pError> {
        let mut inner = self.inner.lock().unwrap();
        inner.deletes.push(message.clone());
        match inner.delete_behavior {
            DeleteBehavior::Succeed => Ok(()),
            DeleteBehavior::NotFound => Err(R2pError::MessageNotFound),
            DeleteBehavior::Forbidden => Err(R2pError::Forbidden("mock forbidden".to_string())),
            DeleteBehavior::Fail => Err(R2pError::Transport("mock delete failure".to_string())),
        }
    }

    async fn grant_ready_role(&self, member: MemberId) -> Result<(), R2pError> {
        self.record_role(RoleChange::Grant(member))
    }

    async fn revoke_ready_role(&self, member: MemberId) -> Result<(), R2pError> {
        self.record_role(RoleChange::Revoke(member))
    }
}

impl MockTransport {
    fn record_role(&self, change: RoleChange) -> Result<(), R2pError> {
        let mut inner = self.inner.lock().unwrap();
        inner.role_changes.push(change);
        if inner.fail_roles {
            Err(R2pError::Transport("mock role failure".to_string()))
        } else {
            Ok(())
        }
    }
}
