//! Per-connection event dispatch.

use std::collections::HashSet;

use coachline_common::{AppError, AppResult, IdGenerator};
use coachline_core::{ConnectionContext, RoomEvent, SendMessageInput};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};
use validator::Validate;

use crate::protocol::{ClientEvent, ServerEvent};
use crate::state::AppState;

/// State of one socket connection.
///
/// Events from one connection are handled in arrival order. Room events
/// for joined conversations arrive on the receiver returned by
/// [`Session::open`].
pub struct Session {
    ctx: ConnectionContext,
    state: AppState,
    inbox: mpsc::UnboundedSender<RoomEvent>,
    joined: HashSet<String>,
}

impl Session {
    /// Authenticate the handshake token and set up the room inbox.
    pub async fn open(
        state: AppState,
        token: Option<&str>,
    ) -> (Self, mpsc::UnboundedReceiver<RoomEvent>) {
        let connection_id = IdGenerator::new().generate_connection_id();
        let ctx = state.authenticator.authenticate(connection_id, token).await;
        Self::with_context(state, ctx)
    }

    /// Session for an already resolved context.
    #[must_use]
    pub fn with_context(
        state: AppState,
        ctx: ConnectionContext,
    ) -> (Self, mpsc::UnboundedReceiver<RoomEvent>) {
        let (inbox, rx) = mpsc::unbounded_channel();
        let session = Self {
            ctx,
            state,
            inbox,
            joined: HashSet::new(),
        };
        (session, rx)
    }

    /// Identity of this connection.
    #[must_use]
    pub const fn context(&self) -> &ConnectionContext {
        &self.ctx
    }

    /// Handle a raw text frame.
    pub async fn handle_text(&mut self, text: &str) -> Option<ServerEvent> {
        match serde_json::from_str::<ClientEvent>(text) {
            Ok(event) => self.handle_event(event).await,
            Err(e) => {
                warn!(connection_id = %self.ctx.connection_id, error = %e, "Malformed client event");
                Some(ServerEvent::error("Invalid message format"))
            }
        }
    }

    /// Handle one client event and return the direct reply, if any.
    pub async fn handle_event(&mut self, event: ClientEvent) -> Option<ServerEvent> {
        let name = event.name();
        debug!(connection_id = %self.ctx.connection_id, event = name, "Client event");

        let (result, fallback) = match event {
            ClientEvent::LoadConversations => (
                self.load_conversations().await,
                "Failed to load conversations",
            ),
            ClientEvent::LoadMessages(payload) => {
                let result = match payload.validate() {
                    Ok(()) => {
                        self.load_messages(&payload.conversation_id, payload.page, payload.limit)
                            .await
                    }
                    Err(e) => Err(e.into()),
                };
                (result, "Failed to load messages")
            }
            ClientEvent::JoinConversation(conversation_id) => (
                self.join(&conversation_id).await,
                "Failed to join conversation",
            ),
            ClientEvent::SendMessage(payload) => {
                let result = match payload.validate() {
                    Ok(()) => {
                        self.send(SendMessageInput {
                            conversation_id: payload.conversation_id,
                            content: payload.content,
                            message_type: payload.message_type,
                            client_message_id: payload.client_message_id,
                        })
                        .await
                    }
                    Err(e) => Err(e.into()),
                };
                (result, "Failed to send message")
            }
            ClientEvent::MarkRead(conversation_id) => (
                self.mark_read(&conversation_id).await,
                "Failed to mark conversation as read",
            ),
            ClientEvent::LeaveConversation(conversation_id) => (
                self.leave(&conversation_id).await,
                "Failed to leave conversation",
            ),
            ClientEvent::StartConversation(payload) => {
                let result = match payload.validate() {
                    Ok(()) => self.start_conversation(&payload.participant_id).await,
                    Err(e) => Err(e.into()),
                };
                (result, "Failed to start conversation")
            }
            ClientEvent::DeleteMessage(payload) => {
                let result = match payload.validate() {
                    Ok(()) => {
                        self.delete_message(&payload.conversation_id, &payload.message_id)
                            .await
                    }
                    Err(e) => Err(e.into()),
                };
                (result, "Failed to delete message")
            }
        };

        match result {
            Ok(reply) => reply,
            Err(e) => Some(self.error_event(name, &e, fallback)),
        }
    }

    /// Render a room event for this connection.
    #[must_use]
    pub fn room_event(&self, event: RoomEvent) -> ServerEvent {
        match event {
            RoomEvent::NewMessage(view) => ServerEvent::NewMessage(view.for_viewer(self.ctx.user_id())),
        }
    }

    /// Leave every joined room.
    pub async fn close(self) {
        self.state
            .rooms
            .drop_connection(&self.ctx.connection_id, &self.joined)
            .await;
        debug!(
            connection_id = %self.ctx.connection_id,
            rooms = self.joined.len(),
            "Session closed"
        );
    }

    async fn load_conversations(&self) -> AppResult<Option<ServerEvent>> {
        let user = self.ctx.require_user()?;
        let conversations = self.state.directory.load_conversations(&user.user_id).await?;
        Ok(Some(ServerEvent::ConversationsLoaded(conversations)))
    }

    async fn load_messages(
        &self,
        conversation_id: &str,
        page: Option<u64>,
        limit: Option<u64>,
    ) -> AppResult<Option<ServerEvent>> {
        let user = self.ctx.require_user()?;
        let page = self
            .state
            .message_store
            .load_messages(&user.user_id, conversation_id, page, limit)
            .await?;
        Ok(Some(ServerEvent::MessagesLoaded(page)))
    }

    async fn join(&mut self, conversation_id: &str) -> AppResult<Option<ServerEvent>> {
        let user = self.ctx.require_user()?;
        require_id(conversation_id)?;
        self.state
            .membership
            .require_member(&user.user_id, conversation_id, "join")
            .await?;

        self.state
            .rooms
            .join(conversation_id, &self.ctx.connection_id, self.inbox.clone())
            .await;
        self.joined.insert(conversation_id.to_string());
        Ok(None)
    }

    async fn leave(&mut self, conversation_id: &str) -> AppResult<Option<ServerEvent>> {
        self.ctx.require_user()?;
        self.state
            .rooms
            .leave(conversation_id, &self.ctx.connection_id)
            .await;
        self.joined.remove(conversation_id);
        Ok(None)
    }

    async fn send(&self, input: SendMessageInput) -> AppResult<Option<ServerEvent>> {
        let user = self.ctx.require_user()?;
        let outcome = self.state.message_store.send_message(user, input).await?;

        // A suppressed retry is echoed back to the sender only.
        if outcome.duplicate {
            return Ok(Some(ServerEvent::NewMessage(outcome.message)));
        }
        Ok(None)
    }

    async fn mark_read(&self, conversation_id: &str) -> AppResult<Option<ServerEvent>> {
        let user = self.ctx.require_user()?;
        require_id(conversation_id)?;
        self.state
            .read_state
            .mark_read(&user.user_id, conversation_id)
            .await?;
        Ok(None)
    }

    async fn start_conversation(&self, participant_id: &str) -> AppResult<Option<ServerEvent>> {
        let user = self.ctx.require_user()?;
        let started = self
            .state
            .opener
            .start_conversation(user, participant_id)
            .await?;
        Ok(Some(ServerEvent::ConversationStarted(started)))
    }

    async fn delete_message(
        &self,
        conversation_id: &str,
        message_id: &str,
    ) -> AppResult<Option<ServerEvent>> {
        let user = self.ctx.require_user()?;
        self.state
            .message_store
            .delete_message(&user.user_id, conversation_id, message_id)
            .await?;
        Ok(None)
    }

    fn error_event(&self, event: &str, err: &AppError, fallback: &str) -> ServerEvent {
        if err.is_server_error() {
            error!(
                connection_id = %self.ctx.connection_id,
                user_id = ?self.ctx.user_id(),
                event,
                error = %err,
                "Event failed"
            );
        } else {
            debug!(
                connection_id = %self.ctx.connection_id,
                user_id = ?self.ctx.user_id(),
                event,
                error = %err,
                "Event refused"
            );
        }
        ServerEvent::error(err.client_message(fallback))
    }
}

fn require_id(id: &str) -> AppResult<()> {
    if id.is_empty() || id.len() > 64 {
        return Err(AppError::Validation(
            "conversationId must be 1 to 64 characters".to_string(),
        ));
    }
    Ok(())
}
