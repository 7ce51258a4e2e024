//! A chat session: validates input, keeps one query outstanding at a time and
//! writes the streamed answer into the conversation.

use crate::auth::AuthStore;
use crate::chat::{ChatMessage, ChatStore};
use crate::client::{Callbacks, QueryClient, QueryError};

/// Shortest question the session will send, in characters.
pub const MIN_QUERY_CHARS: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("question must be at least {MIN_QUERY_CHARS} characters")]
    TooShort,
    #[error("a reply is still streaming")]
    Busy,
    #[error(transparent)]
    Query(#[from] QueryError),
}

#[derive(Debug, Clone)]
pub struct ChatSession {
    client: QueryClient,
    chat: ChatStore,
}

impl ChatSession {
    pub fn new(client: QueryClient, chat: ChatStore) -> Self {
        Self { client, chat }
    }

    pub fn client(&self) -> &QueryClient {
        &self.client
    }

    pub fn chat(&self) -> &ChatStore {
        &self.chat
    }

    pub fn auth(&self) -> &AuthStore {
        self.client.auth()
    }

    /// Ask `input` and return the full answer.
    pub async fn send(&self, input: &str) -> Result<String, SessionError> {
        self.send_with(input, |_| {}).await
    }

    /// Like [`send`](Self::send), also handing each delta to `on_delta` as it arrives.
    pub async fn send_with<F>(&self, input: &str, mut on_delta: F) -> Result<String, SessionError>
    where
        F: FnMut(&str) + Send,
    {
        let question = input.trim();
        if question.chars().count() < MIN_QUERY_CHARS {
            return Err(SessionError::TooShort);
        }
        if !self.chat.try_begin() {
            return Err(SessionError::Busy);
        }

        self.chat.add_message(ChatMessage::user(question));
        let reply = ChatMessage::assistant("");
        let mut turn = Turn {
            chat: &self.chat,
            reply_id: reply.id.clone(),
            answered: false,
        };
        self.chat.add_message(reply);

        let mut answer = String::new();
        let mut failure = None;
        {
            let chat = &self.chat;
            let reply_id = turn.reply_id.as_str();
            let answer = &mut answer;
            let mut observer = Callbacks::new(|delta: &str| {
                answer.push_str(delta);
                chat.update_message(reply_id, answer.as_str());
                on_delta(delta);
            })
            .with_error(|e| failure = Some(e));
            self.client.stream_query(question, &mut observer).await;
        }

        match failure {
            Some(e) => Err(e.into()),
            None => {
                turn.answered = true;
                Ok(answer)
            }
        }
    }

    pub fn clear(&self) {
        self.chat.clear_messages();
    }

    /// End the session: drop credentials and the conversation.
    pub fn logout(&self) {
        self.auth().logout();
        self.chat.clear_messages();
    }
}

/// One question in flight. Dropping it, on completion or when the `send`
/// future is cancelled, clears the loading flag; an unanswered reply that
/// never received text is removed.
struct Turn<'a> {
    chat: &'a ChatStore,
    reply_id: String,
    answered: bool,
}

impl Drop for Turn<'_> {
    fn drop(&mut self) {
        if !self.answered {
            let empty = self
                .chat
                .message(&self.reply_id)
                .is_some_and(|m| m.content.is_empty());
            if empty {
                self.chat.remove_message(&self.reply_id);
            }
        }
        self.chat.set_loading(false);
    }
}
