//! An in-process [`ApiGatewayClient`](crate::ApiGatewayClient) double for
//! tests, backed by a plain mutex-guarded map instead of a network call.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::{Result, SessionUser};

#[derive(Debug, Clone)]
pub struct SentMessage {
    pub session_uuid: String,
    pub sender_uuid: String,
    pub payload: Vec<u8>,
    pub message_type: i32,
    pub seq_id: i64,
    pub timestamp: i64,
}

/// A mock API Gateway: sessions are seeded ahead of time via
/// [`MockApiGatewayClient::seed_session`], and every `send_message` call is
/// recorded for assertions.
#[derive(Default)]
pub struct MockApiGatewayClient {
    sessions: Mutex<HashMap<String, Vec<SessionUser>>>,
    sent: Mutex<Vec<SentMessage>>,
    session_list_calls: AtomicUsize,
}

impl MockApiGatewayClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_session(&self, session_uuid: impl Into<String>, members: Vec<SessionUser>) {
        self.sessions
            .lock()
            .expect("mock sessions lock poisoned")
            .insert(session_uuid.into(), members);
    }

    pub fn sent_messages(&self) -> Vec<SentMessage> {
        self.sent.lock().expect("mock sent lock poisoned").clone()
    }

    /// Number of times `get_session_user_list` has actually been called.
    pub fn session_list_calls(&self) -> usize {
        self.session_list_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl crate::ApiGatewayClient for MockApiGatewayClient {
    async fn get_session_user_list(&self, session_uuid: &str) -> Result<Vec<SessionUser>> {
        self.session_list_calls.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .sessions
            .lock()
            .expect("mock sessions lock poisoned")
            .get(session_uuid)
            .cloned()
            .unwrap_or_default())
    }

    async fn send_message(
        &self,
        session_uuid: &str,
        sender_uuid: &str,
        payload: Vec<u8>,
        message_type: i32,
        seq_id: i64,
        timestamp: i64,
    ) -> Result<String> {
        self.sent.lock().expect("mock sent lock poisoned").push(SentMessage {
            session_uuid: session_uuid.to_string(),
            sender_uuid: sender_uuid.to_string(),
            payload,
            message_type,
            seq_id,
            timestamp,
        });
        Ok(uuid::Uuid::new_v4().to_string())
    }
}
