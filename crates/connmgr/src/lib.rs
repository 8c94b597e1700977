//! The Connection Manager: a single reader-writer lock guarding the three
//! tables that describe a gateway's live connections, the users they belong
//! to, and the session memberships cached against them. The tables are kept
//! behind one lock rather than three because callers rely on them being
//! mutually consistent (see the bijection invariant on `user_conn_index`).

use std::collections::HashMap;

use tokio::sync::{RwLock, mpsc};

/// A live client connection, identified by an opaque `conn_uuid`. Outbound
/// frames are pushed onto `outbound`, which feeds a dedicated writer task for
/// this connection's socket — the same split the gateway uses for its read
/// loop so one slow peer can never block another connection's fan-out.
#[derive(Clone)]
pub struct Connection {
    pub conn_uuid: String,
    pub user_uuid: String,
    pub outbound: mpsc::UnboundedSender<Vec<u8>>,
}

/// A cached, lazily-populated session membership list. Member order is
/// preserved as seen (first the session creator, then `OpenSession`'s
/// `with_user_ids`, then anyone who later `JoinSession`s).
#[derive(Clone, Debug, Default)]
pub struct Session {
    pub session_uuid: String,
    pub members: Vec<String>,
}

#[derive(Default)]
struct Tables {
    connections: HashMap<String, Connection>,
    user_conn_index: HashMap<String, String>,
    sessions: HashMap<String, Session>,
}

/// Thread-safe registry of connections, the user→connection index, and
/// cached session memberships for one gateway process.
#[derive(Default)]
pub struct ConnManager {
    tables: RwLock<Tables>,
}

impl ConnManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection for `user_uuid`, returning its fresh
    /// `conn_uuid`. If the user already had a connection, the index now
    /// points at this new one; the manager does not close the old entry —
    /// that is the caller's decision.
    pub async fn add_connection(
        &self,
        user_uuid: impl Into<String>,
        outbound: mpsc::UnboundedSender<Vec<u8>>,
    ) -> String {
        let user_uuid = user_uuid.into();
        let conn_uuid = uuid::Uuid::new_v4().to_string();
        let mut tables = self.tables.write().await;
        tables.connections.insert(
            conn_uuid.clone(),
            Connection {
                conn_uuid: conn_uuid.clone(),
                user_uuid: user_uuid.clone(),
                outbound,
            },
        );
        tables.user_conn_index.insert(user_uuid, conn_uuid.clone());
        conn_uuid
    }

    pub async fn get_connection(&self, conn_uuid: &str) -> Option<Connection> {
        self.tables.read().await.connections.get(conn_uuid).cloned()
    }

    pub async fn get_user_conn_uuid(&self, user_uuid: &str) -> Option<String> {
        self.tables.read().await.user_conn_index.get(user_uuid).cloned()
    }

    /// Remove a connection. If it is still the current mapping for its
    /// user, the `user_conn_index` entry is removed too — but only if no
    /// newer connection has since replaced it.
    pub async fn remove_connection(&self, conn_uuid: &str) {
        let mut tables = self.tables.write().await;
        let Some(conn) = tables.connections.remove(conn_uuid) else {
            return;
        };
        if tables.user_conn_index.get(&conn.user_uuid).map(String::as_str) == Some(conn_uuid) {
            tables.user_conn_index.remove(&conn.user_uuid);
        }
    }

    /// Insert or overwrite a session's cached member list.
    pub async fn add_session(&self, session_uuid: impl Into<String>, members: Vec<String>) {
        let session_uuid = session_uuid.into();
        self.tables.write().await.sessions.insert(
            session_uuid.clone(),
            Session {
                session_uuid,
                members,
            },
        );
    }

    pub async fn get_session(&self, session_uuid: &str) -> Option<Session> {
        self.tables.read().await.sessions.get(session_uuid).cloned()
    }

    /// Append `user_uuid` to a cached session's member list if not already
    /// present. No-op if the session is not cached — the caller is expected
    /// to have populated it via `add_session` first.
    pub async fn join_session(&self, session_uuid: &str, user_uuid: &str) {
        let mut tables = self.tables.write().await;
        if let Some(session) = tables.sessions.get_mut(session_uuid)
            && !session.members.iter().any(|m| m == user_uuid)
        {
            session.members.push(user_uuid.to_string());
        }
    }

    /// Remove `user_uuid` from a cached session's member list.
    pub async fn leave_session(&self, session_uuid: &str, user_uuid: &str) {
        let mut tables = self.tables.write().await;
        if let Some(session) = tables.sessions.get_mut(session_uuid) {
            session.members.retain(|m| m != user_uuid);
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.tables.read().await.connections.len()
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn sink() -> mpsc::UnboundedSender<Vec<u8>> {
        let (tx, _rx) = mpsc::unbounded_channel();
        tx
    }

    #[tokio::test]
    async fn add_then_lookup_is_consistent() {
        let mgr = ConnManager::new();
        let conn_uuid = mgr.add_connection("user-a", sink()).await;

        let conn = mgr.get_connection(&conn_uuid).await.unwrap();
        assert_eq!(conn.user_uuid, "user-a");
        assert_eq!(mgr.get_user_conn_uuid("user-a").await.unwrap(), conn_uuid);
    }

    #[tokio::test]
    async fn bijection_holds_after_replace_and_remove() {
        let mgr = ConnManager::new();
        let first = mgr.add_connection("user-a", sink()).await;
        let second = mgr.add_connection("user-a", sink()).await;

        // index now points at the newest connection; the old one still exists.
        assert_eq!(mgr.get_user_conn_uuid("user-a").await.unwrap(), second);
        assert!(mgr.get_connection(&first).await.is_some());

        // removing the stale first connection must not disturb the index.
        mgr.remove_connection(&first).await;
        assert_eq!(mgr.get_user_conn_uuid("user-a").await.unwrap(), second);

        // removing the current connection clears the index.
        mgr.remove_connection(&second).await;
        assert!(mgr.get_user_conn_uuid("user-a").await.is_none());
    }

    #[tokio::test]
    async fn session_join_and_leave() {
        let mgr = ConnManager::new();
        mgr.add_session("s1", vec!["a".into(), "b".into()]).await;

        mgr.join_session("s1", "c").await;
        mgr.join_session("s1", "c").await; // idempotent
        let session = mgr.get_session("s1").await.unwrap();
        assert_eq!(session.members, vec!["a", "b", "c"]);

        mgr.leave_session("s1", "b").await;
        let session = mgr.get_session("s1").await.unwrap();
        assert_eq!(session.members, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn unknown_session_lookup_is_none_not_error() {
        let mgr = ConnManager::new();
        assert!(mgr.get_session("missing").await.is_none());
    }
}
