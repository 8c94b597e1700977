//! The per-connection read loop: decode frames, dispatch by type, persist
//! and fan out chat messages. One lightweight task per accepted socket.

use std::sync::Arc;

use prost::Message;
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use imcore_protocol::{MsgType, body, read_frame_with_limit};
use imcore_rpc::SessionUser;

use crate::seq::SeqClock;
use crate::state::GatewayState;

const MESSAGE_TYPE_TEXT: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthState {
    Unauthenticated,
    Authenticated,
}

/// Drive one accepted socket until it closes, then unregister it.
pub async fn handle_connection(socket: TcpStream, state: Arc<GatewayState>) {
    let (read_half, write_half) = tokio::io::split(socket);
    let (tx, rx) = mpsc::unbounded_channel::<Vec<u8>>();

    let writer_task = tokio::spawn(run_writer(write_half, rx));

    let mut conn = ConnectionCtx {
        state: state.clone(),
        outbound: tx,
        auth: AuthState::Unauthenticated,
        conn_uuid: None,
        user_uuid: None,
        seq: SeqClock::default(),
    };

    conn.read_loop(read_half).await;

    if let Some(conn_uuid) = &conn.conn_uuid {
        state.conn_mgr.remove_connection(conn_uuid).await;
    }
    writer_task.abort();
}

async fn run_writer(mut write_half: WriteHalf<TcpStream>, mut rx: mpsc::UnboundedReceiver<Vec<u8>>) {
    while let Some(frame_bytes) = rx.recv().await {
        if let Err(err) = write_half.write_all(&frame_bytes).await {
            warn!(%err, "write failed, closing connection writer");
            break;
        }
        if write_half.flush().await.is_err() {
            break;
        }
    }
}

struct ConnectionCtx {
    state: Arc<GatewayState>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    auth: AuthState,
    conn_uuid: Option<String>,
    user_uuid: Option<String>,
    seq: SeqClock,
}

impl ConnectionCtx {
    async fn read_loop(&mut self, mut read_half: ReadHalf<TcpStream>) {
        loop {
            let frame = match read_frame_with_limit(&mut read_half, self.state.max_frame_bytes).await {
                Ok(frame) => frame,
                Err(err) => {
                    debug!(%err, "connection closed");
                    return;
                }
            };

            let Ok(msg_type) = frame.msg_type() else {
                warn!(msg_type = frame.msg_type, "dropping frame of unknown type");
                continue;
            };

            if self.auth == AuthState::Unauthenticated && msg_type != MsgType::CreateConn {
                debug!(?msg_type, "dropping frame from unauthenticated connection");
                continue;
            }

            match msg_type {
                MsgType::CreateConn => {
                    if !self.handle_create_conn(&frame.body).await {
                        // Per spec: a failed CreateConn closes the socket.
                        return;
                    }
                }
                MsgType::MessageUpLink => self.handle_uplink(&frame.body).await,
                MsgType::OpenSession => self.handle_open_session(&frame.body).await,
                MsgType::JoinSession => self.handle_join_session(&frame.body).await,
                MsgType::LeaveSession => self.handle_leave_session(&frame.body).await,
                MsgType::MessageDownLink => {
                    warn!("dropping MessageDownLink received from a client");
                }
            }
        }
    }

    #[instrument(skip(self, body), fields(conn_uuid))]
    async fn handle_create_conn(&mut self, body: &[u8]) -> bool {
        let Ok(req) = body::CreateConnBody::decode(body) else {
            warn!("malformed CreateConn body");
            return false;
        };

        let claims = match self.state.jwt.validate_token(&req.token) {
            Ok(claims) => claims,
            Err(err) => {
                warn!(%err, "CreateConn token rejected");
                return false;
            }
        };

        let conn_uuid = self
            .state
            .conn_mgr
            .add_connection(claims.sub.clone(), self.outbound.clone())
            .await;
        tracing::Span::current().record("conn_uuid", tracing::field::display(&conn_uuid));
        info!(user_uuid = %claims.sub, "connection authenticated");

        self.conn_uuid = Some(conn_uuid);
        self.user_uuid = Some(claims.sub);
        self.auth = AuthState::Authenticated;
        true
    }

    async fn handle_uplink(&mut self, body: &[u8]) {
        let (Some(user_uuid), Some(conn_uuid)) = (self.user_uuid.clone(), self.conn_uuid.clone())
        else {
            return;
        };

        let Ok(req) = body::UpLinkBody::decode(body) else {
            warn!("malformed MessageUpLink body");
            return;
        };

        let members = match self.resolve_session_members(&req.session_uuid).await {
            Some(members) => members,
            None => return,
        };

        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        let persist_seq = self.seq.next();

        if let Err(err) = self
            .state
            .api
            .send_message(
                &req.session_uuid,
                &user_uuid,
                req.payload.clone(),
                MESSAGE_TYPE_TEXT,
                persist_seq,
                timestamp,
            )
            .await
        {
            warn!(%err, session_uuid = %req.session_uuid, "failed to persist message, skipping fan-out");
            return;
        }

        self.fan_out(&req.session_uuid, &user_uuid, &conn_uuid, &req.payload, &members)
            .await;
    }

    async fn resolve_session_members(&self, session_uuid: &str) -> Option<Vec<String>> {
        if let Some(session) = self.state.conn_mgr.get_session(session_uuid).await {
            return Some(session.members);
        }

        match self.state.api.get_session_user_list(session_uuid).await {
            Ok(users) => {
                let members: Vec<String> = users.iter().map(|u: &SessionUser| u.user_uuid.clone()).collect();
                self.state.conn_mgr.add_session(session_uuid, members.clone()).await;
                Some(members)
            }
            Err(err) => {
                warn!(%err, session_uuid, "failed to resolve session members, dropping uplink");
                None
            }
        }
    }

    async fn fan_out(
        &mut self,
        session_uuid: &str,
        sender_uuid: &str,
        sender_conn_uuid: &str,
        payload: &[u8],
        members: &[String],
    ) {
        for member in members {
            if member == sender_uuid {
                continue;
            }
            let Some(peer_conn_uuid) = self.state.conn_mgr.get_user_conn_uuid(member).await else {
                continue;
            };
            if peer_conn_uuid == sender_conn_uuid {
                continue;
            }
            let Some(peer) = self.state.conn_mgr.get_connection(&peer_conn_uuid).await else {
                continue;
            };

            let down = body::DownLinkBody {
                session_uuid: session_uuid.to_string(),
                sender_user_uuid: sender_uuid.to_string(),
                seq_id: self.seq.next(),
                payload: payload.to_vec(),
            };
            let frame = imcore_protocol::Frame::new(MsgType::MessageDownLink, down.encode_to_vec());

            if peer.outbound.send(frame.encode()).is_err() {
                warn!(conn_uuid = %peer_conn_uuid, "peer write channel closed, evicting");
                self.state.conn_mgr.remove_connection(&peer_conn_uuid).await;
            }
        }
    }

    async fn handle_open_session(&mut self, body: &[u8]) {
        let Some(user_uuid) = self.user_uuid.clone() else {
            return;
        };
        let Ok(req) = body::OpenSessionRequest::decode(body) else {
            warn!("malformed OpenSession body");
            return;
        };

        if req.single && req.with_user_ids.len() != 1 {
            warn!(
                with_user_ids = req.with_user_ids.len(),
                "rejecting single-chat OpenSession with other than one counterpart"
            );
            return;
        }

        let mut members = vec![user_uuid];
        for id in req.with_user_ids {
            if !members.contains(&id) {
                members.push(id);
            }
        }

        let session_uuid = uuid::Uuid::new_v4().to_string();
        self.state.conn_mgr.add_session(&session_uuid, members).await;

        let resp = body::OpenSessionResponse {
            session_uuid: session_uuid.clone(),
        };
        let frame = imcore_protocol::Frame::new(MsgType::OpenSession, resp.encode_to_vec());
        let _ = self.outbound.send(frame.encode());
    }

    async fn handle_join_session(&self, body: &[u8]) {
        let Some(user_uuid) = &self.user_uuid else {
            return;
        };
        let Ok(req) = body::JoinSessionBody::decode(body) else {
            warn!("malformed JoinSession body");
            return;
        };
        self.state.conn_mgr.join_session(&req.session_uuid, user_uuid).await;
    }

    async fn handle_leave_session(&self, body: &[u8]) {
        let Some(user_uuid) = &self.user_uuid else {
            return;
        };
        let Ok(req) = body::LeaveSessionBody::decode(body) else {
            warn!("malformed LeaveSession body");
            return;
        };
        self.state.conn_mgr.leave_session(&req.session_uuid, user_uuid).await;
    }
}
