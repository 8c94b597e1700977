//! End-to-end scenarios driven over real TCP sockets against an in-process
//! mock API Gateway client.

use std::sync::Arc;
use std::time::Duration;

use prost::Message;
use tokio::net::{TcpListener, TcpStream};

use imcore_auth::JwtSigner;
use imcore_gateway::GatewayState;
use imcore_protocol::{MsgType, body, read_frame_with_limit, write_frame, Frame};
use imcore_rpc::testing::MockApiGatewayClient;
use imcore_rpc::SessionUser;

const SECRET: &[u8] = b"scenario-test-secret";

async fn spawn_gateway(api: Arc<MockApiGatewayClient>) -> (std::net::SocketAddr, JwtSigner) {
    let jwt = JwtSigner::new(SECRET);
    let state = GatewayState::new(api, jwt.clone(), 16 * 1024 * 1024);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (_tx, rx) = tokio::sync::broadcast::channel(1);
    tokio::spawn(imcore_gateway::serve(listener, state, rx));
    (addr, jwt)
}

async fn create_conn(stream: &mut TcpStream, jwt: &JwtSigner, user_uuid: &str) {
    let token = jwt.generate_token(user_uuid, 3600).unwrap();
    let body = body::CreateConnBody { token };
    let frame = Frame::new(MsgType::CreateConn, body.encode_to_vec());
    write_frame(stream, &frame).await.unwrap();
}

async fn send_uplink(stream: &mut TcpStream, session_uuid: &str, payload: &str) {
    let body = body::UpLinkBody {
        session_uuid: session_uuid.to_string(),
        payload: payload.as_bytes().to_vec(),
    };
    let frame = Frame::new(MsgType::MessageUpLink, body.encode_to_vec());
    write_frame(stream, &frame).await.unwrap();
}

async fn recv_downlink_with_timeout(stream: &mut TcpStream) -> Option<body::DownLinkBody> {
    let frame = tokio::time::timeout(Duration::from_secs(2), read_frame_with_limit(stream, 16 * 1024 * 1024))
        .await
        .ok()?
        .ok()?;
    assert_eq!(frame.msg_type().unwrap(), MsgType::MessageDownLink);
    Some(body::DownLinkBody::decode(frame.body.as_slice()).unwrap())
}

#[tokio::test]
async fn s1_single_peer_chat_fans_out_to_the_other_member_only() {
    let api = Arc::new(MockApiGatewayClient::new());
    api.seed_session(
        "session-1",
        vec![
            SessionUser {
                user_uuid: "alice".into(),
                user_name: "Alice".into(),
                user_avatar: String::new(),
            },
            SessionUser {
                user_uuid: "bob".into(),
                user_name: "Bob".into(),
                user_avatar: String::new(),
            },
        ],
    );
    let (addr, jwt) = spawn_gateway(api.clone()).await;

    let mut alice = TcpStream::connect(addr).await.unwrap();
    let mut bob = TcpStream::connect(addr).await.unwrap();
    create_conn(&mut alice, &jwt, "alice").await;
    create_conn(&mut bob, &jwt, "bob").await;
    // Let both CreateConn frames land before the uplink races ahead.
    tokio::time::sleep(Duration::from_millis(50)).await;

    send_uplink(&mut alice, "session-1", "hi").await;

    let downlink = recv_downlink_with_timeout(&mut bob).await.expect("bob should receive a downlink");
    assert_eq!(downlink.session_uuid, "session-1");
    assert_eq!(downlink.sender_user_uuid, "alice");
    assert_eq!(downlink.payload, b"hi");

    // Alice must not receive her own uplink echoed back.
    let nothing = tokio::time::timeout(
        Duration::from_millis(200),
        read_frame_with_limit(&mut alice, 16 * 1024 * 1024),
    )
    .await;
    assert!(nothing.is_err(), "alice should not receive a downlink for her own message");

    let sent = api.sent_messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].sender_uuid, "alice");
    assert_eq!(sent[0].payload, b"hi");
}

#[tokio::test]
async fn s2_uplink_before_create_conn_is_dropped_silently() {
    let api = Arc::new(MockApiGatewayClient::new());
    let (addr, _jwt) = spawn_gateway(api.clone()).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    send_uplink(&mut stream, "session-x", "too early").await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(api.sent_messages().is_empty());

    // The socket itself stays open: a follow-up CreateConn still works.
    let jwt = JwtSigner::new(SECRET);
    create_conn(&mut stream, &jwt, "late-user").await;
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn s3_session_members_are_cached_after_first_resolution() {
    let api = Arc::new(MockApiGatewayClient::new());
    api.seed_session(
        "session-2",
        vec![SessionUser {
            user_uuid: "alice".into(),
            user_name: "Alice".into(),
            user_avatar: String::new(),
        }],
    );
    let (addr, jwt) = spawn_gateway(api.clone()).await;

    let mut alice = TcpStream::connect(addr).await.unwrap();
    create_conn(&mut alice, &jwt, "alice").await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    send_uplink(&mut alice, "session-2", "first").await;
    send_uplink(&mut alice, "session-2", "second").await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(api.sent_messages().len(), 2);
    assert_eq!(api.session_list_calls(), 1, "second uplink should hit the cache, not the RPC");
}
