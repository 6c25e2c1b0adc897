use std::time::Duration;

use strider::host;
use strider::net::{Listener, SessionError, SessionEvent, SessionHandle, connect};
use strider::{ClientCommand, Envelope, ServerConfig, ServerEvent};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

async fn next_event(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionEvent {
    timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for a session event")
        .expect("event channel closed")
}

async fn next_server_event(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> ServerEvent {
    loop {
        if let SessionEvent::Message { envelope, .. } = next_event(events).await {
            return ServerEvent::from_envelope(&envelope).expect("valid server event");
        }
    }
}

async fn connected(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionHandle {
    match next_event(events).await {
        SessionEvent::Connected(handle) => handle,
        other => panic!("expected connected, got {other:?}"),
    }
}

#[tokio::test]
async fn envelopes_cross_loopback() {
    let mut listener = Listener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let (server_tx, mut server_rx) = mpsc::unbounded_channel();
    let (client_tx, mut client_rx) = mpsc::unbounded_channel();

    let (accepted, dialed) = tokio::join!(listener.accept(&server_tx), connect(&addr, 1, client_tx));
    let accepted = accepted.unwrap();
    let dialed = dialed.unwrap();
    assert_eq!(accepted.id(), 1);
    assert_eq!(connected(&mut server_rx).await.id(), 1);
    connected(&mut client_rx).await;

    let envelope = Envelope::new("join").with("name", "walker");
    dialed.send(&envelope).unwrap();
    match next_event(&mut server_rx).await {
        SessionEvent::Message { session, envelope: received } => {
            assert_eq!(session, 1);
            assert_eq!(received, envelope);
        }
        other => panic!("expected message, got {other:?}"),
    }

    accepted.send(&Envelope::new("started")).unwrap();
    match next_event(&mut client_rx).await {
        SessionEvent::Message { envelope, .. } => assert_eq!(envelope.command, "started"),
        other => panic!("expected message, got {other:?}"),
    }
}

#[tokio::test]
async fn closed_port_is_refused() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().to_string()
    };

    let (tx, _rx) = mpsc::unbounded_channel();
    let result = connect(&addr, 1, tx).await;
    assert!(matches!(result, Err(SessionError::ConnectionRefused(_))));
}

#[tokio::test]
async fn garbage_closes_session() {
    let mut listener = Listener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let (accepted, stream) = tokio::join!(listener.accept(&tx), TcpStream::connect(addr));
    accepted.unwrap();
    let mut stream = stream.unwrap();
    connected(&mut rx).await;

    stream.write_all(&[0xff; 64]).await.unwrap();
    match next_event(&mut rx).await {
        SessionEvent::Disconnected { session, error } => {
            assert_eq!(session, 1);
            assert!(matches!(error, Some(SessionError::Codec(_))));
        }
        other => panic!("expected disconnect, got {other:?}"),
    }
}

#[tokio::test]
async fn host_serves_a_session() {
    let listener = Listener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let config = ServerConfig {
        seed: Some(3),
        ..Default::default()
    };
    tokio::spawn(host::run(listener, config, std::future::pending()));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let session = connect(&addr, 1, tx).await.unwrap();
    connected(&mut rx).await;

    let commands = [
        ClientCommand::Join {
            name: "walker".to_string(),
        },
        ClientCommand::Load { map: String::new() },
        ClientCommand::Ready,
    ];
    for command in &commands {
        session.send(&command.to_envelope()).unwrap();
    }

    assert_eq!(next_server_event(&mut rx).await, ServerEvent::SelfId { id: 1 });
    assert_eq!(
        next_server_event(&mut rx).await,
        ServerEvent::Joined {
            name: "walker".to_string(),
            id: 1
        }
    );
    assert!(matches!(
        next_server_event(&mut rx).await,
        ServerEvent::Loaded { state: Some(_), .. }
    ));
    let ServerEvent::Attached { objects, .. } = next_server_event(&mut rx).await else {
        panic!("expected attached");
    };
    assert_eq!(objects[0].name, "walker");
}
