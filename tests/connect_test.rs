use std::time::Duration;

use serde_json::{json, Value as Json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use joueur::client::{ClientConfig, ClientError, Session};
use joueur::types::{ExitCode, SessionState, FRAME_TERMINATOR};

#[tokio::test]
async fn connects_over_tcp_and_resolves_alias() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (alias_tx, alias_rx) = oneshot::channel::<Json>();

    let server_handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let mut frame = Vec::new();
        reader.read_until(FRAME_TERMINATOR, &mut frame).await.unwrap();
        frame.pop();
        let alias: Json = serde_json::from_slice(&frame).unwrap();
        let _ = alias_tx.send(alias);

        // Two frames in one write, the first one split from its terminator.
        let named = json!({"event": "named", "data": "Chess"}).to_string();
        write_half.write_all(named.as_bytes()).await.unwrap();
        write_half.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        write_half.write_all(&[FRAME_TERMINATOR]).await.unwrap();
        write_half.flush().await.unwrap();

        // Hold the connection until the client goes away.
        let mut rest = Vec::new();
        let _ = reader.read_until(FRAME_TERMINATOR, &mut rest).await;
    });

    let config = ClientConfig {
        port: addr.port(),
        game_alias: "chess".to_string(),
        ..ClientConfig::default()
    };
    let mut session = Session::connect(config).await.expect("connect failed");
    assert_eq!(session.state(), SessionState::Connecting);

    let game_name = tokio::time::timeout(Duration::from_secs(2), session.alias())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(game_name, "Chess");
    assert_eq!(session.state(), SessionState::Named);

    let alias = alias_rx.await.unwrap();
    assert_eq!(alias["event"], "alias");
    assert_eq!(alias["data"], "chess");

    drop(session);
    let _ = tokio::time::timeout(Duration::from_secs(2), server_handle).await;
}

#[tokio::test]
async fn refused_connection_reports_could_not_connect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let config = ClientConfig {
        port,
        game_alias: "chess".to_string(),
        ..ClientConfig::default()
    };
    let err = match Session::connect(config).await {
        Ok(_) => panic!("connected to a closed port"),
        Err(err) => err,
    };
    assert!(matches!(err, ClientError::Connect { .. }));
    assert_eq!(err.exit_code(), ExitCode::CouldNotConnect);
}
