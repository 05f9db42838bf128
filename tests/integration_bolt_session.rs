//! End-to-end smoke test: drive a real `Connection` against a fake Bolt
//! server over a loopback `TcpListener`, through HELLO, an explicit
//! transaction's BEGIN/RUN/COMMIT, and GOODBYE. Exercises the handshake,
//! chunk framing, PackStream codec, message engine, and transaction state
//! machine together rather than in isolation.

use bolt_driver::chunking::ChunkWriter;
use bolt_driver::config::DriverConfig;
use bolt_driver::connection::Connection;
use bolt_driver::messages::tag;
use bolt_driver::packstream::{encode, Value};
use bolt_driver::transaction::{BoltConnection, Transaction};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn read_handshake(stream: &mut TcpStream) -> [u8; 4] {
    let mut buf = [0u8; 4 + 16];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf[0..4], &[0x60, 0x60, 0xB0, 0x17]);
    [buf[4], buf[5], buf[6], buf[7]]
}

async fn read_one_message(stream: &mut TcpStream) -> Vec<u8> {
    let mut message = Vec::new();
    loop {
        let mut len_buf = [0u8; 2];
        stream.read_exact(&mut len_buf).await.unwrap();
        let len = u16::from_be_bytes(len_buf) as usize;
        if len == 0 {
            return message;
        }
        let mut chunk = vec![0u8; len];
        stream.read_exact(&mut chunk).await.unwrap();
        message.extend_from_slice(&chunk);
    }
}

async fn write_struct(stream: &mut TcpStream, tag: u8, fields: Vec<Value>) {
    let payload = encode(&Value::Struct { tag, fields }).unwrap();
    let mut out = Vec::new();
    ChunkWriter::write_message(&mut out, &payload);
    ChunkWriter::write_end_of_message(&mut out);
    stream.write_all(&out).await.unwrap();
    stream.flush().await.unwrap();
}

#[tokio::test]
async fn full_transaction_lifecycle_against_a_fake_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();

        // Handshake: propose versions, pick the first one (5.4).
        read_handshake(&mut stream).await;
        stream.write_all(&[0, 0, 4, 5]).await.unwrap();
        stream.flush().await.unwrap();

        // HELLO
        let hello = read_one_message(&mut stream).await;
        assert!(!hello.is_empty());
        write_struct(&mut stream, tag::SUCCESS, vec![Value::Map(vec![])]).await;

        // BEGIN
        let _begin = read_one_message(&mut stream).await;
        write_struct(&mut stream, tag::SUCCESS, vec![Value::Map(vec![])]).await;

        // RUN
        let _run = read_one_message(&mut stream).await;
        write_struct(&mut stream, tag::SUCCESS, vec![Value::Map(vec![])]).await;

        // PULL_ALL: one record, then a terminal success.
        let _pull = read_one_message(&mut stream).await;
        write_struct(&mut stream, tag::RECORD, vec![Value::List(vec![Value::Int(42)])]).await;
        write_struct(&mut stream, tag::SUCCESS, vec![Value::Map(vec![])]).await;

        // COMMIT, with a bookmark in the metadata.
        let _commit = read_one_message(&mut stream).await;
        write_struct(
            &mut stream,
            tag::SUCCESS,
            vec![Value::Map(vec![(
                "bookmark".to_string(),
                Value::String("tx:99".to_string()),
            )])],
        )
        .await;

        // GOODBYE has no response.
        let _goodbye = read_one_message(&mut stream).await;
    });

    let config = DriverConfig::default();
    let mut connection = Connection::open("127.0.0.1", addr.port(), &config)
        .await
        .unwrap();
    assert!(connection.is_open());

    let mut tx = Transaction::new(&mut connection, None);
    tx.begin(&bolt_driver::Bookmark::empty(), vec![]).await.unwrap();
    tx.run("RETURN 42", vec![]).await.unwrap();
    tx.success();
    tx.dispose().await.unwrap();
    assert_eq!(tx.state(), bolt_driver::transaction::State::Succeeded);

    server.await.unwrap();
}

#[tokio::test]
async fn hello_failure_reports_security_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        read_handshake(&mut stream).await;
        stream.write_all(&[0, 0, 4, 5]).await.unwrap();
        stream.flush().await.unwrap();

        let _hello = read_one_message(&mut stream).await;
        write_struct(
            &mut stream,
            tag::FAILURE,
            vec![Value::Map(vec![
                ("code".to_string(), Value::String("Neo.ClientError.Security.Unauthorized".to_string())),
                ("message".to_string(), Value::String("bad credentials".to_string())),
            ])],
        )
        .await;
    });

    let config = DriverConfig::default();
    let result = Connection::open("127.0.0.1", addr.port(), &config).await;
    assert!(result.is_err());
    server.await.unwrap();
}
