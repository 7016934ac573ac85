use mailcore::config::Config;
use mailcore::smtp::SmtpSession;
use mailcore::storage::{PrintingReceiver, Receiver};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// Starts a session-accepting listener on an ephemeral port. Insecure, no
/// TLS, using the diagnostic receiver since these tests only exercise
/// protocol sequencing.
async fn start_test_server() -> SocketAddr {
    start_test_server_with(false).await
}

async fn start_test_server_with(secure: bool) -> SocketAddr {
    let mut config = Config::default();
    config.smtp.secure = secure;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let local_addr = listener.local_addr().unwrap();
    let receiver: Arc<dyn Receiver> = Arc::new(PrintingReceiver::new());

    tokio::spawn(async move {
        loop {
            let Ok((socket, peer)) = listener.accept().await else {
                return;
            };
            let config = config.clone();
            let receiver = receiver.clone();
            tokio::spawn(async move {
                let mut session =
                    SmtpSession::new(socket, peer.to_string(), &config, None, None, receiver);
                let _ = session.run().await;
            });
        }
    });

    local_addr
}

/// Helper to read a line from the stream
async fn read_line(reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>) -> String {
    let mut line = String::new();
    reader.read_line(&mut line).await.unwrap();
    line
}

/// Helper to write a line to the stream
async fn write_line(
    writer: &mut tokio::net::tcp::OwnedWriteHalf,
    line: &str,
) -> Result<(), std::io::Error> {
    writer.write_all(format!("{}\r\n", line).as_bytes()).await
}

#[tokio::test]
async fn test_smtp_greeting() {
    let addr = start_test_server().await;
    let stream = TcpStream::connect(addr).await.unwrap();
    let (reader, _writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    // Read greeting
    let greeting = read_line(&mut reader).await;
    assert!(greeting.starts_with("220"), "Expected 220 greeting");
}

#[tokio::test]
async fn test_smtp_ehlo() {
    let addr = start_test_server().await;
    let stream = TcpStream::connect(addr).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    // Read greeting
    let _greeting = read_line(&mut reader).await;

    // Send EHLO
    write_line(&mut writer, "EHLO test.client").await.unwrap();

    // Read response
    let response = read_line(&mut reader).await;
    assert!(response.starts_with("250"), "Expected 250 response");
}

#[tokio::test]
async fn test_smtp_helo() {
    let addr = start_test_server().await;
    let stream = TcpStream::connect(addr).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    // Read greeting
    let _greeting = read_line(&mut reader).await;

    // Send HELO
    write_line(&mut writer, "HELO test.client").await.unwrap();

    // Read response
    let response = read_line(&mut reader).await;
    assert!(
        response.starts_with("250"),
        "Expected 250 response, got: {}",
        response
    );
}

#[tokio::test]
async fn test_smtp_quit() {
    let addr = start_test_server().await;
    let stream = TcpStream::connect(addr).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    // Read greeting
    let _greeting = read_line(&mut reader).await;

    // Send QUIT
    write_line(&mut writer, "QUIT").await.unwrap();

    // Read response
    let response = read_line(&mut reader).await;
    assert!(
        response.starts_with("221"),
        "Expected 221 response, got: {}",
        response
    );
}

#[tokio::test]
async fn test_smtp_invalid_sequence() {
    let addr = start_test_server().await;
    let stream = TcpStream::connect(addr).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    // Read greeting
    let _greeting = read_line(&mut reader).await;

    // Try to send MAIL FROM without HELO/EHLO
    write_line(&mut writer, "MAIL FROM:<test@example.com>")
        .await
        .unwrap();

    // Read response - should be error
    let response = read_line(&mut reader).await;
    assert!(
        response.starts_with("503") || response.starts_with("5"),
        "Expected error response for invalid sequence, got: {}",
        response
    );
}

#[tokio::test]
async fn test_smtp_complete_transaction() {
    let addr = start_test_server().await;
    let stream = TcpStream::connect(addr).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    // Read greeting
    let _greeting = read_line(&mut reader).await;

    // EHLO
    write_line(&mut writer, "EHLO test.client").await.unwrap();
    let _response = read_line(&mut reader).await;

    // MAIL FROM
    write_line(&mut writer, "MAIL FROM:<sender@example.com>")
        .await
        .unwrap();
    let response = read_line(&mut reader).await;
    assert!(response.starts_with("250"), "MAIL FROM failed: {}", response);

    // RCPT TO
    write_line(&mut writer, "RCPT TO:<recipient@localhost>")
        .await
        .unwrap();
    let response = read_line(&mut reader).await;
    assert!(response.starts_with("250"), "RCPT TO failed: {}", response);

    // DATA
    write_line(&mut writer, "DATA").await.unwrap();
    let response = read_line(&mut reader).await;
    assert!(response.starts_with("354"), "DATA failed: {}", response);

    // Send email content
    write_line(&mut writer, "Subject: Test Email").await.unwrap();
    write_line(&mut writer, "").await.unwrap();
    write_line(&mut writer, "This is a test email.").await.unwrap();
    write_line(&mut writer, ".").await.unwrap();

    // Read response
    let response = read_line(&mut reader).await;
    assert!(
        response.starts_with("250"),
        "Message acceptance failed: {}",
        response
    );

    // QUIT
    write_line(&mut writer, "QUIT").await.unwrap();
    let _response = read_line(&mut reader).await;
}

#[tokio::test]
async fn test_smtp_rcpt_before_mail_is_rejected() {
    let addr = start_test_server().await;
    let stream = TcpStream::connect(addr).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let _greeting = read_line(&mut reader).await;

    write_line(&mut writer, "EHLO test.client").await.unwrap();
    let _response = read_line(&mut reader).await;

    write_line(&mut writer, "RCPT TO:<recipient@localhost>")
        .await
        .unwrap();
    let response = read_line(&mut reader).await;
    assert!(
        response.starts_with("503"),
        "Expected 503 for RCPT TO before MAIL FROM, got: {}",
        response
    );
}

#[tokio::test]
async fn test_smtp_mail_from_twice_without_rset_is_rejected() {
    let addr = start_test_server().await;
    let stream = TcpStream::connect(addr).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let _greeting = read_line(&mut reader).await;

    write_line(&mut writer, "EHLO test.client").await.unwrap();
    let _response = read_line(&mut reader).await;

    write_line(&mut writer, "MAIL FROM:<sender@example.com>")
        .await
        .unwrap();
    let response = read_line(&mut reader).await;
    assert!(response.starts_with("250"), "first MAIL FROM failed: {}", response);

    write_line(&mut writer, "MAIL FROM:<other@example.com>")
        .await
        .unwrap();
    let response = read_line(&mut reader).await;
    assert!(
        response.starts_with("503"),
        "Expected 503 for repeated MAIL FROM without RSET, got: {}",
        response
    );
}

#[tokio::test]
async fn test_smtp_rset_allows_new_transaction() {
    let addr = start_test_server().await;
    let stream = TcpStream::connect(addr).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let _greeting = read_line(&mut reader).await;

    write_line(&mut writer, "EHLO test.client").await.unwrap();
    let _response = read_line(&mut reader).await;

    write_line(&mut writer, "MAIL FROM:<sender@example.com>")
        .await
        .unwrap();
    let _response = read_line(&mut reader).await;

    write_line(&mut writer, "RSET").await.unwrap();
    let response = read_line(&mut reader).await;
    assert!(response.starts_with("250"), "RSET failed: {}", response);

    write_line(&mut writer, "MAIL FROM:<second@example.com>")
        .await
        .unwrap();
    let response = read_line(&mut reader).await;
    assert!(
        response.starts_with("250"),
        "MAIL FROM after RSET failed: {}",
        response
    );
}

#[tokio::test]
async fn test_smtp_repeated_ehlo_is_rejected() {
    let addr = start_test_server().await;
    let stream = TcpStream::connect(addr).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let _greeting = read_line(&mut reader).await;

    write_line(&mut writer, "EHLO test.client").await.unwrap();
    let response = read_line(&mut reader).await;
    assert!(response.starts_with("250"), "first EHLO failed: {}", response);

    write_line(&mut writer, "EHLO test.client").await.unwrap();
    let response = read_line(&mut reader).await;
    assert!(
        response.starts_with("503"),
        "Expected 503 for repeated EHLO, got: {}",
        response
    );
}

#[tokio::test]
async fn test_smtp_repeated_helo_mid_transaction_is_rejected() {
    let addr = start_test_server().await;
    let stream = TcpStream::connect(addr).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let _greeting = read_line(&mut reader).await;

    write_line(&mut writer, "HELO test.client").await.unwrap();
    let _response = read_line(&mut reader).await;

    write_line(&mut writer, "MAIL FROM:<sender@example.com>")
        .await
        .unwrap();
    let response = read_line(&mut reader).await;
    assert!(response.starts_with("250"), "MAIL FROM failed: {}", response);

    write_line(&mut writer, "HELO test.client").await.unwrap();
    let response = read_line(&mut reader).await;
    assert!(
        response.starts_with("503"),
        "Expected 503 for HELO mid-transaction, got: {}",
        response
    );
}

#[tokio::test]
async fn test_smtp_secure_mode_requires_auth_before_mail() {
    let addr = start_test_server_with(true).await;
    let stream = TcpStream::connect(addr).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let _greeting = read_line(&mut reader).await;

    write_line(&mut writer, "EHLO test.client").await.unwrap();
    let _response = read_line(&mut reader).await;

    write_line(&mut writer, "MAIL FROM:<sender@example.com>")
        .await
        .unwrap();
    let response = read_line(&mut reader).await;
    assert!(
        response.starts_with("503"),
        "Expected 503 authentication-required, got: {}",
        response
    );
}
