//! End-to-end tests for the unidirectional streaming channel mode.

use std::time::Duration;

use futures::StreamExt;
use hostlink::comms::{ChannelConfig, CommsError, StreamReader, StreamWriter};
use tempfile::TempDir;

#[tokio::test]
async fn payloads_arrive_in_accept_order() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("s.sock");

    // Backlog wide enough to queue all three writer connections.
    let config = ChannelConfig::default().with_backlog(4);
    let mut reader = StreamReader::with_config(&path, config).unwrap();

    let writer = StreamWriter::new(&path);
    for payload in ["a", "bb", "ccc"] {
        writer.send(payload, false).await.unwrap();
    }

    assert_eq!(reader.recv().await.unwrap(), "a");
    assert_eq!(reader.recv().await.unwrap(), "bb");
    assert_eq!(reader.recv().await.unwrap(), "ccc");
}

#[tokio::test]
async fn payloads_are_trimmed() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("s.sock");

    let mut reader = StreamReader::bind(&path).unwrap();
    StreamWriter::new(&path)
        .send("  spaced out  ", false)
        .await
        .unwrap();

    assert_eq!(reader.recv().await.unwrap(), "spaced out");
}

#[tokio::test]
async fn writer_without_payload_yields_empty_message() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("s.sock");

    let mut reader = StreamReader::bind(&path).unwrap();
    StreamWriter::new(&path).send("", false).await.unwrap();

    assert_eq!(reader.recv().await.unwrap(), "");
}

#[tokio::test]
async fn fail_fast_write_without_listener_is_refused() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("missing.sock");

    let err = StreamWriter::new(&path)
        .send("x", false)
        .await
        .unwrap_err();
    assert!(matches!(err, CommsError::ConnectionRefused { .. }));
}

#[tokio::test]
async fn waiting_write_succeeds_once_a_listener_appears() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("s.sock");

    let reader_path = path.clone();
    let reader_task = tokio::spawn(async move {
        // Let the writer spin against the missing listener first.
        tokio::time::sleep(Duration::from_millis(300)).await;
        let mut reader = StreamReader::bind(&reader_path).unwrap();
        reader.recv().await.unwrap()
    });

    StreamWriter::new(&path)
        .send("eventually", true)
        .await
        .unwrap();

    assert_eq!(reader_task.await.unwrap(), "eventually");
}

#[tokio::test]
async fn reader_drop_removes_the_path_and_allows_rebinding() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("s.sock");

    {
        let _reader = StreamReader::bind(&path).unwrap();
        assert!(path.exists());
    }
    assert!(!path.exists());

    // A fresh bind on the same path succeeds after teardown.
    let reader = StreamReader::bind(&path).unwrap();
    reader.close();
    assert!(!path.exists());
}

#[tokio::test]
async fn binding_an_occupied_path_fails() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("s.sock");

    let _reader = StreamReader::bind(&path).unwrap();
    let err = StreamReader::bind(&path).unwrap_err();
    assert!(matches!(err, CommsError::AddrInUse { .. }));
}

#[tokio::test]
async fn into_stream_yields_payloads_lazily() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("s.sock");

    let config = ChannelConfig::default().with_backlog(4);
    let reader = StreamReader::with_config(&path, config).unwrap();

    let writer = StreamWriter::new(&path);
    writer.send("first", false).await.unwrap();
    writer.send("second", false).await.unwrap();

    let mut stream = Box::pin(reader.into_stream());
    assert_eq!(stream.next().await.unwrap().unwrap(), "first");
    assert_eq!(stream.next().await.unwrap().unwrap(), "second");

    // Dropping the stream drops the reader and removes the path.
    drop(stream);
    assert!(!path.exists());
}

#[tokio::test]
async fn oversized_streaming_payload_is_rejected() {
    use hostlink::comms::stream::MAX_STREAM_PAYLOAD;

    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("s.sock");

    let mut reader = StreamReader::bind(&path).unwrap();

    let reader_task = tokio::spawn(async move { reader.recv().await });

    let payload = "x".repeat(MAX_STREAM_PAYLOAD + 1);
    // The writer may or may not complete depending on when the reader bails
    // out; only the reader's verdict matters.
    let _ = StreamWriter::new(&path).send(&payload, false).await;

    let err = reader_task.await.unwrap().unwrap_err();
    assert!(matches!(err, CommsError::Oversized { .. }));
}

#[tokio::test]
async fn sequential_sessions_from_one_writer_struct() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("s.sock");

    let mut reader = StreamReader::bind(&path).unwrap();
    let writer = StreamWriter::new(&path);

    for payload in ["one", "two"] {
        writer.send(payload, false).await.unwrap();
        assert_eq!(reader.recv().await.unwrap(), payload);
    }
}
