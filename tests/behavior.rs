//! End-to-end scenarios from spec §8, driven against the in-memory
//! `FakeTransport` (`test-util` feature) instead of a live SFTP server.
//! Mirrors `opendal`'s own `tests/it` behavior suite: one scenario per
//! test, exercised through the public API only.

use sftp_vfs::testutil::SharedFakeFactory;
use sftp_vfs::{
    AttributeView, ChannelPool, CopyOption, Filesystem, OpenOption, Path, PoolConfig,
};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

async fn filesystem(max_size: u32, max_wait: Duration) -> Filesystem<SharedFakeFactory> {
    let pool = ChannelPool::new(
        PoolConfig {
            initial_size: 0,
            max_size,
            max_wait_time: Some(max_wait),
            max_idle_time: None,
        },
        SharedFakeFactory::new(),
    )
    .await
    .unwrap();
    Filesystem::new(pool, "sftp://test/".to_string(), Path::root())
}

// S1 — create a file, close it, read it back byte-for-byte.
#[tokio::test]
async fn s1_create_file_then_read_back() {
    let fs = filesystem(2, Duration::from_millis(500)).await;
    let path = Path::parse("/tmp/hello.txt");

    let mut out = fs
        .new_output_stream(
            &path,
            [OpenOption::Create, OpenOption::Write, OpenOption::TruncateExisting],
        )
        .await
        .unwrap();
    out.write_all(b"Hello").await.unwrap();
    out.close().await.unwrap();

    let mut input = fs.new_input_stream(&path, [OpenOption::Read]).await.unwrap();
    let mut buf = Vec::new();
    input.read_to_end(&mut buf).await.unwrap();
    assert_eq!(buf, b"Hello");
}

// S2 — CREATE_NEW against an existing path fails and leaves it untouched.
#[tokio::test]
async fn s2_create_new_collision_leaves_file_untouched() {
    let fs = filesystem(2, Duration::from_millis(500)).await;
    let path = Path::parse("/tmp/x");

    let mut out = fs.new_output_stream(&path, []).await.unwrap();
    out.write_all(b"original").await.unwrap();
    out.close().await.unwrap();

    let err = fs
        .new_output_stream(&path, [OpenOption::CreateNew, OpenOption::Write])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), sftp_vfs::ErrorKind::AlreadyExists);

    let mut input = fs.new_input_stream(&path, [OpenOption::Read]).await.unwrap();
    let mut buf = Vec::new();
    input.read_to_end(&mut buf).await.unwrap();
    assert_eq!(buf, b"original");
}

// S3 — listing a regular file as a directory fails with NotDirectory.
#[tokio::test]
async fn s3_listing_a_regular_file_is_not_directory() {
    let fs = filesystem(2, Duration::from_millis(500)).await;
    let path = Path::parse("/tmp/y");
    fs.new_output_stream(&path, []).await.unwrap().close().await.unwrap();

    let err = fs.new_directory_stream(&path, |_| true).await.unwrap_err();
    assert_eq!(err.kind(), sftp_vfs::ErrorKind::NotDirectory);
}

// S4 — copy within a single-channel pool succeeds and round-trips content.
#[tokio::test]
async fn s4_single_channel_copy_succeeds() {
    let fs = filesystem(1, Duration::from_millis(500)).await;
    let source = Path::parse("/tmp/src");
    let target = Path::parse("/tmp/dst");

    let mut out = fs.new_output_stream(&source, []).await.unwrap();
    out.write_all(b"payload").await.unwrap();
    out.close().await.unwrap();

    tokio::time::timeout(
        Duration::from_secs(2),
        fs.copy(&source, &target, [CopyOption::ReplaceExisting]),
    )
    .await
    .expect("copy must not deadlock a single-channel pool")
    .unwrap();

    let mut input = fs.new_input_stream(&target, [OpenOption::Read]).await.unwrap();
    let mut buf = Vec::new();
    input.read_to_end(&mut buf).await.unwrap();
    assert_eq!(buf, b"payload");
}

// S5 — pool wait timeout fires at ~maxWaitTime, not before and not much after.
#[tokio::test]
async fn s5_pool_wait_times_out_around_configured_duration() {
    let fs = filesystem(2, Duration::from_millis(500)).await;
    let first = Path::parse("/tmp/one");
    let second = Path::parse("/tmp/two");
    fs.new_output_stream(&first, []).await.unwrap().close().await.unwrap();
    fs.new_output_stream(&second, []).await.unwrap().close().await.unwrap();

    // Hold both pooled channels open via two live input streams.
    let a = fs.new_input_stream(&first, [OpenOption::Read]).await.unwrap();
    let b = fs.new_input_stream(&second, [OpenOption::Read]).await.unwrap();

    let start = std::time::Instant::now();
    let err = fs
        .new_input_stream(&first, [OpenOption::Read])
        .await
        .unwrap_err();
    let elapsed = start.elapsed();

    assert_eq!(err.kind(), sftp_vfs::ErrorKind::TimedOut);
    assert!(elapsed >= Duration::from_millis(450), "fired too early: {elapsed:?}");
    assert!(elapsed <= Duration::from_millis(900), "fired too late: {elapsed:?}");

    drop(a);
    drop(b);
}

// S6 — owner must parse as a non-negative integer; a name is rejected.
#[tokio::test]
async fn s6_owner_attribute_accepts_only_integers() {
    let fs = filesystem(2, Duration::from_millis(500)).await;
    let path = Path::parse("/tmp/owned");
    fs.new_output_stream(&path, []).await.unwrap().close().await.unwrap();

    let err = fs
        .set_attribute(&path, AttributeView::Owner, "owner", "alice")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), sftp_vfs::ErrorKind::InvalidArgument);

    fs.set_attribute(&path, AttributeView::Owner, "owner", "1001")
        .await
        .unwrap();
    let attrs = fs
        .read_attributes(&path, AttributeView::Owner, &["owner"], true)
        .await
        .unwrap();
    match attrs.get("owner") {
        Some(sftp_vfs::AttributeValue::U32(1001)) => {}
        other => panic!("expected owner=1001, got {other:?}"),
    }
}
