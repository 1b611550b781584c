use std::sync::Once;
use std::time::Duration;

use futures_util::TryStreamExt;
use tempdir::TempDir;
use vfs_store::{
    Backend, BlobFS, BlobKind, CancellationToken, FileHandle, FileStore, ShareFS, Store,
    StoreConfig, StoreError, open_store,
};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::registry()
            .with(EnvFilter::from_default_env())
            .with(fmt::layer().with_test_writer())
            .try_init();
    });
}

/// One store per backend. The temp dir keeps the disk store's root alive.
struct Fixture {
    name: &'static str,
    store: Box<dyn FileStore>,
    _dir: Option<TempDir>,
}

fn fixtures() -> Vec<Fixture> {
    init_tracing();

    let dir = TempDir::new("vfs_store_it").unwrap();
    let disk_config = StoreConfig::new(dir.path().to_str().unwrap())
        .with_copy_poll_interval(Duration::from_millis(1));
    let memory_config = StoreConfig::new("/data").with_copy_poll_interval(Duration::from_millis(1));

    let blob = BlobFS::new(BlobKind::Block)
        .with_page_size(2)
        .with_empty_pages(true)
        .with_copy_latency(2);
    let share = ShareFS::new().with_page_size(2);

    vec![
        Fixture {
            name: "disk",
            store: open_store(&disk_config, Backend::Disk).unwrap(),
            _dir: Some(dir),
        },
        Fixture {
            name: "blob",
            store: Box::new(Store::new(blob, &memory_config).unwrap()),
            _dir: None,
        },
        Fixture {
            name: "share",
            store: Box::new(Store::new(share, &memory_config).unwrap()),
            _dir: None,
        },
    ]
}

async fn read_text(store: &dyn FileStore, path: &str) -> String {
    store
        .get_file_stream(path, &CancellationToken::none())
        .await
        .unwrap()
        .read_to_string()
        .await
        .unwrap()
}

async fn list_names(store: &dyn FileStore, path: &str) -> Vec<String> {
    let listing = store
        .get_directory_contents(path, &CancellationToken::none())
        .await
        .unwrap();
    let mut names: Vec<String> = listing
        .collect()
        .await
        .unwrap()
        .iter()
        .map(|entry: &FileHandle| entry.name().to_string())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_text_and_binary_round_trip() {
    let cancel = CancellationToken::none();
    let binary: Vec<u8> = (0..=255u8).cycle().take(4096).collect();

    for fixture in fixtures() {
        let store = fixture.store.as_ref();

        store.save_text("notes/hello.txt", "héllo wörld", &cancel).await.unwrap();
        assert_eq!(read_text(store, "notes/hello.txt").await, "héllo wörld", "{}", fixture.name);

        let mut content = &binary[..];
        store.save_file("bin/data.bin", &mut content, &cancel).await.unwrap();
        let read = store
            .get_file_stream("bin/data.bin", &cancel)
            .await
            .unwrap()
            .read_to_end()
            .await
            .unwrap();
        assert_eq!(read, binary, "{}", fixture.name);

        let info = store.get_file_info("bin/data.bin", &cancel).await.unwrap();
        assert!(info.is_file(), "{}", fixture.name);
        assert_eq!(info.length(), 4096, "{}", fixture.name);
        assert_eq!(info.path(), Some("bin/data.bin"), "{}", fixture.name);
    }
}

#[tokio::test]
async fn test_missing_file_queries() {
    let cancel = CancellationToken::none();

    for fixture in fixtures() {
        let store = fixture.store.as_ref();

        let info = store.get_file_info("missing/file.txt", &cancel).await.unwrap();
        assert!(!info.exists(), "{}", fixture.name);
        assert_eq!(info.name(), "missing/file.txt", "{}", fixture.name);

        let listing = store.get_directory_contents("missing", &cancel).await.unwrap();
        assert!(!listing.exists(), "{}", fixture.name);

        let err = store.get_file_stream("missing/file.txt", &cancel).await.err();
        assert!(matches!(err, Some(StoreError::NotFound(_))), "{}", fixture.name);
    }
}

#[tokio::test]
async fn test_delete_file_is_idempotent() {
    let cancel = CancellationToken::none();

    for fixture in fixtures() {
        let store = fixture.store.as_ref();
        store.save_text("a.txt", "a", &cancel).await.unwrap();

        store.delete_file("a.txt", &cancel).await.unwrap();
        store.delete_file("a.txt", &cancel).await.unwrap();
        store.delete_file("never/was.txt", &cancel).await.unwrap();

        assert!(!store.get_file_info("a.txt", &cancel).await.unwrap().exists(), "{}", fixture.name);
    }
}

#[tokio::test]
async fn test_listing_spans_pages() {
    let cancel = CancellationToken::none();

    for fixture in fixtures() {
        let store = fixture.store.as_ref();
        for name in ["a", "b", "c", "d", "e"] {
            store.save_text(&format!("dir/{name}.txt"), name, &cancel).await.unwrap();
        }
        store.save_text("dir/sub/deep.txt", "deep", &cancel).await.unwrap();

        assert_eq!(
            list_names(store, "dir").await,
            vec!["a.txt", "b.txt", "c.txt", "d.txt", "e.txt", "sub"],
            "{}",
            fixture.name
        );

        let listing = store.get_directory_contents("dir/sub", &cancel).await.unwrap();
        assert!(listing.exists(), "{}", fixture.name);
        assert_eq!(listing.name(), "sub", "{}", fixture.name);
        let entries: Vec<FileHandle> = listing.into_stream().try_collect().await.unwrap();
        assert_eq!(entries.len(), 1, "{}", fixture.name);
        assert_eq!(entries[0].path(), Some("dir/sub/deep.txt"), "{}", fixture.name);
    }
}

#[tokio::test]
async fn test_recursive_delete() {
    let cancel = CancellationToken::none();

    for fixture in fixtures() {
        let store = fixture.store.as_ref();
        let leaves = [
            "tree/1.txt",
            "tree/a/2.txt",
            "tree/a/3.txt",
            "tree/a/b/4.txt",
            "tree/a/b/c/5.txt",
            "tree/d/6.txt",
            "keep/7.txt",
        ];
        for leaf in leaves {
            store.save_text(leaf, leaf, &cancel).await.unwrap();
        }

        store.delete_directory("tree", &cancel).await.unwrap();

        let listing = store.get_directory_contents("tree", &cancel).await.unwrap();
        let remaining = if listing.exists() {
            listing.collect().await.unwrap().len()
        } else {
            0
        };
        assert_eq!(remaining, 0, "{}", fixture.name);
        for leaf in &leaves[..6] {
            assert!(!store.get_file_info(leaf, &cancel).await.unwrap().exists(), "{}", fixture.name);
        }
        assert!(store.get_file_info("keep/7.txt", &cancel).await.unwrap().exists(), "{}", fixture.name);

        // a second delete is a no-op
        store.delete_directory("tree", &cancel).await.unwrap();
    }
}

#[tokio::test]
async fn test_delete_root_contents() {
    let cancel = CancellationToken::none();

    for fixture in fixtures() {
        let store = fixture.store.as_ref();
        store.save_text("x/y.txt", "y", &cancel).await.unwrap();
        store.save_text("z.txt", "z", &cancel).await.unwrap();

        store.delete_directory("", &cancel).await.unwrap();

        assert!(list_names(store, "").await.is_empty(), "{}", fixture.name);
        // the root itself survives and stays writable
        store.save_text("again.txt", "ok", &cancel).await.unwrap();
    }
}

#[tokio::test]
async fn test_copy_and_rename() {
    let cancel = CancellationToken::none();

    for fixture in fixtures() {
        let store = fixture.store.as_ref();
        store.save_text("src/a.txt", "payload", &cancel).await.unwrap();
        store.save_text("dst/existing.txt", "old", &cancel).await.unwrap();

        store.copy_file("src/a.txt", "copies/a.txt", &cancel).await.unwrap();
        assert_eq!(read_text(store, "copies/a.txt").await, "payload", "{}", fixture.name);
        assert_eq!(read_text(store, "src/a.txt").await, "payload", "{}", fixture.name);

        store.rename_file("src/a.txt", "dst/existing.txt", &cancel).await.unwrap();
        assert_eq!(read_text(store, "dst/existing.txt").await, "payload", "{}", fixture.name);
        assert!(!store.get_file_info("src/a.txt", &cancel).await.unwrap().exists(), "{}", fixture.name);

        let err = store.rename_file("src/a.txt", "dst/b.txt", &cancel).await.unwrap_err();
        assert!(
            matches!(err, StoreError::NotFound(_) | StoreError::TransferFailed { .. }),
            "{}",
            fixture.name
        );
        assert!(!store.get_file_info("dst/b.txt", &cancel).await.unwrap().exists(), "{}", fixture.name);
    }
}

#[tokio::test]
async fn test_copy_onto_itself_keeps_content() {
    let cancel = CancellationToken::none();

    for fixture in fixtures() {
        let store = fixture.store.as_ref();
        store.save_text("a.txt", "payload", &cancel).await.unwrap();

        store.copy_file("a.txt", "./a.txt", &cancel).await.unwrap();
        assert_eq!(read_text(store, "a.txt").await, "payload", "{}", fixture.name);

        store.rename_file("a.txt", "sub/../a.txt", &cancel).await.unwrap();
        assert_eq!(read_text(store, "a.txt").await, "payload", "{}", fixture.name);

        let err = store.copy_file("gone.txt", "./gone.txt", &cancel).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)), "{}", fixture.name);
    }
}

#[tokio::test]
async fn test_failed_blob_copy_keeps_source() {
    let cancel = CancellationToken::none();
    let config = StoreConfig::new("/").with_copy_poll_interval(Duration::ZERO);
    let store = Store::new(BlobFS::new(BlobKind::Block).with_copy_latency(1), &config).unwrap();
    store.provider().fail_copies_to("b.txt");

    store.save_text("a.txt", "a", &cancel).await.unwrap();
    let err = store.rename_file("a.txt", "b.txt", &cancel).await.unwrap_err();

    assert!(matches!(err, StoreError::TransferFailed { .. }));
    assert!(store.get_file_info("a.txt", &cancel).await.unwrap().exists());
    assert!(!store.get_file_info("b.txt", &cancel).await.unwrap().exists());
}

#[tokio::test]
async fn test_sandbox_escapes_rejected() {
    let cancel = CancellationToken::none();

    for fixture in fixtures() {
        let store = fixture.store.as_ref();

        let err = store.save_text("../../etc/passwd", "x", &cancel).await.unwrap_err();
        assert!(matches!(err, StoreError::PathEscapesRoot(_)), "{}", fixture.name);

        let err = store.get_file_info("/etc/passwd", &cancel).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidPath(_)), "{}", fixture.name);

        let err = store.delete_directory("a/../../b", &cancel).await.unwrap_err();
        assert!(err.is_path_error(), "{}", fixture.name);

        let err = store.copy_file("ok.txt", "..\\escape.txt", &cancel).await.unwrap_err();
        assert!(matches!(err, StoreError::PathEscapesRoot(_)), "{}", fixture.name);
    }
}

#[tokio::test]
async fn test_cancellation() {
    for fixture in fixtures() {
        let store = fixture.store.as_ref();
        let live = CancellationToken::new();
        store.save_text("dir/a.txt", "a", &live).await.unwrap();

        let cancelled = CancellationToken::new();
        cancelled.cancel();

        let err = store.save_text("dir/b.txt", "b", &cancelled).await.unwrap_err();
        assert!(matches!(err, StoreError::Cancelled), "{}", fixture.name);
        assert!(!store.get_file_info("dir/b.txt", &live).await.unwrap().exists(), "{}", fixture.name);

        let err = store.delete_directory("dir", &cancelled).await.unwrap_err();
        assert!(matches!(err, StoreError::Cancelled), "{}", fixture.name);
        assert!(store.get_file_info("dir/a.txt", &live).await.unwrap().exists(), "{}", fixture.name);

        let err = store.copy_file("dir/a.txt", "dir/c.txt", &cancelled).await.unwrap_err();
        assert!(matches!(err, StoreError::Cancelled), "{}", fixture.name);

        // cancelling an open stream stops further reads
        let token = CancellationToken::new();
        let mut stream = store.get_file_stream("dir/a.txt", &token).await.unwrap();
        token.cancel();
        assert!(matches!(stream.read_to_end().await, Err(StoreError::Cancelled)), "{}", fixture.name);
    }
}
