//! End-to-end tests wiring the scanner, ignore matcher, block requester,
//! change-set applier, and versioners together across two real
//! directory trees, the way an outer sync process would.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use syncore::config::Options;
use syncore::error::SyncError;
use syncore::external::{Archiver, CurrentFiler, NoCurrentFiler, NoProgresser, RequestBackend};
use syncore::fs::{Filesystem, StdFilesystem};
use syncore::ignore::{Matcher, StaticIncludes};
use syncore::scanner::{CancelToken, Scanner};
use syncore::types::FileInfo;

/// Serves block requests straight out of a source tree, standing in for
/// the wire protocol an outer process would speak.
struct TreeBackend {
    fs: StdFilesystem,
}

#[async_trait]
impl RequestBackend for TreeBackend {
    async fn request(
        &self,
        name: &str,
        offset: u64,
        _hash: &[u8; 32],
        buf: &mut [u8],
    ) -> Result<(), SyncError> {
        use std::io::{Read, Seek, SeekFrom};
        let mut file = self.fs.open(std::path::Path::new(name)).map_err(SyncError::from)?;
        file.seek(SeekFrom::Start(offset)).map_err(SyncError::from)?;
        file.read_exact(buf).map_err(SyncError::from)?;
        Ok(())
    }
}

fn empty_matcher() -> Matcher {
    Matcher::load("root", "", &StaticIncludes(HashMap::new()), false).unwrap()
}

fn scan_all(fsys: &StdFilesystem, matcher: &Matcher) -> Vec<FileInfo> {
    let filer = NoCurrentFiler;
    let options = Options::default();
    let scanner = Scanner { fs: fsys, matcher, current: &filer, options: &options, modifier_id: 1 };
    scanner.scan(CancelToken::new()).iter().filter_map(|r| r.file).collect()
}

#[tokio::test]
async fn scanned_tree_applies_byte_identical_into_a_fresh_destination() {
    let src_dir = TempDir::new().unwrap();
    std::fs::create_dir(src_dir.path().join("sub")).unwrap();
    std::fs::write(src_dir.path().join("a.txt"), b"hello world").unwrap();
    std::fs::write(src_dir.path().join("sub/b.txt"), b"nested contents, a little longer this time").unwrap();

    let src_fs = StdFilesystem::new(src_dir.path());
    let matcher = empty_matcher();
    let files = scan_all(&src_fs, &matcher);
    assert!(files.iter().any(|f| f.name == "a.txt"));
    assert!(files.iter().any(|f| f.name == "sub"));
    assert!(files.iter().any(|f| f.name == "sub/b.txt"));

    let dst_dir = TempDir::new().unwrap();
    let dst_fs = StdFilesystem::new(dst_dir.path());
    let filer = NoCurrentFiler;
    let progress = NoProgresser;
    let options = Options::default();
    let applier = syncore::apply::Applier::new(&dst_fs, &filer, None, &progress, &options);
    for f in files {
        applier.queue(f);
    }

    let backend = Arc::new(TreeBackend { fs: StdFilesystem::new(src_dir.path()) });
    let (requester, handle) = syncore::requester::Requester::spawn(backend, 4, 1 << 20);
    applier.apply(&requester).await.unwrap();
    requester.shut_down();
    handle.join().await;

    let a = std::fs::read(dst_dir.path().join("a.txt")).unwrap();
    assert_eq!(a, b"hello world");
    let b = std::fs::read(dst_dir.path().join("sub/b.txt")).unwrap();
    assert_eq!(b, b"nested contents, a little longer this time");
}

#[tokio::test]
async fn ignored_subtree_never_reaches_the_applier() {
    let src_dir = TempDir::new().unwrap();
    std::fs::create_dir(src_dir.path().join("build")).unwrap();
    std::fs::write(src_dir.path().join("build/output.o"), b"binary junk").unwrap();
    std::fs::write(src_dir.path().join("keep.txt"), b"source file").unwrap();

    let src_fs = StdFilesystem::new(src_dir.path());
    let matcher = Matcher::load("root", "build\n", &StaticIncludes(HashMap::new()), false).unwrap();
    let files = scan_all(&src_fs, &matcher);
    let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
    assert!(names.contains(&"keep.txt"));
    assert!(!names.iter().any(|n| n.starts_with("build")));
}

#[tokio::test]
async fn conflicting_concurrent_edit_produces_a_conflict_copy_instead_of_silent_overwrite() {
    let dst_dir = TempDir::new().unwrap();
    let dst_fs = StdFilesystem::new(dst_dir.path());
    let local_content = b"locally edited content";
    std::fs::write(dst_dir.path().join("doc.txt"), local_content).unwrap();

    struct ConcurrentFiler(FileInfo);
    impl CurrentFiler for ConcurrentFiler {
        fn current_file(&self, _name: &str) -> Option<FileInfo> {
            Some(self.0.clone())
        }
    }

    // The recorded FileInfo must reflect what's actually on disk: the
    // applier's pre-write check rejects a write whose expected state
    // (size/content hash) doesn't match the real file.
    let local_version = syncore::types::Version::new().update(1);
    let local_block_hash = syncore::util::sha256(local_content);
    let local_hash = syncore::util::content_hash(std::iter::once(&local_block_hash));
    let local = FileInfo {
        name: "doc.txt".into(),
        kind: syncore::types::FileKind::File,
        deleted: false,
        invalid: false,
        ignored: false,
        permissions: 0o644,
        ignore_perms: false,
        modified: syncore::types::ModTime { sec: 0, nsec: 0 },
        size: local_content.len() as u64,
        block_size: 131072,
        blocks: vec![syncore::types::BlockInfo {
            offset: 0,
            size: local_content.len() as u32,
            hash: local_block_hash,
            weak_hash: 0,
        }],
        symlink_target: None,
        version: local_version,
        hash: local_hash,
    };

    let incoming_version = syncore::types::Version::new().update(2);
    let content = b"remote replacement!!!!";
    let hash = syncore::util::sha256(content);
    let incoming = FileInfo {
        name: "doc.txt".into(),
        kind: syncore::types::FileKind::File,
        deleted: false,
        invalid: false,
        ignored: false,
        permissions: 0o644,
        ignore_perms: false,
        modified: syncore::types::ModTime { sec: 12345, nsec: 0 },
        size: content.len() as u64,
        block_size: 131072,
        blocks: vec![syncore::types::BlockInfo { offset: 0, size: content.len() as u32, hash, weak_hash: 0 }],
        symlink_target: None,
        version: incoming_version,
        hash,
    };

    let filer = ConcurrentFiler(local);
    let progress = NoProgresser;
    let options = Options::default();
    let applier = syncore::apply::Applier::new(&dst_fs, &filer, None, &progress, &options);
    applier.queue(incoming);

    struct FixedBackend(Vec<u8>);
    #[async_trait]
    impl RequestBackend for FixedBackend {
        async fn request(&self, _n: &str, _o: u64, _h: &[u8; 32], buf: &mut [u8]) -> Result<(), SyncError> {
            buf.copy_from_slice(&self.0[..buf.len()]);
            Ok(())
        }
    }
    let backend = Arc::new(FixedBackend(content.to_vec()));
    let (requester, handle) = syncore::requester::Requester::spawn(backend, 1, 4096);
    applier.apply(&requester).await.unwrap();
    requester.shut_down();
    handle.join().await;

    assert_eq!(std::fs::read(dst_dir.path().join("doc.txt")).unwrap(), content);
    let has_conflict_copy = std::fs::read_dir(dst_dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .any(|e| e.file_name().to_string_lossy().contains(".sync-conflict-"));
    assert!(has_conflict_copy);
}

#[tokio::test]
async fn deletion_detected_by_the_scanner_removes_the_file_on_apply() {
    let dst_dir = TempDir::new().unwrap();
    let dst_fs = StdFilesystem::new(dst_dir.path());
    std::fs::write(dst_dir.path().join("gone.txt"), b"will be deleted").unwrap();

    let deletion = FileInfo {
        name: "gone.txt".into(),
        kind: syncore::types::FileKind::File,
        deleted: true,
        invalid: false,
        ignored: false,
        permissions: 0o644,
        ignore_perms: false,
        modified: syncore::types::ModTime { sec: 0, nsec: 0 },
        size: 0,
        block_size: 131072,
        blocks: vec![],
        symlink_target: None,
        version: syncore::types::Version::new().update(1),
        hash: [0; 32],
    };

    let filer = NoCurrentFiler;
    let progress = NoProgresser;
    let options = Options::default();
    let applier = syncore::apply::Applier::new(&dst_fs, &filer, None, &progress, &options);
    applier.queue(deletion);

    struct UnusedBackend;
    #[async_trait]
    impl RequestBackend for UnusedBackend {
        async fn request(&self, _n: &str, _o: u64, _h: &[u8; 32], _b: &mut [u8]) -> Result<(), SyncError> {
            Err(SyncError::BlockUnavailable { path: "unused".into(), offset: 0 })
        }
    }
    let (requester, handle) = syncore::requester::Requester::spawn(Arc::new(UnusedBackend), 1, 4096);
    applier.apply(&requester).await.unwrap();
    requester.shut_down();
    handle.join().await;

    assert!(dst_fs.stat(std::path::Path::new("gone.txt")).is_err());
}

#[tokio::test]
async fn replacing_a_file_through_a_trashcan_versioner_archives_the_old_copy() {
    let dst_dir = TempDir::new().unwrap();
    let dst_fs = StdFilesystem::new(dst_dir.path());
    std::fs::write(dst_dir.path().join("report.txt"), b"old report").unwrap();

    let versioner = syncore::versioner::TrashcanVersioner::new(&dst_fs, ".stversions");

    let content = b"new report content";
    let hash = syncore::util::sha256(content);
    let incoming = FileInfo {
        name: "report.txt".into(),
        kind: syncore::types::FileKind::File,
        deleted: false,
        invalid: false,
        ignored: false,
        permissions: 0o644,
        ignore_perms: false,
        modified: syncore::types::ModTime { sec: 99, nsec: 0 },
        size: content.len() as u64,
        block_size: 131072,
        blocks: vec![syncore::types::BlockInfo { offset: 0, size: content.len() as u32, hash, weak_hash: 0 }],
        symlink_target: None,
        version: syncore::types::Version::new().update(1),
        hash,
    };

    let filer = NoCurrentFiler;
    let progress = NoProgresser;
    let options = Options::default();
    let applier = syncore::apply::Applier::new(&dst_fs, &filer, Some(&versioner), &progress, &options);
    applier.queue(incoming);

    struct FixedBackend(Vec<u8>);
    #[async_trait]
    impl RequestBackend for FixedBackend {
        async fn request(&self, _n: &str, _o: u64, _h: &[u8; 32], buf: &mut [u8]) -> Result<(), SyncError> {
            buf.copy_from_slice(&self.0[..buf.len()]);
            Ok(())
        }
    }
    let backend = Arc::new(FixedBackend(content.to_vec()));
    let (requester, handle) = syncore::requester::Requester::spawn(backend, 1, 4096);
    applier.apply(&requester).await.unwrap();
    requester.shut_down();
    handle.join().await;

    assert_eq!(std::fs::read(dst_dir.path().join("report.txt")).unwrap(), content);
    assert_eq!(std::fs::read(dst_dir.path().join(".stversions/report.txt")).unwrap(), b"old report");
}
