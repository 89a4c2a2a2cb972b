use sda_protocol::{FileEntry, FileTree, Project};
use sda_sync::{GitRemote, MemoryProjectStore, ProjectStore, SyncEngine, SyncError};
use std::path::{Path, PathBuf};
use std::process::Command;

fn git(args: &[&str]) -> String {
    let output = Command::new("git").args(args).output().unwrap();
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Create an empty bare repository at `<root>/<owner>/<repo>.git` whose HEAD is `main`.
fn bare_remote(root: &Path, owner: &str, repo: &str) -> PathBuf {
    let path = root.join(owner).join(format!("{repo}.git"));
    std::fs::create_dir_all(&path).unwrap();
    let path_str = path.to_str().unwrap();
    git(&["init", "--bare", "--quiet", path_str]);
    git(&["--git-dir", path_str, "symbolic-ref", "HEAD", "refs/heads/main"]);
    path
}

fn commit_count(bare: &Path) -> u32 {
    git(&["--git-dir", bare.to_str().unwrap(), "rev-list", "--count", "main"])
        .parse()
        .unwrap()
}

fn engine(remote_root: &Path, work_dir: &Path) -> SyncEngine {
    SyncEngine::new(
        GitRemote::new(remote_root.to_str().unwrap(), None),
        work_dir,
    )
}

fn sample_tree() -> FileTree {
    FileTree::from([
        (
            "package.json".to_string(),
            FileEntry::file(r#"{"name":"demo-app"}"#),
        ),
        ("index.js".to_string(), FileEntry::file("console.log('hi');\n")),
        ("src/components/App.jsx".to_string(), FileEntry::file("export default 1;\n")),
    ])
}

#[tokio::test]
async fn pushing_unchanged_tree_twice_is_a_noop() {
    let remotes = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let bare = bare_remote(remotes.path(), "octo", "demo-app");
    let engine = engine(remotes.path(), work.path());
    let project = Project::new("p1", "demo").with_file_tree(sample_tree());

    let first = engine.push(&project, "octo", "demo-app", None).await.unwrap();
    assert!(!first.is_noop());
    assert!(first.message.starts_with("Pushed successfully."));
    assert_eq!(first.changed_files.len(), 3);
    assert_eq!(commit_count(&bare), 1);

    let second = engine.push(&project, "octo", "demo-app", Some("again")).await.unwrap();
    assert!(second.is_noop());
    assert!(second.message.starts_with("No changes detected to push."));
    assert!(second.message.contains("Files in tree: 3"));
    assert_eq!(commit_count(&bare), 1);
}

#[tokio::test]
async fn push_then_pull_round_trips_the_tree() {
    let remotes = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    bare_remote(remotes.path(), "octo", "demo-app");
    let engine = engine(remotes.path(), work.path());

    let store = MemoryProjectStore::new();
    let source = store.create("demo", sample_tree()).await.unwrap();
    engine.push(&source, "octo", "demo-app", Some("initial")).await.unwrap();

    let mut target = store.create("other", FileTree::new()).await.unwrap();
    let outcome = engine
        .pull(&mut target, "octo", "demo-app", &store)
        .await
        .unwrap();

    assert_eq!(outcome.message, "Pulled successfully. Project updated.");
    assert_eq!(outcome.file_tree, sample_tree());
    assert_eq!(target.file_tree, sample_tree());
    assert_eq!(store.get(&target.id).await.unwrap().file_tree, sample_tree());
}

#[tokio::test]
async fn push_mirrors_deletions() {
    let remotes = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let bare = bare_remote(remotes.path(), "octo", "demo-app");
    let engine = engine(remotes.path(), work.path());

    let mut project = Project::new("p1", "demo").with_file_tree(sample_tree());
    engine.push(&project, "octo", "demo-app", None).await.unwrap();

    project.file_tree.remove("index.js");
    let outcome = engine.push(&project, "octo", "demo-app", None).await.unwrap();
    assert_eq!(outcome.changed_files, vec!["index.js".to_string()]);
    assert_eq!(commit_count(&bare), 2);

    let store = MemoryProjectStore::new();
    let mut copy = store.create("copy", FileTree::new()).await.unwrap();
    let pulled = engine.pull(&mut copy, "octo", "demo-app", &store).await.unwrap();
    assert!(!pulled.file_tree.contains_key("index.js"));
    assert_eq!(pulled.file_tree.len(), 2);
}

#[tokio::test]
async fn clone_failure_leaves_no_workspace_behind() {
    let remotes = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let engine = engine(remotes.path(), work.path());
    let project = Project::new("p1", "demo").with_file_tree(sample_tree());

    let err = engine
        .push(&project, "octo", "missing", None)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::RepositoryAccess { .. }), "got {err:?}");

    let store = MemoryProjectStore::new();
    let mut target = store.create("demo", FileTree::new()).await.unwrap();
    let err = engine
        .pull(&mut target, "octo", "missing", &store)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::RepositoryAccess { .. }), "got {err:?}");

    assert_eq!(std::fs::read_dir(work.path()).unwrap().count(), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn pull_skips_symlinks_out_of_the_clone() {
    let remotes = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let host = tempfile::tempdir().unwrap();
    let bare = bare_remote(remotes.path(), "octo", "linked");

    let secret = host.path().join("config.toml");
    std::fs::write(&secret, "token = \"ghp_secret\"").unwrap();

    // Commit an absolute symlink with plain git, outside the engine.
    let checkout = host.path().join("checkout");
    let checkout_str = checkout.to_str().unwrap();
    git(&["clone", "--quiet", bare.to_str().unwrap(), checkout_str]);
    std::fs::write(checkout.join("index.js"), "ok\n").unwrap();
    std::os::unix::fs::symlink(&secret, checkout.join("leak.txt")).unwrap();
    git(&["-C", checkout_str, "add", "-A"]);
    git(&[
        "-C",
        checkout_str,
        "-c",
        "user.name=Test",
        "-c",
        "user.email=test@example.com",
        "commit",
        "--quiet",
        "-m",
        "add link",
    ]);
    git(&["-C", checkout_str, "push", "--quiet", "origin", "HEAD:refs/heads/main"]);

    let engine = engine(remotes.path(), work.path());
    let store = MemoryProjectStore::new();
    let mut project = store.create("linked", FileTree::new()).await.unwrap();
    let outcome = engine
        .pull(&mut project, "octo", "linked", &store)
        .await
        .unwrap();

    assert_eq!(outcome.file_tree.keys().collect::<Vec<_>>(), vec!["index.js"]);
    assert!(!store
        .get(&project.id)
        .await
        .unwrap()
        .file_tree
        .contains_key("leak.txt"));
}
