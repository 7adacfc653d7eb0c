//! End-to-end scenarios against throwaway repositories, including local
//! filesystem remotes for the networked operations.

use std::time::Duration;

use git_executor::{DeployKey, GitExecutor, GitExecutorError, MergeOutcome, RepoPath};
use tempfile::TempDir;

fn engine(root: &TempDir) -> GitExecutor {
    GitExecutor::new(root.path())
}

/// Local filesystem transport never queries the credential callback.
fn key() -> DeployKey {
    DeployKey::new("unused-public", "unused-private")
}

fn bare_remote(dir: &TempDir) -> String {
    let path = dir.path().join("remote.git");
    let mut opts = git2::RepositoryInitOptions::new();
    opts.bare(true).initial_head("main");
    git2::Repository::init_opts(&path, &opts).unwrap();
    path.to_str().unwrap().to_string()
}

fn write(repo: &RepoPath, name: &str, content: &str) {
    std::fs::write(repo.as_path().join(name), content).unwrap();
}

fn read(repo: &RepoPath, name: &str) -> String {
    std::fs::read_to_string(repo.as_path().join(name)).unwrap()
}

async fn commit(engine: &GitExecutor, repo: &RepoPath, message: &str) -> String {
    engine
        .commit(repo, message, "Dev", "dev@example.com", false)
        .await
        .unwrap()
}

/// init + one commit of `a.txt = "base"` on main.
async fn seeded(root: &TempDir) -> (GitExecutor, RepoPath, String) {
    let engine = engine(root);
    let repo = engine.resolve("org", "app", "artifact", None).unwrap();
    assert!(engine.init_repository(&repo).await.unwrap());
    write(&repo, "a.txt", "base");
    let c1 = commit(&engine, &repo, "first").await;
    (engine, repo, c1)
}

#[tokio::test]
async fn init_is_idempotent() {
    let root = TempDir::new().unwrap();
    let engine = engine(&root);
    let repo = engine.resolve("org", "app", "artifact", None).unwrap();
    assert!(engine.init_repository(&repo).await.unwrap());
    assert!(!engine.init_repository(&repo).await.unwrap());
}

#[tokio::test]
async fn commit_then_reset_round_trip() {
    let root = TempDir::new().unwrap();
    let (engine, repo, c1) = seeded(&root).await;

    write(&repo, "a.txt", "y");
    let c2 = commit(&engine, &repo, "second").await;
    assert_ne!(c1, c2);

    let history = engine.commit_history(&repo, 10).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, c2);
    assert_eq!(history[0].parents, vec![c1.clone()]);
    assert_eq!(history[0].author_name, "Dev");

    // Dirty the tree, then discard everything back to the committed state.
    write(&repo, "a.txt", "scratch");
    write(&repo, "junk.txt", "scratch");
    assert!(engine.reset_to_last_commit(&repo, "main").await.unwrap());
    assert_eq!(read(&repo, "a.txt"), "y");
    assert!(!repo.as_path().join("junk.txt").exists());

    let status = engine.status(&repo, "main").await.unwrap();
    assert!(status.is_clean, "{status:?}");
}

#[tokio::test]
async fn empty_commit_is_idempotent() {
    let root = TempDir::new().unwrap();
    let (engine, repo, c1) = seeded(&root).await;
    let again = commit(&engine, &repo, "noop").await;
    assert_eq!(again, c1);
    assert_eq!(engine.commit_history(&repo, 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn amend_rewrites_instead_of_appending() {
    let root = TempDir::new().unwrap();
    let (engine, repo, c1) = seeded(&root).await;
    write(&repo, "a.txt", "amended");
    let c1b = engine
        .commit(&repo, "first, fixed", "Dev", "dev@example.com", true)
        .await
        .unwrap();
    assert_ne!(c1, c1b);
    let history = engine.commit_history(&repo, 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].message, "first, fixed");
}

#[tokio::test]
async fn amend_without_prior_commit_is_rejected() {
    let root = TempDir::new().unwrap();
    let engine = engine(&root);
    let repo = engine.resolve("org", "app", "artifact", None).unwrap();
    engine.init_repository(&repo).await.unwrap();
    write(&repo, "a.txt", "x");
    let err = engine
        .commit(&repo, "m", "Dev", "dev@example.com", true)
        .await
        .unwrap_err();
    assert!(matches!(err, GitExecutorError::NoPriorCommit));
}

#[tokio::test]
async fn status_sets_are_disjoint_and_complete() {
    let root = TempDir::new().unwrap();
    let (engine, repo, _) = seeded(&root).await;
    write(&repo, "b.txt", "two");
    commit(&engine, &repo, "add b").await;

    write(&repo, "a.txt", "changed");
    write(&repo, "new.txt", "fresh");
    std::fs::remove_file(repo.as_path().join("b.txt")).unwrap();

    let status = engine.status(&repo, "main").await.unwrap();
    assert_eq!(status.added, vec!["new.txt"]);
    assert_eq!(status.modified, vec!["a.txt"]);
    assert_eq!(status.removed, vec!["b.txt"]);
    assert!(!status.is_clean);
    for p in &status.added {
        assert!(!status.modified.contains(p) && !status.removed.contains(p));
    }
}

#[tokio::test]
async fn checkout_refuses_to_clobber_uncommitted_changes() {
    let root = TempDir::new().unwrap();
    let (engine, repo, _) = seeded(&root).await;
    engine
        .create_and_checkout_branch(&repo, "feature")
        .await
        .unwrap();
    write(&repo, "a.txt", "feature side");
    commit(&engine, &repo, "feature change").await;
    engine.checkout_branch(&repo, "main").await.unwrap();

    write(&repo, "a.txt", "uncommitted local edit");
    let err = engine.checkout_branch(&repo, "feature").await.unwrap_err();
    assert!(matches!(err, GitExecutorError::DirtyWorkingTree));
}

#[tokio::test]
async fn branch_listing_and_deletion() {
    let root = TempDir::new().unwrap();
    let (engine, repo, _) = seeded(&root).await;
    engine
        .create_and_checkout_branch(&repo, "feature")
        .await
        .unwrap();
    engine.checkout_branch(&repo, "main").await.unwrap();

    let branches = engine.list_branches(&repo).await.unwrap();
    let names: Vec<_> = branches.iter().map(|b| b.name.as_str()).collect();
    assert!(names.contains(&"main") && names.contains(&"feature"));

    // HEAD is on main, so main is the default in the local listing.
    let main = branches.iter().find(|b| b.name == "main").unwrap();
    let feature = branches.iter().find(|b| b.name == "feature").unwrap();
    assert!(main.is_default);
    assert!(!feature.is_default);

    engine.delete_branch(&repo, "feature").await.unwrap();
    let branches = engine.list_branches(&repo).await.unwrap();
    assert!(!branches.iter().any(|b| b.name == "feature"));

    let err = engine.tracking_status(&repo, "main").await.unwrap_err();
    assert!(matches!(err, GitExecutorError::NoUpstream(_)));
}

async fn conflicted_fixture(root: &TempDir) -> (GitExecutor, RepoPath) {
    let (engine, repo, _) = seeded(root).await;
    engine
        .create_and_checkout_branch(&repo, "feature")
        .await
        .unwrap();
    write(&repo, "a.txt", "feature side");
    commit(&engine, &repo, "feature change").await;
    engine.checkout_branch(&repo, "main").await.unwrap();
    write(&repo, "a.txt", "main side");
    commit(&engine, &repo, "main change").await;
    (engine, repo)
}

#[tokio::test]
async fn dry_run_merge_reports_conflicts_without_mutating() {
    let root = TempDir::new().unwrap();
    let (engine, repo) = conflicted_fixture(&root).await;

    let before_status = engine.status(&repo, "main").await.unwrap();
    let before_head = engine.commit_history(&repo, 1).await.unwrap()[0].id.clone();

    let outcome = engine.dry_run_merge(&repo, "feature", "main").await.unwrap();
    assert_eq!(
        outcome,
        MergeOutcome::Conflicted {
            files: vec!["a.txt".to_string()]
        }
    );

    assert_eq!(engine.status(&repo, "main").await.unwrap(), before_status);
    assert_eq!(
        engine.commit_history(&repo, 1).await.unwrap()[0].id,
        before_head
    );
    assert_eq!(read(&repo, "a.txt"), "main side");
}

#[tokio::test]
async fn real_merge_reports_the_same_conflicts_as_the_dry_run() {
    let root = TempDir::new().unwrap();
    let (engine, repo) = conflicted_fixture(&root).await;

    let dry = engine.dry_run_merge(&repo, "feature", "main").await.unwrap();
    let real = engine.merge(&repo, "feature", "main").await.unwrap();
    assert_eq!(dry, real);
    assert!(matches!(real, MergeOutcome::Conflicted { .. }));

    // The real merge is left paused; reset is the escape hatch.
    assert!(engine.reset_to_last_commit(&repo, "main").await.unwrap());
    assert!(engine.status(&repo, "main").await.unwrap().is_clean);
}

#[tokio::test]
async fn clean_merge_creates_a_merge_commit() {
    let root = TempDir::new().unwrap();
    let (engine, repo, _) = seeded(&root).await;
    engine
        .create_and_checkout_branch(&repo, "feature")
        .await
        .unwrap();
    write(&repo, "feature.txt", "f");
    commit(&engine, &repo, "feature file").await;
    engine.checkout_branch(&repo, "main").await.unwrap();
    write(&repo, "main.txt", "m");
    commit(&engine, &repo, "main file").await;

    let dry = engine.dry_run_merge(&repo, "feature", "main").await.unwrap();
    assert_eq!(dry, MergeOutcome::Clean { merge_commit: None });

    let outcome = engine.merge(&repo, "feature", "main").await.unwrap();
    let MergeOutcome::Clean {
        merge_commit: Some(id),
    } = outcome
    else {
        panic!("expected clean merge, got {outcome:?}");
    };
    let head = &engine.commit_history(&repo, 1).await.unwrap()[0];
    assert_eq!(head.id, id);
    assert_eq!(head.parents.len(), 2);
    assert!(repo.as_path().join("feature.txt").exists());
    assert!(repo.as_path().join("main.txt").exists());
}

#[tokio::test]
async fn merge_fast_forwards_when_possible() {
    let root = TempDir::new().unwrap();
    let (engine, repo, _) = seeded(&root).await;
    engine
        .create_and_checkout_branch(&repo, "feature")
        .await
        .unwrap();
    write(&repo, "feature.txt", "f");
    let tip = commit(&engine, &repo, "feature file").await;
    engine.checkout_branch(&repo, "main").await.unwrap();

    let outcome = engine.merge(&repo, "feature", "main").await.unwrap();
    assert_eq!(
        outcome,
        MergeOutcome::Clean {
            merge_commit: Some(tip.clone())
        }
    );
    assert_eq!(engine.commit_history(&repo, 1).await.unwrap()[0].id, tip);
    assert!(repo.as_path().join("feature.txt").exists());
}

#[tokio::test]
async fn clone_push_pull_against_local_remote() {
    let remote_dir = TempDir::new().unwrap();
    let url = bare_remote(&remote_dir);

    // Writer seeds the remote.
    let root_a = TempDir::new().unwrap();
    let (engine_a, repo_a, _) = seeded(&root_a).await;
    engine_a.push(&repo_a, &url, key(), "main").await.unwrap();

    // Reader clones it.
    let root_b = TempDir::new().unwrap();
    let engine_b = engine(&root_b);
    let repo_b = engine_b.resolve("org", "app", "artifact", None).unwrap();
    let default_branch = engine_b
        .clone_repository(&repo_b, &url, key())
        .await
        .unwrap();
    assert_eq!(default_branch, "main");
    assert_eq!(read(&repo_b, "a.txt"), "base");
    assert!(engine_b.status(&repo_b, "main").await.unwrap().is_clean);

    // Writer advances; reader fetches, falls behind, then pulls clean.
    write(&repo_a, "a.txt", "v2");
    commit(&engine_a, &repo_a, "second").await;
    engine_a.push(&repo_a, &url, key(), "main").await.unwrap();

    engine_b
        .fetch(&repo_b, &url, key(), Some("main"), false)
        .await
        .unwrap();
    let tracking = engine_b.tracking_status(&repo_b, "main").await.unwrap();
    assert_eq!((tracking.ahead, tracking.behind), (0, 1));

    let outcome = engine_b.pull(&repo_b, &url, "main", key()).await.unwrap();
    assert!(outcome.is_clean(), "{outcome:?}");
    assert_eq!(read(&repo_b, "a.txt"), "v2");
}

#[tokio::test]
async fn push_rejects_non_fast_forward() {
    let remote_dir = TempDir::new().unwrap();
    let url = bare_remote(&remote_dir);

    let root_a = TempDir::new().unwrap();
    let (engine_a, repo_a, _) = seeded(&root_a).await;
    engine_a.push(&repo_a, &url, key(), "main").await.unwrap();

    let root_b = TempDir::new().unwrap();
    let engine_b = engine(&root_b);
    let repo_b = engine_b.resolve("org", "app", "artifact", None).unwrap();
    engine_b.clone_repository(&repo_b, &url, key()).await.unwrap();

    // Both sides commit; the writer lands first.
    write(&repo_a, "a.txt", "writer wins");
    commit(&engine_a, &repo_a, "writer").await;
    engine_a.push(&repo_a, &url, key(), "main").await.unwrap();

    write(&repo_b, "a.txt", "stale reader");
    commit(&engine_b, &repo_b, "reader").await;
    let err = engine_b.push(&repo_b, &url, key(), "main").await.unwrap_err();
    assert!(matches!(err, GitExecutorError::NonFastForward), "{err}");
}

#[tokio::test]
async fn checkout_remote_branch_creates_tracking_branch() {
    let remote_dir = TempDir::new().unwrap();
    let url = bare_remote(&remote_dir);

    let root_a = TempDir::new().unwrap();
    let (engine_a, repo_a, _) = seeded(&root_a).await;
    engine_a.push(&repo_a, &url, key(), "main").await.unwrap();
    engine_a
        .create_and_checkout_branch(&repo_a, "feature")
        .await
        .unwrap();
    write(&repo_a, "feature.txt", "f");
    commit(&engine_a, &repo_a, "feature file").await;
    engine_a.push(&repo_a, &url, key(), "feature").await.unwrap();

    let root_b = TempDir::new().unwrap();
    let engine_b = engine(&root_b);
    let repo_b = engine_b.resolve("org", "app", "artifact", None).unwrap();
    engine_b.clone_repository(&repo_b, &url, key()).await.unwrap();
    engine_b
        .fetch(&repo_b, &url, key(), None, true)
        .await
        .unwrap();

    let name = engine_b
        .checkout_remote_branch(&repo_b, "feature")
        .await
        .unwrap();
    assert_eq!(name, "feature");
    assert_eq!(read(&repo_b, "feature.txt"), "f");
    let tracking = engine_b.tracking_status(&repo_b, "feature").await.unwrap();
    assert_eq!((tracking.ahead, tracking.behind), (0, 0));
}

#[tokio::test]
async fn remote_branch_listing_is_an_advertisement() {
    let remote_dir = TempDir::new().unwrap();
    let url = bare_remote(&remote_dir);

    let root_a = TempDir::new().unwrap();
    let (engine_a, repo_a, _) = seeded(&root_a).await;
    engine_a.push(&repo_a, &url, key(), "main").await.unwrap();
    engine_a
        .create_and_checkout_branch(&repo_a, "feature")
        .await
        .unwrap();
    write(&repo_a, "feature.txt", "f");
    commit(&engine_a, &repo_a, "feature file").await;
    engine_a.push(&repo_a, &url, key(), "feature").await.unwrap();

    let branches = engine_a
        .list_remote_branches(&url, key(), true)
        .await
        .unwrap();
    let names: Vec<_> = branches.iter().map(|b| b.name.as_str()).collect();
    assert!(names.contains(&"main") && names.contains(&"feature"));
    assert!(branches.iter().all(|b| b.is_remote));
    assert!(!branches.iter().any(|b| b.name == "feature" && b.is_default));
}

#[tokio::test]
async fn clone_of_empty_remote_fails_without_leftovers() {
    let remote_dir = TempDir::new().unwrap();
    let url = bare_remote(&remote_dir);

    let root = TempDir::new().unwrap();
    let engine = engine(&root);
    let repo = engine.resolve("org", "app", "artifact", None).unwrap();
    let err = engine.clone_repository(&repo, &url, key()).await.unwrap_err();
    assert!(matches!(err, GitExecutorError::EmptyRemote));
    assert!(!repo.as_path().exists());
}

#[tokio::test]
async fn clone_onto_existing_repository_is_rejected() {
    let remote_dir = TempDir::new().unwrap();
    let url = bare_remote(&remote_dir);

    let root = TempDir::new().unwrap();
    let engine = engine(&root);
    let repo = engine.resolve("org", "app", "artifact", None).unwrap();
    engine.init_repository(&repo).await.unwrap();
    let err = engine.clone_repository(&repo, &url, key()).await.unwrap_err();
    assert!(matches!(err, GitExecutorError::RepositoryExists(_)));
}

#[tokio::test]
async fn rebase_replays_onto_upstream() {
    let remote_dir = TempDir::new().unwrap();
    let url = bare_remote(&remote_dir);

    let root_a = TempDir::new().unwrap();
    let (engine_a, repo_a, _) = seeded(&root_a).await;
    engine_a.push(&repo_a, &url, key(), "main").await.unwrap();

    let root_b = TempDir::new().unwrap();
    let engine_b = engine(&root_b);
    let repo_b = engine_b.resolve("org", "app", "artifact", None).unwrap();
    engine_b.clone_repository(&repo_b, &url, key()).await.unwrap();

    // Upstream advances with one file while the local branch adds another.
    write(&repo_a, "upstream.txt", "u");
    commit(&engine_a, &repo_a, "upstream change").await;
    engine_a.push(&repo_a, &url, key(), "main").await.unwrap();

    write(&repo_b, "local.txt", "l");
    commit(&engine_b, &repo_b, "local change").await;
    engine_b
        .fetch(&repo_b, &url, key(), Some("main"), false)
        .await
        .unwrap();

    let outcome = engine_b.rebase(&repo_b, "main").await.unwrap();
    assert!(outcome.is_clean(), "{outcome:?}");
    assert!(repo_b.as_path().join("upstream.txt").exists());
    assert!(repo_b.as_path().join("local.txt").exists());
    let tracking = engine_b.tracking_status(&repo_b, "main").await.unwrap();
    assert_eq!((tracking.ahead, tracking.behind), (1, 0));
}

#[tokio::test]
async fn conflicted_rebase_is_left_paused_and_resettable() {
    let remote_dir = TempDir::new().unwrap();
    let url = bare_remote(&remote_dir);

    let root_a = TempDir::new().unwrap();
    let (engine_a, repo_a, _) = seeded(&root_a).await;
    engine_a.push(&repo_a, &url, key(), "main").await.unwrap();

    let root_b = TempDir::new().unwrap();
    let engine_b = engine(&root_b);
    let repo_b = engine_b.resolve("org", "app", "artifact", None).unwrap();
    engine_b.clone_repository(&repo_b, &url, key()).await.unwrap();

    write(&repo_a, "a.txt", "upstream side");
    commit(&engine_a, &repo_a, "upstream change").await;
    engine_a.push(&repo_a, &url, key(), "main").await.unwrap();

    write(&repo_b, "a.txt", "local side");
    commit(&engine_b, &repo_b, "local change").await;
    engine_b
        .fetch(&repo_b, &url, key(), Some("main"), false)
        .await
        .unwrap();

    let outcome = engine_b.rebase(&repo_b, "main").await.unwrap();
    let MergeOutcome::Conflicted { files } = outcome else {
        panic!("expected conflict, got {outcome:?}");
    };
    assert_eq!(files, vec!["a.txt"]);

    // Paused, not aborted; reset recovers a clean tree.
    assert!(engine_b.reset_to_last_commit(&repo_b, "main").await.unwrap());
    assert!(engine_b.status(&repo_b, "main").await.unwrap().is_clean);
}

#[tokio::test]
async fn reset_hard_moves_the_branch_pointer() {
    let root = TempDir::new().unwrap();
    let (engine, repo, c1) = seeded(&root).await;
    engine
        .create_and_checkout_branch(&repo, "anchor")
        .await
        .unwrap();
    engine.checkout_branch(&repo, "main").await.unwrap();
    write(&repo, "a.txt", "later");
    commit(&engine, &repo, "later").await;

    assert!(engine.reset_hard(&repo, "anchor").await.unwrap());
    assert_eq!(engine.commit_history(&repo, 1).await.unwrap()[0].id, c1);
    assert_eq!(read(&repo, "a.txt"), "base");
}

#[tokio::test]
async fn test_connection_distinguishes_reachable_from_not() {
    let remote_dir = TempDir::new().unwrap();
    let url = bare_remote(&remote_dir);

    let root = TempDir::new().unwrap();
    let engine = engine(&root);
    assert!(engine.test_connection(&url, key()).await.unwrap());

    let missing = remote_dir.path().join("nope.git");
    let unreachable = engine
        .test_connection(missing.to_str().unwrap(), key())
        .await
        .unwrap();
    assert!(!unreachable);
    assert!(!missing.exists());
}

#[tokio::test]
async fn contended_repository_fails_fast_with_concurrent_access() {
    let root = TempDir::new().unwrap();
    let engine = GitExecutor::new(root.path()).with_lock_wait(Duration::from_millis(100));
    let repo = engine.resolve("org", "app", "artifact", None).unwrap();
    engine.init_repository(&repo).await.unwrap();
    write(&repo, "a.txt", "x");

    let guard = git_executor::lock::acquire(repo.as_path(), Duration::from_secs(1))
        .await
        .unwrap();
    let err = engine
        .commit(&repo, "m", "Dev", "dev@example.com", false)
        .await
        .unwrap_err();
    assert!(matches!(err, GitExecutorError::ConcurrentAccess(_, _)));
    drop(guard);

    commit(&engine, &repo, "m").await;
}

#[tokio::test]
async fn cancelled_mutation_holds_the_lock_until_the_work_finishes() {
    let root = TempDir::new().unwrap();
    let (engine, repo, _) = seeded(&root).await;
    for i in 0..2000 {
        write(&repo, &format!("file-{i}.txt"), "payload");
    }

    // Drop the commit future mid-operation; the staging work keeps running
    // on the blocking pool.
    let commit_fut = engine.commit(&repo, "bulk", "Dev", "dev@example.com", false);
    let _ = tokio::time::timeout(Duration::from_millis(5), commit_fut).await;

    // The lock is only reacquirable once the orphaned work has finished, so
    // from here on nothing can mutate the repository underneath the holder.
    let guard = git_executor::lock::acquire(repo.as_path(), Duration::from_secs(30))
        .await
        .unwrap();
    let head = engine.commit_history(&repo, 1).await.unwrap()[0].id.clone();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(engine.commit_history(&repo, 1).await.unwrap()[0].id, head);
    drop(guard);
}

#[tokio::test]
async fn concurrent_mutations_on_one_repository_serialize() {
    let root = TempDir::new().unwrap();
    let root_path = root.path().to_path_buf();
    let (engine, repo, _) = seeded(&root).await;

    let e2 = GitExecutor::new(root_path);
    let repo2 = e2.resolve("org", "app", "artifact", None).unwrap();
    write(&repo, "one.txt", "1");
    write(&repo, "two.txt", "2");

    let a = tokio::spawn(async move {
        e2.commit(&repo2, "a", "Dev", "dev@example.com", false).await
    });
    let b = engine.commit(&repo, "b", "Dev", "dev@example.com", false);
    let (ra, rb) = tokio::join!(a, b);
    let ra = ra.unwrap();
    assert!(ra.is_ok() && rb.is_ok(), "{ra:?} {rb:?}");

    // Whichever ran second saw the fully-applied effect of the first.
    assert!(engine.status(&repo, "main").await.unwrap().is_clean);
}
