//! CLI integration tests.
//!
//! Each test gets its own project root and drives the binary with `--json`.
//!
//! ## Exit Codes
//! - 0: Success
//! - 2: Not initialized / database
//! - 3: Document or run not found
//! - 4: Validation or missing confirmation
//! - 5: Conflict needing a decision
//! - 6: Batch with failures

use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

use filetime::FileTime;
use serde_json::Value as JsonValue;
use tempfile::TempDir;

/// A docsync command rooted at `root` with no environment leaking in.
fn docsync(root: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::cargo_bin("docsync").unwrap();
    for var in [
        "DOCSYNC_DB",
        "DOCSYNC_ROOT",
        "DOCSYNC_ACTOR",
        "DOCSYNC_WORKERS",
        "DOCSYNC_DEBOUNCE_MS",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd.arg("--root").arg(root).arg("--json").arg("--actor").arg("tester");
    cmd
}

fn init_project() -> TempDir {
    let temp = TempDir::new().unwrap();
    docsync(temp.path()).arg("init").assert().success();
    temp
}

/// Run and parse stdout as JSON, asserting success.
fn run_json(root: &Path, args: &[&str]) -> JsonValue {
    let output = docsync(root).args(args).output().unwrap();
    assert!(
        output.status.success(),
        "{args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

/// Run expecting failure; returns the exit code and the structured error.
fn run_err(root: &Path, args: &[&str]) -> (i32, JsonValue) {
    let output = docsync(root).args(args).output().unwrap();
    assert!(!output.status.success(), "{args:?} unexpectedly succeeded");
    let err: JsonValue = serde_json::from_slice(&output.stderr).unwrap();
    (output.status.code().unwrap(), err)
}

fn touch_future(path: &Path) {
    let later = SystemTime::now() + Duration::from_secs(60);
    filetime::set_file_mtime(path, FileTime::from_system_time(later)).unwrap();
}

// =============================================================================
// Setup
// =============================================================================

#[test]
fn init_creates_data_directory() {
    let temp = TempDir::new().unwrap();
    let out = run_json(temp.path(), &["init", "--docs-root", "handbook"]);
    assert_eq!(out["docs_root"], "handbook");
    assert_eq!(out["already_initialized"], false);
    assert!(temp.path().join(".docsync/docsync.db").exists());
    assert!(temp.path().join(".docsync/config.json").exists());
}

#[test]
fn uninitialized_root_exits_2() {
    let temp = TempDir::new().unwrap();
    let (code, err) = run_err(temp.path(), &["status"]);
    assert_eq!(code, 2);
    assert_eq!(err["error"]["code"], "NOT_INITIALIZED");
}

#[test]
fn types_lists_taxonomy() {
    let temp = TempDir::new().unwrap();
    let out = run_json(temp.path(), &["types", "--category", "operations"]);
    let types: Vec<&str> = out
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["document_type"].as_str().unwrap())
        .collect();
    assert!(types.contains(&"runbook"));
    assert!(out.as_array().unwrap().iter().all(|t| t["category"] == "operations"));
}

// =============================================================================
// Documents
// =============================================================================

#[test]
fn register_hybrid_writes_file() {
    let temp = init_project();
    let doc = run_json(
        temp.path(),
        &[
            "register",
            "docs/guides/tutorial/intro.md",
            "--type",
            "tutorial",
            "--content",
            "# Intro\n\nHello.\n",
        ],
    );
    assert_eq!(doc["sync_status"], "synced");
    assert_eq!(doc["category"], "guides");
    assert_eq!(doc["title"], "Intro");

    let on_disk = fs::read_to_string(temp.path().join("docs/guides/tutorial/intro.md")).unwrap();
    assert_eq!(on_disk, "# Intro\n\nHello.\n");
}

#[test]
fn register_rejects_category_mismatch() {
    let temp = init_project();
    let (code, err) = run_err(
        temp.path(),
        &["register", "docs/operations/tutorial/intro.md", "--type", "tutorial"],
    );
    assert_eq!(code, 4);
    assert_eq!(err["error"]["code"], "CATEGORY_MISMATCH");
}

#[test]
fn unknown_document_exits_3() {
    let temp = init_project();
    let (code, err) = run_err(temp.path(), &["show", "doc_missing"]);
    assert_eq!(code, 3);
    assert_eq!(err["error"]["code"], "DOCUMENT_NOT_FOUND");
}

#[test]
fn update_content_writes_through_and_search_finds_it() {
    let temp = init_project();
    let doc = run_json(
        temp.path(),
        &["register", "docs/reference/glossary/terms.md", "--type", "glossary", "--content", "old"],
    );
    let id = doc["id"].as_str().unwrap();

    run_json(temp.path(), &["update", id, "--content", "zeppelin definitions"]);
    let on_disk = fs::read_to_string(temp.path().join("docs/reference/glossary/terms.md")).unwrap();
    assert_eq!(on_disk, "zeppelin definitions");

    let hits = run_json(temp.path(), &["search", "zeppelin"]);
    assert_eq!(hits["count"], 1);
    assert_eq!(hits["hits"][0]["document_id"], id);
}

#[test]
fn delete_removes_hybrid_file() {
    let temp = init_project();
    let doc = run_json(
        temp.path(),
        &["register", "docs/guides/tutorial/gone.md", "--type", "tutorial", "--content", "bye"],
    );
    let id = doc["id"].as_str().unwrap();
    let path = temp.path().join("docs/guides/tutorial/gone.md");
    assert!(path.exists());

    run_json(temp.path(), &["delete", id]);
    assert!(!path.exists());
    let (code, _) = run_err(temp.path(), &["show", id]);
    assert_eq!(code, 3);
}

// =============================================================================
// Sync
// =============================================================================

#[test]
fn edited_file_is_pulled_into_database() {
    let temp = init_project();
    let doc = run_json(
        temp.path(),
        &["register", "docs/guides/tutorial/edit.md", "--type", "tutorial", "--content", "v1"],
    );
    let id = doc["id"].as_str().unwrap();

    let path = temp.path().join("docs/guides/tutorial/edit.md");
    fs::write(&path, "v2 from editor").unwrap();
    touch_future(&path);

    let report = run_json(temp.path(), &["sync", id]);
    assert_eq!(report["status_before"], "file_newer");
    assert_eq!(report["action"], "wrote_database");

    let content = run_json(temp.path(), &["show", id, "--content"]);
    assert_eq!(content["content"], "v2 from editor");
}

#[test]
fn bulk_dry_run_plans_without_writing() {
    let temp = init_project();
    let doc = run_json(
        temp.path(),
        &["register", "docs/guides/tutorial/a.md", "--type", "tutorial", "--content", "a"],
    );
    let path = temp.path().join("docs/guides/tutorial/a.md");
    fs::remove_file(&path).unwrap();

    let report = run_json(temp.path(), &["sync", "--all", "--dry-run"]);
    assert_eq!(report["dry_run"], true);
    assert_eq!(report["planned"], 1);
    assert_eq!(report["items"][0]["document_id"], doc["id"]);
    assert!(!path.exists());

    let report = run_json(temp.path(), &["sync", "--all"]);
    assert_eq!(report["updated"], 1);
    assert_eq!(fs::read_to_string(&path).unwrap(), "a");
}

#[test]
fn conflict_needs_manual_resolution_or_a_strategy() {
    let temp = init_project();
    let doc = run_json(
        temp.path(),
        &["register", "docs/guides/tutorial/c.md", "--type", "tutorial", "--content", "base"],
    );
    let id = doc["id"].as_str().unwrap();
    let path = temp.path().join("docs/guides/tutorial/c.md");

    // Change the database copy without writing through, then the file
    docsync(temp.path())
        .args(["update", id, "--mode", "database-only"])
        .assert()
        .success();
    docsync(temp.path())
        .args(["update", id, "--content", "db side"])
        .assert()
        .success();
    docsync(temp.path())
        .args(["update", id, "--mode", "hybrid"])
        .assert()
        .success();
    fs::write(&path, "file side").unwrap();
    touch_future(&path);

    let status = run_json(temp.path(), &["status", "--refresh", "--all"]);
    assert_eq!(status["out_of_sync"][0]["id"], id);
    assert_eq!(status["out_of_sync"][0]["sync_status"], "conflict");

    let (code, err) = run_err(temp.path(), &["sync", id]);
    assert_eq!(code, 5);
    assert_eq!(err["error"]["code"], "MANUAL_RESOLUTION_REQUIRED");
    assert_eq!(err["error"]["candidates"]["database"], "db side");
    assert_eq!(err["error"]["candidates"]["file"], "file side");

    let report = run_json(temp.path(), &["sync", id, "--strategy", "file-wins"]);
    assert_eq!(report["action"], "resolved_conflict");
    assert_eq!(report["winner"], "file");
}

#[test]
fn invalid_strategy_exits_4() {
    let temp = init_project();
    let (code, err) = run_err(temp.path(), &["sync", "--all", "--strategy", "coin-flip"]);
    assert_eq!(code, 4);
    assert_eq!(err["error"]["code"], "INVALID_ARGUMENT");
}

// =============================================================================
// Structure migration
// =============================================================================

#[test]
fn migrate_requires_confirmation_then_moves_and_rolls_back() {
    let temp = init_project();
    let doc = run_json(
        temp.path(),
        &["register", "notes/setup.md", "--type", "runbook", "--legacy", "--content", "steps"],
    );
    let id = doc["id"].as_str().unwrap();
    let old = temp.path().join("notes/setup.md");
    let new = temp.path().join("docs/operations/runbook/setup.md");
    assert!(old.exists());

    let plan = run_json(temp.path(), &["migrate-to-structure", "--dry-run"]);
    assert_eq!(plan["moves"][0]["to_path"], "docs/operations/runbook/setup.md");
    assert!(old.exists());

    let (code, err) = run_err(temp.path(), &["migrate-to-structure", "--execute"]);
    assert_eq!(code, 4);
    assert_eq!(err["error"]["code"], "CONFIRMATION_REQUIRED");

    let report = run_json(temp.path(), &["migrate-to-structure", "--execute", "--yes"]);
    assert_eq!(report["migrated"], 1);
    assert!(new.exists());
    assert!(!old.exists());
    let moved = run_json(temp.path(), &["show", id]);
    assert_eq!(moved["file_path"], "docs/operations/runbook/setup.md");

    let run_id = report["run_id"].as_str().unwrap();
    let runs = run_json(temp.path(), &["migrate-to-structure", "--runs"]);
    assert_eq!(runs[0]["id"], run_id);

    let undone = run_json(
        temp.path(),
        &["migrate-to-structure", "--rollback", run_id, "--yes"],
    );
    assert_eq!(undone["rolled_back"], 1);
    assert!(old.exists());
    assert!(!new.exists());
    assert_eq!(fs::read_to_string(&old).unwrap(), "steps");
}

#[test]
fn rollback_unknown_run_exits_3() {
    let temp = init_project();
    let (code, err) = run_err(
        temp.path(),
        &["migrate-to-structure", "--rollback", "mig_nope", "--yes"],
    );
    assert_eq!(code, 3);
    assert_eq!(err["error"]["code"], "MIGRATION_RUN_NOT_FOUND");
}
