use jobhunt_db::{jobs, Database};
use jobhunt_engine::state::EngineState;
use jobhunt_engine::{load_config, run, Options};
use tokio_util::sync::CancellationToken;

fn write_config(dir: &std::path::Path, extra: &str) -> std::path::PathBuf {
    let db_path = dir.join("data").join("jobhunt.db");
    let config_path = dir.join("config.toml");
    let contents = format!(
        "[database]\npath = {:?}\n\n[polling]\ninterval_secs = 5\n{extra}",
        db_path.display().to_string()
    );
    std::fs::write(&config_path, contents).expect("write config");
    config_path
}

#[tokio::test]
async fn test_once_with_no_sources_creates_database() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config_path = write_config(dir.path(), "");

    let options = Options {
        once: true,
        config: Some(config_path),
    };
    run(options, CancellationToken::new()).await.expect("run once");

    let db = Database::new(dir.path().join("data").join("jobhunt.db"))
        .await
        .expect("reopen");
    assert_eq!(jobs::count_jobs(db.pool()).await.expect("count"), 0);
}

#[tokio::test]
async fn test_state_opens_configured_database() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config_path = write_config(dir.path(), "\n[filters]\nremote_ok = true\n");

    let options = Options {
        config: Some(config_path),
        ..Options::default()
    };
    let config = load_config(&options).expect("config");
    assert_eq!(config.polling.interval_secs, 5);

    let state = EngineState::open(config).await.expect("open state");
    assert!(state.config.filters.remote_ok);
    assert_eq!(state.db.get_schema_version().await.expect("version"), 2);
    assert!(!state.status.snapshot().running);
}

#[tokio::test]
async fn test_shutdown_stops_the_poller() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config_path = write_config(dir.path(), "");

    let shutdown = CancellationToken::new();
    shutdown.cancel();
    let options = Options {
        config: Some(config_path),
        ..Options::default()
    };
    run(options, shutdown).await.expect("run until shutdown");
}
