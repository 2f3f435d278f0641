mod common;

use anyhow::Result;
use common::Fixture;
use quiver_arrow::{ArrowRunner, Operation, SummaryPersister};
use std::time::Duration;

/// A sender run end to end: the collaborator gets the contract arguments,
/// its stdout becomes the transfer log and the summary lands on disk.
#[tokio::test]
async fn sender_run_writes_all_artifacts() -> Result<()> {
    let fixture = Fixture::with_script(
        "echo m1,1000\necho m2,1050\nsleep 0.3\necho m3,1200",
    );
    let config = fixture.config("send", &["-m", "3", "--bytes", "1k", "--quiet"]);
    let transfers_file = config.transfers_file();
    let snapshots_file = config.snapshots_file();
    let summary_file = config.summary_file();

    let summary = ArrowRunner::new(config)
        .with_tick(Duration::from_millis(100))
        .run()
        .await?;

    assert_eq!(
        fixture.recorded_args(),
        "client active send arrow-test 127.0.0.1 5672 q0 3 1000 1000"
    );

    assert_eq!(summary.config.operation, Operation::Send);
    assert_eq!(summary.config.payload_size, 1000);
    assert_eq!(summary.results.message_count, 3);
    assert!(summary.results.message_rate > 0);
    assert!(summary.results.message_latency.is_none());
    assert!(summary.results.message_latency_by_quartile.is_none());

    assert_eq!(
        std::fs::read_to_string(&transfers_file)?,
        "m1,1000\nm2,1050\nm3,1200\n"
    );
    assert!(transfers_file.ends_with("sender-transfers.csv"));

    // At least one tick fell inside the 300ms pause.
    let snapshots = std::fs::read_to_string(&snapshots_file)?;
    assert!(snapshots.lines().count() >= 1);
    for line in snapshots.lines() {
        assert_eq!(line.split(',').count(), 7);
    }

    assert_eq!(SummaryPersister::load(&summary_file)?, summary);
    Ok(())
}

/// A record split across two writes is still counted exactly once.
#[tokio::test]
async fn sender_run_reassembles_split_records() -> Result<()> {
    let fixture = Fixture::with_script(
        "printf 'm1,1000\\nm2,10'\nsleep 0.3\nprintf '50\\nm3,1100\\n'",
    );
    let config = fixture.config("send", &["--quiet"]);

    let summary = ArrowRunner::new(config)
        .with_tick(Duration::from_millis(50))
        .run()
        .await?;

    assert_eq!(summary.results.message_count, 3);
    Ok(())
}

/// Server mode implies a passive channel, and both reach the collaborator.
#[tokio::test]
async fn server_mode_arguments() -> Result<()> {
    let fixture = Fixture::with_script("echo m1,1000\nsleep 0.1");
    let config = fixture.config("send", &["--server", "-m", "1", "--quiet"]);

    let summary = ArrowRunner::new(config).run().await?;

    assert!(fixture
        .recorded_args()
        .starts_with("server passive send arrow-test"));
    let json = std::fs::read_to_string(fixture.output_dir().join("sender-summary.json"))?;
    let value: serde_json::Value = serde_json::from_str(&json)?;
    assert_eq!(value["config"]["connection_mode"], "server");
    assert_eq!(value["config"]["channel_mode"], "passive");
    assert_eq!(value["config"]["impl"], "qpid-proton-cpp");
    assert_eq!(summary.results.message_count, 1);
    Ok(())
}

/// A line that is not valid UTF-8 is skipped like any other malformed line.
#[tokio::test]
async fn sender_run_skips_undecodable_line() -> Result<()> {
    let fixture = Fixture::with_script("printf 'm1,1000\\nm\\377,1010\\nm3,1200\\n'\nsleep 0.1");
    let config = fixture.config("send", &["--quiet"]);

    let summary = ArrowRunner::new(config)
        .with_tick(Duration::from_millis(50))
        .run()
        .await?;

    assert_eq!(summary.results.message_count, 2);
    Ok(())
}
