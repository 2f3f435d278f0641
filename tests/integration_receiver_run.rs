mod common;

use anyhow::Result;
use common::Fixture;
use quiver_arrow::ArrowRunner;
use std::time::Duration;

/// Receiver figures come from the full transfer log after exit, including
/// records written after the monitor's last tick.
#[tokio::test]
async fn receiver_run_reports_latency() -> Result<()> {
    let fixture = Fixture::with_script(
        "echo m1,1000,1010\nsleep 0.2\necho m2,1050,1055\necho garbage\necho m3,1100,1120",
    );
    let config = fixture.config("receive", &["--quiet"]);

    let summary = ArrowRunner::new(config)
        .with_tick(Duration::from_millis(50))
        .run()
        .await?;

    let results = &summary.results;
    assert_eq!(results.message_count, 3);
    assert!(results.message_rate > 0);

    let latency = results.message_latency.unwrap();
    assert!((latency - 35.0 / 3.0).abs() < 1e-9);

    let quartiles = results.message_latency_by_quartile.unwrap();
    assert_eq!(quartiles[1], 10.0);
    assert_eq!(quartiles[3], 20.0);
    assert!(quartiles[0] <= quartiles[1] && quartiles[1] <= quartiles[2]);

    let json = std::fs::read_to_string(fixture.output_dir().join("receiver-summary.json"))?;
    let value: serde_json::Value = serde_json::from_str(&json)?;
    assert_eq!(value["results"]["message_count"], 3);
    assert_eq!(value["results"]["message_latency_by_quartile"][3], 20.0);
    Ok(())
}

/// Status lines and the results block go to stdout; the run is unaffected.
#[tokio::test]
async fn receiver_run_with_console_output() -> Result<()> {
    let fixture = Fixture::with_script("echo m1,1000,1001\nsleep 0.2\necho m2,1000,1003");
    let config = fixture.config("receive", &["--timeout", "5"]);

    let summary = ArrowRunner::new(config)
        .with_tick(Duration::from_millis(50))
        .run()
        .await?;

    assert_eq!(summary.results.message_count, 2);
    assert_eq!(summary.results.message_latency, Some(2.0));
    assert_eq!(summary.config.timeout, 5);
    Ok(())
}
