use std::env;

use anyhow::Result;
use stockdump_core::config::ConnectionConfig;
use stockdump_core::db::MySqlSource;
use stockdump_core::source::TableSource;

#[tokio::test]
async fn mysql_source_round_trip_when_database_available() -> Result<()> {
    let database_url = match env::var("STOCKDUMP_TEST_DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("Skipping mysql test because STOCKDUMP_TEST_DATABASE_URL is not set");
            return Ok(());
        }
    };

    let config = ConnectionConfig {
        url: Some(database_url),
        ..ConnectionConfig::default()
    };
    let mut source = MySqlSource::connect(&config).await?;
    source.probe().await?;

    source
        .fetch("CREATE TEMPORARY TABLE stockdump_probe (datetime DATETIME, close DOUBLE, volume BIGINT, label VARCHAR(8))")
        .await?;
    source
        .fetch("INSERT INTO stockdump_probe VALUES ('2024-01-02 09:30:00', 101.5, 1200, 'Tue'), ('2024-01-02 09:31:00', NULL, NULL, NULL)")
        .await?;

    let frame = source
        .fetch("SELECT * FROM stockdump_probe ORDER BY datetime")
        .await?;
    assert_eq!(frame.get_column_names_str(), vec!["datetime", "close", "volume", "label"]);
    assert_eq!(frame.height(), 2);
    assert_eq!(frame.column("close")?.null_count(), 1);

    let empty = source
        .fetch("SELECT * FROM stockdump_probe WHERE 1 = 0")
        .await?;
    assert_eq!(empty.height(), 0);
    assert_eq!(empty.width(), 4);

    source.close().await?;
    source.close().await?;
    assert!(source.probe().await.is_err());
    Ok(())
}
