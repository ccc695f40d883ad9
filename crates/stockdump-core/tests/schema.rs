mod common;

use anyhow::Result;
use common::market_source;
use stockdump_core::catalog::Catalog;
use stockdump_core::schema::{columns_of, describe_join};
use stockdump_core::ExportError;

#[tokio::test]
async fn join_key_is_excluded_and_native_order_kept() -> Result<()> {
    let mut source = market_source();

    let columns = columns_of(&mut source, "price_ohlc", "datetime").await?;
    assert_eq!(columns, vec!["open", "close"]);

    // Key column position does not matter.
    let columns = columns_of(&mut source, "volume_metrics", "datetime").await?;
    assert_eq!(columns, vec!["x"]);
    Ok(())
}

#[tokio::test]
async fn missing_table_is_a_schema_error() {
    let mut source = market_source();
    match columns_of(&mut source, "dividends", "datetime").await {
        Err(ExportError::Schema { table, .. }) => assert_eq!(table, "dividends"),
        other => panic!("expected schema error, got {other:?}"),
    }
}

#[tokio::test]
async fn table_without_join_key_is_a_schema_error() {
    let mut source = market_source();
    source
        .schemas
        .insert("oscillators".into(), vec!["ts".into(), "rsi".into()]);

    let err = columns_of(&mut source, "oscillators", "datetime")
        .await
        .unwrap_err();
    assert!(matches!(err, ExportError::Schema { .. }));
    assert!(err.to_string().contains("datetime"));
}

#[tokio::test]
async fn describe_join_covers_every_non_anchor_table() -> Result<()> {
    let mut source = market_source();
    let catalog = Catalog::default();

    let described = describe_join(&mut source, &catalog).await?;
    let layout: Vec<(&str, Vec<&str>)> = described
        .iter()
        .map(|table| {
            (
                table.entry.alias.as_str(),
                table.columns.iter().map(String::as_str).collect(),
            )
        })
        .collect();

    assert_eq!(
        layout,
        vec![
            ("p", vec!["open", "close"]),
            ("v", vec!["x"]),
            ("m", vec!["y"]),
            ("o", vec!["z"]),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn describe_join_checks_the_anchor_exists() {
    let mut source = market_source();
    source.schemas.remove("datetime_dimension");

    let err = describe_join(&mut source, &Catalog::default()).await.unwrap_err();
    assert!(matches!(err, ExportError::Schema { ref table, .. } if table == "datetime_dimension"));
}
