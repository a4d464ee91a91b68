use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, Int64Array, TimestampMillisecondArray};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use crate::candle::Candle;
use crate::error::FeedError;

pub fn candle_schema() -> Schema {
    Schema::new(vec![
        Field::new(
            "timestamp",
            DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into())),
            false,
        ),
        Field::new("open", DataType::Float64, false),
        Field::new("high", DataType::Float64, false),
        Field::new("low", DataType::Float64, false),
        Field::new("close", DataType::Float64, false),
        Field::new("volume", DataType::Int64, false),
    ])
}

fn price_column(candles: &[Candle], field: impl Fn(&Candle) -> f64) -> ArrayRef {
    Arc::new(Float64Array::from_iter_values(candles.iter().map(field)))
}

pub fn candles_to_record_batch(candles: &[Candle]) -> Result<RecordBatch, FeedError> {
    let schema = Arc::new(candle_schema());

    let columns: Vec<ArrayRef> = vec![
        Arc::new(
            TimestampMillisecondArray::from_iter_values(candles.iter().map(|c| c.timestamp))
                .with_timezone("UTC"),
        ),
        price_column(candles, |c| c.open),
        price_column(candles, |c| c.high),
        price_column(candles, |c| c.low),
        price_column(candles, |c| c.close),
        Arc::new(Int64Array::from_iter_values(candles.iter().map(|c| c.volume))),
    ];

    Ok(RecordBatch::try_new(schema, columns)?)
}

fn float_column<'a>(
    batch: &'a RecordBatch,
    idx: usize,
    name: &str,
) -> Result<&'a Float64Array, FeedError> {
    batch
        .column(idx)
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| FeedError::InvalidData(format!("expected {name} column")))
}

pub fn record_batch_to_candles(batch: &RecordBatch) -> Result<Vec<Candle>, FeedError> {
    let timestamps = batch
        .column(0)
        .as_any()
        .downcast_ref::<TimestampMillisecondArray>()
        .ok_or_else(|| FeedError::InvalidData("expected timestamp column".into()))?;
    let opens = float_column(batch, 1, "open")?;
    let highs = float_column(batch, 2, "high")?;
    let lows = float_column(batch, 3, "low")?;
    let closes = float_column(batch, 4, "close")?;
    let volumes = batch
        .column(5)
        .as_any()
        .downcast_ref::<Int64Array>()
        .ok_or_else(|| FeedError::InvalidData("expected volume column".into()))?;

    Ok((0..batch.num_rows())
        .map(|i| Candle {
            timestamp: timestamps.value(i),
            open: opens.value(i),
            high: highs.value(i),
            low: lows.value(i),
            close: closes.value(i),
            volume: volumes.value(i),
        })
        .collect())
}

/// Write a candle series to a Snappy-compressed Parquet file.
pub fn write_parquet(path: &Path, candles: &[Candle]) -> Result<(), FeedError> {
    let batch = candles_to_record_batch(candles)?;

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(&batch)?;
    writer.close()?;

    Ok(())
}

pub fn read_parquet(path: &Path) -> Result<Vec<Candle>, FeedError> {
    let file = std::fs::File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

    let mut all_candles = Vec::new();
    for batch in reader {
        all_candles.extend(record_batch_to_candles(&batch?)?);
    }
    Ok(all_candles)
}
