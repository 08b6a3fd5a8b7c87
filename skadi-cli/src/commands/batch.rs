use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use skadi::{ElevationService, LocationData};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use super::query::format_elevation;
use super::{build_service, runtime};
use crate::TierArgs;

/// Points sent to the service per call; the progress bar advances per chunk.
const CHUNK_SIZE: usize = 1000;

pub fn run(
    tiers: &TierArgs,
    input: PathBuf,
    output: Option<PathBuf>,
    lat_col: String,
    lon_col: String,
) -> Result<()> {
    let extension = input
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    if extension != "csv" {
        bail!("Unsupported file format: {}. Use .csv", extension);
    }

    let file = File::open(&input).context("Failed to open input file")?;
    let table = read_csv(BufReader::new(file), &lat_col, &lon_col)?;

    let service = build_service(tiers)?;
    let elevations = runtime()?.block_on(fetch_with_progress(&service, &table.points))?;

    let output_path = output.unwrap_or_else(|| default_output_path(&input));
    let output_file = File::create(&output_path).context("Failed to create output file")?;
    write_csv(BufWriter::new(output_file), &table, &elevations)?;

    let unavailable = elevations.iter().filter(|e| e.is_none()).count();
    println!(
        "Output written to: {} ({} points, {} void)",
        output_path.display(),
        elevations.len(),
        unavailable
    );
    Ok(())
}

/// A parsed input CSV.
struct CoordinateTable {
    headers: csv::StringRecord,
    records: Vec<csv::StringRecord>,
    points: Vec<LocationData>,
}

fn read_csv(input: impl Read, lat_col: &str, lon_col: &str) -> Result<CoordinateTable> {
    let mut reader = csv::Reader::from_reader(input);

    let headers = reader.headers()?.clone();
    let lat_idx = headers
        .iter()
        .position(|h| h == lat_col)
        .with_context(|| format!("Column '{}' not found in CSV", lat_col))?;
    let lon_idx = headers
        .iter()
        .position(|h| h == lon_col)
        .with_context(|| format!("Column '{}' not found in CSV", lon_col))?;

    let records: Vec<_> = reader.records().collect::<Result<_, _>>()?;
    let points = records
        .iter()
        .enumerate()
        .map(|(i, record)| -> Result<LocationData> {
            // Line 1 is the header
            let line = i + 2;
            let lat: f64 = record
                .get(lat_idx)
                .with_context(|| format!("Missing latitude on line {}", line))?
                .trim()
                .parse()
                .with_context(|| format!("Invalid latitude on line {}", line))?;
            let lon: f64 = record
                .get(lon_idx)
                .with_context(|| format!("Missing longitude on line {}", line))?
                .trim()
                .parse()
                .with_context(|| format!("Invalid longitude on line {}", line))?;
            Ok(LocationData::new(lat, lon))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CoordinateTable {
        headers,
        records,
        points,
    })
}

async fn fetch_with_progress(
    service: &ElevationService,
    points: &[LocationData],
) -> Result<Vec<Option<f64>>> {
    let pb = ProgressBar::new(points.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )?
            .progress_chars("#>-"),
    );

    let mut elevations = Vec::with_capacity(points.len());
    for chunk in points.chunks(CHUNK_SIZE) {
        elevations.extend(service.fetch_elevations(chunk).await);
        pb.inc(chunk.len() as u64);
    }

    pb.finish_with_message("done");
    Ok(elevations)
}

fn write_csv(output: impl Write, table: &CoordinateTable, elevations: &[Option<f64>]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(output);

    let mut headers: Vec<&str> = table.headers.iter().collect();
    headers.push("elevation");
    writer.write_record(&headers)?;

    for (record, elevation) in table.records.iter().zip(elevations) {
        let elevation = format_elevation(*elevation);
        let mut row: Vec<&str> = record.iter().collect();
        row.push(&elevation);
        writer.write_record(&row)?;
    }

    writer.flush()?;
    Ok(())
}

fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "points".to_string());
    input.with_file_name(format!("{}_elevation.csv", stem))
}
