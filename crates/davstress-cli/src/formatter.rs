//! Renders a method's stats snapshot as a fixed-width table, CSV, or TSV.
//!
//! Grounded on `http_stats_print`/`http_stats_fprint`'s format/flags enums
//! in `lib/http_stats.h`: three formats, a `showAll` flag that controls
//! whether zero-count buckets are omitted from the table.

use std::io::Write;

use davstress_core::{Bucket, Field, Stats};

use crate::config::StatsFormat;

/// Writes one method's full `bucket x field` snapshot to `out`.
pub fn write_stats(
    out: &mut (impl Write + ?Sized),
    format: StatsFormat,
    show_all: bool,
    method_label: &str,
    stats: &Stats,
) -> Result<(), anyhow::Error> {
    match format {
        StatsFormat::Table => write_table(out, show_all, method_label, stats),
        StatsFormat::Csv => write_delimited(out, ',', method_label, stats),
        StatsFormat::Tsv => write_delimited(out, '\t', method_label, stats),
    }
}

fn write_table(
    out: &mut (impl Write + ?Sized),
    show_all: bool,
    method_label: &str,
    stats: &Stats,
) -> Result<(), anyhow::Error> {
    writeln!(out, "~~~~ {method_label} ~~~~")?;
    writeln!(
        out,
        "{:<10} {:>18} {:>10} {:>12} {:>12} {:>12} {:>12}",
        "bucket", "field", "#req", "min", "max", "avg", "stddev"
    )?;
    for bucket in Bucket::ALL {
        let mut any = false;
        for field in Field::ALL {
            let snap = stats.snapshot(bucket, field);
            if snap.count == 0 && !show_all {
                continue;
            }
            any = true;
            writeln!(
                out,
                "{:<10} {:>18} {:>10} {:>12.3} {:>12.3} {:>12.3} {:>12.3}",
                bucket.label(),
                field.label(),
                snap.count,
                snap.min,
                snap.max,
                snap.mean,
                snap.stddev,
            )?;
        }
        if !any {
            continue;
        }
    }
    Ok(())
}

fn write_delimited(
    out: &mut (impl Write + ?Sized),
    delim: char,
    method_label: &str,
    stats: &Stats,
) -> Result<(), anyhow::Error> {
    write!(out, "method{delim}bucket{delim}field{delim}count{delim}min{delim}max{delim}mean{delim}variance{delim}stddev")?;
    writeln!(out)?;
    for bucket in Bucket::ALL {
        for field in Field::ALL {
            let snap = stats.snapshot(bucket, field);
            writeln!(
                out,
                "{}{delim}{}{delim}{}{delim}{}{delim}{}{delim}{}{delim}{}{delim}{}{delim}{}",
                method_label,
                bucket.label(),
                field.label(),
                snap.count,
                snap.min,
                snap.max,
                snap.mean,
                snap.variance,
                snap.stddev,
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use davstress_core::Timings;

    #[test]
    fn table_omits_zero_count_buckets_by_default() {
        let mut stats = Stats::new();
        stats.update(&Timings::default(), 200);
        let mut buf = Vec::new();
        write_stats(&mut buf, StatsFormat::Table, false, "GET", &stats).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(!text.contains("5XX"));
        assert!(text.contains("2XX") || text.contains("all"));
    }

    #[test]
    fn show_all_includes_zero_count_buckets() {
        let stats = Stats::new();
        let mut buf = Vec::new();
        write_stats(&mut buf, StatsFormat::Table, true, "GET", &stats).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("5XX"));
    }

    #[test]
    fn csv_round_trips_count_to_six_significant_digits() {
        let mut stats = Stats::new();
        for v in [1.0, 2.0, 3.0] {
            stats.update(
                &Timings {
                    total_time: v / 1000.0,
                    ..Default::default()
                },
                200,
            );
        }
        let mut buf = Vec::new();
        write_stats(&mut buf, StatsFormat::Csv, true, "GET", &stats).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let row = text
            .lines()
            .find(|l| l.starts_with("GET,2XX,totalTime,"))
            .expect("totalTime row present");
        let fields: Vec<&str> = row.split(',').collect();
        assert_eq!(fields[3], "3");
        let mean: f64 = fields[6].parse().unwrap();
        assert!((mean - 2.0).abs() < 1e-6);
    }
}
