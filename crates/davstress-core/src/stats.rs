//! Online min/max/mean/variance accumulator, bucketed by HTTP status class.
//!
//! Grounded on `http_stats.c`/`lib/http_stats.h` from the original C
//! implementation: Welford's recurrence for mean and sum-of-squared
//! deviations, five status buckets, seven timing fields.

use std::fmt;

/// One of the seven per-request timing fields tracked per bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Dns,
    TcpConnect,
    TlsHandshake,
    PreTransfer,
    FirstResponseByte,
    TotalTime,
    ContentBytes,
}

impl Field {
    pub const ALL: [Field; 7] = [
        Field::Dns,
        Field::TcpConnect,
        Field::TlsHandshake,
        Field::PreTransfer,
        Field::FirstResponseByte,
        Field::TotalTime,
        Field::ContentBytes,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Field::Dns => "dns",
            Field::TcpConnect => "tcpConnect",
            Field::TlsHandshake => "tlsHandshake",
            Field::PreTransfer => "preTransfer",
            Field::FirstResponseByte => "firstResponseByte",
            Field::TotalTime => "totalTime",
            Field::ContentBytes => "contentBytes",
        }
    }

    fn index(self) -> usize {
        match self {
            Field::Dns => 0,
            Field::TcpConnect => 1,
            Field::TlsHandshake => 2,
            Field::PreTransfer => 3,
            Field::FirstResponseByte => 4,
            Field::TotalTime => 5,
            Field::ContentBytes => 6,
        }
    }
}

/// Raw per-request timing measurements, seconds except `content_bytes`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Timings {
    pub dns: f64,
    pub tcp_connect: f64,
    pub tls_handshake: f64,
    pub pre_transfer: f64,
    pub first_response_byte: f64,
    pub total_time: f64,
    pub content_bytes: f64,
}

impl Timings {
    fn field(&self, field: Field) -> f64 {
        match field {
            Field::Dns => self.dns,
            Field::TcpConnect => self.tcp_connect,
            Field::TlsHandshake => self.tls_handshake,
            Field::PreTransfer => self.pre_transfer,
            Field::FirstResponseByte => self.first_response_byte,
            Field::TotalTime => self.total_time,
            Field::ContentBytes => self.content_bytes,
        }
    }
}

/// Status bucket an observation is filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    All,
    Status2xx,
    Status3xx,
    Status4xx,
    Status5xx,
}

impl Bucket {
    pub const ALL: [Bucket; 5] = [
        Bucket::All,
        Bucket::Status2xx,
        Bucket::Status3xx,
        Bucket::Status4xx,
        Bucket::Status5xx,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Bucket::All => "all",
            Bucket::Status2xx => "2XX",
            Bucket::Status3xx => "3XX",
            Bucket::Status4xx => "4XX",
            Bucket::Status5xx => "5XX",
        }
    }

    /// Maps an HTTP status to the class-specific bucket, or `None` if the
    /// status is outside `[200, 600)`.
    fn from_status(status: u16) -> Option<Bucket> {
        if !(200..600).contains(&status) {
            return None;
        }
        match (status / 100) - 2 {
            0 => Some(Bucket::Status2xx),
            1 => Some(Bucket::Status3xx),
            2 => Some(Bucket::Status4xx),
            3 => Some(Bucket::Status5xx),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Accumulator {
    count: u64,
    min: f64,
    max: f64,
    mean: f64,
    sum_sq_dev: f64,
}

impl Accumulator {
    fn reset() -> Self {
        Accumulator {
            count: 0,
            min: f64::MAX,
            max: f64::MIN,
            mean: 0.0,
            sum_sq_dev: 0.0,
        }
    }

    /// Welford update: count is incremented first, then the recurrence uses
    /// the new count. This matches `http_stats_update` in the original C.
    fn update(&mut self, value: f64) {
        self.count += 1;
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = value - self.mean;
        self.sum_sq_dev += delta * delta2;
    }

    fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.sum_sq_dev / (self.count - 1) as f64
        }
    }
}

/// A point-in-time read of one (bucket, field) cell.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Snapshot {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub variance: f64,
    pub stddev: f64,
}

/// Online accumulator for one HTTP method: five buckets x seven fields.
#[derive(Debug, Clone)]
pub struct Stats {
    cells: [[Accumulator; 7]; 5],
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    pub fn new() -> Self {
        Stats {
            cells: [[Accumulator::reset(); 7]; 5],
        }
    }

    fn bucket_index(bucket: Bucket) -> usize {
        match bucket {
            Bucket::All => 0,
            Bucket::Status2xx => 1,
            Bucket::Status3xx => 2,
            Bucket::Status4xx => 3,
            Bucket::Status5xx => 4,
        }
    }

    /// Records one completed request. Timing fields other than
    /// `content_bytes` are converted from seconds to milliseconds. Silently
    /// does nothing if `status` is outside `[200, 600)`.
    pub fn update(&mut self, timings: &Timings, status: u16) {
        let Some(bucket) = Bucket::from_status(status) else {
            return;
        };
        for field in Field::ALL {
            let raw = timings.field(field);
            let value = if matches!(field, Field::ContentBytes) {
                raw
            } else {
                raw * 1000.0
            };
            self.cells[0][field.index()].update(value);
            self.cells[Self::bucket_index(bucket)][field.index()].update(value);
        }
    }

    pub fn snapshot(&self, bucket: Bucket, field: Field) -> Snapshot {
        let acc = &self.cells[Self::bucket_index(bucket)][field.index()];
        if acc.count == 0 {
            return Snapshot::default();
        }
        let variance = acc.variance();
        Snapshot {
            count: acc.count,
            min: acc.min,
            max: acc.max,
            mean: acc.mean,
            variance,
            stddev: variance.sqrt(),
        }
    }

    pub fn reset(&mut self) {
        self.cells = [[Accumulator::reset(); 7]; 5];
    }

    pub fn is_empty(&self) -> bool {
        self.cells[0].iter().all(|acc| acc.count == 0)
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.count == 0 {
            write!(f, "n/a")
        } else {
            write!(f, "{:.3}", self.mean)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_from_status() {
        assert_eq!(Bucket::from_status(200), Some(Bucket::Status2xx));
        assert_eq!(Bucket::from_status(301), Some(Bucket::Status3xx));
        assert_eq!(Bucket::from_status(404), Some(Bucket::Status4xx));
        assert_eq!(Bucket::from_status(503), Some(Bucket::Status5xx));
        assert_eq!(Bucket::from_status(199), None);
        assert_eq!(Bucket::from_status(600), None);
    }

    #[test]
    fn out_of_range_status_not_counted() {
        let mut stats = Stats::new();
        stats.update(&Timings::default(), 700);
        assert!(stats.is_empty());
    }

    #[test]
    fn mean_and_variance_match_closed_form() {
        let mut stats = Stats::new();
        let samples = [1.0, 2.0, 3.0];
        for &s in &samples {
            stats.update(
                &Timings {
                    total_time: s / 1000.0,
                    ..Default::default()
                },
                200,
            );
        }
        let snap = stats.snapshot(Bucket::Status2xx, Field::TotalTime);
        assert_eq!(snap.count, 3);
        assert!((snap.mean - 2.0).abs() < 1e-9);
        // sum((x-mean)^2) = 1+0+1 = 2, /(n-1) = 1.0
        assert!((snap.variance - 1.0).abs() < 1e-9);
        assert!((snap.stddev - 1.0).abs() < 1e-9);
        assert!(snap.min <= snap.mean && snap.mean <= snap.max);
    }

    #[test]
    fn all_bucket_accumulates_every_status_class() {
        let mut stats = Stats::new();
        stats.update(&Timings::default(), 200);
        stats.update(&Timings::default(), 404);
        let snap = stats.snapshot(Bucket::All, Field::TotalTime);
        assert_eq!(snap.count, 2);
    }

    #[test]
    fn reset_clears_counts_and_resets_min_sentinel() {
        let mut stats = Stats::new();
        stats.update(&Timings::default(), 200);
        stats.reset();
        assert!(stats.is_empty());
        let snap = stats.snapshot(Bucket::Status2xx, Field::TotalTime);
        assert_eq!(snap.count, 0);
    }

    #[test]
    fn single_sample_has_zero_variance_reported() {
        let mut stats = Stats::new();
        stats.update(&Timings::default(), 200);
        let snap = stats.snapshot(Bucket::Status2xx, Field::TotalTime);
        assert_eq!(snap.count, 1);
        assert_eq!(snap.variance, 0.0);
    }
}
