//! Metrics sink boundary.
//!
//! All instrumentation flows through `MetricsEvent` and `MetricsSink`.
//! Events are only recorded for mutations that commit.

///
/// ExecKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExecKind {
    Create,
    Update,
    Delete,
}

///
/// MetricsEvent
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MetricsEvent<'a> {
    Exec {
        kind: ExecKind,
        entity: &'a str,
        rows_touched: u64,
    },
    Cascade {
        entity: &'a str,
        rows_deleted: u64,
    },
    IndexDelta {
        entity: &'a str,
        inserts: u64,
        removes: u64,
    },
    RowsScanned {
        entity: &'a str,
        rows_scanned: u64,
    },
}

///
/// MetricsSink
///

pub trait MetricsSink {
    fn record(&self, event: MetricsEvent<'_>);
}
