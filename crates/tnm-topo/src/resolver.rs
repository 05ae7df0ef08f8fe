//! Record normalization and deduplication.

use crate::index::IndexRecord;
use crate::quad::QuadrangleKey;
use std::collections::HashSet;
use tnm_common::{ProgressEvent, ProgressSink};
use tnm_metrics::{metric_defs, metrics};
use tracing::warn;

/// Lazy dedup fold over index records.
///
/// Yields each distinct [`QuadrangleKey`] once, in first-seen order. Records
/// that cannot be normalized are reported to the sink and skipped; repeats of
/// a key already yielded are skipped silently. Created by [`resolve`].
pub struct Resolve<'a, I> {
    records: I,
    seen: HashSet<QuadrangleKey>,
    sink: &'a dyn ProgressSink,
    records_seen: usize,
    skipped_invalid: usize,
}

/// Normalize and deduplicate a record stream.
pub fn resolve<'a, I>(records: I, sink: &'a dyn ProgressSink) -> Resolve<'a, I::IntoIter>
where
    I: IntoIterator<Item = IndexRecord>,
{
    Resolve {
        records: records.into_iter(),
        seen: HashSet::new(),
        sink,
        records_seen: 0,
        skipped_invalid: 0,
    }
}

impl<I> Resolve<'_, I> {
    /// Records pulled from the source so far.
    pub fn records_seen(&self) -> usize {
        self.records_seen
    }

    /// Records rejected by normalization so far.
    pub fn skipped_invalid(&self) -> usize {
        self.skipped_invalid
    }

    /// Distinct keys yielded so far.
    pub fn unique_keys(&self) -> usize {
        self.seen.len()
    }
}

impl<I> Iterator for Resolve<'_, I>
where
    I: Iterator<Item = IndexRecord>,
{
    type Item = QuadrangleKey;

    fn next(&mut self) -> Option<QuadrangleKey> {
        loop {
            let record = self.records.next()?;
            self.records_seen += 1;

            match QuadrangleKey::from_fields(&record.cell_name, record.state_alpha.as_deref()) {
                Ok(key) => {
                    if self.seen.insert(key.clone()) {
                        return Some(key);
                    }
                }
                Err(reason) => {
                    self.skipped_invalid += 1;
                    metrics::counter!(metric_defs::RECORDS_SKIPPED.name).increment(1);
                    warn!(cell_name = %record.cell_name, reason, "Skipping index record");
                    self.sink.emit(&ProgressEvent::RecordSkipped {
                        cell_name: record.cell_name,
                        reason: reason.to_string(),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tnm_common::{CollectingSink, NullSink};

    #[test]
    fn test_equivalent_records_dedup() {
        let records = vec![
            IndexRecord::new("Foo Bar", Some("NE,SD")),
            IndexRecord::new("Foo_Bar", Some("ne")),
            IndexRecord::new("Foo Bar", Some("SD")),
        ];

        let mut resolver = resolve(records, &NullSink);
        let keys: Vec<String> = resolver.by_ref().map(|k| k.to_string()).collect();

        assert_eq!(keys, vec!["Foo_Bar_NE", "Foo_Bar_SD"]);
        assert_eq!(resolver.records_seen(), 3);
        assert_eq!(resolver.unique_keys(), 2);
        assert_eq!(resolver.skipped_invalid(), 0);
    }

    #[test]
    fn test_empty_state_skipped_with_diagnostic() {
        let records = vec![
            IndexRecord::new("Hill City", Some("SD")),
            IndexRecord::new("Nowhere", Some("")),
            IndexRecord::new("Nullstate", None),
            IndexRecord::new("Custer", Some("SD")),
        ];
        let sink = CollectingSink::new();

        let mut resolver = resolve(records, &sink);
        let keys: Vec<QuadrangleKey> = resolver.by_ref().collect();

        assert_eq!(keys.len(), 2);
        assert_eq!(keys[1].quad_name(), "Custer");
        assert_eq!(resolver.unique_keys(), 2);
        assert_eq!(resolver.skipped_invalid(), 2);
        assert_eq!(resolver.records_seen(), 4);
        assert_eq!(
            sink.events()
                .iter()
                .filter_map(|e| match e {
                    ProgressEvent::RecordSkipped { cell_name, .. } => Some(cell_name.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>(),
            vec!["Nowhere", "Nullstate"]
        );
    }

    #[test]
    fn test_skip_reason_names_the_field() {
        let records = vec![
            IndexRecord::new("   ", Some("SD")),
            IndexRecord::new("Custer", Some(" , SD")),
        ];
        let sink = CollectingSink::new();

        assert_eq!(resolve(records, &sink).count(), 0);
        let reasons: Vec<String> = sink
            .events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::RecordSkipped { reason, .. } => Some(reason),
                _ => None,
            })
            .collect();
        assert_eq!(reasons, vec!["cell name is empty", "state field is empty"]);
    }

    #[test]
    fn test_resolve_is_lazy() {
        let records = (0..).map(|i| IndexRecord::new(format!("Quad {}", i % 3), Some("SD")));
        let mut resolver = resolve(records, &NullSink);

        let first_three: Vec<QuadrangleKey> = resolver.by_ref().take(3).collect();
        assert_eq!(first_three.len(), 3);
        assert_eq!(resolver.records_seen(), 3);
    }
}
