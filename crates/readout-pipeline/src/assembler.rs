//! Folds per-slot outcomes into the final series.

use readout_types::reading::{
    Diagnostic, DropReason, ExtractionReport, Observation, Series, SlotOutcome, SlotReading,
};
use tracing::{debug, warn};

/// Collects slot outcomes in any order and produces a deterministic report.
///
/// Slots are ordered by `(timestamp, sequence)` before selection, so the
/// arrival order of concurrently processed frames never changes the result.
/// Per slot the first candidate with a value wins; for a repeated timestamp
/// the earliest sampled observation wins.
#[derive(Debug, Default)]
pub struct SeriesAssembler {
    slots: Vec<SlotOutcome>,
}

impl SeriesAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, slot: SlotOutcome) {
        self.slots.push(slot);
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn finish(self) -> ExtractionReport {
        let mut slots = self.slots;
        let requested_slots = slots.len();
        slots.sort_by_key(|slot| (slot.timestamp, slot.sequence));

        let mut accepted: Vec<Observation> = Vec::with_capacity(slots.len());
        let mut diagnostics = Vec::new();
        let mut drop_slot = |timestamp: u64, reason: DropReason, detail: Option<String>| {
            debug!("Dropping {}s: {}", timestamp, reason);
            diagnostics.push(Diagnostic {
                timestamp,
                reason,
                detail,
            });
        };

        for slot in slots {
            let timestamp = slot.timestamp;
            match slot.reading {
                SlotReading::DecodeFailed { reason } => {
                    drop_slot(timestamp, DropReason::NoFrameDecoded, Some(reason));
                }
                SlotReading::EngineFailed { reason } => {
                    drop_slot(timestamp, DropReason::NoValidDigits, Some(reason));
                }
                SlotReading::Recognized { candidates } => {
                    let Some(value) = candidates.iter().find_map(|c| c.value) else {
                        let detail = if candidates.is_empty() {
                            "no text recognized".to_string()
                        } else {
                            let raw: Vec<&str> =
                                candidates.iter().map(|c| c.raw_text.as_str()).collect();
                            format!("rejected {raw:?}")
                        };
                        drop_slot(timestamp, DropReason::NoValidDigits, Some(detail));
                        continue;
                    };

                    if accepted.last().map(|obs| obs.timestamp) == Some(timestamp) {
                        warn!("Discarding repeated reading {} at {}s", value, timestamp);
                        drop_slot(
                            timestamp,
                            DropReason::DuplicateTimestamp,
                            Some(format!("discarded value {value}")),
                        );
                        continue;
                    }
                    accepted.push(Observation::new(timestamp, value));
                }
            }
        }

        ExtractionReport {
            series: Series::from_observations(accepted),
            diagnostics,
            requested_slots,
            cancelled: false,
            abandoned: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use readout_types::reading::Candidate;

    fn recognized(sequence: usize, timestamp: u64, texts: &[(&str, Option<u64>)]) -> SlotOutcome {
        let candidates = texts
            .iter()
            .map(|(raw, value)| Candidate {
                raw_text: raw.to_string(),
                value: *value,
            })
            .collect();
        SlotOutcome::new(sequence, timestamp, SlotReading::Recognized { candidates })
    }

    fn assemble(slots: Vec<SlotOutcome>) -> ExtractionReport {
        let mut assembler = SeriesAssembler::with_capacity(slots.len());
        for slot in slots {
            assembler.push(slot);
        }
        assembler.finish()
    }

    #[test]
    fn first_valid_candidate_wins() {
        let report = assemble(vec![recognized(
            0,
            0,
            &[("98.6", None), ("'37)", Some(37)), ("40", Some(40))],
        )]);
        assert_eq!(report.series.as_slice(), &[Observation::new(0, 37)]);
        assert!(report.diagnostics.is_empty());
    }

    #[test]
    fn failures_become_diagnostics() {
        let report = assemble(vec![
            SlotOutcome::new(0, 0, SlotReading::DecodeFailed { reason: "eof".into() }),
            SlotOutcome::new(1, 2, SlotReading::EngineFailed { reason: "timeout".into() }),
            recognized(2, 4, &[]),
            recognized(3, 6, &[("abc", None)]),
            recognized(4, 8, &[("12", Some(12))]),
        ]);

        assert_eq!(report.series.as_slice(), &[Observation::new(8, 12)]);
        let reasons: Vec<(u64, DropReason)> = report
            .diagnostics
            .iter()
            .map(|d| (d.timestamp, d.reason))
            .collect();
        assert_eq!(
            reasons,
            vec![
                (0, DropReason::NoFrameDecoded),
                (2, DropReason::NoValidDigits),
                (4, DropReason::NoValidDigits),
                (6, DropReason::NoValidDigits),
            ]
        );
        assert_eq!(report.diagnostics[1].detail.as_deref(), Some("timeout"));
        assert_eq!(report.requested_slots, 5);
    }

    #[test]
    fn arrival_order_does_not_matter() {
        let slots = vec![
            recognized(0, 0, &[("20", Some(20))]),
            recognized(1, 2, &[("x", None)]),
            recognized(2, 4, &[("22", Some(22))]),
            SlotOutcome::new(3, 6, SlotReading::DecodeFailed { reason: "seek".into() }),
            recognized(4, 8, &[("24", Some(24))]),
        ];
        let baseline = assemble(slots.clone());

        let mut reversed = slots.clone();
        reversed.reverse();
        assert_eq!(assemble(reversed), baseline);

        let mut rotated = slots;
        rotated.rotate_left(2);
        assert_eq!(assemble(rotated), baseline);
    }

    #[test]
    fn repeated_timestamp_keeps_earliest_sample() {
        let report = assemble(vec![
            recognized(5, 4, &[("31", Some(31))]),
            recognized(2, 4, &[("30", Some(30))]),
            recognized(0, 0, &[("29", Some(29))]),
        ]);
        assert_eq!(
            report.series.as_slice(),
            &[Observation::new(0, 29), Observation::new(4, 30)]
        );
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.diagnostics[0].reason, DropReason::DuplicateTimestamp);
    }

    #[test]
    fn repeated_timestamp_after_failed_sample_is_accepted() {
        let report = assemble(vec![
            recognized(0, 4, &[("??", None)]),
            recognized(1, 4, &[("30", Some(30))]),
        ]);
        assert_eq!(report.series.as_slice(), &[Observation::new(4, 30)]);
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.diagnostics[0].reason, DropReason::NoValidDigits);
    }

    #[test]
    fn nothing_recognized_is_an_empty_series() {
        let report = assemble(vec![recognized(0, 0, &[]), recognized(1, 2, &[])]);
        assert!(report.no_digits_recognized());
        assert_eq!(report.diagnostics.len(), 2);

        let report = SeriesAssembler::new().finish();
        assert!(report.series.is_empty());
        assert!(report.diagnostics.is_empty());
    }
}
