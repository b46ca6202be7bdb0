use std::fmt;

use serde::{Deserialize, Serialize};

/// One text region as reported by an OCR engine, in engine order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRegion {
    pub text: String,
    pub confidence: Option<f32>,
}

impl TextRegion {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            confidence: None,
        }
    }
}

/// OCR output for one region with the value derived from it, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub raw_text: String,
    pub value: Option<u64>,
}

/// An accepted reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: u64,
    pub value: u64,
}

impl Observation {
    pub fn new(timestamp: u64, value: u64) -> Self {
        Self { timestamp, value }
    }
}

/// Observations ordered by timestamp with at most one entry per timestamp.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Series(Vec<Observation>);

impl Series {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stable-sort by timestamp and keep the first observation for each
    /// timestamp, so input order decides ties.
    pub fn from_observations(observations: impl IntoIterator<Item = Observation>) -> Self {
        let mut observations: Vec<Observation> = observations.into_iter().collect();
        observations.sort_by_key(|obs| obs.timestamp);
        observations.dedup_by_key(|obs| obs.timestamp);
        Self(observations)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Observation> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Observation] {
        &self.0
    }

    pub fn get(&self, timestamp: u64) -> Option<&Observation> {
        self.0
            .binary_search_by_key(&timestamp, |obs| obs.timestamp)
            .ok()
            .map(|idx| &self.0[idx])
    }

    pub fn into_vec(self) -> Vec<Observation> {
        self.0
    }
}

impl<'a> IntoIterator for &'a Series {
    type Item = &'a Observation;
    type IntoIter = std::slice::Iter<'a, Observation>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Why a sample slot contributed no observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    NoFrameDecoded,
    NoValidDigits,
    DuplicateTimestamp,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DropReason::NoFrameDecoded => "no frame decoded",
            DropReason::NoValidDigits => "no valid digits recognized",
            DropReason::DuplicateTimestamp => "duplicate timestamp",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub timestamp: u64,
    pub reason: DropReason,
    pub detail: Option<String>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s: {}", self.timestamp, self.reason)?;
        if let Some(detail) = &self.detail {
            write!(f, " ({detail})")?;
        }
        Ok(())
    }
}

/// What happened to a single sample slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SlotReading {
    DecodeFailed { reason: String },
    EngineFailed { reason: String },
    Recognized { candidates: Vec<Candidate> },
}

/// Per-slot result handed to the assembler. `sequence` is the position of
/// the slot in sampling order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotOutcome {
    pub sequence: usize,
    pub timestamp: u64,
    pub reading: SlotReading,
}

impl SlotOutcome {
    pub fn new(sequence: usize, timestamp: u64, reading: SlotReading) -> Self {
        Self {
            sequence,
            timestamp,
            reading,
        }
    }
}

/// Terminal output of a pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractionReport {
    pub series: Series,
    pub diagnostics: Vec<Diagnostic>,
    pub requested_slots: usize,
    pub cancelled: bool,
    /// Slots never attempted because the run was cancelled.
    pub abandoned: Vec<u64>,
}

impl ExtractionReport {
    /// An empty series means nothing was recognized; it is not a failure.
    pub fn no_digits_recognized(&self) -> bool {
        self.series.is_empty()
    }

    pub fn dropped(&self, reason: DropReason) -> impl Iterator<Item = &Diagnostic> + '_ {
        self.diagnostics.iter().filter(move |d| d.reason == reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Small LCG so the multiset test needs no extra dependency.
    fn scramble(seed: &mut u64) -> u64 {
        *seed = seed
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        *seed >> 33
    }

    #[test]
    fn series_is_sorted_and_unique_for_any_multiset() {
        let mut seed = 7;
        for round in 0..200 {
            let len = (scramble(&mut seed) % 30) as usize;
            let input: Vec<Observation> = (0..len)
                .map(|_| Observation::new(scramble(&mut seed) % 12, scramble(&mut seed) % 100))
                .collect();
            let series = Series::from_observations(input.clone());
            let stamps: Vec<u64> = series.iter().map(|o| o.timestamp).collect();
            assert!(
                stamps.windows(2).all(|w| w[0] < w[1]),
                "round {round}: {stamps:?}"
            );
            for obs in series.iter() {
                let first = input
                    .iter()
                    .find(|o| o.timestamp == obs.timestamp)
                    .expect("timestamp came from input");
                assert_eq!(first, obs, "first occurrence wins");
            }
        }
    }

    #[test]
    fn lookup_by_timestamp() {
        let series = Series::from_observations([
            Observation::new(4, 21),
            Observation::new(0, 19),
            Observation::new(2, 20),
        ]);
        assert_eq!(series.get(2).map(|o| o.value), Some(20));
        assert!(series.get(3).is_none());
        assert_eq!(series.len(), 3);
    }

    #[test]
    fn diagnostic_display() {
        let diag = Diagnostic {
            timestamp: 6,
            reason: DropReason::NoFrameDecoded,
            detail: Some("end of stream".into()),
        };
        assert_eq!(diag.to_string(), "6s: no frame decoded (end of stream)");
        let diag = Diagnostic {
            timestamp: 8,
            reason: DropReason::NoValidDigits,
            detail: None,
        };
        assert_eq!(diag.to_string(), "8s: no valid digits recognized");
    }

    #[test]
    fn series_serializes_as_plain_list() {
        let series = Series::from_observations([Observation::new(0, 98)]);
        let json = serde_json::to_string(&series).expect("serialize series");
        assert_eq!(json, r#"[{"timestamp":0,"value":98}]"#);
    }
}
