//! Per-partition state record
//!
//! The record is stored as a JSON object in the `vbstate` sub-store:
//!
//! ```text
//! {"state":"active","checkpoint_id":"12","max_deleted_seqno":"40",
//!  "failover_table":[{"id":0,"seq":0}],"snap_start":"0","snap_end":"55",
//!  "max_cas":"1700000000000","drift_counter":"-140737488355328"}
//! ```
//!
//! Integers are string-encoded. `state`, `checkpoint_id` and
//! `max_deleted_seqno` are mandatory; everything else falls back to its
//! default when absent or unparsable.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Drift counter value meaning "no drift tracked" (lowest 48-bit signed).
pub const INITIAL_DRIFT: i64 = -140_737_488_355_328;

/// Partition lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Active,
    Replica,
    Pending,
    #[default]
    Dead,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Replica => "replica",
            Self::Pending => "pending",
            Self::Dead => "dead",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LifecycleState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "replica" => Ok(Self::Replica),
            "pending" => Ok(Self::Pending),
            "dead" => Ok(Self::Dead),
            other => Err(format!("unknown partition state '{}'", other)),
        }
    }
}

/// One failover history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FailoverEntry {
    pub id: u64,
    pub seq: u64,
}

/// Persisted state of one partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionState {
    pub state: LifecycleState,
    pub checkpoint_id: u64,
    pub max_deleted_seqno: u64,
    /// Start of the last committed snapshot window
    pub snap_start: u64,
    /// End of the last committed snapshot window
    pub snap_end: u64,
    /// CAS high-water mark
    pub max_cas: u64,
    pub drift_counter: i64,
    /// Oldest first, never empty
    pub failover_history: Vec<FailoverEntry>,
}

impl Default for PartitionState {
    fn default() -> Self {
        Self {
            state: LifecycleState::Dead,
            checkpoint_id: 0,
            max_deleted_seqno: 0,
            snap_start: 0,
            snap_end: 0,
            max_cas: 0,
            drift_counter: INITIAL_DRIFT,
            failover_history: default_failover_history(),
        }
    }
}

fn default_failover_history() -> Vec<FailoverEntry> {
    vec![FailoverEntry { id: 0, seq: 0 }]
}

/// Outcome of decoding a persisted record that was valid JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedState {
    /// Mandatory fields present and parsed
    Parsed(PartitionState),
    /// Mandatory fields missing or unparsable; defaults apply
    Malformed(String),
}

#[derive(Serialize)]
struct PersistedState<'a> {
    state: &'a str,
    checkpoint_id: String,
    max_deleted_seqno: String,
    failover_table: &'a [FailoverEntry],
    snap_start: String,
    snap_end: String,
    max_cas: String,
    drift_counter: String,
}

impl PartitionState {
    /// A state in `state` with every other field defaulted.
    pub fn with_lifecycle(state: LifecycleState) -> Self {
        Self {
            state,
            ..Self::default()
        }
    }

    /// Serialize to the persisted JSON shape.
    pub fn to_json(&self) -> String {
        let persisted = PersistedState {
            state: self.state.as_str(),
            checkpoint_id: self.checkpoint_id.to_string(),
            max_deleted_seqno: self.max_deleted_seqno.to_string(),
            failover_table: &self.failover_history,
            snap_start: self.snap_start.to_string(),
            snap_end: self.snap_end.to_string(),
            max_cas: self.max_cas.to_string(),
            drift_counter: self.drift_counter.to_string(),
        };
        // Only strings, integers and fixed keys: serialization cannot fail.
        serde_json::to_string(&persisted).unwrap_or_default()
    }

    /// Decode a persisted record.
    ///
    /// Returns `Err` with the parser message when `body` is not JSON at all.
    pub fn decode(body: &[u8]) -> Result<DecodedState, String> {
        let value: Value = serde_json::from_slice(body).map_err(|e| e.to_string())?;

        let object = match value.as_object() {
            Some(object) => object,
            None => return Ok(DecodedState::Malformed("record is not a JSON object".to_string())),
        };

        let string_field = |name: &str| object.get(name).and_then(Value::as_str);

        let (state, checkpoint_id, max_deleted_seqno) = match (
            string_field("state"),
            string_field("checkpoint_id"),
            string_field("max_deleted_seqno"),
        ) {
            (Some(state), Some(checkpoint_id), Some(max_deleted_seqno)) => {
                (state, checkpoint_id, max_deleted_seqno)
            }
            _ => {
                return Ok(DecodedState::Malformed(
                    "missing state, checkpoint_id or max_deleted_seqno".to_string(),
                ))
            }
        };

        let state = match state.parse::<LifecycleState>() {
            Ok(state) => state,
            Err(reason) => return Ok(DecodedState::Malformed(reason)),
        };
        let checkpoint_id = match checkpoint_id.parse::<u64>() {
            Ok(id) => id,
            Err(e) => return Ok(DecodedState::Malformed(format!("checkpoint_id: {}", e))),
        };
        let max_deleted_seqno = match max_deleted_seqno.parse::<u64>() {
            Ok(seqno) => seqno,
            Err(e) => {
                return Ok(DecodedState::Malformed(format!("max_deleted_seqno: {}", e)))
            }
        };

        let mut decoded = PartitionState {
            state,
            checkpoint_id,
            max_deleted_seqno,
            ..PartitionState::default()
        };

        if let Some(v) = string_field("snap_start").and_then(|s| s.parse().ok()) {
            decoded.snap_start = v;
        }
        if let Some(v) = string_field("snap_end").and_then(|s| s.parse().ok()) {
            decoded.snap_end = v;
        }
        if let Some(v) = string_field("max_cas").and_then(|s| s.parse().ok()) {
            decoded.max_cas = v;
        }
        if let Some(v) = string_field("drift_counter").and_then(|s| s.parse().ok()) {
            decoded.drift_counter = v;
        }
        if let Some(table) = object.get("failover_table") {
            if let Ok(history) = serde_json::from_value::<Vec<FailoverEntry>>(table.clone()) {
                if !history.is_empty() {
                    decoded.failover_history = history;
                }
            }
        }

        Ok(DecodedState::Parsed(decoded))
    }

    /// Fold a committed snapshot window into the state.
    ///
    /// The CAS high-water mark never moves backwards.
    pub fn apply_snapshot(&mut self, snap_start: u64, snap_end: u64, max_cas: u64, drift_counter: i64) {
        self.snap_start = snap_start;
        self.snap_end = snap_end;
        self.max_cas = self.max_cas.max(max_cas);
        self.drift_counter = drift_counter;
    }

    /// Raise `max_deleted_seqno` to `by_seqno` if it is higher.
    pub fn record_deletion(&mut self, by_seqno: u64) {
        self.max_deleted_seqno = self.max_deleted_seqno.max(by_seqno);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populated() -> PartitionState {
        PartitionState {
            state: LifecycleState::Active,
            checkpoint_id: 12,
            max_deleted_seqno: 40,
            snap_start: 50,
            snap_end: 55,
            max_cas: 1_700_000_000_000,
            drift_counter: -3,
            failover_history: vec![
                FailoverEntry { id: 0, seq: 0 },
                FailoverEntry { id: 0xabcdef, seq: 30 },
            ],
        }
    }

    #[test]
    fn test_default_state() {
        let state = PartitionState::default();
        assert_eq!(state.state, LifecycleState::Dead);
        assert_eq!(state.checkpoint_id, 0);
        assert_eq!(state.max_deleted_seqno, 0);
        assert_eq!(state.drift_counter, INITIAL_DRIFT);
        assert_eq!(state.failover_history, vec![FailoverEntry { id: 0, seq: 0 }]);
    }

    #[test]
    fn test_json_shape() {
        let json: Value = serde_json::from_str(&populated().to_json()).unwrap();

        assert_eq!(json["state"], "active");
        assert_eq!(json["checkpoint_id"], "12");
        assert_eq!(json["max_deleted_seqno"], "40");
        assert_eq!(json["snap_start"], "50");
        assert_eq!(json["snap_end"], "55");
        assert_eq!(json["max_cas"], "1700000000000");
        assert_eq!(json["drift_counter"], "-3");
        assert_eq!(json["failover_table"][1]["id"], 0xabcdef);
        assert_eq!(json["failover_table"][1]["seq"], 30);
    }

    #[test]
    fn test_decode_roundtrip() {
        let state = populated();
        let decoded = PartitionState::decode(state.to_json().as_bytes()).unwrap();
        assert_eq!(decoded, DecodedState::Parsed(state));
    }

    #[test]
    fn test_decode_invalid_json_is_error() {
        assert!(PartitionState::decode(b"{\"state\": ").is_err());
    }

    #[test]
    fn test_decode_missing_mandatory_is_malformed() {
        let decoded = PartitionState::decode(br#"{"state":"active","checkpoint_id":"1"}"#).unwrap();
        assert!(matches!(decoded, DecodedState::Malformed(_)));
    }

    #[test]
    fn test_decode_non_string_mandatory_is_malformed() {
        let body = br#"{"state":"active","checkpoint_id":1,"max_deleted_seqno":"0"}"#;
        assert!(matches!(
            PartitionState::decode(body).unwrap(),
            DecodedState::Malformed(_)
        ));
    }

    #[test]
    fn test_decode_unknown_lifecycle_is_malformed() {
        let body = br#"{"state":"zombie","checkpoint_id":"1","max_deleted_seqno":"0"}"#;
        assert!(matches!(
            PartitionState::decode(body).unwrap(),
            DecodedState::Malformed(_)
        ));
    }

    #[test]
    fn test_decode_optional_fields_default() {
        let body = br#"{"state":"replica","checkpoint_id":"3","max_deleted_seqno":"9","max_cas":"oops","failover_table":[]}"#;
        let decoded = match PartitionState::decode(body).unwrap() {
            DecodedState::Parsed(state) => state,
            other => panic!("unexpected {:?}", other),
        };

        assert_eq!(decoded.state, LifecycleState::Replica);
        assert_eq!(decoded.checkpoint_id, 3);
        assert_eq!(decoded.max_deleted_seqno, 9);
        assert_eq!(decoded.max_cas, 0);
        assert_eq!(decoded.snap_end, 0);
        assert_eq!(decoded.drift_counter, INITIAL_DRIFT);
        assert_eq!(decoded.failover_history, vec![FailoverEntry { id: 0, seq: 0 }]);
    }

    #[test]
    fn test_apply_snapshot_keeps_cas_high_water_mark() {
        let mut state = populated();
        state.apply_snapshot(60, 70, 5, 11);
        assert_eq!(state.snap_start, 60);
        assert_eq!(state.snap_end, 70);
        assert_eq!(state.max_cas, 1_700_000_000_000);
        assert_eq!(state.drift_counter, 11);
    }

    #[test]
    fn test_record_deletion_is_monotonic() {
        let mut state = populated();
        state.record_deletion(10);
        assert_eq!(state.max_deleted_seqno, 40);
        state.record_deletion(41);
        assert_eq!(state.max_deleted_seqno, 41);
    }

    #[test]
    fn test_lifecycle_parse() {
        assert_eq!("pending".parse::<LifecycleState>(), Ok(LifecycleState::Pending));
        assert!("".parse::<LifecycleState>().is_err());
    }
}
