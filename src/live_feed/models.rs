use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Provider tag stamped on every normalized match.
pub const PROVIDER: &str = "apisports";

/// The five sport verticals polled from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sport {
    Football,
    Basketball,
    Hockey,
    Volleyball,
    Baseball,
}

impl Sport {
    pub const ALL: [Sport; 5] = [
        Sport::Football,
        Sport::Basketball,
        Sport::Hockey,
        Sport::Volleyball,
        Sport::Baseball,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sport::Football => "football",
            Sport::Basketball => "basketball",
            Sport::Hockey => "hockey",
            Sport::Volleyball => "volleyball",
            Sport::Baseball => "baseball",
        }
    }

    /// Position in `Sport::ALL`, for per-sport fixed arrays.
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn parse(s: &str) -> Option<Sport> {
        Sport::ALL
            .into_iter()
            .find(|sport| sport.as_str().eq_ignore_ascii_case(s.trim()))
    }

    /// Fixed over/under line used when the provider does not price totals.
    pub fn total_line(&self) -> f64 {
        match self {
            Sport::Football => 2.5,
            Sport::Basketball => 220.5,
            Sport::Hockey => 5.5,
            Sport::Volleyball => 4.5,
            Sport::Baseball => 8.5,
        }
    }
}

impl fmt::Display for Sport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical match status. Serialized with the short codes consumers expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchStatus {
    #[serde(rename = "SOON")]
    Soon,
    #[serde(rename = "LIVE")]
    Live,
    #[serde(rename = "1H")]
    FirstHalf,
    #[serde(rename = "2H")]
    SecondHalf,
    #[serde(rename = "HT")]
    HalfTime,
    #[serde(rename = "ET")]
    ExtraTime,
    #[serde(rename = "P")]
    Penalties,
    #[serde(rename = "FINISHED")]
    Finished,
    #[serde(rename = "CANCELLED")]
    Cancelled,
    #[serde(rename = "POSTPONED")]
    Postponed,
    #[serde(rename = "SUSPENDED")]
    Suspended,
}

impl MatchStatus {
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            MatchStatus::Live
                | MatchStatus::FirstHalf
                | MatchStatus::SecondHalf
                | MatchStatus::HalfTime
                | MatchStatus::ExtraTime
                | MatchStatus::Penalties
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Odds {
    /// 1X2 prices; football only.
    pub home: Option<f64>,
    pub draw: Option<f64>,
    pub away: Option<f64>,
    pub over: f64,
    pub under: f64,
    pub total_line: f64,
}

/// One fixture in the canonical shape shared by every sport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedMatch {
    /// `<provider>-<sport>-<native id>`, stable across polls.
    pub id: String,
    pub sport: Sport,
    pub league: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub status: MatchStatus,
    pub home_team: String,
    pub away_team: String,
    pub home_score: i32,
    pub away_score: i32,
    pub odds: Option<Odds>,
    pub elapsed_minutes: i64,
    pub provider: String,
    /// Untouched provider record, kept for diagnostics.
    pub raw: serde_json::Value,
}

impl NormalizedMatch {
    pub fn match_id(sport: Sport, native_id: &str) -> String {
        format!("{}-{}-{}", PROVIDER, sport, native_id)
    }
}

pub type SportsMap = BTreeMap<Sport, Vec<NormalizedMatch>>;

/// Per sport, `#<index> <masked key>` → requests used today.
pub type QuotaReport = BTreeMap<Sport, BTreeMap<String, u32>>;

/// The published, immutable view of every sport.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub updated_at: DateTime<Utc>,
    pub sports: SportsMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quota: Option<QuotaReport>,
    /// Sports whose fetch failed in the cycle that produced this data.
    pub stale: Vec<Sport>,
}

impl Snapshot {
    pub fn empty(at: DateTime<Utc>) -> Self {
        Snapshot {
            updated_at: at,
            sports: empty_sports_map(),
            quota: None,
            stale: Vec::new(),
        }
    }
}

pub fn empty_sports_map() -> SportsMap {
    Sport::ALL.into_iter().map(|s| (s, Vec::new())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sport_parse_roundtrip() {
        for sport in Sport::ALL {
            assert_eq!(Sport::parse(sport.as_str()), Some(sport));
        }
        assert_eq!(Sport::parse("Hockey"), Some(Sport::Hockey));
        assert_eq!(Sport::parse("tennis"), None);
    }

    #[test]
    fn test_match_id_is_deterministic() {
        assert_eq!(
            NormalizedMatch::match_id(Sport::Football, "1035"),
            "apisports-football-1035"
        );
        assert_eq!(
            NormalizedMatch::match_id(Sport::Football, "1035"),
            NormalizedMatch::match_id(Sport::Football, "1035")
        );
    }

    #[test]
    fn test_live_family() {
        assert!(MatchStatus::HalfTime.is_live());
        assert!(MatchStatus::Penalties.is_live());
        assert!(!MatchStatus::Soon.is_live());
        assert!(!MatchStatus::Finished.is_live());
    }

    #[test]
    fn test_empty_snapshot_shape() {
        let snap = Snapshot::empty(Utc::now());
        let json = serde_json::to_value(&snap).unwrap();
        for sport in Sport::ALL {
            assert!(json["sports"][sport.as_str()].as_array().unwrap().is_empty());
        }
        assert!(json.get("updatedAt").is_some());
        assert!(json.get("quota").is_none());
    }

    #[test]
    fn test_status_codes_serialize_short() {
        assert_eq!(serde_json::to_string(&MatchStatus::FirstHalf).unwrap(), "\"1H\"");
        assert_eq!(serde_json::to_string(&MatchStatus::Soon).unwrap(), "\"SOON\"");
    }
}
