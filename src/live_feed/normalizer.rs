//! Provider record → `NormalizedMatch`.
//!
//! Football comes back as nested `fixture`/`teams`/`goals` objects; the other
//! four sports share the looser `games` shape where a score is either a plain
//! integer or a `{ "total": n }` object. Each shape is decoded into its own
//! type and anything that does not fit is dropped on its own.

use chrono::{DateTime, TimeZone, Utc};
use rand::Rng;
use serde::Deserialize;

use super::models::{MatchStatus, NormalizedMatch, Odds, Sport, PROVIDER};

// ── Raw shapes ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum NativeId {
    Number(i64),
    Text(String),
}

impl NativeId {
    fn into_string(self) -> Option<String> {
        match self {
            NativeId::Number(n) => Some(n.to_string()),
            NativeId::Text(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            NativeId::Text(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawStatus {
    short: Option<String>,
    elapsed: Option<i64>,
    /// Minute marker on the `games` endpoints; number or numeric string.
    timer: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct LeagueInfo {
    name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Team {
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct Teams {
    home: Team,
    away: Team,
}

/// Prices occasionally attached to a record.
#[derive(Debug, Clone, Default, Deserialize)]
struct RawOdds {
    home: Option<f64>,
    draw: Option<f64>,
    away: Option<f64>,
    over: Option<f64>,
    under: Option<f64>,
    line: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct FixtureInfo {
    id: NativeId,
    date: Option<String>,
    timestamp: Option<i64>,
    #[serde(default)]
    status: RawStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Goals {
    home: Option<i32>,
    away: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FootballFixture {
    fixture: FixtureInfo,
    league: Option<LeagueInfo>,
    teams: Teams,
    #[serde(default)]
    goals: Goals,
    odds: Option<RawOdds>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ScoreValue {
    Plain(i32),
    Total { total: Option<i32> },
}

impl ScoreValue {
    fn value(&self) -> Option<i32> {
        match self {
            ScoreValue::Plain(n) => Some(*n),
            ScoreValue::Total { total } => *total,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct GameScores {
    home: Option<ScoreValue>,
    away: Option<ScoreValue>,
}

/// The `games` shape shared by basketball, hockey, volleyball and baseball.
#[derive(Debug, Clone, Deserialize)]
pub struct GameRecord {
    id: NativeId,
    date: Option<String>,
    timestamp: Option<i64>,
    #[serde(default)]
    status: RawStatus,
    league: Option<LeagueInfo>,
    teams: Teams,
    #[serde(default)]
    scores: GameScores,
    odds: Option<RawOdds>,
}

/// A provider record decoded according to the sport it was fetched for.
#[derive(Debug, Clone)]
pub enum RawRecord {
    Football(FootballFixture),
    Basketball(GameRecord),
    Hockey(GameRecord),
    Volleyball(GameRecord),
    Baseball(GameRecord),
}

impl RawRecord {
    pub fn parse(sport: Sport, raw: &serde_json::Value) -> Option<RawRecord> {
        let game = || serde_json::from_value::<GameRecord>(raw.clone()).ok();
        match sport {
            Sport::Football => serde_json::from_value(raw.clone()).ok().map(RawRecord::Football),
            Sport::Basketball => game().map(RawRecord::Basketball),
            Sport::Hockey => game().map(RawRecord::Hockey),
            Sport::Volleyball => game().map(RawRecord::Volleyball),
            Sport::Baseball => game().map(RawRecord::Baseball),
        }
    }
}

/// Fields every shape boils down to before odds and ids are attached.
struct Common {
    native_id: String,
    league: Option<String>,
    started_at: Option<DateTime<Utc>>,
    status_code: Option<String>,
    home_team: String,
    away_team: String,
    home_score: i32,
    away_score: i32,
    elapsed: Option<i64>,
    odds: Option<RawOdds>,
}

fn from_game(g: GameRecord) -> Option<Common> {
    let elapsed = g.status.timer.as_ref().and_then(|t| {
        t.as_i64()
            .or_else(|| t.as_str().and_then(|s| s.trim().parse().ok()))
    });
    Some(Common {
        native_id: g.id.into_string()?,
        league: g.league.and_then(|l| l.name),
        started_at: parse_start(g.date.as_deref(), g.timestamp),
        status_code: g.status.short,
        home_team: g.teams.home.name,
        away_team: g.teams.away.name,
        home_score: g.scores.home.and_then(|s| s.value()).unwrap_or(0),
        away_score: g.scores.away.and_then(|s| s.value()).unwrap_or(0),
        elapsed: elapsed.or(g.status.elapsed),
        odds: g.odds,
    })
}

fn from_football(f: FootballFixture) -> Option<Common> {
    Some(Common {
        native_id: f.fixture.id.into_string()?,
        league: f.league.and_then(|l| l.name),
        started_at: parse_start(f.fixture.date.as_deref(), f.fixture.timestamp),
        status_code: f.fixture.status.short,
        home_team: f.teams.home.name,
        away_team: f.teams.away.name,
        home_score: f.goals.home.unwrap_or(0),
        away_score: f.goals.away.unwrap_or(0),
        elapsed: f.fixture.status.elapsed,
        odds: f.odds,
    })
}

fn parse_start(date: Option<&str>, timestamp: Option<i64>) -> Option<DateTime<Utc>> {
    date.and_then(|d| DateTime::parse_from_rfc3339(d).ok())
        .map(|d| d.with_timezone(&Utc))
        .or_else(|| timestamp.and_then(|ts| Utc.timestamp_opt(ts, 0).single()))
}

// ── Status mapping ───────────────────────────────────────────────────────────

/// Translate a provider short status code into the canonical enumeration.
/// Codes we do not recognise are treated as not yet started.
pub fn map_status(code: &str) -> MatchStatus {
    match code.trim().to_uppercase().as_str() {
        "NS" | "TBD" => MatchStatus::Soon,
        "LIVE" => MatchStatus::Live,
        "1H" => MatchStatus::FirstHalf,
        "2H" => MatchStatus::SecondHalf,
        "HT" | "BT" => MatchStatus::HalfTime,
        "ET" => MatchStatus::ExtraTime,
        "P" => MatchStatus::Penalties,
        // quarters, overtime, hockey periods and shootout, sets
        "Q1" | "Q2" | "Q3" | "Q4" | "OT" | "P1" | "P2" | "P3" | "PT" | "S1" | "S2" | "S3"
        | "S4" | "S5" => MatchStatus::Live,
        "FT" | "AET" | "PEN" | "AOT" | "AP" => MatchStatus::Finished,
        "CANC" | "ABD" | "AWD" | "WO" => MatchStatus::Cancelled,
        "PST" => MatchStatus::Postponed,
        "SUSP" | "INT" => MatchStatus::Suspended,
        // baseball innings: IN1..IN9 and extras
        c if c.starts_with("IN") && c[2..].parse::<u8>().is_ok() => MatchStatus::Live,
        _ => MatchStatus::Soon,
    }
}

/// Status code of a raw record, read without fully decoding it.
pub fn raw_status_code(sport: Sport, raw: &serde_json::Value) -> Option<&str> {
    let status = match sport {
        Sport::Football => raw.get("fixture")?.get("status")?,
        _ => raw.get("status")?,
    };
    status.get("short")?.as_str()
}

/// Whether a raw record looks like it is in play.
pub fn raw_is_live(sport: Sport, raw: &serde_json::Value) -> bool {
    raw_status_code(sport, raw)
        .map(|code| map_status(code).is_live())
        .unwrap_or(false)
}

// ── Synthetic odds ───────────────────────────────────────────────────────────

const FOOTBALL_HOME_RANGE: (f64, f64) = (1.50, 3.50);
const FOOTBALL_DRAW_RANGE: (f64, f64) = (2.80, 3.60);
const FOOTBALL_AWAY_RANGE: (f64, f64) = (1.80, 4.50);
/// Totals prices sit near even money with a little jitter.
const TOTALS_RANGE: (f64, f64) = (1.85, 1.95);

fn price<R: Rng>(rng: &mut R, (lo, hi): (f64, f64)) -> f64 {
    (rng.gen_range(lo..=hi) * 100.0).round() / 100.0
}

/// Odds for a match: provider prices where given, placeholders elsewhere.
/// Placeholders are illustrative only and do not track any real market.
fn build_odds<R: Rng>(sport: Sport, provided: Option<RawOdds>, rng: &mut R) -> Odds {
    let p = provided.unwrap_or_default();
    let (home, draw, away) = match sport {
        Sport::Football => (
            Some(p.home.unwrap_or_else(|| price(rng, FOOTBALL_HOME_RANGE))),
            Some(p.draw.unwrap_or_else(|| price(rng, FOOTBALL_DRAW_RANGE))),
            Some(p.away.unwrap_or_else(|| price(rng, FOOTBALL_AWAY_RANGE))),
        ),
        _ => (p.home, None, p.away),
    };
    Odds {
        home,
        draw,
        away,
        over: p.over.unwrap_or_else(|| price(rng, TOTALS_RANGE)),
        under: p.under.unwrap_or_else(|| price(rng, TOTALS_RANGE)),
        total_line: p.line.unwrap_or_else(|| sport.total_line()),
    }
}

// ── Entry points ─────────────────────────────────────────────────────────────

/// Normalize one raw record; `None` if it does not fit the sport's shape.
pub fn normalize(raw: &serde_json::Value, sport: Sport) -> Option<NormalizedMatch> {
    normalize_with(raw, sport, &mut rand::thread_rng())
}

pub fn normalize_with<R: Rng>(
    raw: &serde_json::Value,
    sport: Sport,
    rng: &mut R,
) -> Option<NormalizedMatch> {
    let common = match RawRecord::parse(sport, raw)? {
        RawRecord::Football(f) => from_football(f)?,
        RawRecord::Basketball(g)
        | RawRecord::Hockey(g)
        | RawRecord::Volleyball(g)
        | RawRecord::Baseball(g) => from_game(g)?,
    };

    let home_team = common.home_team.trim().to_string();
    let away_team = common.away_team.trim().to_string();
    if home_team.is_empty() || away_team.is_empty() {
        return None;
    }

    let status = common
        .status_code
        .as_deref()
        .map(map_status)
        .unwrap_or(MatchStatus::Soon);

    Some(NormalizedMatch {
        id: NormalizedMatch::match_id(sport, &common.native_id),
        sport,
        league: common.league,
        started_at: common.started_at,
        status,
        home_team,
        away_team,
        home_score: common.home_score,
        away_score: common.away_score,
        odds: Some(build_odds(sport, common.odds, rng)),
        elapsed_minutes: common.elapsed.unwrap_or(0).max(0),
        provider: PROVIDER.to_string(),
        raw: raw.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn football_raw() -> serde_json::Value {
        json!({
            "fixture": {
                "id": 1035,
                "date": "2026-10-18T19:00:00+00:00",
                "timestamp": 1_792_350_000,
                "status": { "long": "Second Half", "short": "2H", "elapsed": 63 }
            },
            "league": { "id": 39, "name": "Premier League" },
            "teams": {
                "home": { "id": 42, "name": "Arsenal" },
                "away": { "id": 49, "name": "Chelsea" }
            },
            "goals": { "home": 1, "away": 0 }
        })
    }

    fn game_raw(status: &str, home: serde_json::Value, away: serde_json::Value) -> serde_json::Value {
        json!({
            "id": 381,
            "date": "2026-10-18T18:00:00+00:00",
            "status": { "long": "in play", "short": status, "timer": "5" },
            "league": { "name": "NBA" },
            "teams": { "home": { "name": "Lakers" }, "away": { "name": "Celtics" } },
            "scores": { "home": home, "away": away }
        })
    }

    #[test]
    fn test_football_record() {
        let raw = football_raw();
        let m = normalize_with(&raw, Sport::Football, &mut rng()).unwrap();
        assert_eq!(m.id, "apisports-football-1035");
        assert_eq!(m.sport, Sport::Football);
        assert_eq!(m.league.as_deref(), Some("Premier League"));
        assert_eq!(m.status, MatchStatus::SecondHalf);
        assert_eq!((m.home_score, m.away_score), (1, 0));
        assert_eq!(m.elapsed_minutes, 63);
        assert_eq!(m.started_at.unwrap().to_rfc3339(), "2026-10-18T19:00:00+00:00");
        assert_eq!(m.provider, "apisports");
        assert_eq!(m.raw, raw);
    }

    #[test]
    fn test_synthetic_football_odds_in_range() {
        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let odds = normalize_with(&football_raw(), Sport::Football, &mut rng)
                .unwrap()
                .odds
                .unwrap();
            let home = odds.home.unwrap();
            let draw = odds.draw.unwrap();
            let away = odds.away.unwrap();
            assert!((1.50..=3.50).contains(&home), "home {}", home);
            assert!((2.80..=3.60).contains(&draw), "draw {}", draw);
            assert!((1.80..=4.50).contains(&away), "away {}", away);
            assert!((1.85..=1.95).contains(&odds.over));
            assert!((1.85..=1.95).contains(&odds.under));
            assert_relative_eq!(odds.total_line, 2.5);
        }
    }

    #[test]
    fn test_total_lines_per_sport() {
        let cases = [
            (Sport::Basketball, 220.5),
            (Sport::Hockey, 5.5),
            (Sport::Volleyball, 4.5),
            (Sport::Baseball, 8.5),
        ];
        for (sport, line) in cases {
            let m = normalize_with(&game_raw("NS", json!(null), json!(null)), sport, &mut rng())
                .unwrap();
            let odds = m.odds.unwrap();
            assert_relative_eq!(odds.total_line, line);
            assert!(odds.draw.is_none());
        }
    }

    #[test]
    fn test_provider_odds_are_kept() {
        let mut raw = football_raw();
        raw["odds"] = json!({ "home": 2.1, "draw": 3.3, "away": 3.9, "over": 1.7, "under": 2.05, "line": 3.5 });
        let odds = normalize_with(&raw, Sport::Football, &mut rng()).unwrap().odds.unwrap();
        assert_relative_eq!(odds.home.unwrap(), 2.1);
        assert_relative_eq!(odds.over, 1.7);
        assert_relative_eq!(odds.total_line, 3.5);
    }

    #[test]
    fn test_same_seed_same_odds() {
        let a = normalize_with(&football_raw(), Sport::Football, &mut rng()).unwrap();
        let b = normalize_with(&football_raw(), Sport::Football, &mut rng()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_basketball_total_scores() {
        let raw = game_raw(
            "Q3",
            json!({ "quarter_1": 20, "total": 78 }),
            json!({ "quarter_1": 22, "total": 71 }),
        );
        let m = normalize_with(&raw, Sport::Basketball, &mut rng()).unwrap();
        assert_eq!(m.id, "apisports-basketball-381");
        assert_eq!(m.status, MatchStatus::Live);
        assert_eq!((m.home_score, m.away_score), (78, 71));
        assert_eq!(m.elapsed_minutes, 5);
    }

    #[test]
    fn test_hockey_and_volleyball_plain_scores() {
        let raw = game_raw("P2", json!(3), json!(2));
        let m = normalize_with(&raw, Sport::Hockey, &mut rng()).unwrap();
        assert_eq!((m.home_score, m.away_score), (3, 2));
        assert_eq!(m.status, MatchStatus::Live);

        let raw = game_raw("S4", json!(2), json!(1));
        let m = normalize_with(&raw, Sport::Volleyball, &mut rng()).unwrap();
        assert_eq!(m.status, MatchStatus::Live);
        assert_eq!(m.id, "apisports-volleyball-381");
    }

    #[test]
    fn test_baseball_missing_scores_default_zero() {
        let raw = game_raw("NS", json!({ "hits": 0, "total": null }), json!(null));
        let m = normalize_with(&raw, Sport::Baseball, &mut rng()).unwrap();
        assert_eq!((m.home_score, m.away_score), (0, 0));
        assert_eq!(m.status, MatchStatus::Soon);
    }

    #[test]
    fn test_string_ids_and_timestamp_fallback() {
        let raw = json!({
            "id": "abc-9",
            "timestamp": 1_792_350_000,
            "status": { "short": "FT" },
            "teams": { "home": { "name": "A" }, "away": { "name": "B" } }
        });
        let m = normalize_with(&raw, Sport::Hockey, &mut rng()).unwrap();
        assert_eq!(m.id, "apisports-hockey-abc-9");
        assert_eq!(m.status, MatchStatus::Finished);
        assert_eq!(m.started_at.unwrap().timestamp(), 1_792_350_000);
        assert!(m.league.is_none());
    }

    #[test]
    fn test_malformed_records_are_dropped() {
        // no teams
        assert!(normalize(&json!({ "id": 1, "status": { "short": "NS" } }), Sport::Basketball).is_none());
        // football record under a games sport lacks a top-level id
        assert!(normalize(&football_raw(), Sport::Basketball).is_none());
        // games record under football lacks `fixture`
        assert!(normalize(&game_raw("Q1", json!(1), json!(1)), Sport::Football).is_none());
        // blank team name
        let mut raw = football_raw();
        raw["teams"]["home"]["name"] = json!("  ");
        assert!(normalize(&raw, Sport::Football).is_none());
        assert!(normalize(&json!("not an object"), Sport::Football).is_none());
    }

    #[test]
    fn test_status_always_in_enumeration() {
        let codes = [
            "NS", "TBD", "LIVE", "1H", "2H", "HT", "BT", "ET", "P", "Q1", "Q4", "OT", "P3", "PT",
            "S5", "IN1", "IN12", "FT", "AET", "PEN", "AOT", "AP", "CANC", "ABD", "AWD", "WO", "PST",
            "SUSP", "INT", "", "??", "halftime",
        ];
        for code in codes {
            let status = map_status(code);
            let json = serde_json::to_value(status).unwrap();
            let back: MatchStatus = serde_json::from_value(json).unwrap();
            assert_eq!(back, status);
        }
        assert_eq!(map_status("xyz"), MatchStatus::Soon);
        assert_eq!(map_status("aet"), MatchStatus::Finished);
        assert_eq!(map_status("INT"), MatchStatus::Suspended);
        assert_eq!(map_status("IN7"), MatchStatus::Live);
        assert_eq!(map_status("PST"), MatchStatus::Postponed);
        assert_eq!(map_status("WO"), MatchStatus::Cancelled);
    }

    #[test]
    fn test_raw_is_live() {
        assert!(raw_is_live(Sport::Football, &football_raw()));
        assert!(!raw_is_live(Sport::Hockey, &game_raw("NS", json!(0), json!(0))));
        assert!(raw_is_live(Sport::Hockey, &game_raw("P1", json!(0), json!(0))));
        assert!(!raw_is_live(Sport::Football, &json!({})));
    }
}
