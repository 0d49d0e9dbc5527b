use chrono::{DateTime, Utc};

use super::models::{MatchStatus, NormalizedMatch, SportsMap};

/// Elapsed minutes are capped at a football match's regulation length for
/// every sport.
pub const MAX_ELAPSED_MINUTES: i64 = 90;

pub fn elapsed_minutes(started_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - started_at).num_minutes().clamp(0, MAX_ELAPSED_MINUTES)
}

/// Advance one match to `now` without asking the provider.
///
/// A SOON match whose kickoff has passed becomes LIVE; any live-family match
/// gets its elapsed minutes recomputed from the kickoff time. Matches without
/// a kickoff time, and finished or called-off matches, are left untouched.
pub fn advance_match(m: &NormalizedMatch, now: DateTime<Utc>) -> NormalizedMatch {
    let mut next = m.clone();
    let Some(started_at) = m.started_at else {
        return next;
    };

    if m.status == MatchStatus::Soon && started_at <= now {
        next.status = MatchStatus::Live;
    }
    if next.status.is_live() {
        next.elapsed_minutes = elapsed_minutes(started_at, now);
    }
    next
}

pub fn advance(sports: &SportsMap, now: DateTime<Utc>) -> SportsMap {
    sports
        .iter()
        .map(|(sport, matches)| {
            (
                *sport,
                matches.iter().map(|m| advance_match(m, now)).collect(),
            )
        })
        .collect()
}

/// Ids of finished matches, for the favorites cleanup hook.
pub fn finished_ids(sports: &SportsMap) -> Vec<String> {
    sports
        .values()
        .flatten()
        .filter(|m| m.status == MatchStatus::Finished)
        .map(|m| m.id.clone())
        .collect()
}
