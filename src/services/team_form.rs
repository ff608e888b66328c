use serde::Serialize;
use std::collections::{HashMap, VecDeque};

use crate::models::{FormFeatures, FormResult, MatchRecord};
use crate::utils::{calculate_win_percentage, results_to_form};

/// Number of results shown in a form string.
pub const FORM_WINDOW: usize = 5;

/// Running statistics for one team.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TeamState {
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
    pub goals_for: u32,
    pub goals_against: u32,
    recent: VecDeque<FormResult>,
    /// Current run of identical results, unbounded.
    streak: Option<(FormResult, u32)>,
}

/// Public view of a team's record after a history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamProfile {
    pub team: String,
    pub played: u32,
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
    pub goals_for: u32,
    pub goals_against: u32,
    pub points_percentage: f64,
    pub form: String,
    pub win_streak: u32,
    pub loss_streak: u32,
}

impl TeamState {
    pub fn profile(&self, team: &str) -> TeamProfile {
        TeamProfile {
            team: team.to_string(),
            played: self.played(),
            wins: self.wins,
            draws: self.draws,
            losses: self.losses,
            goals_for: self.goals_for,
            goals_against: self.goals_against,
            points_percentage: self.points_percentage(),
            form: self.form(),
            win_streak: self.win_streak(),
            loss_streak: self.loss_streak(),
        }
    }

    pub fn played(&self) -> u32 {
        self.wins + self.draws + self.losses
    }

    pub fn win_streak(&self) -> u32 {
        self.run_of(FormResult::Win)
    }

    pub fn loss_streak(&self) -> u32 {
        self.run_of(FormResult::Loss)
    }

    /// Up to five most recent results, oldest first.
    pub fn form(&self) -> String {
        results_to_form(self.recent.iter())
    }

    pub fn avg_goals_scored(&self) -> f64 {
        self.goals_for as f64 / self.played().max(1) as f64
    }

    pub fn avg_goals_conceded(&self) -> f64 {
        self.goals_against as f64 / self.played().max(1) as f64
    }

    pub fn points_percentage(&self) -> f64 {
        calculate_win_percentage(self.wins, self.draws, self.losses)
    }

    fn run_of(&self, kind: FormResult) -> u32 {
        match self.streak {
            Some((result, len)) if result == kind => len,
            _ => 0,
        }
    }

    fn record(&mut self, result: FormResult, scored: u32, conceded: u32) {
        match result {
            FormResult::Win => self.wins += 1,
            FormResult::Draw => self.draws += 1,
            FormResult::Loss => self.losses += 1,
        }
        self.goals_for = self.goals_for.saturating_add(scored);
        self.goals_against = self.goals_against.saturating_add(conceded);

        self.recent.push_back(result);
        if self.recent.len() > FORM_WINDOW {
            self.recent.pop_front();
        }

        self.streak = match self.streak {
            Some((current, len)) if current == result => Some((current, len + 1)),
            _ => Some((result, 1)),
        };
    }
}

/// Causal per-team form over a chronologically ordered match history.
///
/// Team states live in an arena indexed by first appearance; a match's features are
/// always read before either participant is updated with that match's outcome.
#[derive(Debug, Clone, Default)]
pub struct TeamFormTracker {
    index: HashMap<String, usize>,
    names: Vec<String>,
    states: Vec<TeamState>,
}

impl TeamFormTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn team(&self, name: &str) -> Option<&TeamState> {
        self.index.get(name).map(|&slot| &self.states[slot])
    }

    pub fn teams(&self) -> impl Iterator<Item = (&str, &TeamState)> {
        self.names.iter().map(String::as_str).zip(self.states.iter())
    }

    /// Pre-match features for `record` without touching any state.
    pub fn peek(&self, record: &MatchRecord) -> FormFeatures {
        let fresh = TeamState::default();
        let home = self.team(&record.home_team).unwrap_or(&fresh);
        let away = self.team(&record.away_team).unwrap_or(&fresh);

        FormFeatures {
            home_win_streak: home.win_streak(),
            away_loss_streak: away.loss_streak(),
            home_form_last5: home.form(),
            away_form_last5: away.form(),
            home_avg_goals_scored: home.avg_goals_scored(),
            home_avg_goals_conceded: home.avg_goals_conceded(),
            away_avg_goals_scored: away.avg_goals_scored(),
            away_avg_goals_conceded: away.avg_goals_conceded(),
        }
    }

    /// Read the pre-match features, then fold the match outcome into both teams.
    pub fn observe(&mut self, record: &MatchRecord) -> FormFeatures {
        let features = self.peek(record);

        let home = self.slot(&record.home_team);
        self.states[home].record(record.result.for_home(), record.home_goals, record.away_goals);
        let away = self.slot(&record.away_team);
        self.states[away].record(record.result.for_away(), record.away_goals, record.home_goals);

        features
    }

    /// Features for every record of an already sorted history, in order.
    pub fn process(&mut self, records: &[MatchRecord]) -> Vec<FormFeatures> {
        let features: Vec<FormFeatures> = records.iter().map(|r| self.observe(r)).collect();
        tracing::info!("Team form computed for {} teams", self.len());
        features
    }

    fn slot(&mut self, name: &str) -> usize {
        if let Some(&slot) = self.index.get(name) {
            return slot;
        }
        let slot = self.states.len();
        self.index.insert(name.to_string(), slot);
        self.names.push(name.to_string());
        self.states.push(TeamState::default());
        slot
    }
}

/// Stable sort by date; same-day fixtures keep their input order.
pub fn sort_chronologically(records: &mut [MatchRecord]) {
    records.sort_by_key(|r| r.date);
}
