use std::collections::HashMap;
use std::path::Path;

use crate::config::{FlagThresholds, IntegrityConfig};
use crate::error::Result;
use crate::models::{ComponentScores, MatchRecord, ProcessedMatch, ScoreResult};
use crate::services::anomaly_flags::{derive_measures, AnomalyFlagDeriver, CardStats};
use crate::services::cleaning::{clean_matches, CleaningReport};
use crate::services::combiner::ScoreCombiner;
use crate::services::ensemble::EnsembleModel;
use crate::services::team_form::{sort_chronologically, TeamFormTracker, TeamState};
use crate::store::{read_raw_matches, RawMatchRow};

/// A feature-engineered history together with the state it leaves behind.
#[derive(Debug, Clone)]
pub struct ProcessedDataset {
    pub matches: Vec<ProcessedMatch>,
    pub tracker: TeamFormTracker,
    pub cards: Option<CardStats>,
    pub cleaning: CleaningReport,
}

/// Sort, track form, derive measures and flag every record in one ordered pass.
///
/// Card statistics need the whole table, so they are computed between the form pass and flagging.
pub fn process_records(mut records: Vec<MatchRecord>, thresholds: &FlagThresholds) -> ProcessedDataset {
    sort_chronologically(&mut records);

    let mut tracker = TeamFormTracker::new();
    let forms = tracker.process(&records);
    let measures: Vec<_> = records.iter().map(derive_measures).collect();
    let cards = CardStats::from_measures(&measures);
    if cards.is_none() {
        tracing::warn!("No card spread in this dataset; card anomaly flags are omitted");
    }

    let deriver = AnomalyFlagDeriver::new(thresholds.clone());
    let matches: Vec<ProcessedMatch> = records
        .into_iter()
        .zip(forms)
        .zip(measures)
        .map(|((record, form), measures)| {
            let flags = deriver.flag(&record, &form, &measures, cards.as_ref());
            ProcessedMatch {
                record,
                form,
                measures,
                flags,
            }
        })
        .collect();

    let flagged = matches.iter().filter(|m| m.flags.total_flags > 0).count();
    tracing::info!(
        "Processed {} matches for {} teams, {} with at least one flag",
        matches.len(),
        tracker.len(),
        flagged
    );

    ProcessedDataset {
        matches,
        tracker,
        cards,
        cleaning: CleaningReport::default(),
    }
}

pub fn process_raw(rows: Vec<RawMatchRow>, config: &IntegrityConfig) -> Result<ProcessedDataset> {
    let (records, cleaning) = clean_matches(rows)?;
    let mut dataset = process_records(records, &config.flags);
    dataset.cleaning = cleaning;
    Ok(dataset)
}

pub fn load_and_process(path: &Path, config: &IntegrityConfig) -> Result<ProcessedDataset> {
    process_raw(read_raw_matches(path)?, config)
}

pub fn train(dataset: &ProcessedDataset, config: &IntegrityConfig) -> Result<EnsembleModel> {
    let mut model = EnsembleModel::from_config(config);
    model.fit(&dataset.matches)?;
    Ok(model)
}

pub fn score_result(m: Option<&ProcessedMatch>, components: &ComponentScores, combiner: &ScoreCombiner) -> ScoreResult {
    let (integrity_score, alert_level) = combiner.combine(components);
    let record = m.map(|m| &m.record);
    ScoreResult {
        date: record.map(|r| r.date),
        home_team: record.map(|r| r.home_team.clone()),
        away_team: record.map(|r| r.away_team.clone()),
        integrity_score,
        alert_level,
        iso_score: 100.0 * components.outlier,
        rf_score: 100.0 * components.classifier1,
        lr_score: 100.0 * components.classifier2,
        home_goals: record.map(|r| r.home_goals),
        away_goals: record.map(|r| r.away_goals),
        result: record.map(|r| r.result),
        league: record.and_then(|r| r.league.clone()),
        season: record.and_then(|r| r.season.clone()),
    }
}

/// One result per processed match, in input order.
pub fn score_matches(
    model: &EnsembleModel,
    combiner: &ScoreCombiner,
    matches: &[ProcessedMatch],
) -> Result<Vec<ScoreResult>> {
    let components = model.score_matches(matches)?;
    let results: Vec<ScoreResult> = matches
        .iter()
        .zip(&components)
        .map(|(m, c)| score_result(Some(m), c, combiner))
        .collect();
    tracing::info!("Scored {} matches", results.len());
    Ok(results)
}

/// Online scoring against a fixed history.
///
/// Holds the fitted model and the form state the history left behind; every call reads that
/// state and never updates it, so one instance can serve concurrent requests.
pub struct ScoringService {
    model: EnsembleModel,
    combiner: ScoreCombiner,
    deriver: AnomalyFlagDeriver,
    tracker: TeamFormTracker,
    cards: Option<CardStats>,
    history_len: usize,
}

impl ScoringService {
    pub fn new(model: EnsembleModel, config: &IntegrityConfig, history: ProcessedDataset) -> Self {
        Self {
            model,
            combiner: ScoreCombiner::from_config(config),
            deriver: AnomalyFlagDeriver::new(config.flags.clone()),
            tracker: history.tracker,
            cards: history.cards,
            history_len: history.matches.len(),
        }
    }

    pub fn model(&self) -> &EnsembleModel {
        &self.model
    }

    pub fn history_len(&self) -> usize {
        self.history_len
    }

    pub fn team(&self, name: &str) -> Option<&TeamState> {
        self.tracker.team(name)
    }

    /// Features of `record` as if it were played right after the history.
    pub fn process(&self, record: MatchRecord) -> ProcessedMatch {
        let form = self.tracker.peek(&record);
        let measures = derive_measures(&record);
        let flags = self.deriver.flag(&record, &form, &measures, self.cards.as_ref());
        ProcessedMatch {
            record,
            form,
            measures,
            flags,
        }
    }

    pub fn score_record(&self, record: MatchRecord) -> Result<ScoreResult> {
        let processed = self.process(record);
        let components = self.model.score_match(&processed)?;
        Ok(score_result(Some(&processed), &components, &self.combiner))
    }

    /// Clean and score raw rows independently; each is scored against the history alone.
    pub fn score_rows(&self, rows: Vec<RawMatchRow>) -> Result<Vec<ScoreResult>> {
        let (records, _) = clean_matches(rows)?;
        records.into_iter().map(|r| self.score_record(r)).collect()
    }

    pub fn score_values(&self, values: &HashMap<String, f64>) -> Result<ScoreResult> {
        let components = self.model.score_values(values)?;
        Ok(score_result(None, &components, &self.combiner))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{AlertLevel, MatchOutcome, OutcomePrices};
    use chrono::{Duration, NaiveDate};

    fn day(n: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 8, 1).unwrap() + Duration::days(n)
    }

    fn priced(mut record: MatchRecord, open: (f64, f64, f64), close: (f64, f64, f64)) -> MatchRecord {
        record.opening_odds = OutcomePrices {
            home: Some(open.0),
            draw: Some(open.1),
            away: Some(open.2),
        };
        record.closing_odds = OutcomePrices {
            home: Some(close.0),
            draw: Some(close.1),
            away: Some(close.2),
        };
        record
    }

    fn stable(record: MatchRecord) -> MatchRecord {
        priced(record, (2.0, 3.4, 3.6), (2.0, 3.4, 3.6))
    }

    /// Quiet background league, then A's winning run, the A-B opener and the 0-5 collapse.
    pub(crate) fn scenario() -> Vec<MatchRecord> {
        let mut records = Vec::new();
        let teams = ["C", "D", "E", "F", "G", "H", "I", "J"];
        let scores = [(1, 0), (2, 0), (2, 1)];
        let mut n = 0;
        for round in 0..8 {
            for pair in 0..4 {
                let home = teams[(pair + round) % 8];
                let away = teams[(pair + round + 4) % 8];
                let (hg, ag) = scores[n % 3];
                records.push(stable(MatchRecord::new(day(n as i64 / 4), home, away, hg, ag)));
                n += 1;
            }
        }

        let start = 20;
        for (i, opponent) in ["C", "D", "E"].iter().enumerate() {
            records.push(stable(MatchRecord::new(day(start + i as i64), "A", opponent, 2, 0)));
        }
        // Match 1: stable odds, expected home win.
        records.push(stable(MatchRecord::new(day(start + 3), "A", "B", 1, 0)));
        for (i, opponent) in ["F", "G"].iter().enumerate() {
            records.push(stable(MatchRecord::new(day(start + 4 + i as i64), "A", opponent, 2, 0)));
        }
        // Match 2: A on a six-game run, drifts from 1.80 to 2.20 and loses 0-5.
        records.push(priced(
            MatchRecord::new(day(start + 10), "A", "B", 0, 5),
            (1.80, 3.50, 4.50),
            (2.20, 3.40, 3.30),
        ));
        records
    }

    pub(crate) fn test_config() -> IntegrityConfig {
        let mut config = IntegrityConfig::default();
        config.model.outlier_trees = 100;
        config.model.forest_trees = 40;
        config
    }

    pub(crate) fn trained_service() -> ScoringService {
        let config = test_config();
        let dataset = process_records(scenario(), &config.flags);
        let model = train(&dataset, &config).unwrap();
        ScoringService::new(model, &config, dataset)
    }

    fn find<'a>(matches: &'a [ProcessedMatch], home: &str, away: &str, hg: u32) -> &'a ProcessedMatch {
        matches
            .iter()
            .find(|m| m.record.home_team == home && m.record.away_team == away && m.record.home_goals == hg)
            .unwrap()
    }

    #[test]
    fn processing_is_sorted_and_flags_the_collapse() {
        let mut records = scenario();
        records.reverse();
        let dataset = process_records(records, &FlagThresholds::default());
        assert!(dataset.matches.windows(2).all(|w| w[0].record.date <= w[1].record.date));

        let opener = find(&dataset.matches, "A", "B", 1);
        assert_eq!(opener.flags.total_flags, 0);

        let collapse = find(&dataset.matches, "A", "B", 0);
        assert_eq!(collapse.record.result, MatchOutcome::Away);
        assert_eq!(collapse.form.home_win_streak, 6);
        assert_eq!(collapse.flags.streak_break, Some(true));
        assert_eq!(collapse.flags.odds_movement, Some(true));
        assert_eq!(collapse.flags.goals_anomaly_away, Some(true));
        assert!(collapse.flags.total_flags >= 2);
    }

    #[test]
    fn end_to_end_collapse_is_at_least_monitored() {
        let config = test_config();
        let dataset = process_records(scenario(), &config.flags);
        let model = train(&dataset, &config).unwrap();
        let combiner = ScoreCombiner::from_config(&config);
        let results = score_matches(&model, &combiner, &dataset.matches).unwrap();
        assert_eq!(results.len(), dataset.matches.len());

        let collapse = results
            .iter()
            .find(|r| r.home_team.as_deref() == Some("A") && r.away_goals == Some(5))
            .unwrap();
        assert!(collapse.alert_level >= AlertLevel::Monitor);
        assert!((collapse.iso_score - 100.0).abs() < 1e-9);

        for r in &results {
            assert!((0.0..=100.0).contains(&r.integrity_score));
            assert_eq!(r.alert_level, combiner.alert_level(r.integrity_score));
        }
    }

    #[test]
    fn online_scoring_reads_history_without_mutating_it() {
        let config = test_config();
        let dataset = process_records(scenario(), &config.flags);
        let model = train(&dataset, &config).unwrap();
        let service = ScoringService::new(model, &config, dataset);

        let before = service.team("A").cloned();
        let upcoming = stable(MatchRecord::new(day(60), "A", "C", 3, 0));
        let first = service.score_record(upcoming.clone()).unwrap();
        let second = service.score_record(upcoming).unwrap();
        assert_eq!(first, second);
        assert_eq!(service.team("A").cloned(), before);
        assert_eq!(first.home_team.as_deref(), Some("A"));
    }

    #[test]
    fn absurd_goal_counts_are_dropped_not_summed() {
        let row = |date: &str, hg: f64| RawMatchRow {
            date: Some(date.to_string()),
            home_team: Some("A".to_string()),
            away_team: Some("B".to_string()),
            home_goals: Some(hg),
            away_goals: Some(1.0),
            ..Default::default()
        };
        let config = IntegrityConfig::default();
        let dataset = process_raw(vec![row("2024-08-16", 4294967295.0), row("2024-08-17", 2.0)], &config).unwrap();
        assert_eq!(dataset.matches.len(), 1);
        assert_eq!(dataset.cleaning.implausible_goals, 1);
        assert_eq!(dataset.matches[0].measures.total_goals, 3);

        assert!(matches!(
            process_raw(vec![row("2024-08-16", 4294967295.0)], &config),
            Err(crate::error::IntegrityError::EmptyDataset)
        ));
    }

    #[test]
    fn empty_input_halts_the_pipeline() {
        let config = IntegrityConfig::default();
        assert!(matches!(
            process_raw(Vec::new(), &config),
            Err(crate::error::IntegrityError::EmptyDataset)
        ));
    }
}
