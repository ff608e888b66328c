use anyhow::Result;
use std::path::Path;

use crate::config::IntegrityConfig;
use crate::models::{ProcessedMatch, ScoreResult};
use crate::services::ensemble::{EnsembleModel, TrainingReport};
use crate::services::pipeline::{self, ProcessedDataset};
use crate::services::reports;
use crate::services::ScoreCombiner;
use crate::store::{write_processed, write_scores};

pub fn process_matches(config: &IntegrityConfig, input: &Path, output: &Path) -> Result<()> {
    println!("📥 Loading matches from {}...", input.display());
    let dataset = pipeline::load_and_process(input, config)?;

    write_processed(output, &dataset.matches)?;
    println!("✅ Wrote {} processed matches to {}", dataset.matches.len(), output.display());

    print_cleaning(&dataset);
    print_flags(&dataset.matches);
    Ok(())
}

pub fn train_model(config: &IntegrityConfig, input: &Path, prefix: &str, output: Option<&Path>) -> Result<()> {
    println!("📥 Loading training history from {}...", input.display());
    let dataset = pipeline::load_and_process(input, config)?;
    print_cleaning(&dataset);

    println!("🧠 Fitting ensemble on {} matches...", dataset.matches.len());
    let model = pipeline::train(&dataset, config)?;
    let path = model.save(&config.model_dir, prefix)?;
    println!("💾 Saved model '{}' to {}", prefix, path.display());

    print_training_report(model.report()?);

    let combiner = ScoreCombiner::from_config(config);
    let results = pipeline::score_matches(&model, &combiner, &dataset.matches)?;
    if let Some(output) = output {
        write_scores(output, &results)?;
        println!("✅ Wrote {} scores to {}", results.len(), output.display());
    }
    print_score_summary(&results, 10);
    Ok(())
}

pub fn score_matches(
    config: &IntegrityConfig,
    input: &Path,
    prefix: &str,
    output: Option<&Path>,
    threshold: f64,
) -> Result<()> {
    let model = EnsembleModel::load(config, prefix)?;
    println!("🔮 Loaded model '{}' ({} features)", prefix, model.feature_names()?.len());

    let dataset = pipeline::load_and_process(input, config)?;
    let combiner = ScoreCombiner::from_config(config);
    let results = pipeline::score_matches(&model, &combiner, &dataset.matches)?;

    if let Some(output) = output {
        write_scores(output, &results)?;
        println!("✅ Wrote {} scores to {}", results.len(), output.display());
    }
    print_score_summary(&results, 10);

    println!("\n🏆 By league:");
    for league in reports::league_summary(&results) {
        println!(
            "   • {}: {} matches, mean {:.1}, max {:.1}",
            league.league, league.matches, league.mean_score, league.max_score
        );
    }

    let flagged = reports::above_threshold(&results, threshold);
    println!("\n⚠️  {} matches scored at or above {:.0}", flagged.len(), threshold);
    for r in flagged.iter().take(20) {
        println!("   {}", describe(r));
    }
    Ok(())
}

pub fn query_team(config: &IntegrityConfig, input: &Path, name: &str) -> Result<()> {
    let dataset = pipeline::load_and_process(input, config)?;

    println!("🔍 Searching for team: {}", name);
    let Some(team) = dataset.tracker.team(name) else {
        println!("❌ No team named '{}' in this history", name);

        let needle = name.to_lowercase();
        let similar: Vec<&str> = dataset
            .tracker
            .teams()
            .map(|(team, _)| team)
            .filter(|team| team.to_lowercase().contains(&needle))
            .take(10)
            .collect();
        if !similar.is_empty() {
            println!("\n💡 Did you mean:");
            for team in similar {
                println!("   • {}", team);
            }
        }
        return Ok(());
    };

    println!("📊 Team Details:");
    println!("   Name: {}", name);
    println!("   Played: {} (W{} D{} L{})", team.played(), team.wins, team.draws, team.losses);
    println!("   Goals: {} for, {} against", team.goals_for, team.goals_against);
    println!(
        "   Averages: {:.2} scored, {:.2} conceded per match",
        team.avg_goals_scored(),
        team.avg_goals_conceded()
    );
    println!("   Points: {:.1}% of available", team.points_percentage());
    let form = team.form();
    println!("   Last 5: {}", if form.is_empty() { "-" } else { form.as_str() });
    println!("   Win streak: {} | Loss streak: {}", team.win_streak(), team.loss_streak());
    Ok(())
}

fn print_cleaning(dataset: &ProcessedDataset) {
    let c = &dataset.cleaning;
    println!(
        "🧹 Cleaning: {} rows in, {} kept, {} dropped ({} missing fields, {} invalid result, {} duplicates, {} implausible goals)",
        c.input_rows,
        c.kept,
        c.dropped(),
        c.missing_required,
        c.invalid_result,
        c.duplicates,
        c.implausible_goals
    );
    if c.inconsistent_results > 0 {
        println!("   {} results disagree with the scoreline (kept as declared)", c.inconsistent_results);
    }
}

fn print_flags(matches: &[ProcessedMatch]) {
    println!("\n🚩 Flags raised:");
    for (name, count) in reports::flag_counts(matches) {
        println!("   • {}: {}", name, count);
    }

    let multi = reports::multi_flag_matches(matches, 2);
    println!("\n🎯 {} matches with 2 or more flags", multi.len());
    for m in multi.iter().take(10) {
        let r = &m.record;
        println!(
            "   {} {} {}-{} {} ({} flags)",
            r.date, r.home_team, r.home_goals, r.away_goals, r.away_team, m.flags.total_flags
        );
    }
}

fn print_training_report(report: &TrainingReport) {
    println!("\n📈 Training report:");
    println!(
        "   Samples: {} ({} train / {} test), synthetic positives: {} ({:.1}%)",
        report.samples,
        report.train_samples,
        report.test_samples,
        report.positives,
        report.positive_rate * 100.0
    );
    if !report.dropped_features.is_empty() {
        println!("   Dropped (not in data): {}", report.dropped_features.join(", "));
    }
    match report.outlier_threshold {
        Some(cut) => println!(
            "   Outlier share above contamination cut ({:.3}): {:.1}%",
            cut,
            report.outlier_flagged_share * 100.0
        ),
        None => println!("   Outlier share above contamination cut: {:.1}%", report.outlier_flagged_share * 100.0),
    }

    for (name, m) in [
        ("Random forest", &report.random_forest),
        ("Logistic regression", &report.logistic_regression),
    ] {
        let auc = m.auc.map_or("n/a".to_string(), |auc| format!("{:.3}", auc));
        println!(
            "   {}: AUC {} | precision {:.3} | recall {:.3} | F1 {:.3}",
            name, auc, m.precision, m.recall, m.f1
        );
    }

    let mut importances = report.feature_importances.clone();
    importances.sort_by(|a, b| b.1.total_cmp(&a.1));
    println!("\n🌲 Feature importances:");
    for (name, value) in importances.iter().take(10) {
        println!("   • {}: {:.3}", name, value);
    }
}

fn print_score_summary(results: &[ScoreResult], top: usize) {
    println!("\n🚨 Alert levels:");
    for (level, count) in reports::alert_distribution(results) {
        println!("   {} {}: {}", level.icon(), level, count);
    }

    println!("\n🔝 Most suspicious:");
    for (i, r) in reports::top_suspicious(results, top).into_iter().enumerate() {
        println!("{}. {}", i + 1, describe(r));
    }
}

fn describe(r: &ScoreResult) -> String {
    let teams = match (&r.home_team, &r.away_team) {
        (Some(home), Some(away)) => format!("{} vs {}", home, away),
        _ => "unnamed match".to_string(),
    };
    let date = r.date.map_or(String::new(), |d| format!("{} ", d));
    let score = match (r.home_goals, r.away_goals) {
        (Some(h), Some(a)) => format!(" ({}-{})", h, a),
        _ => String::new(),
    };
    format!(
        "{}{}{}: {:.1} {} [iso {:.0} | rf {:.0} | lr {:.0}]",
        date,
        teams,
        score,
        r.integrity_score,
        r.alert_level.icon(),
        r.iso_score,
        r.rf_score,
        r.lr_score
    )
}
