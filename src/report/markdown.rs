//! Human-readable markdown reports.

use std::cmp::Ordering;
use std::fmt::{self, Write};

use crate::analysis::forecast::{self, ForecastOutcome};
use crate::analysis::indicators::{
    CATCHUP_MIN_INFANT_ENROLMENTS, top_catchup, top_digital, top_migration,
};
use crate::analysis::outliers::{self, OutlierReport};
use crate::model::{DistrictIndicatorRecord, ForecastRecord};

/// Rows per ranking table.
pub const TOP_N: usize = 10;

/// Migration hotspots, catch-up areas and digital maturity rankings.
pub fn render_findings(records: &[DistrictIndicatorRecord]) -> Result<String, fmt::Error> {
    let mut out = String::new();
    writeln!(out, "# Registration Activity Findings")?;
    writeln!(out)?;
    writeln!(out, "Districts analysed: {}", records.len())?;
    writeln!(out)?;

    writeln!(out, "## 1. Potential migration hotspots")?;
    writeln!(out)?;
    writeln!(out, "Demographic updates (address changes) high relative to biometric updates.")?;
    writeln!(out)?;
    let hotspots = top_migration(records, TOP_N);
    if hotspots.is_empty() {
        writeln!(out, "_No districts._")?;
    } else {
        writeln!(out, "| State | District | Demographic updates | Biometric updates | Migration score |")?;
        writeln!(out, "|---|---|---:|---:|---:|")?;
        for r in hotspots {
            writeln!(
                out,
                "| {} | {} | {:.0} | {:.0} | {:.3} |",
                r.key.state, r.key.district, r.total_demographic_updates, r.total_biometric_updates, r.migration_score
            )?;
        }
    }
    writeln!(out)?;

    writeln!(out, "## 2. Late-registration catch-up areas")?;
    writeln!(out)?;
    writeln!(
        out,
        "School-age enrolments high relative to infant enrolments (districts with more than {:.0} infant enrolments).",
        CATCHUP_MIN_INFANT_ENROLMENTS
    )?;
    writeln!(out)?;
    let catchup = top_catchup(records, TOP_N);
    if catchup.is_empty() {
        writeln!(out, "_No districts above the infant enrolment floor._")?;
    } else {
        writeln!(out, "| State | District | Enrolments 0-5 | Enrolments 5-17 | Catch-up ratio |")?;
        writeln!(out, "|---|---|---:|---:|---:|")?;
        for r in catchup {
            writeln!(
                out,
                "| {} | {} | {:.0} | {:.0} | {:.3} |",
                r.key.state, r.key.district, r.enrol_0_5, r.enrol_5_17, r.child_catchup_ratio
            )?;
        }
    }
    writeln!(out)?;

    writeln!(out, "## 3. Digital maturity")?;
    writeln!(out)?;
    writeln!(out, "Highest total update volume.")?;
    writeln!(out)?;
    let digital = top_digital(records, TOP_N);
    if digital.is_empty() {
        writeln!(out, "_No districts._")?;
    } else {
        writeln!(out, "| State | District | Biometric updates | Demographic updates | Digital intensity |")?;
        writeln!(out, "|---|---|---:|---:|---:|")?;
        for r in digital {
            writeln!(
                out,
                "| {} | {} | {:.0} | {:.0} | {:.0} |",
                r.key.state, r.key.district, r.total_biometric_updates, r.total_demographic_updates, r.digital_intensity
            )?;
        }
    }

    Ok(out)
}

/// Flagged districts only, most anomalous first.
///
/// `records` must be the slice the outlier engine scored.
pub fn render_anomaly_report(
    records: &[DistrictIndicatorRecord],
    report: &OutlierReport,
) -> Result<String, fmt::Error> {
    let mut out = String::new();
    writeln!(out, "# Anomaly Report")?;
    writeln!(out)?;
    writeln!(
        out,
        "{} of {} districts flagged by isolation forest on {}.",
        report.flagged,
        report.flags.len(),
        outliers::FEATURE_NAMES.join(", ")
    )?;
    writeln!(out)?;

    let mut flagged: Vec<_> = records
        .iter()
        .zip(&report.flags)
        .filter(|(_, f)| f.is_anomaly)
        .collect();
    flagged.sort_by(|(ra, a), (rb, b)| match b.score.total_cmp(&a.score) {
        Ordering::Equal => ra.key.cmp(&rb.key),
        other => other,
    });

    if flagged.is_empty() {
        writeln!(out, "_No anomalies flagged._")?;
        return Ok(out);
    }

    writeln!(out, "| State | District | Enrolments 0-5 | Biometric updates | Bio ratio | Score |")?;
    writeln!(out, "|---|---|---:|---:|---:|---:|")?;
    for (r, flag) in flagged {
        writeln!(
            out,
            "| {} | {} | {:.0} | {:.0} | {:.2} | {:.4} |",
            r.key.state, r.key.district, r.enrol_0_5, r.total_biometric_updates, r.bio_ratio, flag.score
        )?;
    }
    Ok(out)
}

/// Largest predicted increases first; ties by key.
fn by_predicted_increase(records: &[ForecastRecord], n: usize) -> Vec<&ForecastRecord> {
    let mut ranked: Vec<&ForecastRecord> = records.iter().collect();
    ranked.sort_by(|a, b| match b.predicted_delta.total_cmp(&a.predicted_delta) {
        Ordering::Equal => a.key.cmp(&b.key),
        other => other,
    });
    ranked.truncate(n);
    ranked
}

/// Model accuracy and the districts with the largest projected rise in
/// migration score.
pub fn render_prediction_report(outcome: &ForecastOutcome) -> Result<String, fmt::Error> {
    let mut out = String::new();
    writeln!(out, "# Migration Score Forecast")?;
    writeln!(out)?;

    let report = match outcome {
        ForecastOutcome::Forecast(r) => r,
        ForecastOutcome::InsufficientHistory {
            districts,
            lagged_rows: 0,
        } => {
            writeln!(
                out,
                "Insufficient history: none of the {} districts has two or more periods, so no lag features could be built and no forecast was produced.",
                districts
            )?;
            return Ok(out);
        }
        ForecastOutcome::InsufficientHistory {
            districts,
            lagged_rows,
        } => {
            writeln!(
                out,
                "Insufficient history: {} districts gave only {} lagged rows, too few to keep any for training after the held-out split, so no forecast was produced.",
                districts, lagged_rows
            )?;
            return Ok(out);
        }
    };

    writeln!(
        out,
        "Random forest trained on {} lagged rows, evaluated on {} held-out rows.",
        report.train_rows, report.test_rows
    )?;
    writeln!(out, "Features: {}.", forecast::FEATURE_NAMES.join(", "))?;
    writeln!(out)?;
    match report.rmse {
        Some(rmse) => writeln!(out, "- RMSE: {:.4}", rmse)?,
        None => writeln!(out, "- RMSE: n/a (no held-out rows)")?,
    }
    writeln!(out, "- Districts projected: {}", report.records.len())?;
    writeln!(out)?;

    writeln!(out, "## Top {} predicted increases", TOP_N)?;
    writeln!(out)?;
    writeln!(out, "| State | District | Current score | Predicted score | Change |")?;
    writeln!(out, "|---|---|---:|---:|---:|")?;
    for r in by_predicted_increase(&report.records, TOP_N) {
        writeln!(
            out,
            "| {} | {} | {:.3} | {:.3} | {:+.3} |",
            r.key.state, r.key.district, r.current_score, r.predicted_score, r.predicted_delta
        )?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::forecast::ForecastReport;
    use crate::analysis::indicators::derive_record;
    use crate::model::{AnomalyFlag, DistrictKey};

    fn record(district: &str, infants: f64, bio: f64, demo: f64) -> DistrictIndicatorRecord {
        derive_record(
            DistrictKey::new("S", district),
            None,
            vec![("enrol_0_5".into(), infants), ("enrol_5_17".into(), infants * 2.0)],
            infants * 3.0,
            bio,
            demo,
        )
    }

    fn forecast(district: &str, current: f64, predicted: f64) -> ForecastRecord {
        ForecastRecord {
            key: DistrictKey::new("S", district),
            current_score: current,
            predicted_score: predicted,
            predicted_delta: predicted - current,
        }
    }

    #[test]
    fn test_findings_lists_rankings_and_respects_infant_floor() {
        let records = vec![
            record("SMALL", 50.0, 10.0, 500.0),
            record("LARGE", 400.0, 1000.0, 100.0),
        ];
        let text = render_findings(&records).expect("render");

        assert!(text.contains("## 1. Potential migration hotspots"));
        let hotspots = text.split("## 2.").next().expect("section 1");
        assert!(hotspots.find("SMALL").expect("SMALL") < hotspots.find("LARGE").expect("LARGE"));

        let catchup = text
            .split("## 2.")
            .nth(1)
            .and_then(|s| s.split("## 3.").next())
            .expect("section 2");
        assert!(catchup.contains("| S | LARGE | 400 | 800 |"));
        assert!(!catchup.contains("SMALL"), "below the infant floor");
    }

    #[test]
    fn test_anomaly_report_lists_flagged_only() {
        let records = vec![record("A", 10.0, 10.0, 10.0), record("B", 10.0, 5000.0, 10.0)];
        let report = OutlierReport {
            flags: vec![
                AnomalyFlag {
                    key: records[0].key.clone(),
                    score: 0.4,
                    is_anomaly: false,
                },
                AnomalyFlag {
                    key: records[1].key.clone(),
                    score: 0.8,
                    is_anomaly: true,
                },
            ],
            flagged: 1,
        };
        let text = render_anomaly_report(&records, &report).expect("render");
        assert!(text.contains("1 of 2 districts flagged"));
        assert!(text.contains("| S | B |"));
        assert!(!text.contains("| S | A |"));
    }

    #[test]
    fn test_prediction_report_orders_by_increase() {
        let outcome = ForecastOutcome::Forecast(ForecastReport {
            records: vec![forecast("FLAT", 1.0, 1.0), forecast("RISE", 1.0, 3.0), forecast("FALL", 2.0, 1.0)],
            rmse: Some(0.25),
            lagged_rows: 20,
            train_rows: 16,
            test_rows: 4,
        });
        let text = render_prediction_report(&outcome).expect("render");

        assert!(text.contains("- RMSE: 0.2500"));
        let rise = text.find("RISE").expect("RISE");
        let flat = text.find("FLAT").expect("FLAT");
        let fall = text.find("FALL").expect("FALL");
        assert!(rise < flat && flat < fall);
        assert!(text.contains("| +2.000 |"));
    }

    #[test]
    fn test_prediction_report_notes_insufficient_history() {
        let text = render_prediction_report(&ForecastOutcome::InsufficientHistory {
            districts: 4,
            lagged_rows: 0,
        })
        .expect("render");
        assert!(text.contains("Insufficient history"));
        assert!(text.contains("none of the 4 districts has two or more periods"));
        assert!(!text.contains("RMSE"));
    }

    #[test]
    fn test_prediction_report_explains_empty_training_split() {
        let text = render_prediction_report(&ForecastOutcome::InsufficientHistory {
            districts: 1,
            lagged_rows: 1,
        })
        .expect("render");
        assert!(text.contains("1 districts gave only 1 lagged rows"));
        assert!(!text.contains("none of the"));
    }
}
