//! Natural-language summary lines for one export series.

use crate::models::{ChangeBand, DropOffPoint, Period, Summary};

/// Optional period inputs. A `None` field means that section was not requested.
#[derive(Debug, Clone, Default)]
pub struct PeriodSets {
    pub changepoint_years: Option<Vec<i32>>,
    pub decades: Option<Vec<Period<String>>>,
    /// Year-aligned change bands; unlabelled years are `None`.
    pub change_bands: Option<Vec<(i32, Option<ChangeBand>)>>,
}

/// Build the summary in its fixed order: changepoints, decade summaries,
/// change-band groups, highest drop-off, lowest drop-off.
///
/// Empty `dropoffs` produce an empty summary regardless of the period inputs.
pub fn summarize(dropoffs: &[DropOffPoint], sets: &PeriodSets) -> Summary {
    let mut summary = Summary::new();
    if dropoffs.is_empty() {
        return summary;
    }

    if let Some(years) = &sets.changepoint_years {
        if !years.is_empty() {
            let joined: Vec<String> = years.iter().map(|y| y.to_string()).collect();
            summary.push(format!(
                "Significant changepoints detected at years: {}",
                joined.join(", ")
            ));
        }
    }

    if let Some(decades) = &sets.decades {
        let lines: Vec<String> = decades
            .iter()
            .filter_map(|decade| decade_line(dropoffs, decade))
            .collect();
        if !lines.is_empty() {
            summary.push("Decade summaries:".to_string());
            summary.extend(lines);
        }
    }

    if let Some(bands) = &sets.change_bands {
        for band in [
            ChangeBand::Consistent,
            ChangeBand::Increasing,
            ChangeBand::Decreasing,
        ] {
            let years = bands
                .iter()
                .filter(|(_, b)| *b == Some(band))
                .map(|(year, _)| *year);
            if let (Some(first), Some(last)) = (years.clone().min(), years.max()) {
                summary.push(format!("{} periods: {} to {}", band, first, last));
            }
        }
    }

    if let Some((highest, lowest)) = drop_extremes(dropoffs) {
        summary.push(format!(
            "Highest drop-off in {} with a drop of {}",
            highest.year,
            highest.drop_off.unwrap_or_default()
        ));
        summary.push(format!(
            "Lowest drop-off in {} with a drop of {}",
            lowest.year,
            lowest.drop_off.unwrap_or_default()
        ));
    }

    summary
}

fn decade_line(dropoffs: &[DropOffPoint], decade: &Period<String>) -> Option<String> {
    let values = dropoffs
        .iter()
        .filter(|p| p.year >= decade.start && p.year <= decade.end)
        .map(|p| p.value);
    let max = values.clone().reduce(f64::max)?;
    let min = values.reduce(f64::min)?;
    Some(format!(
        "{}: Max Value = {}, Min Value = {}",
        decade.label, max, min
    ))
}

/// Signed maximum and minimum drop-off. Ties resolve to the earliest year.
pub fn drop_extremes(dropoffs: &[DropOffPoint]) -> Option<(&DropOffPoint, &DropOffPoint)> {
    let mut highest: Option<&DropOffPoint> = None;
    let mut lowest: Option<&DropOffPoint> = None;

    for point in dropoffs {
        let Some(drop) = point.drop_off else { continue };
        if highest.map_or(true, |h| drop > h.drop_off.unwrap_or(f64::NEG_INFINITY)) {
            highest = Some(point);
        }
        if lowest.map_or(true, |l| drop < l.drop_off.unwrap_or(f64::INFINITY)) {
            lowest = Some(point);
        }
    }

    highest.zip(lowest)
}

/// One canned explanatory note per summary line, in the same order.
pub fn summary_notes(summary: &[String]) -> Vec<String> {
    summary
        .iter()
        .map(|line| {
            if line.starts_with("Highest drop-off") {
                "The highest drop-off reflects a significant decrease in values for a specific year."
            } else if line.starts_with("Lowest drop-off") {
                "The lowest drop-off represents the least decrease in values observed."
            } else {
                "Additional context could be provided here based on specific summaries."
            }
            .to_string()
        })
        .collect()
}

/// One explanatory line naming the biggest drop-off years and the value extremes of the range.
pub fn dropoff_context(
    commodity: &str,
    origin_label: &str,
    dropoffs: &[DropOffPoint],
    top: &[DropOffPoint],
) -> Option<String> {
    let first_top = top.first()?;

    let mut highest = dropoffs.first()?;
    let mut lowest = highest;
    for point in dropoffs {
        if point.value > highest.value {
            highest = point;
        }
        if point.value < lowest.value {
            lowest = point;
        }
    }

    let listed: Vec<String> = top
        .iter()
        .map(|p| format!("{} ({})", p.year, p.drop_off.unwrap_or_default()))
        .collect();

    Some(format!(
        "The highest drop-offs are: {}. In {}, {} {} exports experienced a significant drop-off. \
         The highest value in the selected range was {} in {}, and the lowest value was {} in {}.",
        listed.join(", "),
        first_top.year,
        origin_label,
        commodity,
        highest.value,
        highest.year,
        lowest.value,
        lowest.year
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dropoff::{compute_dropoffs, top_dropoffs};
    use crate::models::ExportRow;
    use crate::segment::{decade_labels, label_years, segment};

    fn cattle() -> Vec<DropOffPoint> {
        let rows: Vec<ExportRow> = [(2018, 50.0), (2019, 40.0), (2020, 70.0), (2021, 65.0)]
            .iter()
            .map(|&(year, value)| ExportRow {
                commodity: "Cattle".to_string(),
                country: None,
                year,
                value,
                origin: "United States, America".to_string(),
            })
            .collect();
        compute_dropoffs(&rows)
    }

    #[test]
    fn test_highest_and_lowest_lines() {
        let summary = summarize(&cattle(), &PeriodSets::default());
        assert_eq!(
            summary,
            vec![
                "Highest drop-off in 2019 with a drop of 10".to_string(),
                "Lowest drop-off in 2020 with a drop of -30".to_string(),
            ]
        );
    }

    #[test]
    fn test_fixed_order_with_all_sections() {
        let dropoffs = cattle();
        let years: Vec<i32> = dropoffs.iter().map(|p| p.year).collect();
        let sets = PeriodSets {
            changepoint_years: Some(vec![2019, 2020]),
            decades: Some(segment(&label_years(&years, &decade_labels(&years)))),
            change_bands: Some(vec![
                (2018, None),
                (2019, Some(ChangeBand::Decreasing)),
                (2020, Some(ChangeBand::Increasing)),
                (2021, Some(ChangeBand::Decreasing)),
            ]),
        };
        let summary = summarize(&dropoffs, &sets);
        assert_eq!(
            summary,
            vec![
                "Significant changepoints detected at years: 2019, 2020",
                "Decade summaries:",
                "2010s: Max Value = 50, Min Value = 40",
                "2020s: Max Value = 70, Min Value = 65",
                "Increasing periods: 2020 to 2020",
                "Decreasing periods: 2019 to 2021",
                "Highest drop-off in 2019 with a drop of 10",
                "Lowest drop-off in 2020 with a drop of -30",
            ]
        );
    }

    #[test]
    fn test_empty_changepoints_emit_nothing() {
        let sets = PeriodSets {
            changepoint_years: Some(vec![]),
            ..PeriodSets::default()
        };
        let summary = summarize(&cattle(), &sets);
        assert!(!summary[0].starts_with("Significant"));
    }

    #[test]
    fn test_ties_pick_first_year() {
        let mut dropoffs = cattle();
        dropoffs[3].drop_off = Some(10.0);
        let (highest, _) = drop_extremes(&dropoffs).unwrap();
        assert_eq!(highest.year, 2019);
    }

    #[test]
    fn test_empty_input_gives_empty_summary() {
        let sets = PeriodSets {
            changepoint_years: Some(vec![2019]),
            ..PeriodSets::default()
        };
        assert!(summarize(&[], &sets).is_empty());
        assert!(dropoff_context("Cattle", "USA", &[], &[]).is_none());
    }

    #[test]
    fn test_single_point_has_no_extremes() {
        let dropoffs = vec![cattle().remove(0)];
        assert!(summarize(&dropoffs, &PeriodSets::default()).is_empty());
    }

    #[test]
    fn test_notes_follow_summary_lines() {
        let summary = summarize(
            &cattle(),
            &PeriodSets {
                changepoint_years: Some(vec![2019]),
                ..PeriodSets::default()
            },
        );
        let notes = summary_notes(&summary);
        assert_eq!(notes.len(), 3);
        assert!(notes[0].starts_with("Additional context"));
        assert_eq!(
            notes[1],
            "The highest drop-off reflects a significant decrease in values for a specific year."
        );
        assert_eq!(
            notes[2],
            "The lowest drop-off represents the least decrease in values observed."
        );
        assert!(summary_notes(&[]).is_empty());
    }

    #[test]
    fn test_dropoff_context_line() {
        let dropoffs = cattle();
        let top = top_dropoffs(&dropoffs, 2);
        let line = dropoff_context("Cattle", "USA", &dropoffs, &top).unwrap();
        assert_eq!(
            line,
            "The highest drop-offs are: 2019 (10), 2021 (5). In 2019, USA Cattle exports \
             experienced a significant drop-off. The highest value in the selected range was \
             70 in 2020, and the lowest value was 40 in 2019."
        );
    }
}
