//! Pre-flight feasibility analysis.
//!
//! A sequence of independent static checks run against the fact tables before
//! any model is built. Each check is isolated: a failure inside one check is
//! demoted to a critical issue string so the remaining checks still run, and
//! partial diagnosis beats aborting. The verdict is purely structural: the
//! problem is considered feasible when no critical issue was recorded, and
//! warnings never affect it.

use serde::Serialize;
use tabled::{
    builder::Builder,
    settings::{Color, Style, object::Rows},
};

use crate::data::{DataError, Field, ProblemData};

/// Supply below this multiple of demand draws a tightness warning.
const SUPPLY_BUFFER: f64 = 1.1;

/// Theoretical output below this share of demanded output is critical.
const CAPACITY_THRESHOLD: f64 = 0.9;

type Check = fn(&ProblemData, &mut FeasibilityReport) -> Result<(), DataError>;

const CHECKS: [(&str, Check); 5] = [
    ("total supply", check_total_supply),
    ("product compatibility", check_product_compatibility),
    ("cumulative supply", check_cumulative_supply),
    ("production capacity", check_production_capacity),
    (
        "compatibility-constrained supply",
        check_compatible_supply,
    ),
];

/// Outcome of the pre-flight analysis.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FeasibilityReport {
    /// Issues that make the problem unlikely to solve.
    pub critical_issues: Vec<String>,

    /// Observations that do not affect the verdict.
    pub warnings: Vec<String>,
}

impl FeasibilityReport {
    /// The problem appears feasible: no critical issue was recorded.
    pub fn is_feasible(&self) -> bool {
        self.critical_issues.is_empty()
    }

    /// Render the report as a text table.
    pub fn render(&self) -> String {
        let mut builder = Builder::default();
        builder.push_record(["Severity", "Finding"]);

        for issue in &self.critical_issues {
            builder.push_record(["critical", issue]);
        }

        for warning in &self.warnings {
            builder.push_record(["warning", warning]);
        }

        if self.critical_issues.is_empty() && self.warnings.is_empty() {
            builder.push_record(["ok", "No issues detected."]);
        }

        let mut table = builder.build();
        table.with(Style::modern_rounded());
        table.modify(Rows::first(), Color::BOLD);

        table.to_string()
    }
}

/// Run every feasibility check against the fact tables.
///
/// # Errors
///
/// Returns [`DataError::MissingFields`] when any dimension list or fact table
/// is absent; the checks themselves never abort the analysis.
pub fn analyze(data: &ProblemData) -> Result<FeasibilityReport, DataError> {
    data.validate_fields(&Field::ALL)?;

    let mut report = FeasibilityReport::default();
    report.warnings.extend(data.structural_issues());

    for (name, check) in CHECKS {
        if let Err(error) = check(data, &mut report) {
            report
                .critical_issues
                .push(format!("Error checking {name}: {error}"));
        }
    }

    tracing::info!(
        feasible = report.is_feasible(),
        critical = report.critical_issues.len(),
        warnings = report.warnings.len(),
        "feasibility analysis finished"
    );

    Ok(report)
}

fn check_total_supply(data: &ProblemData, report: &mut FeasibilityReport) -> Result<(), DataError> {
    let total_supply = data.total_supply();
    let total_demand = data.total_demand();

    if total_supply < total_demand {
        report.critical_issues.push(format!(
            "Insufficient total resource supply: {total_supply} units available, \
             but {total_demand} units required for demand."
        ));
    } else if total_supply < total_demand * SUPPLY_BUFFER {
        report.warnings.push(format!(
            "Supply is tight: only {total_supply} units available for \
             {total_demand} units of demand (less than 10% margin)."
        ));
    }

    Ok(())
}

fn check_product_compatibility(
    data: &ProblemData,
    report: &mut FeasibilityReport,
) -> Result<(), DataError> {
    for product in data.products() {
        if data.compatible_resources(product).is_empty() {
            report.critical_issues.push(format!(
                "Product type '{product}' has no compatible resource types."
            ));
        }
    }

    Ok(())
}

fn check_cumulative_supply(
    data: &ProblemData,
    report: &mut FeasibilityReport,
) -> Result<(), DataError> {
    let mut cumulative_supply = 0.0;
    let mut cumulative_demand = 0.0;

    for period in data.periods() {
        cumulative_supply += data.supply_in_period(period);
        cumulative_demand += data.demand_in_period(period);

        if cumulative_supply < cumulative_demand {
            report.critical_issues.push(format!(
                "Insufficient cumulative supply by {period}: {cumulative_supply} units \
                 available, but {cumulative_demand} units required."
            ));
        }
    }

    Ok(())
}

fn check_production_capacity(
    data: &ProblemData,
    report: &mut FeasibilityReport,
) -> Result<(), DataError> {
    for product in data.products() {
        let capacity = data.yield_of(product);
        let product_demand = data.demand_for_product(product);
        let compatible = data.compatible_resources(product);

        if capacity <= 0.0 && product_demand > 0.0 {
            report.critical_issues.push(format!(
                "Product type '{product}' has demand of {product_demand} but production \
                 capacity is zero or negative ({capacity} output units per resource unit)."
            ));
        }

        if capacity > 0.0 && !compatible.is_empty() && product_demand > 0.0 {
            let max_output: f64 = compatible
                .iter()
                .map(|resource| data.supply_for_resource(resource) * capacity)
                .sum();
            let demanded_output = product_demand * capacity;

            if max_output < demanded_output * CAPACITY_THRESHOLD {
                let coverage = max_output / demanded_output * 100.0;
                report.critical_issues.push(format!(
                    "Insufficient production capacity for product type '{product}': maximum \
                     possible output is {max_output:.1} units, but demand is \
                     {demanded_output:.1} units (only {coverage:.1}% of demand can be met)."
                ));
            }
        }
    }

    Ok(())
}

#[derive(Debug, Clone)]
struct Deficit {
    period: String,
    needed: f64,
    compatible_supply: f64,
    deficit_pct: f64,
}

fn check_compatible_supply(
    data: &ProblemData,
    report: &mut FeasibilityReport,
) -> Result<(), DataError> {
    for product in data.products() {
        let compatible = data.compatible_resources(product);

        // Products with no compatible resources or invalid capacity are
        // already reported by earlier checks; skip them to avoid
        // double-counting.
        if compatible.is_empty() {
            continue;
        }

        let capacity = data.yield_of(product);
        if capacity <= 0.0 {
            continue;
        }

        let mut deficits = Vec::new();
        for period in data.periods() {
            let demand = data.demand_at(product, period).unwrap_or(0.0);
            if demand <= 0.0 {
                continue;
            }

            let needed = demand / capacity;
            let compatible_supply: f64 = compatible
                .iter()
                .map(|resource| data.supply_at(resource, period).unwrap_or(0.0))
                .sum();

            if compatible_supply < needed {
                deficits.push(Deficit {
                    period: period.clone(),
                    needed,
                    compatible_supply,
                    deficit_pct: (needed - compatible_supply) / needed * 100.0,
                });
            }
        }

        for group in group_consecutive_periods(deficits) {
            match group.as_slice() {
                [] => {}
                [deficit] => report.critical_issues.push(format!(
                    "Insufficient compatible supply for product '{product}' in {period}: \
                     need {needed:.1} resource units but only {available:.1} compatible \
                     units available ({pct:.1}% shortage).",
                    period = deficit.period,
                    needed = deficit.needed,
                    available = deficit.compatible_supply,
                    pct = deficit.deficit_pct,
                )),
                [first, .., last] => {
                    #[expect(clippy::cast_precision_loss, reason = "group sizes are tiny")]
                    let avg = group.iter().map(|d| d.deficit_pct).sum::<f64>()
                        / group.len() as f64;

                    report.critical_issues.push(format!(
                        "Insufficient compatible supply for product '{product}' in \
                         {start}-{end}: average {avg:.1}% shortage of compatible resources.",
                        start = first.period,
                        end = last.period,
                    ));
                }
            }
        }
    }

    Ok(())
}

/// Parse the trailing number of a `Week N` style label.
fn week_number(label: &str) -> Option<i64> {
    if !label.contains("Week") {
        return None;
    }

    label.split_whitespace().last()?.parse().ok()
}

/// Group deficits whose period labels are exactly one week apart.
///
/// Deficits keep the problem's period order, so labels like `Week 10` that
/// a lexicographic sort would misplace still follow `Week 9`. Unparsable
/// labels never merge with anything, and only a numeric suffix exactly one
/// higher than the previous one extends a group.
fn group_consecutive_periods(deficits: Vec<Deficit>) -> Vec<Vec<Deficit>> {
    if deficits.is_empty() {
        return Vec::new();
    }

    let mut groups: Vec<Vec<Deficit>> = Vec::new();
    let mut iter = deficits.into_iter();

    if let Some(first) = iter.next() {
        let mut current = vec![first];

        for deficit in iter {
            let merges = current.last().is_some_and(|last| {
                match (week_number(&last.period), week_number(&deficit.period)) {
                    (Some(prev), Some(next)) => next == prev + 1,
                    _ => last.period == deficit.period,
                }
            });

            if merges {
                current.push(deficit);
            } else {
                groups.push(std::mem::take(&mut current));
                current.push(deficit);
            }
        }

        groups.push(current);
    }

    groups
}
