//! Derived KPIs and the feature record assembled from the raw filings.

use serde::Deserialize;
use tracing::{debug, info};

use crate::dto::{FeatureRecord, EDGAR_BROWSE_URL};
use crate::facts::{extract, FactsDocument, REVENUES, SALES_AND_MARKETING_EXPENSE};

const NOT_AVAILABLE: &str = "N/A";

/// Ratios derived across fiscal years, in percent with two decimals.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Kpis {
    pub yoy_revenue_growth_pct: Option<f64>,
    pub sm_expense_as_pct_revenue: Option<f64>,
}

/// Company metadata taken from the submissions document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmissionsDocument {
    #[serde(rename = "sicDescription", default)]
    pub sic_description: Option<String>,
    #[serde(rename = "fiscalYearEnd", default)]
    pub fiscal_year_end: Option<String>,
}

impl SubmissionsDocument {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Name and identifier of the account being processed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompanyIdentity {
    pub name: Option<String>,
    pub cik: Option<u64>,
}

/// Computes growth and sales-and-marketing share for `fiscal_year`.
///
/// Both outputs are `None` unless revenue and year are known. A ratio is only
/// computed over a strictly positive denominator.
pub fn derive(facts: &FactsDocument, latest_revenue: Option<f64>, fiscal_year: Option<i32>) -> Kpis {
    let (Some(latest), Some(year)) = (latest_revenue, fiscal_year) else {
        return Kpis::default();
    };

    let prior = year
        .checked_sub(1)
        .and_then(|prior_year| extract(facts, REVENUES, Some(prior_year)))
        .map(|f| f.value);
    let sm_expense = extract(facts, SALES_AND_MARKETING_EXPENSE, Some(year)).map(|f| f.value);
    debug!(year, ?prior, ?sm_expense, "kpi inputs");

    let yoy_revenue_growth_pct = prior
        .filter(|p| *p > 0.0)
        .and_then(|p| as_percent((latest - p) / p));
    let sm_expense_as_pct_revenue = sm_expense
        .filter(|_| latest > 0.0)
        .and_then(|e| as_percent(e / latest));

    Kpis {
        yoy_revenue_growth_pct,
        sm_expense_as_pct_revenue,
    }
}

/// `ratio * 100` rounded to two decimals; `None` for non-finite results.
///
/// Rounding works on the exact binary value with ties to even, so a
/// percentage such as `1 / 800 * 100` becomes `0.12`.
fn as_percent(ratio: f64) -> Option<f64> {
    let pct = ratio * 100.0;
    if !pct.is_finite() {
        return None;
    }
    format!("{pct:.2}").parse().ok()
}

/// Assembles the feature record for one account.
pub fn build_feature_record(
    facts: &FactsDocument,
    submissions: &SubmissionsDocument,
    identity: &CompanyIdentity,
) -> FeatureRecord {
    let latest = extract(facts, REVENUES, None);
    let latest_revenue = latest.map(|f| f.value);
    let fiscal_year = latest.map(|f| f.fiscal_year);
    let kpis = derive(facts, latest_revenue, fiscal_year);

    let record = FeatureRecord {
        company_name: identity.name.clone(),
        cik: identity.cik,
        fiscal_year,
        industry: submissions
            .sic_description
            .clone()
            .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        fiscal_year_end: submissions
            .fiscal_year_end
            .clone()
            .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        latest_revenue_usd: latest_revenue,
        yoy_revenue_growth_pct: kpis.yoy_revenue_growth_pct,
        sm_expense_as_pct_revenue: kpis.sm_expense_as_pct_revenue,
        data_source: format!(
            "{EDGAR_BROWSE_URL}?CIK={}",
            identity.cik.map(|c| c.to_string()).unwrap_or_default()
        ),
    };
    info!(
        cik = ?record.cik,
        fiscal_year = ?record.fiscal_year,
        revenue = ?record.latest_revenue_usd,
        yoy = ?record.yoy_revenue_growth_pct,
        sm_pct = ?record.sm_expense_as_pct_revenue,
        "feature record built"
    );
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn annual(val: f64, fy: i32) -> Value {
        json!({ "val": val, "fy": fy, "fp": "FY", "form": "10-K", "frame": format!("CY{fy}") })
    }

    fn facts(revenues: Value, sm_expense: Value) -> FactsDocument {
        FactsDocument::from_value(json!({
            "facts": { "us-gaap": {
                "Revenues": { "units": { "USD": revenues } },
                "SalesAndMarketingExpense": { "units": { "USD": sm_expense } }
            } }
        }))
    }

    #[test]
    fn two_years_of_revenue_and_sm_expense() {
        let doc = facts(
            json!([annual(100.0, 2023), annual(80.0, 2022)]),
            json!([annual(20.0, 2023)]),
        );
        let record = build_feature_record(
            &doc,
            &SubmissionsDocument::default(),
            &CompanyIdentity { name: Some("Acme Corp".into()), cik: Some(42) },
        );
        assert_eq!(record.latest_revenue_usd, Some(100.0));
        assert_eq!(record.fiscal_year, Some(2023));
        assert_eq!(record.yoy_revenue_growth_pct, Some(25.0));
        assert_eq!(record.sm_expense_as_pct_revenue, Some(20.0));
        assert_eq!(record.data_source, "https://www.sec.gov/edgar/browse/?CIK=42");
        assert_eq!(record.industry, "N/A");
        assert_eq!(record.fiscal_year_end, "N/A");
    }

    #[test]
    fn single_revenue_observation_has_no_growth() {
        let doc = facts(json!([annual(100.0, 2023)]), json!([]));
        let record = build_feature_record(
            &doc,
            &SubmissionsDocument::default(),
            &CompanyIdentity::default(),
        );
        assert_eq!(record.latest_revenue_usd, Some(100.0));
        assert_eq!(record.yoy_revenue_growth_pct, None);
        assert_eq!(record.sm_expense_as_pct_revenue, None);
    }

    #[test]
    fn missing_inputs_skip_computation() {
        let doc = facts(json!([annual(100.0, 2023), annual(80.0, 2022)]), json!([annual(20.0, 2023)]));
        assert_eq!(derive(&doc, None, Some(2023)), Kpis::default());
        assert_eq!(derive(&doc, Some(100.0), None), Kpis::default());
    }

    #[test]
    fn non_positive_prior_revenue_has_no_growth() {
        for prior in [0.0, -50.0] {
            let doc = facts(json!([annual(100.0, 2023), annual(prior, 2022)]), json!([]));
            assert_eq!(derive(&doc, Some(100.0), Some(2023)).yoy_revenue_growth_pct, None);
        }
    }

    #[test]
    fn non_positive_latest_revenue_has_no_sm_ratio() {
        for latest in [0.0, -10.0] {
            let doc = facts(json!([annual(80.0, 2022)]), json!([annual(20.0, 2023)]));
            let kpis = derive(&doc, Some(latest), Some(2023));
            assert_eq!(kpis.sm_expense_as_pct_revenue, None);
        }
    }

    #[test]
    fn negative_growth_is_rounded() {
        let doc = facts(json!([annual(2.0, 2023), annual(3.0, 2022)]), json!([]));
        assert_eq!(derive(&doc, Some(2.0), Some(2023)).yoy_revenue_growth_pct, Some(-33.33));
    }

    #[test]
    fn half_cent_ties_round_to_even() {
        let doc = facts(json!([annual(800.0, 2023)]), json!([annual(1.0, 2023)]));
        assert_eq!(derive(&doc, Some(800.0), Some(2023)).sm_expense_as_pct_revenue, Some(0.12));
        assert_eq!(as_percent(1.0 / 800.0), Some(0.12));
        assert_eq!(as_percent(-1.0 / 800.0), Some(-0.12));
        assert_eq!(as_percent(0.5), Some(50.0));
    }

    #[test]
    fn overflowing_ratio_is_absent() {
        let doc = facts(json!([annual(f64::MAX, 2023), annual(f64::MIN_POSITIVE, 2022)]), json!([]));
        assert_eq!(derive(&doc, Some(f64::MAX), Some(2023)).yoy_revenue_growth_pct, None);
    }

    #[test]
    fn submissions_metadata_is_copied() {
        let submissions = SubmissionsDocument::from_slice(
            br#"{"name":"ACME CORP","sicDescription":"Services-Prepackaged Software","fiscalYearEnd":"0131"}"#,
        )
        .unwrap();
        let record = build_feature_record(&FactsDocument::default(), &submissions, &CompanyIdentity::default());
        assert_eq!(record.industry, "Services-Prepackaged Software");
        assert_eq!(record.fiscal_year_end, "0131");
        assert_eq!(record.latest_revenue_usd, None);
        assert_eq!(record.fiscal_year, None);
    }

    #[test]
    fn derivation_is_repeatable() {
        let doc = facts(json!([annual(100.0, 2023), annual(80.0, 2022)]), json!([annual(20.0, 2023)]));
        assert_eq!(derive(&doc, Some(100.0), Some(2023)), derive(&doc, Some(100.0), Some(2023)));
    }
}
