//! Resolves single financial concepts out of a company facts document.
//!
//! Every lookup returns `Option<Fact>`: a concept that is missing, reported
//! in another unit or malformed resolves to `None` so that one gap never
//! aborts the derivation of the remaining figures.

use std::cmp::Reverse;

use serde_json::Value;
use tracing::debug;

pub const US_GAAP: &str = "us-gaap";
pub const USD: &str = "USD";
/// Form type of an annual report.
pub const ANNUAL_FORM: &str = "10-K";

pub const REVENUES: &str = "Revenues";
pub const SALES_AND_MARKETING_EXPENSE: &str = "SalesAndMarketingExpense";

/// One reported value of a concept.
///
/// Fields are read one by one, so a bad field only affects its own entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Observation {
    pub val: Option<f64>,
    pub fy: Option<i32>,
    pub fp: Option<String>,
    pub form: Option<String>,
    /// Set only on facts normalized to a comparable calendar frame.
    pub frame: Option<String>,
}

impl Observation {
    /// Reads an entry of a unit list; `None` when the entry is not an object.
    pub fn from_value(entry: &Value) -> Option<Self> {
        let entry = entry.as_object()?;
        let text = |key: &str| entry.get(key).and_then(Value::as_str).map(str::to_string);
        Some(Self {
            val: entry.get("val").and_then(Value::as_f64),
            fy: entry
                .get("fy")
                .and_then(Value::as_i64)
                .and_then(|fy| i32::try_from(fy).ok()),
            fp: text("fp"),
            form: text("form"),
            frame: text("frame"),
        })
    }

    pub fn is_annual(&self) -> bool {
        self.frame.is_some() && self.form.as_deref() == Some(ANNUAL_FORM)
    }

    fn to_fact(&self) -> Option<Fact> {
        let value = self.val.filter(|v| v.is_finite())?;
        Some(Fact {
            value,
            fiscal_year: self.fy?,
        })
    }
}

/// A resolved value together with the fiscal year it was reported for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fact {
    pub value: f64,
    pub fiscal_year: i32,
}

/// Read-only view over the raw company facts document
/// (`facts -> taxonomy -> concept -> units -> unit -> [observation]`).
#[derive(Debug, Clone, Default)]
pub struct FactsDocument {
    raw: Value,
}

impl FactsDocument {
    pub fn from_value(raw: Value) -> Self {
        Self { raw }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes).map(Self::from_value)
    }

    /// USD observations of a `us-gaap` concept, in document order.
    pub fn usd_observations(&self, concept: &str) -> Option<Vec<Observation>> {
        let list = self
            .raw
            .get("facts")?
            .get(US_GAAP)?
            .get(concept)?
            .get("units")?
            .get(USD)?;
        let Some(entries) = list.as_array() else {
            debug!(concept, "USD unit is not a list");
            return None;
        };
        Some(entries.iter().filter_map(Observation::from_value).collect())
    }
}

/// Most recent value of `concept`, or the value for exactly `fiscal_year`.
///
/// Annual observations (framed 10-K facts) are preferred. When a concept has
/// none, the latest entry of the unfiltered list is returned instead,
/// regardless of `fiscal_year`. When annual observations exist, an explicit
/// year must match exactly.
pub fn extract(facts: &FactsDocument, concept: &str, fiscal_year: Option<i32>) -> Option<Fact> {
    let observations = facts.usd_observations(concept)?;

    let mut annual: Vec<&Observation> = observations.iter().filter(|o| o.is_annual()).collect();
    if annual.is_empty() {
        let mut all: Vec<&Observation> = observations.iter().collect();
        sort_latest_first(&mut all);
        let fact = all.first().and_then(|o| o.to_fact());
        debug!(concept, ?fact, "no annual observations, using latest entry");
        return fact;
    }

    sort_latest_first(&mut annual);
    let target = match fiscal_year {
        Some(year) => annual.iter().find(|o| o.fy == Some(year))?,
        None => annual.first()?,
    };
    target.to_fact()
}

fn sort_latest_first(observations: &mut [&Observation]) {
    observations.sort_by_key(|o| Reverse(o.fy.unwrap_or(0)));
}
