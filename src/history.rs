//! Closed-day history and its column totals.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::api::RegisterApi;
use crate::error::Result;

/// One closed register as listed by the daily-cash endpoint. Older documents
/// use different field names, hence the aliases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClosedDay {
    #[serde(default, rename = "_id", alias = "id")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_day")]
    pub date: Option<NaiveDate>,
    #[serde(
        default,
        alias = "initial_amount_counted",
        alias = "initial_cash"
    )]
    pub initial_amount: Decimal,
    #[serde(default, alias = "total_income", alias = "revenue", alias = "income")]
    pub billing: Decimal,
    #[serde(default, alias = "total_expenses")]
    pub expenses: Decimal,
    #[serde(default, alias = "final_count", alias = "current_balance")]
    pub final_amount: Decimal,
    #[serde(default)]
    pub responsible: Option<String>,
}

/// Column sums over a set of closed days.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HistorySummary {
    pub days: usize,
    pub total_initial: Decimal,
    pub total_billing: Decimal,
    pub total_expenses: Decimal,
    pub total_balance: Decimal,
}

impl HistorySummary {
    pub fn from_days(days: &[ClosedDay]) -> Self {
        days.iter().fold(
            HistorySummary {
                days: days.len(),
                ..Default::default()
            },
            |mut acc, day| {
                acc.total_initial += day.initial_amount;
                acc.total_billing += day.billing;
                acc.total_expenses += day.expenses;
                acc.total_balance += day.final_amount;
                acc
            },
        )
    }
}

/// Fetch closed days and sum them.
pub async fn load_history<A: RegisterApi>(api: &A) -> Result<(Vec<ClosedDay>, HistorySummary)> {
    let days = api.closed_days().await?;
    let summary = HistorySummary::from_days(&days);
    Ok((days, summary))
}

/// Dates arrive either as `YYYY-MM-DD` or as a full date-time.
fn deserialize_day<'de, D>(deserializer: D) -> std::result::Result<Option<NaiveDate>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| {
        let s = s.trim();
        NaiveDate::parse_from_str(s.get(..10).unwrap_or(s), "%Y-%m-%d").ok()
    }))
}
