//! Expense record as held by a store
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use expq_core::json::{datetime_to_json, decimal_to_json};
use expq_core::{Decimal, Row};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::str::FromStr;

/// Store field names in wire order
pub const EXPENSE_FIELDS: &[&str] = &[
    "id",
    "user_id",
    "amount",
    "category",
    "subcategory",
    "paymentMethod",
    "description",
    "date",
    "companions",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: String,
    pub user_id: String,
    #[serde(serialize_with = "serialize_amount", deserialize_with = "deserialize_amount")]
    pub amount: Decimal,
    pub category: String,
    #[serde(default)]
    pub subcategory: Option<String>,
    #[serde(rename = "paymentMethod", alias = "payment_method")]
    pub payment_method: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(deserialize_with = "deserialize_date")]
    pub date: DateTime<Utc>,
    /// Stored lowercase
    #[serde(default)]
    pub companions: Vec<String>,
}

impl Expense {
    pub fn new(
        id: impl Into<String>,
        user_id: impl Into<String>,
        amount: Decimal,
        category: impl Into<String>,
        payment_method: impl Into<String>,
        date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            amount,
            category: category.into(),
            subcategory: None,
            payment_method: payment_method.into(),
            description: None,
            date,
            companions: Vec::new(),
        }
    }

    pub fn with_subcategory(mut self, subcategory: impl Into<String>) -> Self {
        self.subcategory = Some(subcategory.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_companions<I, S>(mut self, companions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.companions = companions
            .into_iter()
            .map(|c| c.into().to_lowercase())
            .collect();
        self
    }

    /// JSON-safe value of a named field. `None` for unknown fields.
    pub fn field(&self, name: &str) -> Option<Value> {
        let value = match name {
            "id" => Value::String(self.id.clone()),
            "user_id" => Value::String(self.user_id.clone()),
            "amount" => decimal_to_json(self.amount),
            "category" => Value::String(self.category.clone()),
            "subcategory" => optional_text(&self.subcategory),
            "paymentMethod" | "payment_method" => Value::String(self.payment_method.clone()),
            "description" => optional_text(&self.description),
            "date" => datetime_to_json(self.date),
            "companions" => Value::Array(
                self.companions
                    .iter()
                    .map(|c| Value::String(c.clone()))
                    .collect(),
            ),
            _ => return None,
        };
        Some(value)
    }

    /// Exact numeric value of a field, when it has one
    pub fn decimal_field(&self, name: &str) -> Option<Decimal> {
        match name {
            "amount" => Some(self.amount),
            other => match self.field(other)? {
                Value::String(s) => Decimal::from_str(s.trim()).ok(),
                _ => None,
            },
        }
    }

    /// Flat row, optionally projected onto `columns`
    pub fn to_row(&self, columns: Option<&[String]>) -> Row {
        let mut row = Row::new();
        match columns.filter(|c| !c.is_empty()) {
            Some(columns) => {
                for name in columns {
                    if let Some(value) = self.field(name) {
                        row.insert(name.clone(), value);
                    }
                }
            }
            None => {
                for name in EXPENSE_FIELDS {
                    if let Some(value) = self.field(name) {
                        row.insert((*name).to_string(), value);
                    }
                }
            }
        }
        row
    }
}

fn optional_text(value: &Option<String>) -> Value {
    value
        .as_ref()
        .map(|s| Value::String(s.clone()))
        .unwrap_or(Value::Null)
}

fn serialize_amount<S: Serializer>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error> {
    decimal_to_json(*value).serialize(serializer)
}

/// Accepts JSON numbers and numeric strings without passing through f64
fn deserialize_amount<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Decimal, D::Error> {
    let raw = Value::deserialize(deserializer)?;
    let text = match &raw {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        other => return Err(D::Error::custom(format!("invalid amount: {}", other))),
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(D::Error::custom)
}

/// RFC 3339 timestamps or bare dates (midnight UTC)
fn deserialize_date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let text = String::deserialize(deserializer)?;
    if let Ok(ts) = DateTime::parse_from_rfc3339(&text) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(&text, "%Y-%m-%d")
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
        .map_err(|e| D::Error::custom(format!("invalid date '{}': {}", text, e)))
}
