//! Post-processing of the model's reply: JSON recovery and the keyword
//! safety net for dietary restrictions.

use crate::llm::Usage;
use crate::profile::DietaryRestriction;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value, json};

/// (item field, totals key, stays an integer while every input is one)
const TOTAL_FIELDS: [(&str, &str, bool); 4] = [
    ("calories_estimate", "calories", true),
    ("protein_g", "protein_g", false),
    ("carbs_g", "carbs_g", false),
    ("fat_g", "fat_g", false),
];

#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    /// The model's JSON object, or `{"raw": text}` when none could be recovered
    pub parsed: Value,
    /// Items dropped because they break a selected restriction
    pub removed_items: Vec<String>,
    pub raw: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    pub analyzed_at: DateTime<Utc>,
}

/// Parse the reply as JSON, falling back to the outermost `{...}` span.
pub fn extract_json(text: &str) -> Value {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return value;
    }
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            if let Ok(value) = serde_json::from_str::<Value>(&text[start..=end]) {
                return value;
            }
        }
    }
    json!({ "raw": text })
}

pub fn violates_restrictions(item_name: &str, restrictions: &[DietaryRestriction]) -> bool {
    if item_name.is_empty() || restrictions.is_empty() {
        return false;
    }
    let name = item_name.to_lowercase();
    restrictions.iter().any(|restriction| {
        restriction
            .keywords()
            .any(|kw| name.contains(kw) && !(kw == "nut" && name.contains("donut")))
    })
}

/// Drop items that break a restriction and recompute totals from what is left.
/// Returns the names of the removed items.
pub fn filter_items(parsed: &mut Value, restrictions: &[DietaryRestriction]) -> Vec<String> {
    let mut removed = Vec::new();
    let Some(object) = parsed.as_object_mut() else {
        return removed;
    };
    let Some(items) = object.get_mut("items").and_then(Value::as_array_mut) else {
        return removed;
    };

    items.retain(|item| {
        let name = item.get("name").and_then(Value::as_str).unwrap_or_default();
        if violates_restrictions(name, restrictions) {
            removed.push(name.to_string());
            false
        } else {
            true
        }
    });

    if let Some(totals) = sum_totals(items) {
        object.insert("totals".to_string(), totals);
    }
    removed
}

/// `None` when no item carried a numeric nutrient field.
fn sum_totals(items: &[Value]) -> Option<Value> {
    let mut sums = [0.0_f64; TOTAL_FIELDS.len()];
    let mut int_sums = TOTAL_FIELDS.map(|(_, _, integral)| integral.then_some(0_i64));
    let mut any_numeric = false;

    for item in items.iter().filter_map(Value::as_object) {
        for (i, (field, _, _)) in TOTAL_FIELDS.iter().enumerate() {
            let Some(n) = item.get(*field).filter(|v| v.is_number()) else {
                continue;
            };
            sums[i] += n.as_f64().unwrap_or_default();
            int_sums[i] = int_sums[i].and_then(|sum| sum.checked_add(n.as_i64()?));
            any_numeric = true;
        }
    }

    if !any_numeric {
        return None;
    }
    let totals: Map<String, Value> = TOTAL_FIELDS
        .iter()
        .zip(sums.into_iter().zip(int_sums))
        .map(|((_, total, _), (sum, int_sum))| {
            let value = match int_sum {
                Some(n) => json!(n),
                None => json!(round2(sum)),
            };
            (total.to_string(), value)
        })
        .collect();
    Some(Value::Object(totals))
}

fn round2(n: f64) -> f64 {
    (n * 100.0).round() / 100.0
}
