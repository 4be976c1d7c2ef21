use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grade {
    pub id: String,
    pub subject: String,
    pub value: f64,
    pub coefficient: u32,
    /// Free-form label ("Devoir", "Interrogation", "Composition", ...).
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

/// Manual adjustment for one subject. `average_bonus` is added to the
/// computed average, `point_bonus` to the weighted point total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectBonus {
    #[serde(default)]
    pub average_bonus: f64,
    #[serde(default)]
    pub point_bonus: f64,
}

impl SubjectBonus {
    pub fn is_zero(&self) -> bool {
        self.average_bonus == 0.0 && self.point_bonus == 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRecord {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub class_id: String,
    pub last_name: String,
    pub first_name: String,
    pub sort_order: i64,
    #[serde(default)]
    pub grades: Vec<Grade>,
    #[serde(default)]
    pub bonuses: BTreeMap<String, SubjectBonus>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Student {
    pub fn display_name(&self) -> String {
        format!("{}, {}", self.last_name, self.first_name)
    }

    pub fn bonus_for(&self, subject: &str) -> SubjectBonus {
        self.bonuses.get(subject).copied().unwrap_or_default()
    }

    pub fn has_grades_in(&self, subject: &str) -> bool {
        self.grades.iter().any(|g| g.subject == subject)
    }
}
