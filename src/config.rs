use crate::calc::{RoundingMode, SubjectWeights};
use serde::{Deserialize, Serialize};

pub const SETTINGS_KEY: &str = "setup.school";

pub const DEFAULT_SUBJECTS: [&str; 13] = [
    "Mathématiques",
    "Physique-Chimie",
    "SVT",
    "Informatique",
    "Français",
    "Anglais",
    "Espagnol",
    "Histoire-Géographie",
    "Philosophie",
    "Éducation Civique",
    "EPS",
    "Arts Plastiques",
    "Musique",
];

const SCIENCES: [&str; 4] = ["Mathématiques", "Physique-Chimie", "SVT", "Informatique"];
const HUMANITIES: [&str; 6] = [
    "Français",
    "Anglais",
    "Espagnol",
    "Histoire-Géographie",
    "Philosophie",
    "Éducation Civique",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectGroup {
    pub key: String,
    pub label: String,
    #[serde(default)]
    pub subjects: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppreciationBand {
    pub min: f64,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchoolConfig {
    pub subjects: Vec<String>,
    pub subject_groups: Vec<SubjectGroup>,
    /// Group receiving any subject not listed in `subject_groups`.
    pub fallback_group: String,
    /// Sorted by descending `min`.
    pub appreciations: Vec<AppreciationBand>,
    pub lowest_appreciation: String,
    pub default_rounding: RoundingMode,
    pub subject_weights: SubjectWeights,
}

fn strings(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

impl Default for SchoolConfig {
    fn default() -> Self {
        let appreciations = [
            (18.0, "Excellent"),
            (16.0, "Très bien"),
            (14.0, "Bien"),
            (12.0, "Assez bien"),
            (10.0, "Passable"),
            (8.0, "Insuffisant"),
            (6.0, "Faible"),
            (5.0, "Très faible"),
        ]
        .into_iter()
        .map(|(min, label)| AppreciationBand {
            min,
            label: label.to_string(),
        })
        .collect();

        Self {
            subjects: strings(&DEFAULT_SUBJECTS),
            subject_groups: vec![
                SubjectGroup {
                    key: "sciences".to_string(),
                    label: "Sciences".to_string(),
                    subjects: strings(&SCIENCES),
                },
                SubjectGroup {
                    key: "humanities".to_string(),
                    label: "Lettres et sciences humaines".to_string(),
                    subjects: strings(&HUMANITIES),
                },
                SubjectGroup {
                    key: "other".to_string(),
                    label: "Autres matières".to_string(),
                    subjects: Vec::new(),
                },
            ],
            fallback_group: "other".to_string(),
            appreciations,
            lowest_appreciation: "Nul".to_string(),
            default_rounding: RoundingMode::None,
            subject_weights: SubjectWeights::new(),
        }
    }
}

impl SchoolConfig {
    pub fn group_key_for(&self, subject: &str) -> &str {
        self.subject_groups
            .iter()
            .find(|g| g.subjects.iter().any(|s| s == subject))
            .map(|g| g.key.as_str())
            .unwrap_or(self.fallback_group.as_str())
    }

    pub fn appreciation(&self, average: f64) -> &str {
        self.appreciations
            .iter()
            .find(|b| average >= b.min)
            .map(|b| b.label.as_str())
            .unwrap_or(self.lowest_appreciation.as_str())
    }

    /// Normalises and checks a config coming from `setup.update`.
    pub fn validated(mut self) -> Result<Self, String> {
        let mut seen = std::collections::HashSet::new();
        let mut subjects = Vec::with_capacity(self.subjects.len());
        for s in &self.subjects {
            let t = s.trim();
            if t.is_empty() {
                return Err("subjects must not contain empty names".into());
            }
            if seen.insert(t.to_string()) {
                subjects.push(t.to_string());
            }
        }
        if subjects.is_empty() {
            return Err("subjects must not be empty".into());
        }
        self.subjects = subjects;

        let mut keys = std::collections::HashSet::new();
        for g in &self.subject_groups {
            if g.key.trim().is_empty() {
                return Err("subjectGroups keys must not be empty".into());
            }
            if !keys.insert(g.key.clone()) {
                return Err(format!("duplicate subject group key: {}", g.key));
            }
        }
        if self.fallback_group.trim().is_empty() {
            return Err("fallbackGroup must not be empty".into());
        }

        for b in &self.appreciations {
            if !b.min.is_finite() {
                return Err("appreciation thresholds must be finite".into());
            }
            if b.label.trim().is_empty() {
                return Err("appreciation labels must not be empty".into());
            }
        }
        self.appreciations
            .sort_by(|a, b| b.min.partial_cmp(&a.min).unwrap_or(std::cmp::Ordering::Equal));

        if let Some((subject, _)) = self.subject_weights.iter().find(|(_, w)| **w == 0) {
            return Err(format!("subjectWeights.{} must be >= 1", subject));
        }
        Ok(self)
    }
}
