use crate::model::{Grade, Student, SubjectBonus};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Per-subject weight overrides used by the overall average. Subjects absent
/// from the map take the coefficient of their first recorded grade.
pub type SubjectWeights = BTreeMap<String, u32>;

/// Rounding applied to the displayed/ranked subject average. Every mode
/// rounds up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundingMode {
    #[default]
    None,
    Quarter,
    Half,
    Integer,
}

impl RoundingMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Some(Self::None),
            "quarter" => Some(Self::Quarter),
            "half" => Some(Self::Half),
            "integer" => Some(Self::Integer),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Quarter => "quarter",
            Self::Half => "half",
            Self::Integer => "integer",
        }
    }

    pub fn apply(self, x: f64) -> f64 {
        match self {
            Self::None => x,
            Self::Quarter => (x * 4.0).ceil() / 4.0,
            Self::Half => (x * 2.0).ceil() / 2.0,
            Self::Integer => x.ceil(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectTotals {
    pub points: f64,
    pub coefficient: f64,
    pub count: usize,
    pub average: f64,
}

pub fn subject_totals(grades: &[Grade], subject: &str) -> SubjectTotals {
    let mut points = 0.0_f64;
    let mut coefficient = 0.0_f64;
    let mut count = 0_usize;
    for g in grades.iter().filter(|g| g.subject == subject) {
        let coef = f64::from(g.coefficient);
        points += g.value * coef;
        coefficient += coef;
        count += 1;
    }
    let average = if coefficient > 0.0 {
        points / coefficient
    } else {
        0.0
    };
    SubjectTotals {
        points,
        coefficient,
        count,
        average,
    }
}

/// Weighted average of one subject's grades; 0 when the coefficients sum to 0.
pub fn subject_average(grades: &[Grade], subject: &str) -> f64 {
    subject_totals(grades, subject).average
}

pub fn adjusted_average(
    raw_average: f64,
    total_coefficient: f64,
    bonus: &SubjectBonus,
    mode: RoundingMode,
) -> f64 {
    let point_share = if total_coefficient > 0.0 {
        bonus.point_bonus / total_coefficient
    } else {
        0.0
    };
    mode.apply(raw_average + bonus.average_bonus + point_share)
}

pub fn student_subject_average(student: &Student, subject: &str, mode: RoundingMode) -> f64 {
    let totals = subject_totals(&student.grades, subject);
    adjusted_average(
        totals.average,
        totals.coefficient,
        &student.bonus_for(subject),
        mode,
    )
}

/// Weight of a subject inside the overall average, or `None` when the
/// student has no grade in it (the subject is then left out entirely).
pub fn subject_weight(grades: &[Grade], subject: &str, overrides: &SubjectWeights) -> Option<f64> {
    let first = grades.iter().find(|g| g.subject == subject)?;
    let weight = overrides
        .get(subject)
        .copied()
        .unwrap_or(first.coefficient);
    Some(f64::from(weight))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectLine {
    pub subject: String,
    pub totals: SubjectTotals,
    pub weight: Option<f64>,
    pub points: f64,
}

/// Raw (unadjusted, unrounded) per-subject contributions, in `subjects` order.
pub fn subject_lines(student: &Student, subjects: &[String], weights: &SubjectWeights) -> Vec<SubjectLine> {
    subjects
        .iter()
        .map(|subject| {
            let totals = subject_totals(&student.grades, subject);
            let weight = subject_weight(&student.grades, subject, weights);
            let points = weight.map(|w| totals.average * w).unwrap_or(0.0);
            SubjectLine {
                subject: subject.clone(),
                totals,
                weight,
                points,
            }
        })
        .collect()
}

pub fn overall_from_lines<'a, I>(lines: I) -> f64
where
    I: IntoIterator<Item = &'a SubjectLine>,
{
    let mut points = 0.0_f64;
    let mut weights = 0.0_f64;
    for line in lines {
        let Some(w) = line.weight else {
            continue;
        };
        points += line.points;
        weights += w;
    }
    if weights > 0.0 {
        points / weights
    } else {
        0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRankEntry {
    pub student_id: String,
    pub average: f64,
    pub has_grades: bool,
    pub rank: usize,
}

fn sort_descending<T>(rows: &mut [T], key: impl Fn(&T) -> f64) {
    // `sort_by` is stable: equal averages keep their input order.
    rows.sort_by(|a, b| key(b).partial_cmp(&key(a)).unwrap_or(Ordering::Equal));
}

pub fn rank_students_in_subject(
    students: &[Student],
    subject: &str,
    mode: RoundingMode,
) -> Vec<SubjectRankEntry> {
    let mut rows: Vec<SubjectRankEntry> = students
        .iter()
        .map(|s| SubjectRankEntry {
            student_id: s.id.clone(),
            average: student_subject_average(s, subject, mode),
            has_grades: s.has_grades_in(subject),
            rank: 0,
        })
        .collect();
    sort_descending(&mut rows, |r| r.average);
    for (i, row) in rows.iter_mut().enumerate() {
        row.rank = i + 1;
    }
    rows
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassStats {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub count: usize,
}

pub fn class_stats(values: &[f64]) -> ClassStats {
    if values.is_empty() {
        return ClassStats::default();
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let sum: f64 = values.iter().sum();
    ClassStats {
        min,
        max,
        avg: sum / values.len() as f64,
        count: values.len(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallRankEntry {
    pub student_id: String,
    pub average: f64,
    pub graded_subjects: usize,
    pub rank: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallRanking {
    pub global_rankings: Vec<OverallRankEntry>,
    pub class_stats: ClassStats,
}

impl OverallRanking {
    pub fn entry(&self, student_id: &str) -> Option<&OverallRankEntry> {
        self.global_rankings
            .iter()
            .find(|e| e.student_id == student_id)
    }
}

pub fn rank_students_overall(
    students: &[Student],
    subjects: &[String],
    weights: &SubjectWeights,
) -> OverallRanking {
    let mut rows: Vec<OverallRankEntry> = students
        .iter()
        .map(|s| {
            let lines = subject_lines(s, subjects, weights);
            OverallRankEntry {
                student_id: s.id.clone(),
                average: overall_from_lines(&lines),
                graded_subjects: lines.iter().filter(|l| l.weight.is_some()).count(),
                rank: 0,
            }
        })
        .collect();
    sort_descending(&mut rows, |r| r.average);
    for (i, row) in rows.iter_mut().enumerate() {
        row.rank = i + 1;
    }
    let averages: Vec<f64> = rows.iter().map(|r| r.average).collect();
    OverallRanking {
        class_stats: class_stats(&averages),
        global_rankings: rows,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectStats {
    pub subject: String,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
    pub graded_count: usize,
}

/// Class-wide spread of adjusted subject averages, over students holding at
/// least one grade in the subject.
pub fn subject_class_stats(
    students: &[Student],
    subjects: &[String],
    mode: RoundingMode,
) -> Vec<SubjectStats> {
    subjects
        .iter()
        .map(|subject| {
            let values: Vec<f64> = students
                .iter()
                .filter(|s| s.has_grades_in(subject))
                .map(|s| student_subject_average(s, subject, mode))
                .collect();
            if values.is_empty() {
                return SubjectStats {
                    subject: subject.clone(),
                    min: None,
                    max: None,
                    avg: None,
                    graded_count: 0,
                };
            }
            let stats = class_stats(&values);
            SubjectStats {
                subject: subject.clone(),
                min: Some(stats.min),
                max: Some(stats.max),
                avg: Some(stats.avg),
                graded_count: stats.count,
            }
        })
        .collect()
}

/// French ordinal: "1er", then "2ème", "3ème", ...
pub fn ordinal_fr(rank: usize) -> String {
    if rank == 1 {
        "1er".to_string()
    } else {
        format!("{}ème", rank)
    }
}
