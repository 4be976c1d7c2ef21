use crate::calc::{
    self, ClassStats, OverallRanking, RoundingMode, SubjectLine, SubjectRankEntry, SubjectStats,
};
use crate::config::SchoolConfig;
use crate::model::Student;
use serde::Serialize;
use std::collections::BTreeMap;

const NO_DATA: &str = "-";

/// Fixed-decimals rendering with the French comma separator.
pub fn format_fr(value: f64, decimals: usize) -> String {
    format!("{:.*}", decimals, value).replace('.', ",")
}

/// Shortest rendering of a single grade: `16`, `14,5`, `13,25`.
pub fn format_note(value: f64) -> String {
    value.to_string().replace('.', ",")
}

fn format_opt(value: Option<f64>) -> String {
    value
        .map(|v| format_fr(v, 2))
        .unwrap_or_else(|| NO_DATA.to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRow {
    pub subject: String,
    pub notes: Vec<String>,
    pub notes_text: String,
    pub average: Option<f64>,
    pub average_text: String,
    pub raw_average: Option<f64>,
    pub weight: Option<f64>,
    pub points: Option<f64>,
    pub rank: Option<usize>,
    pub rank_label: Option<String>,
    pub appreciation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalRow {
    pub label: String,
    pub points: f64,
    pub weight: f64,
    pub average: Option<f64>,
    pub average_text: String,
    pub appreciation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupBlock {
    pub key: String,
    pub label: String,
    pub rows: Vec<SubjectRow>,
    pub bilan: TotalRow,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCard {
    pub student_id: String,
    pub display_name: String,
    pub class_name: String,
    pub rounding: RoundingMode,
    pub groups: Vec<GroupBlock>,
    pub grand_total: TotalRow,
    pub global_rank: Option<usize>,
    pub global_rank_label: Option<String>,
    pub student_count: usize,
    pub class_stats: ClassStats,
}

/// Class-level results shared by every report card of a class.
pub struct ClassContext<'a> {
    pub class_name: &'a str,
    pub config: &'a SchoolConfig,
    pub mode: RoundingMode,
    pub subject_rankings: &'a BTreeMap<String, Vec<SubjectRankEntry>>,
    pub overall: &'a OverallRanking,
}

fn total_row(label: &str, config: &SchoolConfig, points: f64, weight: f64, average: Option<f64>) -> TotalRow {
    TotalRow {
        label: label.to_string(),
        points,
        weight,
        average,
        average_text: format_opt(average),
        appreciation: average.map(|a| config.appreciation(a).to_string()),
    }
}

fn subject_row(student: &Student, line: &SubjectLine, ctx: &ClassContext<'_>) -> SubjectRow {
    let notes: Vec<String> = student
        .grades
        .iter()
        .filter(|g| g.subject == line.subject)
        .map(|g| format_note(g.value))
        .collect();
    let notes_text = if notes.is_empty() {
        NO_DATA.to_string()
    } else {
        notes.join(" ; ")
    };

    let Some(weight) = line.weight else {
        return SubjectRow {
            subject: line.subject.clone(),
            notes,
            notes_text,
            average: None,
            average_text: NO_DATA.to_string(),
            raw_average: None,
            weight: None,
            points: None,
            rank: None,
            rank_label: None,
            appreciation: None,
        };
    };

    let ranked = ctx
        .subject_rankings
        .get(&line.subject)
        .and_then(|rows| rows.iter().find(|r| r.student_id == student.id));
    let average = ranked
        .map(|r| r.average)
        .unwrap_or_else(|| calc::student_subject_average(student, &line.subject, ctx.mode));
    let rank = ranked.map(|r| r.rank);

    SubjectRow {
        subject: line.subject.clone(),
        notes,
        notes_text,
        average: Some(average),
        average_text: format_fr(average, 2),
        raw_average: Some(line.totals.average),
        weight: Some(weight),
        points: Some(line.points),
        rank,
        rank_label: rank.map(calc::ordinal_fr),
        appreciation: Some(ctx.config.appreciation(average).to_string()),
    }
}

fn group_order(config: &SchoolConfig) -> Vec<(String, String)> {
    let mut order: Vec<(String, String)> = config
        .subject_groups
        .iter()
        .map(|g| (g.key.clone(), g.label.clone()))
        .collect();
    if !order.iter().any(|(k, _)| *k == config.fallback_group) {
        order.push((config.fallback_group.clone(), config.fallback_group.clone()));
    }
    order
}

pub fn build_report_card(student: &Student, ctx: &ClassContext<'_>) -> ReportCard {
    let config = ctx.config;
    let lines = calc::subject_lines(student, &config.subjects, &config.subject_weights);

    let mut groups = Vec::new();
    for (key, label) in group_order(config) {
        let members: Vec<&SubjectLine> = lines
            .iter()
            .filter(|l| config.group_key_for(&l.subject) == key)
            .collect();
        if members.is_empty() {
            continue;
        }
        let rows: Vec<SubjectRow> = members.iter().map(|l| subject_row(student, l, ctx)).collect();
        let points: f64 = members.iter().filter(|l| l.weight.is_some()).map(|l| l.points).sum();
        let weight: f64 = members.iter().filter_map(|l| l.weight).sum();
        let average = if weight > 0.0 { Some(points / weight) } else { None };
        groups.push(GroupBlock {
            bilan: total_row(&format!("Bilan {}", label), config, points, weight, average),
            key,
            label,
            rows,
        });
    }

    // Same summation as the class ranking, in subject-list order.
    let grand_points: f64 = lines.iter().filter(|l| l.weight.is_some()).map(|l| l.points).sum();
    let grand_weight: f64 = lines.iter().filter_map(|l| l.weight).sum();
    let grand_average = if grand_weight > 0.0 {
        Some(calc::overall_from_lines(&lines))
    } else {
        None
    };

    let global_rank = ctx.overall.entry(&student.id).map(|e| e.rank);

    ReportCard {
        student_id: student.id.clone(),
        display_name: student.display_name(),
        class_name: ctx.class_name.to_string(),
        rounding: ctx.mode,
        groups,
        grand_total: total_row("Total général", config, grand_points, grand_weight, grand_average),
        global_rank,
        global_rank_label: global_rank.map(calc::ordinal_fr),
        student_count: ctx.overall.global_rankings.len(),
        class_stats: ctx.overall.class_stats,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassReport {
    pub class_name: String,
    pub rounding: RoundingMode,
    pub overall: OverallRanking,
    pub subject_stats: Vec<SubjectStats>,
    pub subject_rankings: BTreeMap<String, Vec<SubjectRankEntry>>,
    pub cards: Vec<ReportCard>,
}

/// Runs every ranking for a class once and assembles all report cards.
/// `students` must be in the class's display order; ties keep that order.
pub fn build_class_report(
    students: &[Student],
    class_name: &str,
    config: &SchoolConfig,
    mode: RoundingMode,
) -> ClassReport {
    let subject_rankings: BTreeMap<String, Vec<SubjectRankEntry>> = config
        .subjects
        .iter()
        .map(|s| (s.clone(), calc::rank_students_in_subject(students, s, mode)))
        .collect();
    let overall = calc::rank_students_overall(students, &config.subjects, &config.subject_weights);
    let subject_stats = calc::subject_class_stats(students, &config.subjects, mode);

    let cards = {
        let ctx = ClassContext {
            class_name,
            config,
            mode,
            subject_rankings: &subject_rankings,
            overall: &overall,
        };
        students.iter().map(|s| build_report_card(s, &ctx)).collect()
    };

    ClassReport {
        class_name: class_name.to_string(),
        rounding: mode,
        overall,
        subject_stats,
        subject_rankings,
        cards,
    }
}
