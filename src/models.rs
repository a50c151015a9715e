use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub type MilestoneNameIndex = BTreeMap<i64, String>;

#[derive(Debug, Clone, Serialize)]
pub struct Team {
    pub id: i64,
    pub name: String,
    pub member_ids: Vec<i64>,
    pub github_repo_url: Option<String>,
    pub instructor_id: Option<i64>,
    pub ta_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: i64,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Milestone {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub deadline: DateTime<Utc>,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionRecord {
    pub team_id: i64,
    pub task_id: i64,
    pub submitted_at: DateTime<Utc>,
    pub feedback: Option<String>,
    pub feedback_by: Option<i64>,
    pub feedback_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct CommitRecord {
    pub author: Option<String>,
    pub author_email: Option<String>,
    pub message: String,
    pub lines_added: u64,
    pub lines_deleted: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MilestoneCommitStats {
    pub id: i64,
    pub name: String,
    pub commits: u64,
    pub lines_added: u64,
    pub lines_deleted: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommitSummary {
    pub total_commits: u64,
    pub total_lines_added: u64,
    pub total_lines_deleted: u64,
    pub milestones: Vec<MilestoneCommitStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskDetail {
    pub task_id: i64,
    pub description: String,
    pub is_completed: bool,
    pub submission_time: Option<DateTime<Utc>>,
    pub feedback: Option<String>,
    pub feedback_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MilestoneDetail {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub deadline: DateTime<Utc>,
    pub tasks: Vec<TaskDetail>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MilestoneCompletion {
    pub id: i64,
    pub title: String,
    pub deadline: DateTime<Utc>,
    pub completion_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MilestonePercentage {
    pub milestone_id: i64,
    pub title: String,
    pub completion_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamProgress {
    pub team_id: i64,
    pub team_name: String,
    pub progress: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortOverview {
    pub no_of_teams: usize,
    pub no_of_students: usize,
    pub milestones: Vec<MilestoneCompletion>,
}
