use std::collections::{HashMap, HashSet};

use crate::models::{
    CohortOverview, Milestone, MilestoneCompletion, MilestoneDetail, MilestonePercentage,
    SubmissionRecord, TaskDetail, Team, TeamProgress,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProgressError {
    #[error("team {0} appears more than once in the team set")]
    DuplicateTeam(i64),
    #[error("task {0} appears more than once across milestones")]
    DuplicateTask(i64),
}

#[derive(Debug, Clone, Default)]
pub struct SubmissionLedger {
    entries: HashMap<(i64, i64), SubmissionRecord>,
}

impl SubmissionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = SubmissionRecord>) -> Self {
        let mut ledger = Self::new();
        for record in records {
            ledger.record(record);
        }
        ledger
    }

    pub fn record(&mut self, submission: SubmissionRecord) -> Option<SubmissionRecord> {
        self.entries
            .insert((submission.team_id, submission.task_id), submission)
    }

    pub fn get(&self, team_id: i64, task_id: i64) -> Option<&SubmissionRecord> {
        self.entries.get(&(team_id, task_id))
    }

    pub fn is_complete(&self, team_id: i64, task_id: i64) -> bool {
        self.entries.contains_key(&(team_id, task_id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn submitted_count(&self, team_id: i64, milestone: &Milestone) -> usize {
        milestone
            .tasks
            .iter()
            .filter(|task| self.is_complete(team_id, task.id))
            .count()
    }
}

fn ensure_unique_teams(teams: &[Team]) -> Result<(), ProgressError> {
    let mut seen = HashSet::with_capacity(teams.len());
    for team in teams {
        if !seen.insert(team.id) {
            return Err(ProgressError::DuplicateTeam(team.id));
        }
    }
    Ok(())
}

fn ensure_unique_tasks<'a>(
    milestones: impl IntoIterator<Item = &'a Milestone>,
) -> Result<(), ProgressError> {
    let mut seen = HashSet::new();
    for milestone in milestones {
        for task in &milestone.tasks {
            if !seen.insert(task.id) {
                return Err(ProgressError::DuplicateTask(task.id));
            }
        }
    }
    Ok(())
}

fn milestone_fraction(team_id: i64, milestone: &Milestone, ledger: &SubmissionLedger) -> f64 {
    let task_count = milestone.tasks.len();
    if task_count == 0 {
        return 0.0;
    }
    ledger.submitted_count(team_id, milestone) as f64 / task_count as f64
}

/// No partial credit: a team with one task outstanding counts as not
/// completed.
pub fn milestone_completion(
    milestone: &Milestone,
    teams: &[Team],
    ledger: &SubmissionLedger,
) -> Result<f64, ProgressError> {
    ensure_unique_teams(teams)?;
    ensure_unique_tasks(std::iter::once(milestone))?;

    let task_count = milestone.tasks.len();
    if task_count == 0 || teams.is_empty() {
        return Ok(0.0);
    }

    let completed = teams
        .iter()
        .filter(|team| ledger.submitted_count(team.id, milestone) == task_count)
        .count();

    Ok(completed as f64 / teams.len() as f64 * 100.0)
}

/// Halves round away from zero.
pub fn team_overall_progress(
    team: &Team,
    milestones: &[Milestone],
    ledger: &SubmissionLedger,
) -> Result<u32, ProgressError> {
    ensure_unique_tasks(milestones)?;

    if milestones.is_empty() {
        return Ok(0);
    }

    let total: f64 = milestones
        .iter()
        .map(|milestone| milestone_fraction(team.id, milestone, ledger))
        .sum();
    let percentage = (total / milestones.len() as f64 * 100.0).round();

    Ok(percentage.clamp(0.0, 100.0) as u32)
}

pub fn team_milestone_detail(
    team: &Team,
    milestones: &[Milestone],
    ledger: &SubmissionLedger,
) -> Result<Vec<MilestoneDetail>, ProgressError> {
    ensure_unique_tasks(milestones)?;

    let details = milestones
        .iter()
        .map(|milestone| MilestoneDetail {
            id: milestone.id,
            title: milestone.title.clone(),
            description: milestone.description.clone(),
            deadline: milestone.deadline,
            tasks: milestone
                .tasks
                .iter()
                .map(|task| {
                    let submission = ledger.get(team.id, task.id);
                    TaskDetail {
                        task_id: task.id,
                        description: task.description.clone(),
                        is_completed: submission.is_some(),
                        submission_time: submission.map(|s| s.submitted_at),
                        feedback: submission.and_then(|s| s.feedback.clone()),
                        feedback_time: submission.and_then(|s| s.feedback_time),
                    }
                })
                .collect(),
        })
        .collect();

    Ok(details)
}

pub fn team_milestone_percentages(
    team: &Team,
    milestones: &[Milestone],
    ledger: &SubmissionLedger,
) -> Result<Vec<MilestonePercentage>, ProgressError> {
    ensure_unique_tasks(milestones)?;

    Ok(milestones
        .iter()
        .map(|milestone| MilestonePercentage {
            milestone_id: milestone.id,
            title: milestone.title.clone(),
            completion_percentage: milestone_fraction(team.id, milestone, ledger) * 100.0,
        })
        .collect())
}

pub fn cohort_overview(
    milestones: &[Milestone],
    teams: &[Team],
    ledger: &SubmissionLedger,
) -> Result<CohortOverview, ProgressError> {
    ensure_unique_tasks(milestones)?;

    let mut rates = Vec::with_capacity(milestones.len());
    for milestone in milestones {
        rates.push(MilestoneCompletion {
            id: milestone.id,
            title: milestone.title.clone(),
            deadline: milestone.deadline,
            completion_rate: milestone_completion(milestone, teams, ledger)?,
        });
    }

    Ok(CohortOverview {
        no_of_teams: teams.len(),
        no_of_students: teams.iter().map(|team| team.member_ids.len()).sum(),
        milestones: rates,
    })
}

/// Best first; ties are ordered by team name.
pub fn rank_teams(
    teams: &[Team],
    milestones: &[Milestone],
    ledger: &SubmissionLedger,
) -> Result<Vec<TeamProgress>, ProgressError> {
    ensure_unique_teams(teams)?;

    let mut values = Vec::with_capacity(teams.len());
    for team in teams {
        values.push(TeamProgress {
            team_id: team.id,
            team_name: team.name.clone(),
            progress: team_overall_progress(team, milestones, ledger)?,
        });
    }

    values.sort_by(|a, b| {
        b.progress
            .cmp(&a.progress)
            .then_with(|| a.team_name.cmp(&b.team_name))
    });
    Ok(values)
}
