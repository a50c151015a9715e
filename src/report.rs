use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::models::{CohortOverview, CommitSummary, Milestone, Team, TeamProgress};
use crate::progress::SubmissionLedger;

pub struct TeamActivity<'a> {
    pub team_name: &'a str,
    pub summary: &'a CommitSummary,
}

pub fn build_report(
    scope: Option<&str>,
    generated_at: DateTime<Utc>,
    overview: &CohortOverview,
    rankings: &[TeamProgress],
    activity: &[TeamActivity<'_>],
) -> String {
    let mut output = String::new();
    let scope_label = scope.unwrap_or("all teams");

    let _ = writeln!(output, "# Course Progress Report");
    let _ = writeln!(
        output,
        "Generated for {} on {}",
        scope_label,
        generated_at.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "{} teams, {} students",
        overview.no_of_teams, overview.no_of_students
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Milestone Completion");

    if overview.milestones.is_empty() {
        let _ = writeln!(output, "No milestones published yet.");
    } else {
        for milestone in &overview.milestones {
            let _ = writeln!(
                output,
                "- {} (due {}): {:.1}% of teams complete",
                milestone.title,
                milestone.deadline.format("%Y-%m-%d"),
                milestone.completion_rate
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Team Progress");

    if rankings.is_empty() {
        let _ = writeln!(output, "No teams in scope.");
    } else {
        for (rank, team) in rankings.iter().enumerate() {
            let _ = writeln!(output, "{}. {}: {}%", rank + 1, team.team_name, team.progress);
        }
    }

    if !activity.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Commit Activity");
        for entry in activity {
            let summary = entry.summary;
            let _ = writeln!(
                output,
                "- {}: {} commits, +{} / -{} lines",
                entry.team_name,
                summary.total_commits,
                summary.total_lines_added,
                summary.total_lines_deleted
            );
            for milestone in &summary.milestones {
                let _ = writeln!(
                    output,
                    "  - {}: {} commits, +{} / -{} lines",
                    milestone.name, milestone.commits, milestone.lines_added, milestone.lines_deleted
                );
            }
        }
    }

    output
}

/// Plain-text digest of one team handed to the AI reviewer.
pub fn build_progress_prompt(
    team: &Team,
    milestones: &[Milestone],
    ledger: &SubmissionLedger,
    progress: u32,
    commits: Option<&CommitSummary>,
) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "Team: {}", team.name);

    for milestone in milestones {
        let submitted = milestone
            .tasks
            .iter()
            .filter(|task| ledger.is_complete(team.id, task.id))
            .count();

        let _ = writeln!(output);
        let _ = writeln!(output, "Milestone: {}", milestone.title);
        let _ = writeln!(output, "Deadline: {}", milestone.deadline.format("%Y-%m-%d"));
        let _ = writeln!(
            output,
            "Tasks completed: {}/{}",
            submitted,
            milestone.tasks.len()
        );

        for task in &milestone.tasks {
            let submission = ledger.get(team.id, task.id);
            let _ = writeln!(output, "Task: {}", task.description);
            let _ = writeln!(
                output,
                "Submitted: {}",
                if submission.is_some() { "Yes" } else { "No" }
            );
            if let Some(submission) = submission {
                let _ = writeln!(
                    output,
                    "Submission time: {}",
                    submission.submitted_at.format("%Y-%m-%d %H:%M:%S")
                );
                if let Some(feedback) = &submission.feedback {
                    let _ = writeln!(output, "Feedback: {}", feedback);
                }
            }
        }
    }

    if let Some(stats) = commits {
        let _ = writeln!(output);
        let _ = writeln!(output, "GitHub Stats:");
        let _ = writeln!(output, "Total Commits: {}", stats.total_commits);
        let _ = writeln!(output, "Lines Added: {}", stats.total_lines_added);
        let _ = writeln!(output, "Lines Deleted: {}", stats.total_lines_deleted);
        for milestone in &stats.milestones {
            let _ = writeln!(output, "Milestone: {}", milestone.name);
            let _ = writeln!(output, "Commits: {}", milestone.commits);
            let _ = writeln!(output, "    Lines Added: {}", milestone.lines_added);
            let _ = writeln!(output, "    Lines Deleted: {}", milestone.lines_deleted);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "Overall Progress: {}%", progress);
    output
}
