use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::{ArgGroup, Parser, Subcommand};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod commits;
mod config;
mod db;
mod git;
mod models;
mod progress;
mod report;
mod validate;

use config::Config;
use models::{CommitSummary, Milestone, MilestoneNameIndex, Team};
use progress::SubmissionLedger;
use validate::MilestoneDraft;

#[derive(Parser)]
#[command(name = "course-milestone-tracker")]
#[command(about = "Milestone, submission and commit progress tracker for course projects", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import submissions from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Completion rate of every milestone across teams
    Milestones {
        /// Only teams this instructor or TA oversees
        #[arg(long)]
        staff: Option<i64>,
        #[arg(long)]
        json: bool,
    },
    /// Overall progress of every team
    Progress {
        #[arg(long)]
        staff: Option<i64>,
        #[arg(long)]
        json: bool,
    },
    /// Per-task progress and feedback for one team
    Team {
        #[arg(long)]
        team: i64,
        #[arg(long)]
        staff: Option<i64>,
        #[arg(long)]
        json: bool,
    },
    /// Record a submission for a team's task
    Submit {
        #[arg(long)]
        team: i64,
        #[arg(long)]
        task: i64,
    },
    /// Leave feedback on a submission
    Feedback {
        #[arg(long)]
        team: i64,
        #[arg(long)]
        task: i64,
        /// Instructor or TA giving the feedback
        #[arg(long)]
        by: i64,
        #[arg(long)]
        text: String,
    },
    /// Publish a milestone with its tasks
    CreateMilestone {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: String,
        /// RFC 3339 or RFC 2822 timestamp
        #[arg(long, value_parser = parse_deadline)]
        deadline: DateTime<Utc>,
        /// Task description; repeat for each task
        #[arg(long = "task")]
        tasks: Vec<String>,
        #[arg(long)]
        by: Option<i64>,
    },
    /// Edit a milestone; only the given fields change
    UpdateMilestone {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, value_parser = parse_deadline)]
        deadline: Option<DateTime<Utc>>,
        /// Replaces every task, and drops their submissions; repeat for each task
        #[arg(long = "task")]
        tasks: Vec<String>,
    },
    /// Delete a milestone with its tasks and submissions
    DeleteMilestone {
        #[arg(long)]
        id: i64,
    },
    /// Commit statistics per milestone from a local clone of the team repository
    #[command(group(
        ArgGroup::new("who")
            .args(["author", "member"])
            .multiple(false)
    ))]
    Commits {
        #[arg(long)]
        team: i64,
        #[arg(long)]
        repo: PathBuf,
        /// Commit author name, email, or email user part to filter on
        #[arg(long)]
        author: Option<String>,
        /// Team member whose GitHub username filters commits
        #[arg(long)]
        member: Option<i64>,
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown progress report
    Report {
        #[arg(long)]
        staff: Option<i64>,
        /// Directory holding team clones, one per repository name
        #[arg(long)]
        clones: Option<PathBuf>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Print the progress digest the AI reviewer receives for a team
    Prompt {
        #[arg(long)]
        team: i64,
        #[arg(long)]
        repo: Option<PathBuf>,
    },
}

fn parse_deadline(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .or_else(|_| DateTime::parse_from_rfc2822(value))
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| format!("{value:?} is not an RFC 3339 or RFC 2822 timestamp"))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn load_team(pool: &PgPool, team_id: i64, staff: Option<i64>) -> anyhow::Result<Team> {
    let team = db::fetch_team(pool, team_id)
        .await?
        .filter(|team| match staff {
            Some(id) => team.instructor_id == Some(id) || team.ta_id == Some(id),
            None => true,
        });
    team.with_context(|| format!("team {team_id} not found"))
}

async fn load_ledger(pool: &PgPool, teams: &[Team]) -> anyhow::Result<SubmissionLedger> {
    let ids: Vec<i64> = teams.iter().map(|team| team.id).collect();
    let submissions = db::fetch_submissions(pool, &ids).await?;
    let ledger = SubmissionLedger::from_records(submissions);
    debug!(teams = ids.len(), submissions = ledger.len(), "built submission ledger");
    Ok(ledger)
}

async fn team_commit_summary(
    names: &MilestoneNameIndex,
    repo: &Path,
    author: Option<&str>,
) -> anyhow::Result<CommitSummary> {
    let records = git::load_commits(repo.to_path_buf()).await?;
    Ok(commits::classify_commits(&records, names, author))
}

// A clone that cannot be read leaves its team out of the activity section.
async fn collect_activity<'t>(
    clones: &Path,
    teams: &'t [Team],
    names: &MilestoneNameIndex,
) -> Vec<(&'t str, CommitSummary)> {
    let mut summaries = Vec::new();
    for team in teams {
        let Some(path) = clone_path(clones, team) else {
            continue;
        };
        match team_commit_summary(names, &path, None).await {
            Ok(summary) => summaries.push((team.name.as_str(), summary)),
            Err(err) => warn!(
                team = %team.name,
                path = %path.display(),
                error = %format!("{err:#}"),
                "skipping unreadable clone"
            ),
        }
    }
    summaries
}

fn edit_draft(
    existing: &Milestone,
    title: Option<String>,
    description: Option<String>,
    deadline: Option<DateTime<Utc>>,
    tasks: Vec<String>,
) -> MilestoneDraft {
    let tasks = if tasks.is_empty() {
        existing.tasks.iter().map(|task| task.description.clone()).collect()
    } else {
        tasks
    };
    MilestoneDraft {
        title: title.unwrap_or_else(|| existing.title.clone()),
        description: description
            .or_else(|| existing.description.clone())
            .unwrap_or_default(),
        deadline: deadline.unwrap_or(existing.deadline),
        tasks,
    }
}

fn clone_path(clones: &Path, team: &Team) -> Option<PathBuf> {
    let url = team.github_repo_url.as_deref()?;
    match commits::parse_repo_url(url) {
        Ok(slug) => {
            let path = clones.join(&slug.name);
            if path.exists() {
                Some(path)
            } else {
                warn!(team = %team.name, repo = %slug.full_name(), "no local clone found");
                None
            }
        }
        Err(err) => {
            warn!(team = %team.name, %err, "skipping repository");
            None
        }
    }
}

fn print_team_detail(
    team: &Team,
    milestones: &[Milestone],
    ledger: &SubmissionLedger,
) -> anyhow::Result<()> {
    let detail = progress::team_milestone_detail(team, milestones, ledger)?;
    let percentages = progress::team_milestone_percentages(team, milestones, ledger)?;
    let overall = progress::team_overall_progress(team, milestones, ledger)?;

    println!("{} ({}% overall)", team.name, overall);
    if ledger.is_empty() {
        println!("No submissions yet.");
    }
    for (milestone, percentage) in detail.into_iter().zip(percentages) {
        println!(
            "{} (due {}): {:.0}%",
            milestone.title,
            milestone.deadline.format("%Y-%m-%d"),
            percentage.completion_percentage
        );
        if milestone.tasks.is_empty() {
            println!("  no tasks");
        }
        for task in milestone.tasks {
            let mark = if task.is_completed { "x" } else { " " };
            println!("  [{}] {} {}", mark, task.task_id, task.description);
            if let (Some(feedback), Some(at)) = (task.feedback, task.feedback_time) {
                println!("      feedback ({}): {}", at.format("%Y-%m-%d"), feedback);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let filter = EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let imported = db::import_csv(&pool, &csv).await?;
            println!("Imported {imported} submissions from {}.", csv.display());
        }
        Commands::Milestones { staff, json } => {
            let teams = db::fetch_teams(&pool, staff).await?;
            let milestones = db::fetch_milestones(&pool).await?;
            let ledger = load_ledger(&pool, &teams).await?;
            let overview = progress::cohort_overview(&milestones, &teams, &ledger)?;

            if json {
                return print_json(&overview);
            }
            println!(
                "{} teams, {} students",
                overview.no_of_teams, overview.no_of_students
            );
            for milestone in &overview.milestones {
                println!(
                    "- {} {} (due {}): {:.2}%",
                    milestone.id,
                    milestone.title,
                    milestone.deadline.format("%Y-%m-%d"),
                    milestone.completion_rate
                );
            }
        }
        Commands::Progress { staff, json } => {
            let teams = db::fetch_teams(&pool, staff).await?;
            let milestones = db::fetch_milestones(&pool).await?;
            let ledger = load_ledger(&pool, &teams).await?;
            let rankings = progress::rank_teams(&teams, &milestones, &ledger)?;

            if json {
                return print_json(&rankings);
            }
            if rankings.is_empty() {
                println!("No teams found.");
                return Ok(());
            }
            for team in &rankings {
                println!("- {} ({}): {}%", team.team_name, team.team_id, team.progress);
            }
        }
        Commands::Team { team, staff, json } => {
            let team = load_team(&pool, team, staff).await?;
            let milestones = db::fetch_milestones(&pool).await?;
            let ledger = load_ledger(&pool, std::slice::from_ref(&team)).await?;

            if json {
                let detail = progress::team_milestone_detail(&team, &milestones, &ledger)?;
                return print_json(&detail);
            }
            print_team_detail(&team, &milestones, &ledger)?;
        }
        Commands::Submit { team, task } => {
            let deadline = db::task_deadline(&pool, task)
                .await?
                .with_context(|| format!("task {task} not found"))?;
            let now = Utc::now();
            validate::ensure_open(deadline, now)?;

            let replaced = db::upsert_submission(&pool, team, task, now).await?;
            info!(team, task, replaced, "submission recorded");
            if replaced {
                println!("Submission for task {task} replaced.");
            } else {
                println!("Submission for task {task} recorded.");
            }
        }
        Commands::Feedback {
            team,
            task,
            by,
            text,
        } => {
            let feedback = validate::normalize_feedback(&text)?;
            if !db::record_feedback(&pool, team, task, &feedback, by, Utc::now()).await? {
                bail!("team {team} has no submission for task {task}");
            }
            println!("Feedback recorded.");
        }
        Commands::CreateMilestone {
            title,
            description,
            deadline,
            tasks,
            by,
        } => {
            let draft = MilestoneDraft {
                title,
                description,
                deadline,
                tasks,
            };
            draft.validate(Utc::now())?;
            let id = db::create_milestone(&pool, &draft, by).await?;
            println!("Milestone {id} published. Tag commits with Milestone-{id}.");
        }
        Commands::UpdateMilestone {
            id,
            title,
            description,
            deadline,
            tasks,
        } => {
            let existing = db::fetch_milestone(&pool, id)
                .await?
                .with_context(|| format!("milestone {id} not found"))?;
            let replace_tasks = !tasks.is_empty();
            let deadline_changed = deadline.is_some();
            let draft = edit_draft(&existing, title, description, deadline, tasks);
            draft.validate_edit(Utc::now(), deadline_changed)?;

            if !db::update_milestone(&pool, id, &draft, replace_tasks).await? {
                bail!("milestone {id} not found");
            }
            println!("Milestone {id} updated.");
        }
        Commands::DeleteMilestone { id } => {
            if !db::delete_milestone(&pool, id).await? {
                bail!("milestone {id} not found");
            }
            println!("Milestone {id} deleted.");
        }
        Commands::Commits {
            team,
            repo,
            author,
            member,
            json,
        } => {
            let team = load_team(&pool, team, None).await?;
            let author = match member {
                Some(user_id) => {
                    if !team.member_ids.contains(&user_id) {
                        bail!("user {user_id} is not a member of {}", team.name);
                    }
                    let username = db::github_username(&pool, user_id)
                        .await?
                        .with_context(|| format!("user {user_id} has no GitHub username"))?;
                    Some(username)
                }
                None => author,
            };

            let names = db::fetch_milestone_names(&pool).await?;
            let summary = team_commit_summary(&names, &repo, author.as_deref()).await?;
            if json {
                return print_json(&summary);
            }

            println!(
                "{}: {} commits, +{} / -{} lines",
                author.as_deref().unwrap_or(&team.name),
                summary.total_commits,
                summary.total_lines_added,
                summary.total_lines_deleted
            );
            for milestone in &summary.milestones {
                println!(
                    "- Milestone-{} {}: {} commits, +{} / -{} lines",
                    milestone.id,
                    milestone.name,
                    milestone.commits,
                    milestone.lines_added,
                    milestone.lines_deleted
                );
            }
        }
        Commands::Report { staff, clones, out } => {
            let teams = db::fetch_teams(&pool, staff).await?;
            let milestones = db::fetch_milestones(&pool).await?;
            let ledger = load_ledger(&pool, &teams).await?;
            let overview = progress::cohort_overview(&milestones, &teams, &ledger)?;
            let rankings = progress::rank_teams(&teams, &milestones, &ledger)?;

            let summaries = match clones.as_deref() {
                Some(clones) => {
                    let names = db::fetch_milestone_names(&pool).await?;
                    collect_activity(clones, &teams, &names).await
                }
                None => Vec::new(),
            };
            let activity: Vec<report::TeamActivity<'_>> = summaries
                .iter()
                .map(|(team_name, summary)| report::TeamActivity { team_name, summary })
                .collect();

            let scope = staff.map(|id| format!("staff {id}"));
            let report = report::build_report(
                scope.as_deref(),
                Utc::now(),
                &overview,
                &rankings,
                &activity,
            );
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Prompt { team, repo } => {
            let team = load_team(&pool, team, None).await?;
            let milestones = db::fetch_milestones(&pool).await?;
            let ledger = load_ledger(&pool, std::slice::from_ref(&team)).await?;
            let progress = progress::team_overall_progress(&team, &milestones, &ledger)?;

            let summary = match repo {
                Some(path) => {
                    let names = db::fetch_milestone_names(&pool).await?;
                    Some(team_commit_summary(&names, &path, None).await?)
                }
                None => None,
            };
            let prompt = report::build_progress_prompt(
                &team,
                &milestones,
                &ledger,
                progress,
                summary.as_ref(),
            );
            print!("{prompt}");
        }
    }

    Ok(())
}
