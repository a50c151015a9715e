use std::collections::HashMap;

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use crate::models::{Milestone, MilestoneNameIndex, SubmissionRecord, Task, Team};
use crate::validate::MilestoneDraft;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

async fn upsert_user(
    pool: &PgPool,
    username: &str,
    email: &str,
    github_username: Option<&str>,
    role: &str,
) -> anyhow::Result<i64> {
    let id = sqlx::query(
        r#"
        INSERT INTO course_tracker.users (username, email, github_username, role)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (email) DO UPDATE
        SET username = EXCLUDED.username,
            github_username = EXCLUDED.github_username,
            role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(username)
    .bind(email)
    .bind(github_username)
    .bind(role)
    .fetch_one(pool)
    .await?
    .get("id");
    Ok(id)
}

async fn ensure_milestone(
    pool: &PgPool,
    title: &str,
    description: &str,
    deadline: DateTime<Utc>,
    created_by: i64,
    tasks: &[&str],
) -> anyhow::Result<Vec<i64>> {
    let existing = sqlx::query("SELECT id FROM course_tracker.milestones WHERE title = $1")
        .bind(title)
        .fetch_optional(pool)
        .await?;

    let milestone_id: i64 = match existing {
        Some(row) => row.get("id"),
        None => sqlx::query(
            r#"
            INSERT INTO course_tracker.milestones (title, description, deadline, created_by)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(title)
        .bind(description)
        .bind(deadline)
        .bind(created_by)
        .fetch_one(pool)
        .await?
        .get("id"),
    };

    let mut task_ids = Vec::with_capacity(tasks.len());
    for description in tasks {
        let existing = sqlx::query(
            "SELECT id FROM course_tracker.tasks WHERE milestone_id = $1 AND description = $2",
        )
        .bind(milestone_id)
        .bind(*description)
        .fetch_optional(pool)
        .await?;

        let task_id: i64 = match existing {
            Some(row) => row.get("id"),
            None => sqlx::query(
                "INSERT INTO course_tracker.tasks (milestone_id, description) VALUES ($1, $2) RETURNING id",
            )
            .bind(milestone_id)
            .bind(*description)
            .fetch_one(pool)
            .await?
            .get("id"),
        };
        task_ids.push(task_id);
    }

    Ok(task_ids)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let instructor =
        upsert_user(pool, "Dr. Priya Rao", "priya.rao@course.edu", None, "instructor").await?;
    let ta = upsert_user(pool, "Sam Okafor", "sam.okafor@course.edu", None, "ta").await?;

    let teams = vec![
        (
            "Team Alpha",
            "https://github.com/course-projects/team-alpha",
            vec![
                ("Avery Lee", "avery.lee@course.edu", "averylee"),
                ("Jules Moreno", "jules.moreno@course.edu", "jmoreno"),
            ],
        ),
        (
            "Team Beta",
            "https://github.com/course-projects/team-beta",
            vec![
                ("Kiara Patel", "kiara.patel@course.edu", "kpatel"),
                ("Noah Brandt", "noah.brandt@course.edu", "nbrandt"),
            ],
        ),
    ];

    let mut team_ids = Vec::new();
    for (name, repo_url, members) in teams {
        let team_id: i64 = sqlx::query(
            r#"
            INSERT INTO course_tracker.teams (name, github_repo_url, instructor_id, ta_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (name) DO UPDATE
            SET github_repo_url = EXCLUDED.github_repo_url,
                instructor_id = EXCLUDED.instructor_id,
                ta_id = EXCLUDED.ta_id
            RETURNING id
            "#,
        )
        .bind(name)
        .bind(repo_url)
        .bind(instructor)
        .bind(ta)
        .fetch_one(pool)
        .await?
        .get("id");

        for (full_name, email, github) in members {
            let student_id = upsert_user(pool, full_name, email, Some(github), "student").await?;
            sqlx::query(
                r#"
                INSERT INTO course_tracker.team_members (team_id, student_id)
                VALUES ($1, $2)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(team_id)
            .bind(student_id)
            .execute(pool)
            .await?;
        }
        team_ids.push(team_id);
    }

    let now = Utc::now();
    let requirements = ensure_milestone(
        pool,
        "Requirements",
        "User stories, scope and wireframes",
        now + Duration::days(14),
        instructor,
        &["User stories", "Wireframes"],
    )
    .await?;
    let prototype = ensure_milestone(
        pool,
        "Prototype",
        "Working vertical slice with tests",
        now + Duration::days(42),
        instructor,
        &["API design", "Prototype demo", "Test plan"],
    )
    .await?;

    // Alpha finished Requirements and started Prototype; Beta has one task in.
    let submissions = [
        (team_ids[0], requirements[0]),
        (team_ids[0], requirements[1]),
        (team_ids[0], prototype[0]),
        (team_ids[1], requirements[0]),
    ];
    for (team_id, task_id) in submissions {
        sqlx::query(
            r#"
            INSERT INTO course_tracker.submissions (team_id, task_id, submitted_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (team_id, task_id) DO NOTHING
            "#,
        )
        .bind(team_id)
        .bind(task_id)
        .bind(now - Duration::days(2))
        .execute(pool)
        .await?;
    }

    info!(teams = team_ids.len(), "seed data ready");
    Ok(())
}

fn team_from_row(row: &sqlx::postgres::PgRow) -> Team {
    Team {
        id: row.get("id"),
        name: row.get("name"),
        member_ids: Vec::new(),
        github_repo_url: row.get("github_repo_url"),
        instructor_id: row.get("instructor_id"),
        ta_id: row.get("ta_id"),
    }
}

async fn attach_members(pool: &PgPool, teams: &mut [Team]) -> anyhow::Result<()> {
    let ids: Vec<i64> = teams.iter().map(|team| team.id).collect();
    let rows = sqlx::query(
        r#"
        SELECT team_id, student_id
        FROM course_tracker.team_members
        WHERE team_id = ANY($1)
        ORDER BY team_id, student_id
        "#,
    )
    .bind(ids)
    .fetch_all(pool)
    .await?;

    let mut members: HashMap<i64, Vec<i64>> = HashMap::new();
    for row in rows {
        members
            .entry(row.get("team_id"))
            .or_default()
            .push(row.get("student_id"));
    }
    for team in teams.iter_mut() {
        team.member_ids = members.remove(&team.id).unwrap_or_default();
    }
    Ok(())
}

pub async fn fetch_teams(pool: &PgPool, staff: Option<i64>) -> anyhow::Result<Vec<Team>> {
    let mut query = String::from(
        "SELECT id, name, github_repo_url, instructor_id, ta_id FROM course_tracker.teams",
    );
    if staff.is_some() {
        query.push_str(" WHERE instructor_id = $1 OR ta_id = $1");
    }
    query.push_str(" ORDER BY id");

    let mut rows = sqlx::query(&query);
    if let Some(value) = staff {
        rows = rows.bind(value);
    }

    let mut teams: Vec<Team> = rows
        .fetch_all(pool)
        .await
        .context("failed to load teams")?
        .iter()
        .map(team_from_row)
        .collect();
    attach_members(pool, &mut teams).await?;

    debug!(count = teams.len(), ?staff, "fetched teams");
    Ok(teams)
}

pub async fn fetch_team(pool: &PgPool, team_id: i64) -> anyhow::Result<Option<Team>> {
    let row = sqlx::query(
        "SELECT id, name, github_repo_url, instructor_id, ta_id FROM course_tracker.teams WHERE id = $1",
    )
    .bind(team_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let mut teams = vec![team_from_row(&row)];
    attach_members(pool, &mut teams).await?;
    Ok(teams.pop())
}

pub async fn fetch_milestones(pool: &PgPool) -> anyhow::Result<Vec<Milestone>> {
    let task_rows = sqlx::query(
        "SELECT id, milestone_id, description FROM course_tracker.tasks ORDER BY milestone_id, id",
    )
    .fetch_all(pool)
    .await?;

    let mut tasks: HashMap<i64, Vec<Task>> = HashMap::new();
    for row in task_rows {
        tasks.entry(row.get("milestone_id")).or_default().push(Task {
            id: row.get("id"),
            description: row.get("description"),
        });
    }

    let rows = sqlx::query(
        "SELECT id, title, description, deadline FROM course_tracker.milestones ORDER BY id",
    )
    .fetch_all(pool)
    .await
    .context("failed to load milestones")?;

    let milestones = rows
        .into_iter()
        .map(|row| {
            let id: i64 = row.get("id");
            Milestone {
                id,
                title: row.get("title"),
                description: row.get("description"),
                deadline: row.get("deadline"),
                tasks: tasks.remove(&id).unwrap_or_default(),
            }
        })
        .collect();

    Ok(milestones)
}

pub async fn fetch_milestone(
    pool: &PgPool,
    milestone_id: i64,
) -> anyhow::Result<Option<Milestone>> {
    let Some(row) = sqlx::query(
        "SELECT id, title, description, deadline FROM course_tracker.milestones WHERE id = $1",
    )
    .bind(milestone_id)
    .fetch_optional(pool)
    .await?
    else {
        return Ok(None);
    };

    let tasks = sqlx::query(
        "SELECT id, description FROM course_tracker.tasks WHERE milestone_id = $1 ORDER BY id",
    )
    .bind(milestone_id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|row| Task {
        id: row.get("id"),
        description: row.get("description"),
    })
    .collect();

    Ok(Some(Milestone {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        deadline: row.get("deadline"),
        tasks,
    }))
}

pub async fn fetch_milestone_names(pool: &PgPool) -> anyhow::Result<MilestoneNameIndex> {
    let rows = sqlx::query("SELECT id, title FROM course_tracker.milestones")
        .fetch_all(pool)
        .await?;
    Ok(rows
        .into_iter()
        .map(|row| (row.get("id"), row.get("title")))
        .collect())
}

pub async fn github_username(pool: &PgPool, user_id: i64) -> anyhow::Result<Option<String>> {
    let row = sqlx::query("SELECT github_username FROM course_tracker.users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.and_then(|row| row.get("github_username")))
}

pub async fn fetch_submissions(
    pool: &PgPool,
    team_ids: &[i64],
) -> anyhow::Result<Vec<SubmissionRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT team_id, task_id, submitted_at, feedback, feedback_by, feedback_time
        FROM course_tracker.submissions
        WHERE team_id = ANY($1)
        "#,
    )
    .bind(team_ids)
    .fetch_all(pool)
    .await
    .context("failed to load submissions")?;

    Ok(rows
        .into_iter()
        .map(|row| SubmissionRecord {
            team_id: row.get("team_id"),
            task_id: row.get("task_id"),
            submitted_at: row.get("submitted_at"),
            feedback: row.get("feedback"),
            feedback_by: row.get("feedback_by"),
            feedback_time: row.get("feedback_time"),
        })
        .collect())
}

pub async fn task_deadline(pool: &PgPool, task_id: i64) -> anyhow::Result<Option<DateTime<Utc>>> {
    let row = sqlx::query(
        r#"
        SELECT m.deadline
        FROM course_tracker.tasks t
        JOIN course_tracker.milestones m ON m.id = t.milestone_id
        WHERE t.id = $1
        "#,
    )
    .bind(task_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|row| row.get("deadline")))
}

/// Records a submission. A resubmission for the same team and task updates
/// the existing row in place and clears feedback given on the earlier
/// version. Returns true when an existing submission was replaced.
pub async fn upsert_submission(
    pool: &PgPool,
    team_id: i64,
    task_id: i64,
    submitted_at: DateTime<Utc>,
) -> anyhow::Result<bool> {
    let replaced = sqlx::query(
        r#"
        INSERT INTO course_tracker.submissions (team_id, task_id, submitted_at)
        VALUES ($1, $2, $3)
        ON CONFLICT (team_id, task_id) DO UPDATE
        SET submitted_at = EXCLUDED.submitted_at,
            feedback = NULL,
            feedback_by = NULL,
            feedback_time = NULL
        RETURNING (xmax <> 0) AS replaced
        "#,
    )
    .bind(team_id)
    .bind(task_id)
    .bind(submitted_at)
    .fetch_one(pool)
    .await?
    .get("replaced");
    Ok(replaced)
}

/// Returns false when the team has no submission for the task.
pub async fn record_feedback(
    pool: &PgPool,
    team_id: i64,
    task_id: i64,
    feedback: &str,
    feedback_by: i64,
    feedback_time: DateTime<Utc>,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE course_tracker.submissions
        SET feedback = $3, feedback_by = $4, feedback_time = $5
        WHERE team_id = $1 AND task_id = $2
        "#,
    )
    .bind(team_id)
    .bind(task_id)
    .bind(feedback)
    .bind(feedback_by)
    .bind(feedback_time)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn create_milestone(
    pool: &PgPool,
    draft: &MilestoneDraft,
    created_by: Option<i64>,
) -> anyhow::Result<i64> {
    let mut tx = pool.begin().await?;

    let milestone_id: i64 = sqlx::query(
        r#"
        INSERT INTO course_tracker.milestones (title, description, deadline, created_by)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(draft.title.trim())
    .bind(draft.description.trim())
    .bind(draft.deadline)
    .bind(created_by)
    .fetch_one(&mut *tx)
    .await?
    .get("id");

    for description in &draft.tasks {
        sqlx::query("INSERT INTO course_tracker.tasks (milestone_id, description) VALUES ($1, $2)")
            .bind(milestone_id)
            .bind(description.trim())
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    info!(milestone_id, tasks = draft.tasks.len(), "milestone published");
    Ok(milestone_id)
}

/// Rewrites a milestone in one transaction. With `replace_tasks` the old
/// tasks, and every submission made against them, are dropped for the
/// draft's task list. Returns false when the milestone does not exist.
pub async fn update_milestone(
    pool: &PgPool,
    milestone_id: i64,
    draft: &MilestoneDraft,
    replace_tasks: bool,
) -> anyhow::Result<bool> {
    let mut tx = pool.begin().await?;

    let updated = sqlx::query(
        r#"
        UPDATE course_tracker.milestones
        SET title = $2, description = $3, deadline = $4
        WHERE id = $1
        "#,
    )
    .bind(milestone_id)
    .bind(draft.title.trim())
    .bind(draft.description.trim())
    .bind(draft.deadline)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if updated == 0 {
        tx.rollback().await?;
        return Ok(false);
    }

    if replace_tasks {
        let dropped = sqlx::query("DELETE FROM course_tracker.tasks WHERE milestone_id = $1")
            .bind(milestone_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        debug!(milestone_id, dropped, "replacing milestone tasks");

        for description in &draft.tasks {
            sqlx::query(
                "INSERT INTO course_tracker.tasks (milestone_id, description) VALUES ($1, $2)",
            )
            .bind(milestone_id)
            .bind(description.trim())
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await?;
    info!(milestone_id, replace_tasks, "milestone updated");
    Ok(true)
}

pub async fn delete_milestone(pool: &PgPool, milestone_id: i64) -> anyhow::Result<bool> {
    let result = sqlx::query("DELETE FROM course_tracker.milestones WHERE id = $1")
        .bind(milestone_id)
        .execute(pool)
        .await?;
    let deleted = result.rows_affected() > 0;
    if deleted {
        info!(milestone_id, "milestone deleted");
    }
    Ok(deleted)
}

#[derive(Debug, serde::Deserialize)]
struct CsvRow {
    team_name: String,
    task_id: i64,
    submitted_at: DateTime<Utc>,
    feedback: Option<String>,
    #[serde(default)]
    feedback_time: Option<DateTime<Utc>>,
}

impl CsvRow {
    // Blank feedback imports as none. Feedback without its own timestamp is
    // dated at the submission it was given on.
    fn imported_feedback(&self) -> (Option<&str>, Option<DateTime<Utc>>) {
        let feedback = self
            .feedback
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty());
        let feedback_time = feedback.map(|_| self.feedback_time.unwrap_or(self.submitted_at));
        (feedback, feedback_time)
    }
}

/// Imports submissions from a CSV with
/// `team_name,task_id,submitted_at[,feedback][,feedback_time]` columns. Rows
/// for an existing team/task pair replace it, including who gave feedback.
pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut imported = 0usize;

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("invalid row {}", line + 1))?;

        let team_id: i64 = sqlx::query("SELECT id FROM course_tracker.teams WHERE name = $1")
            .bind(&row.team_name)
            .fetch_optional(pool)
            .await?
            .with_context(|| format!("unknown team {:?} on row {}", row.team_name, line + 1))?
            .get("id");

        let (feedback, feedback_time) = row.imported_feedback();

        let result = sqlx::query(
            r#"
            INSERT INTO course_tracker.submissions
            (team_id, task_id, submitted_at, feedback, feedback_by, feedback_time)
            VALUES ($1, $2, $3, $4, NULL, $5)
            ON CONFLICT (team_id, task_id) DO UPDATE
            SET submitted_at = EXCLUDED.submitted_at,
                feedback = EXCLUDED.feedback,
                feedback_by = NULL,
                feedback_time = EXCLUDED.feedback_time
            "#,
        )
        .bind(team_id)
        .bind(row.task_id)
        .bind(row.submitted_at)
        .bind(feedback)
        .bind(feedback_time)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            imported += 1;
        }
    }

    Ok(imported)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn rows(data: &str) -> Vec<CsvRow> {
        csv::Reader::from_reader(data.as_bytes())
            .deserialize()
            .collect::<Result<_, _>>()
            .unwrap()
    }

    #[test]
    fn csv_feedback_keeps_its_own_timestamp() {
        let rows = rows(
            "team_name,task_id,submitted_at,feedback,feedback_time\n\
             Team Alpha,1,2026-02-18T14:05:00Z,Well scoped,2026-02-19T08:00:00Z\n\
             Team Alpha,2,2026-02-19T09:30:00Z,Needs a diagram,\n\
             Team Beta,1,2026-02-20T21:45:00Z,  ,2026-02-21T10:00:00Z\n",
        );

        assert_eq!(
            rows[0].imported_feedback(),
            (
                Some("Well scoped"),
                Some(Utc.with_ymd_and_hms(2026, 2, 19, 8, 0, 0).unwrap())
            )
        );
        assert_eq!(
            rows[1].imported_feedback(),
            (
                Some("Needs a diagram"),
                Some(Utc.with_ymd_and_hms(2026, 2, 19, 9, 30, 0).unwrap())
            )
        );
        assert_eq!(rows[2].imported_feedback(), (None, None));
    }

    #[test]
    fn csv_without_feedback_columns_still_loads() {
        let rows = rows("team_name,task_id,submitted_at\nTeam Beta,4,2026-03-02T12:00:00Z\n");
        assert_eq!(rows[0].team_name, "Team Beta");
        assert_eq!(rows[0].task_id, 4);
        assert_eq!(rows[0].imported_feedback(), (None, None));
    }
}
