use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{}", .0.join(" "))]
    Invalid(Vec<String>),
    #[error("feedback must be a non-empty string")]
    EmptyFeedback,
    #[error("cannot submit after the milestone deadline ({0})")]
    DeadlinePassed(DateTime<Utc>),
}

#[derive(Debug, Clone)]
pub struct MilestoneDraft {
    pub title: String,
    pub description: String,
    pub deadline: DateTime<Utc>,
    pub tasks: Vec<String>,
}

impl MilestoneDraft {
    /// Collects every problem rather than stopping at the first one.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), ValidationError> {
        self.check(Some(now))
    }

    /// An edit only has to move the deadline into the future when it changes
    /// the deadline; renaming a closed milestone stays allowed.
    pub fn validate_edit(
        &self,
        now: DateTime<Utc>,
        deadline_changed: bool,
    ) -> Result<(), ValidationError> {
        self.check(deadline_changed.then_some(now))
    }

    fn check(&self, now: Option<DateTime<Utc>>) -> Result<(), ValidationError> {
        let mut errors = Vec::new();

        if self.title.trim().is_empty() {
            errors.push("Title is required.".to_string());
        }
        if self.description.trim().is_empty() {
            errors.push("Description is required.".to_string());
        }
        if now.is_some_and(|now| self.deadline <= now) {
            errors.push("Deadline must be set to a future date and time.".to_string());
        }
        for (i, task) in self.tasks.iter().enumerate() {
            if task.trim().is_empty() {
                errors.push(format!("Task {} must have a description.", i + 1));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::Invalid(errors))
        }
    }
}

pub fn normalize_feedback(text: &str) -> Result<String, ValidationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyFeedback);
    }
    Ok(trimmed.to_string())
}

pub fn ensure_open(deadline: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), ValidationError> {
    if deadline < now {
        return Err(ValidationError::DeadlinePassed(deadline));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn draft(now: DateTime<Utc>) -> MilestoneDraft {
        MilestoneDraft {
            title: "Requirements".to_string(),
            description: "User stories and scope".to_string(),
            deadline: now + Duration::days(7),
            tasks: vec!["User stories".to_string(), "Wireframes".to_string()],
        }
    }

    #[test]
    fn accepts_a_complete_draft() {
        let now = Utc::now();
        assert_eq!(draft(now).validate(now), Ok(()));
    }

    #[test]
    fn reports_every_problem() {
        let now = Utc::now();
        let mut bad = draft(now);
        bad.title = "  ".to_string();
        bad.deadline = now - Duration::hours(1);
        bad.tasks.push(String::new());

        let ValidationError::Invalid(errors) = bad.validate(now).unwrap_err() else {
            panic!("expected collected errors");
        };
        assert_eq!(
            errors,
            vec![
                "Title is required.".to_string(),
                "Deadline must be set to a future date and time.".to_string(),
                "Task 3 must have a description.".to_string(),
            ]
        );
    }

    #[test]
    fn deadline_equal_to_now_is_not_future() {
        let now = Utc::now();
        let mut bad = draft(now);
        bad.deadline = now;
        assert!(bad.validate(now).is_err());
    }

    #[test]
    fn edits_recheck_deadline_only_when_it_changes() {
        let now = Utc::now();
        let mut closed = draft(now);
        closed.deadline = now - Duration::days(2);

        assert_eq!(closed.validate_edit(now, false), Ok(()));
        assert!(closed.validate_edit(now, true).is_err());

        closed.description = String::new();
        let ValidationError::Invalid(errors) = closed.validate_edit(now, false).unwrap_err() else {
            panic!("expected collected errors");
        };
        assert_eq!(errors, vec!["Description is required.".to_string()]);
    }

    #[test]
    fn feedback_is_trimmed() {
        assert_eq!(normalize_feedback("  Good work \n").unwrap(), "Good work");
        assert_eq!(normalize_feedback(" \t"), Err(ValidationError::EmptyFeedback));
    }

    #[test]
    fn submissions_close_after_deadline() {
        let now = Utc::now();
        assert!(ensure_open(now + Duration::minutes(1), now).is_ok());
        assert_eq!(
            ensure_open(now - Duration::minutes(1), now),
            Err(ValidationError::DeadlinePassed(now - Duration::minutes(1)))
        );
    }
}
