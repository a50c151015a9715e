use std::collections::BTreeMap;

use tracing::debug;

use crate::models::{CommitRecord, CommitSummary, MilestoneCommitStats, MilestoneNameIndex};

const MILESTONE_TAG_PREFIX: &str = "milestone-";

/// Milestone id referenced by a `Milestone-<id> ...` commit message.
///
/// The prefix is matched case-insensitively. The id is the text between the
/// first and second hyphen of the message's first word, so `Milestone-3-fix`
/// still yields 3 while `Milestone-3a` and `Milestone- x` yield nothing.
pub fn milestone_tag(message: &str) -> Option<i64> {
    if !has_tag_prefix(message) {
        return None;
    }

    let word = message.split_whitespace().next()?;
    word.split('-').nth(1)?.parse().ok()
}

fn has_tag_prefix(message: &str) -> bool {
    message
        .get(..MILESTONE_TAG_PREFIX.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(MILESTONE_TAG_PREFIX))
}

// Display name, full email, or the email's local part, so a GitHub username
// matches `<user>@users.noreply.github.com` commits.
fn matches_author(commit: &CommitRecord, author: Option<&str>) -> bool {
    let Some(wanted) = author else {
        return true;
    };

    let by_name = commit
        .author
        .as_deref()
        .is_some_and(|name| name.eq_ignore_ascii_case(wanted));
    let by_email = commit.author_email.as_deref().is_some_and(|email| {
        let local = email.split_once('@').map_or(email, |(local, _)| local);
        email.eq_ignore_ascii_case(wanted) || local.eq_ignore_ascii_case(wanted)
    });
    by_name || by_email
}

pub fn classify_commits(
    commits: &[CommitRecord],
    names: &MilestoneNameIndex,
    author: Option<&str>,
) -> CommitSummary {
    let mut summary = CommitSummary::default();
    let mut buckets: BTreeMap<i64, MilestoneCommitStats> = BTreeMap::new();

    for commit in commits.iter().filter(|c| matches_author(c, author)) {
        summary.total_commits += 1;
        summary.total_lines_added += commit.lines_added;
        summary.total_lines_deleted += commit.lines_deleted;

        if !has_tag_prefix(&commit.message) {
            continue;
        }

        let Some(milestone_id) = milestone_tag(&commit.message) else {
            debug!(message = %commit.message, "malformed milestone tag");
            continue;
        };
        let Some(name) = names.get(&milestone_id) else {
            debug!(milestone_id, "commit tagged with unknown milestone");
            continue;
        };

        let entry = buckets
            .entry(milestone_id)
            .or_insert_with(|| MilestoneCommitStats {
                id: milestone_id,
                name: name.clone(),
                commits: 0,
                lines_added: 0,
                lines_deleted: 0,
            });
        entry.commits += 1;
        entry.lines_added += commit.lines_added;
        entry.lines_deleted += commit.lines_deleted;
    }

    summary.milestones = buckets.into_values().collect();
    summary
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSlug {
    pub owner: String,
    pub name: String,
}

impl RepoSlug {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid GitHub URL format: {0}")]
pub struct RepoUrlError(pub String);

pub fn parse_repo_url(url: &str) -> Result<RepoSlug, RepoUrlError> {
    let invalid = || RepoUrlError(url.to_string());
    let trimmed = url.trim().trim_end_matches('/');

    let path = if trimmed.starts_with("https://") {
        let mut parts = trimmed.rsplit('/');
        let name = parts.next().ok_or_else(invalid)?;
        let owner = parts.next().ok_or_else(invalid)?;
        // https://host/repo has no owner segment
        if parts.next().is_none() || owner.is_empty() {
            return Err(invalid());
        }
        (owner, name)
    } else if trimmed.starts_with("git@") {
        let (_, repo_part) = trimmed.split_once(':').ok_or_else(invalid)?;
        repo_part.split_once('/').ok_or_else(invalid)?
    } else {
        return Err(invalid());
    };

    let (owner, name) = path;
    let name = name.strip_suffix(".git").unwrap_or(name);
    if owner.is_empty() || name.is_empty() || name.contains('/') {
        return Err(invalid());
    }

    Ok(RepoSlug {
        owner: owner.to_string(),
        name: name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn commit(message: &str, added: u64, deleted: u64) -> CommitRecord {
        CommitRecord {
            author: Some("avery".to_string()),
            author_email: Some("avery@example.com".to_string()),
            message: message.to_string(),
            lines_added: added,
            lines_deleted: deleted,
        }
    }

    fn names() -> MilestoneNameIndex {
        MilestoneNameIndex::from([(1, "M1".to_string())])
    }

    #[test]
    fn tags_are_case_insensitive() {
        assert_eq!(milestone_tag("Milestone-1 init"), Some(1));
        assert_eq!(milestone_tag("MILESTONE-12 docs"), Some(12));
        assert_eq!(milestone_tag("milestone-4"), Some(4));
        assert_eq!(milestone_tag("Milestone-3-hotfix tidy"), Some(3));
    }

    #[test]
    fn malformed_tags_yield_nothing() {
        assert_eq!(milestone_tag("Milestone- broken"), None);
        assert_eq!(milestone_tag("Milestone-"), None);
        assert_eq!(milestone_tag("Milestone-3a wip"), None);
        assert_eq!(milestone_tag("fix Milestone-1"), None);
        assert_eq!(milestone_tag("Milestone"), None);
        assert_eq!(milestone_tag(""), None);
        assert_eq!(milestone_tag("Milestöne-1"), None);
    }

    #[test]
    fn buckets_known_milestones_and_counts_everything() {
        let commits = vec![
            commit("Milestone-1 init", 100, 0),
            commit("fix bug", 5, 3),
            commit("milestone-1 followup", 20, 10),
            commit("Milestone-99 orphan", 7, 7),
        ];

        let summary = classify_commits(&commits, &names(), None);

        assert_eq!(summary.total_commits, 4);
        assert_eq!(summary.total_lines_added, 132);
        assert_eq!(summary.total_lines_deleted, 20);
        assert_eq!(
            summary.milestones,
            vec![MilestoneCommitStats {
                id: 1,
                name: "M1".to_string(),
                commits: 2,
                lines_added: 120,
                lines_deleted: 10,
            }]
        );
    }

    #[test]
    fn malformed_message_only_counts_globally() {
        let summary = classify_commits(&[commit("Milestone- broken", 3, 1)], &names(), None);
        assert_eq!(summary.total_commits, 1);
        assert_eq!(summary.total_lines_added, 3);
        assert!(summary.milestones.is_empty());
    }

    #[test]
    fn buckets_are_sorted_by_id() {
        let names = MilestoneNameIndex::from([
            (2, "Design".to_string()),
            (5, "Release".to_string()),
            (10, "Retro".to_string()),
        ]);
        let commits = vec![
            commit("Milestone-10 notes", 1, 0),
            commit("Milestone-2 sketch", 1, 0),
            commit("Milestone-5 ship", 1, 0),
            commit("Milestone-2 revise", 1, 0),
        ];

        let summary = classify_commits(&commits, &names, None);
        let ids: Vec<i64> = summary.milestones.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![2, 5, 10]);

        let bucketed: u64 = summary.milestones.iter().map(|m| m.commits).sum();
        assert!(bucketed <= summary.total_commits);
        assert_eq!(bucketed, 4);
    }

    #[test]
    fn author_filter_limits_input() {
        let mut other = commit("Milestone-1 theirs", 50, 0);
        other.author = Some("jules".to_string());
        other.author_email = Some("jules@example.com".to_string());
        let mut anonymous = commit("Milestone-1 unknown", 9, 9);
        anonymous.author = None;
        anonymous.author_email = None;
        let commits = vec![commit("Milestone-1 mine", 10, 2), other, anonymous];

        let summary = classify_commits(&commits, &names(), Some("Avery"));
        assert_eq!(summary.total_commits, 1);
        assert_eq!(summary.total_lines_added, 10);
        assert_eq!(summary.milestones[0].commits, 1);

        let everyone = classify_commits(&commits, &names(), None);
        assert_eq!(everyone.total_commits, 3);
    }

    #[test]
    fn author_filter_accepts_github_username_from_email() {
        let mut noreply = commit("Milestone-1 login form", 40, 4);
        noreply.author = Some("Avery Lee".to_string());
        noreply.author_email = Some("averylee@users.noreply.github.com".to_string());
        let mut lookalike = commit("Milestone-1 other", 8, 0);
        lookalike.author = Some("Avery Lee".to_string());
        lookalike.author_email = Some("averylee.fan@example.com".to_string());
        let commits = vec![noreply, lookalike];

        let summary = classify_commits(&commits, &names(), Some("averylee"));
        assert_eq!(summary.total_commits, 1);
        assert_eq!(summary.total_lines_added, 40);

        let by_email =
            classify_commits(&commits, &names(), Some("AveryLee@users.noreply.github.com"));
        assert_eq!(by_email.total_commits, 1);

        let by_name = classify_commits(&commits, &names(), Some("avery lee"));
        assert_eq!(by_name.total_commits, 2);
    }

    #[test]
    fn empty_input_is_empty_summary() {
        assert_eq!(classify_commits(&[], &names(), None), CommitSummary::default());
    }

    #[test]
    fn parses_https_and_ssh_urls() {
        let expected = RepoSlug {
            owner: "course".to_string(),
            name: "team-alpha".to_string(),
        };
        assert_eq!(
            parse_repo_url("https://github.com/course/team-alpha").unwrap(),
            expected
        );
        assert_eq!(
            parse_repo_url("https://github.com/course/team-alpha.git/").unwrap(),
            expected
        );
        assert_eq!(
            parse_repo_url("git@github.com:course/team-alpha.git").unwrap(),
            expected
        );
        assert_eq!(expected.full_name(), "course/team-alpha");
    }

    #[test]
    fn rejects_unsupported_urls() {
        assert!(parse_repo_url("http://github.com/course/team").is_err());
        assert!(parse_repo_url("github.com/course/team").is_err());
        assert!(parse_repo_url("git@github.com:team-only").is_err());
        assert!(parse_repo_url("https://github.com").is_err());
    }
}
