use std::path::PathBuf;

use anyhow::Context;
use git2::{DiffOptions, Repository, Sort};
use tokio::task::spawn_blocking;
use tracing::{debug, info};

use crate::models::CommitRecord;

pub async fn load_commits(path: PathBuf) -> anyhow::Result<Vec<CommitRecord>> {
    spawn_blocking(move || read_history(&path))
        .await
        .context("commit loader task panicked")?
}

fn read_history(path: &std::path::Path) -> anyhow::Result<Vec<CommitRecord>> {
    let repo = Repository::open(path)
        .with_context(|| format!("failed to open repository at {}", path.display()))?;

    let mut walk = repo.revwalk()?;
    walk.set_sorting(Sort::TOPOLOGICAL | Sort::REVERSE)?;
    walk.push_head().context("repository has no HEAD commit")?;

    let mut diff_opts = DiffOptions::new();
    diff_opts.include_untracked(false).context_lines(0);

    let mut records = Vec::new();
    for oid in walk {
        let commit = repo.find_commit(oid?)?;
        let tree = commit.tree()?;
        let parent_tree = match commit.parent_count() {
            0 => None,
            _ => Some(commit.parent(0)?.tree()?),
        };

        let diff =
            repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), Some(&mut diff_opts))?;
        let stats = diff.stats()?;

        debug!(commit = %commit.id(), "read commit");
        let signature = commit.author();
        records.push(CommitRecord {
            author: signature.name().map(str::to_string),
            author_email: signature.email().map(str::to_string),
            message: commit.message().unwrap_or_default().to_string(),
            lines_added: stats.insertions() as u64,
            lines_deleted: stats.deletions() as u64,
        });
    }

    info!(count = records.len(), path = %path.display(), "loaded commit history");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commits::classify_commits;
    use crate::models::MilestoneNameIndex;
    use git2::Signature;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn commit_file(repo: &Repository, dir: &Path, name: &str, content: &str, message: &str) {
        let signature = Signature::now("Avery Lee", "avery@example.com").unwrap();
        commit_file_as(repo, dir, &signature, name, content, message);
    }

    fn commit_file_as(
        repo: &Repository,
        dir: &Path,
        signature: &Signature<'_>,
        name: &str,
        content: &str,
        message: &str,
    ) {
        fs::write(dir.join(name), content).unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new(name)).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();

        let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        repo.commit(Some("HEAD"), signature, signature, message, &tree, &parents)
            .unwrap();
    }

    #[tokio::test]
    async fn reads_messages_and_line_counts() {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        commit_file(&repo, dir.path(), "plan.md", "a\nb\nc\n", "Milestone-1 plan");
        commit_file(&repo, dir.path(), "plan.md", "a\nc\nd\ne\n", "tidy plan");

        let records = load_commits(dir.path().to_path_buf()).await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].message, "Milestone-1 plan");
        assert_eq!(records[0].author.as_deref(), Some("Avery Lee"));
        assert_eq!(records[0].author_email.as_deref(), Some("avery@example.com"));
        assert_eq!((records[0].lines_added, records[0].lines_deleted), (3, 0));
        assert_eq!(records[1].message, "tidy plan");
        assert_eq!((records[1].lines_added, records[1].lines_deleted), (2, 1));
    }

    #[tokio::test]
    async fn github_username_matches_noreply_email() {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let avery = Signature::now("Avery Lee", "averylee@users.noreply.github.com").unwrap();
        let jordan = Signature::now("Jordan Moreno", "jordan@example.com").unwrap();
        commit_file_as(&repo, dir.path(), &avery, "a.txt", "one\n", "Milestone-1 start");
        commit_file_as(&repo, dir.path(), &jordan, "b.txt", "two\n", "Milestone-1 more");

        let records = load_commits(dir.path().to_path_buf()).await.unwrap();
        let names = MilestoneNameIndex::from([(1, "Requirements".to_string())]);
        let summary = classify_commits(&records, &names, Some("averylee"));

        assert_eq!(summary.total_commits, 1);
        assert_eq!(summary.milestones[0].commits, 1);
    }

    #[tokio::test]
    async fn missing_repository_is_an_error() {
        let dir = TempDir::new().unwrap();
        let result = load_commits(dir.path().join("nope")).await;
        assert!(result.is_err());
    }
}
