//! Phase 4: Publishing
//!
//! The only phase that changes anything. It runs three steps in order:
//!
//! 1. push the branches of the push set
//! 2. open pull requests for the create set
//! 3. rewrite the descriptions of every active pull request with a fresh
//!    metadata block
//!
//! Each step attempts every repository, then fails with all errors at once.

use std::collections::{BTreeMap, HashSet};

use log::{debug, info, warn};

use super::collect::Collected;
use crate::block::{self, BlockInput, RelatedPr};
use crate::error::{Error, Result};
use crate::git::Git;
use crate::github::{CreateRequest, GitHub, PrLookup, PullRequestRecord};
use crate::graph::DependencyGraph;
use crate::parallel::TaskRunner;
use crate::runner::{stderr_of, CommandRunner};
use crate::snapshot::Snapshot;
use crate::status::StatusRecord;

/// What git prints when there is nothing to push.
const UP_TO_DATE: &str = "Everything up-to-date";

/// Title, body and draft flag of newly created pull requests.
#[derive(Debug, Clone, Default)]
pub struct PrTemplate {
    /// Defaults to the branch name.
    pub title: Option<String>,
    pub body: Option<String>,
    pub draft: bool,
}

/// Shared content of the metadata blocks of one run.
#[derive(Debug, Clone)]
pub struct Description<'a> {
    pub snapshot: &'a Snapshot,
    pub graph: Option<&'a DependencyGraph>,
    pub graph_source: Option<&'a str>,
    /// Repositories whose pull requests may be linked from other
    /// descriptions.
    pub public_ids: &'a HashSet<String>,
}

fn statuses<'c>(ids: &[String], collected: &'c Collected) -> Result<Vec<(&'c StatusRecord, String)>> {
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        let status = collected
            .status(id)
            .ok_or_else(|| Error::for_repo(id, "no status recorded"))?;
        let branch = status
            .branch()
            .ok_or_else(|| Error::for_repo(id, "HEAD is detached"))?
            .to_string();
        out.push((status, branch));
    }
    Ok(out)
}

/// Step 1: `git push -u origin <branch>` for every repository in `ids`.
pub fn push(
    ids: &[String],
    collected: &Collected,
    runner: &dyn CommandRunner,
    jobs: usize,
) -> Result<()> {
    let targets = statuses(ids, collected)?;
    info!("Pushing {} repositories", targets.len());
    let batch = TaskRunner::new(jobs).run(&targets, |(status, branch)| {
        match Git::new(runner, &status.dir).push(branch) {
            Ok(_) => Ok(()),
            Err(e) if stderr_of(&e).contains(UP_TO_DATE) => Ok(()),
            Err(e) => Err(Error::for_repo(&status.id, e)),
        }
    })?;
    batch.into_result().map(|_| ())
}

/// Step 2: opens a pull request for every repository in `ids` and returns
/// their URLs by repository id.
pub fn create(
    ids: &[String],
    collected: &Collected,
    runner: &dyn CommandRunner,
    jobs: usize,
    template: &PrTemplate,
) -> Result<BTreeMap<String, String>> {
    let targets = statuses(ids, collected)?;
    info!("Creating {} pull requests", targets.len());
    let github = GitHub::new(runner);
    let batch = TaskRunner::new(jobs).run(&targets, |(status, branch)| {
        let base = collected
            .base(&status.id)
            .ok_or_else(|| Error::for_repo(&status.id, "no base branch known"))?;
        let request = CreateRequest {
            base: &base.branch,
            head: branch,
            title: template.title.as_deref().unwrap_or(branch),
            body: template.body.as_deref().unwrap_or_default(),
            draft: template.draft,
        };
        let url = github
            .create(&status.dir, &request)
            .map_err(|e| Error::for_repo(&status.id, e))?;
        debug!("{}: opened {}", status.id, url);
        Ok((status.id.clone(), url))
    })?;
    Ok(batch.into_result()?.into_iter().collect())
}

/// Step 3: embeds a fresh metadata block into the description of the open
/// pull request of every repository in `ids`. Pull requests the user may not
/// edit are left alone. Returns the ids whose description changed.
pub fn update_descriptions(
    ids: &[String],
    collected: &Collected,
    runner: &dyn CommandRunner,
    jobs: usize,
    description: &Description<'_>,
) -> Result<Vec<String>> {
    let targets = statuses(ids, collected)?;
    let github = GitHub::new(runner);
    let viewer = github.viewer_login().ok();
    let tasks = TaskRunner::new(jobs);

    // Descriptions may have changed since Phase 1, and created pull requests
    // were not known then.
    let lookups = tasks.run(&targets, |(status, branch)| {
        let lookup = github.lookup(&status.dir, branch, viewer.as_deref());
        Ok((status.id.clone(), lookup))
    })?;
    let mut open: BTreeMap<String, PullRequestRecord> = BTreeMap::new();
    let mut errors = Vec::new();
    for (id, lookup) in lookups.results {
        match lookup {
            PrLookup::Failed(reason) => errors.push(Error::for_repo(&id, reason)),
            lookup => match lookup.open() {
                Some(pr) => {
                    open.insert(id, pr.clone());
                }
                None => warn!("{}: no open pull request, description not updated", id),
            },
        }
    }

    let mut related: Vec<RelatedPr> = open
        .iter()
        .filter(|(id, _)| description.public_ids.contains(id.as_str()))
        .map(|(id, pr)| RelatedPr {
            id: id.clone(),
            url: pr.url.clone(),
        })
        .collect();
    related.sort_by(|a, b| a.id.cmp(&b.id));

    let editable: Vec<(&StatusRecord, &PullRequestRecord)> = targets
        .iter()
        .filter_map(|(status, _)| open.get(&status.id).map(|pr| (*status, pr)))
        .filter(|(status, pr)| {
            if !pr.can_edit {
                info!("{}: no permission to edit {}, skipping", status.id, pr.url);
            }
            pr.can_edit
        })
        .collect();
    info!("Updating {} pull request descriptions", editable.len());

    let batch = tasks.run(&editable, |(status, pr)| {
        let rendered = block::encode(&BlockInput {
            current_id: &status.id,
            related: &related,
            snapshot: description.snapshot,
            graph: description.graph,
            graph_source: description.graph_source,
        })?;
        let body = block::embed(&pr.body, &rendered);
        if block::same_content(&body, &pr.body) {
            return Ok(None);
        }
        github
            .edit_body(&status.dir, pr.number, &body)
            .map_err(|e| Error::for_repo(&status.id, e))?;
        Ok(Some(status.id.clone()))
    })?;

    errors.extend(batch.errors);
    Error::collect(errors)?;
    let mut updated: Vec<String> = batch.results.into_iter().flatten().collect();
    updated.sort();
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phases::BaseTarget;
    use crate::runner::fake::ScriptedRunner;
    use crate::status::HeadRef;
    use std::path::PathBuf;

    const LIST: &str =
        "gh pr list --head topic --state all --json number,state,isDraft,url,baseRefName,headRefOid,author,body";

    fn record(id: &str) -> StatusRecord {
        StatusRecord {
            id: id.to_string(),
            head_ref: HeadRef::Branch("topic".to_string()),
            local_head: "h".to_string(),
            local_head_short: "h".to_string(),
            remote_head: None,
            ahead: true,
            behind: false,
            conflict: false,
            dir: PathBuf::from(format!("/w/{}", id)),
        }
    }

    fn collected(ids: &[&str]) -> Collected {
        let mut c = Collected::default();
        for id in ids {
            c.statuses.push(record(id));
            c.bases.insert(
                id.to_string(),
                BaseTarget {
                    branch: "main".to_string(),
                    tip: None,
                },
            );
        }
        c
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_push_tolerates_up_to_date_and_aggregates() {
        let runner = ScriptedRunner::new()
            .ok("a git push -u origin topic", "")
            .fail("b git push -u origin topic", "Everything up-to-date")
            .fail("c git push -u origin topic", "rejected")
            .fail("d git push -u origin topic", "Permission denied");
        let c = collected(&["a", "b", "c", "d"]);
        let err = push(&ids(&["a", "b", "c", "d"]), &c, &runner, 2).unwrap_err();
        match err {
            Error::Aggregate(errors) => {
                assert_eq!(errors.len(), 2);
                let text = errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("\n");
                assert!(text.contains("c: "));
                assert!(text.contains("d: "));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(runner.calls_matching("").len(), 4, "every repository is attempted");
    }

    #[test]
    fn test_create_uses_template_and_base() {
        let runner = ScriptedRunner::new().ok(
            "a gh pr create --base main --head topic --title Ship it --body  --draft",
            "https://github.com/o/a/pull/7",
        );
        let template = PrTemplate {
            title: Some("Ship it".to_string()),
            body: None,
            draft: true,
        };
        let urls = create(&ids(&["a"]), &collected(&["a"]), &runner, 1, &template).unwrap();
        assert_eq!(urls["a"], "https://github.com/o/a/pull/7");
    }

    #[test]
    fn test_create_title_defaults_to_branch() {
        let runner = ScriptedRunner::new().ok(
            "a gh pr create --base main --head topic --title topic --body Body",
            "https://github.com/o/a/pull/8",
        );
        let template = PrTemplate {
            body: Some("Body".to_string()),
            ..Default::default()
        };
        let urls = create(&ids(&["a"]), &collected(&["a"]), &runner, 1, &template).unwrap();
        assert_eq!(urls.len(), 1);
    }

    fn pr_json(id: &str, number: u64, state: &str, body: &str) -> String {
        serde_json::json!([{
            "number": number,
            "state": state,
            "isDraft": false,
            "url": format!("https://github.com/o/{}/pull/{}", id, number),
            "baseRefName": "main",
            "headRefOid": "h",
            "author": {"login": "me"},
            "body": body,
        }])
        .to_string()
    }

    #[test]
    fn test_update_descriptions_links_public_prs() {
        let runner = ScriptedRunner::new()
            .ok("- gh api user --jq .login", "me")
            .ok(&format!("a {}", LIST), &pr_json("a", 1, "OPEN", "Intro"))
            .ok(&format!("b {}", LIST), &pr_json("b", 2, "OPEN", ""))
            .ok(&format!("c {}", LIST), &pr_json("c", 3, "MERGED", ""))
            .ok("a gh repo view --json viewerPermission --jq .viewerPermission", "READ")
            .ok("b gh repo view --json viewerPermission --jq .viewerPermission", "WRITE")
            .ok("c gh repo view --json viewerPermission --jq .viewerPermission", "WRITE");
        // Bodies contain a random delimiter, so accept any edit.
        let runner = AnyEdit(runner);

        let snapshot = Snapshot::default();
        let public: HashSet<String> = ["a", "c"].iter().map(|s| s.to_string()).collect();
        let description = Description {
            snapshot: &snapshot,
            graph: None,
            graph_source: None,
            public_ids: &public,
        };
        let c = collected(&["a", "b", "c"]);
        let updated =
            update_descriptions(&ids(&["a", "b", "c"]), &c, &runner, 2, &description).unwrap();
        assert_eq!(updated, vec!["a", "b"]);

        let edits = runner.edits();
        assert_eq!(edits.len(), 2);
        let a_body = &edits.iter().find(|(dir, _)| dir == "a").unwrap().1;
        assert!(a_body.starts_with("Intro\n\n"));
        assert!(!a_body.contains("/o/a/pull/1"), "own pull request is not linked");
        let b_body = &edits.iter().find(|(dir, _)| dir == "b").unwrap().1;
        assert!(b_body.contains("https://github.com/o/a/pull/1"));
        assert!(!b_body.contains("/o/c/pull/3"), "closed pull requests are not linked");
    }

    #[test]
    fn test_unchanged_description_is_not_edited() {
        let snapshot = Snapshot::default();
        let related = vec![RelatedPr {
            id: "a".to_string(),
            url: "https://github.com/o/a/pull/1".to_string(),
        }];
        let current = block::encode_with_delimiter(
            &BlockInput {
                current_id: "a",
                related: &related,
                snapshot: &snapshot,
                graph: None,
                graph_source: None,
            },
            5,
        )
        .unwrap();
        let body = format!("Intro\n\n{}", current);
        let runner = AnyEdit(
            ScriptedRunner::new()
                .ok("- gh api user --jq .login", "me")
                .ok(&format!("a {}", LIST), &pr_json("a", 1, "OPEN", &body))
                .ok("a gh repo view --json viewerPermission --jq .viewerPermission", "WRITE"),
        );

        let public: HashSet<String> = ["a".to_string()].into_iter().collect();
        let description = Description {
            snapshot: &snapshot,
            graph: None,
            graph_source: None,
            public_ids: &public,
        };
        let updated =
            update_descriptions(&ids(&["a"]), &collected(&["a"]), &runner, 1, &description).unwrap();
        assert!(updated.is_empty());
        assert!(runner.edits().is_empty());
    }

    /// Wraps a scripted runner and accepts every `gh pr edit`, recording the
    /// new bodies.
    struct AnyEdit(ScriptedRunner);

    impl AnyEdit {
        fn edits(&self) -> Vec<(String, String)> {
            self.0
                .calls_matching("")
                .into_iter()
                .filter(|c| c.contains(" gh pr edit "))
                .map(|c| {
                    let (dir, rest) = c.split_once(' ').unwrap();
                    let body = rest.split_once("--body ").unwrap().1.to_string();
                    (dir.to_string(), body)
                })
                .collect()
        }
    }

    impl CommandRunner for AnyEdit {
        fn run(&self, dir: Option<&std::path::Path>, program: &str, args: &[&str]) -> Result<String> {
            if program == "gh" && args.starts_with(&["pr", "edit"]) {
                let name = dir
                    .and_then(|d| d.file_name())
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                self.0
                    .calls
                    .lock()
                    .unwrap()
                    .push(format!("{} {} {}", name, program, args.join(" ")));
                return Ok(String::new());
            }
            self.0.run(dir, program, args)
        }

        fn run_interactive(&self, dir: Option<&std::path::Path>, program: &str, args: &[&str]) -> Result<()> {
            self.run(dir, program, args).map(|_| ())
        }
    }
}
