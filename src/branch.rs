//! Publishing a fresh branch when the generated name may already be taken.
//!
//! Several people (or several runs) can publish a branch in the same
//! repository at the same second. Names are generated as
//! `mistletoe/<user>/<yyyymmdd-hhmmss>`, and every retry appends `-<n>`.
//!
//! The workflow is an explicit state machine:
//!
//! ```text
//! GenerateName -> CheckoutLocal -> Commit -> Push -> Success
//!      |               |                      |
//!      +---------------+------> Retry <-------+
//!                                 |
//!                   GenerateName (next attempt) | Fail
//! ```
//!
//! [`Machine::next`] is pure; [`publish_new_branch`] drives it against real
//! git commands.

use std::path::Path;

use chrono::{DateTime, Local};
use log::{debug, warn};

use crate::error::{Error, Result};
use crate::git::Git;
use crate::runner::{stderr_of, CommandRunner};

/// Attempts before giving up, counting the first one.
pub const MAX_ATTEMPTS: usize = 5;

/// Namespace of generated branch names.
pub const BRANCH_PREFIX: &str = "mistletoe";

/// Push rejections that mean "somebody else already has this branch".
const COLLISION_MARKERS: [&str; 3] = ["already exists", "non-fast-forward", "fetch first"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    GenerateName,
    CheckoutLocal,
    Commit,
    Push,
    Retry,
    Success,
    Fail,
}

/// What happened while executing the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Done,
    /// The name is taken, locally or on the remote.
    Collision,
    Failed,
}

/// State plus the zero-based attempt counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Machine {
    pub state: State,
    pub attempt: usize,
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

impl Machine {
    pub fn new() -> Self {
        Self {
            state: State::GenerateName,
            attempt: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, State::Success | State::Fail)
    }

    /// Whether the machine stopped because every attempt collided.
    pub fn exhausted(&self) -> bool {
        self.state == State::Fail && self.attempt + 1 >= MAX_ATTEMPTS
    }

    pub fn next(self, event: Event) -> Self {
        let state = match (self.state, event) {
            (State::Success, _) | (State::Fail, _) => return self,
            (State::Retry, _) => {
                return if self.attempt + 1 < MAX_ATTEMPTS {
                    Self {
                        state: State::GenerateName,
                        attempt: self.attempt + 1,
                    }
                } else {
                    Self {
                        state: State::Fail,
                        ..self
                    }
                };
            }
            (_, Event::Failed) => State::Fail,
            (State::Commit, Event::Collision) => State::Fail,
            (_, Event::Collision) => State::Retry,
            (State::GenerateName, Event::Done) => State::CheckoutLocal,
            (State::CheckoutLocal, Event::Done) => State::Commit,
            (State::Commit, Event::Done) => State::Push,
            (State::Push, Event::Done) => State::Success,
        };
        Self { state, ..self }
    }
}

/// Lowercase user name restricted to `[a-z0-9._-]`.
pub fn sanitize_user(user: &str) -> String {
    let mut out = String::new();
    for c in user.trim().chars().flat_map(char::to_lowercase) {
        let c = if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
            c
        } else {
            '-'
        };
        if c == '-' && out.ends_with('-') {
            continue;
        }
        out.push(c);
    }
    let trimmed = out.trim_matches(|c| c == '-' || c == '.');
    if trimmed.is_empty() {
        "user".to_string()
    } else {
        trimmed.to_string()
    }
}

/// `yyyymmdd-hhmmss` in local time.
pub fn timestamp(now: DateTime<Local>) -> String {
    now.format("%Y%m%d-%H%M%S").to_string()
}

/// Branch name for the given attempt.
pub fn branch_name(user: &str, stamp: &str, attempt: usize) -> String {
    let base = format!("{}/{}/{}", BRANCH_PREFIX, sanitize_user(user), stamp);
    if attempt == 0 {
        base
    } else {
        format!("{}-{}", base, attempt)
    }
}

fn is_collision(err: &Error) -> bool {
    let stderr = stderr_of(err);
    COLLISION_MARKERS.iter().any(|m| stderr.contains(m))
}

/// Creates, commits and publishes a fresh branch in `dir`, retrying with a
/// new name on collisions. Returns the published branch name.
pub fn publish_new_branch(
    id: &str,
    dir: &Path,
    runner: &dyn CommandRunner,
    user: &str,
    stamp: &str,
) -> Result<String> {
    let git = Git::new(runner, dir);
    let original = git.current_branch()?;
    let mut machine = Machine::new();
    let mut name = branch_name(user, stamp, 0);
    let mut failure: Option<Error> = None;

    while !machine.is_terminal() {
        let event = match machine.state {
            State::GenerateName => {
                name = branch_name(user, stamp, machine.attempt);
                match git.ls_remote_head(&name) {
                    Ok(Some(_)) => {
                        debug!("{}: {} already exists on the remote", id, name);
                        Event::Collision
                    }
                    Ok(None) => Event::Done,
                    Err(e) => {
                        failure = Some(e);
                        Event::Failed
                    }
                }
            }
            State::CheckoutLocal => match git.checkout_new(&name) {
                Ok(()) => Event::Done,
                Err(e) if is_collision(&e) => Event::Collision,
                Err(e) => {
                    failure = Some(e);
                    Event::Failed
                }
            },
            State::Commit => match git.commit_empty(&format!("Start {}", name)) {
                Ok(()) => Event::Done,
                Err(e) => {
                    failure = Some(e);
                    Event::Failed
                }
            },
            State::Push => match git.push(&name) {
                Ok(_) => Event::Done,
                Err(e) if is_collision(&e) => {
                    debug!("{}: push of {} rejected, picking another name", id, name);
                    abandon(&git, original.as_deref(), &name);
                    Event::Collision
                }
                Err(e) => {
                    failure = Some(e);
                    Event::Failed
                }
            },
            State::Retry => Event::Done,
            State::Success | State::Fail => break,
        };
        machine = machine.next(event);
    }

    match machine.state {
        State::Success => Ok(name),
        _ if machine.exhausted() && failure.is_none() => Err(Error::BranchCollision {
            id: id.to_string(),
            branch: name,
            attempts: MAX_ATTEMPTS,
        }),
        _ => Err(failure
            .map(|e| Error::for_repo(id, e))
            .unwrap_or_else(|| Error::for_repo(id, format!("could not publish {}", name)))),
    }
}

/// Returns to the original branch and drops the rejected local branch.
fn abandon(git: &Git<'_>, original: Option<&str>, name: &str) {
    let Some(original) = original else {
        return;
    };
    if let Err(e) = git.checkout(original).and_then(|_| git.delete_branch(name)) {
        warn!("could not clean up rejected branch {}: {}", name, e);
    }
}
