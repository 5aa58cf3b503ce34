//! Pure progress/state bookkeeping for one batch.
//!
//! Only the batch control task touches this; it is plain data with no
//! locking of its own.

use std::collections::HashMap;

use crate::job::{GroupId, JobId, JobSpec, JobState};

use super::types::{GroupReport, GroupStatus};

/// A group transition worth telling subscribers about.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GroupUpdate {
    pub group_id: GroupId,
    pub status: GroupStatus,
    pub completed: usize,
    pub total: usize,
}

#[derive(Debug)]
struct JobEntry {
    state: JobState,
    percent: f32,
    group: GroupId,
}

#[derive(Debug, Default)]
struct GroupEntry {
    members: Vec<JobId>,
    /// Last `(status, completed)` reported, to suppress no-op updates.
    reported: Option<(GroupStatus, usize)>,
}

/// Tracks every job of a batch from registration to its terminal state,
/// plus the group roll-ups derived from them.
#[derive(Debug, Default)]
pub(crate) struct ProgressBook {
    jobs: HashMap<JobId, JobEntry>,
    groups: HashMap<GroupId, GroupEntry>,
}

impl ProgressBook {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a job. Returns `false` if the id is already present.
    pub(crate) fn register(&mut self, spec: &JobSpec) -> bool {
        if self.jobs.contains_key(&spec.id) {
            return false;
        }
        self.jobs.insert(
            spec.id.clone(),
            JobEntry {
                state: JobState::Pending,
                percent: 0.0,
                group: spec.group_id.clone(),
            },
        );
        self.groups
            .entry(spec.group_id.clone())
            .or_default()
            .members
            .push(spec.id.clone());
        true
    }

    pub(crate) fn mark_running(&mut self, id: &JobId) -> Option<GroupUpdate> {
        let group = {
            let entry = self.jobs.get_mut(id)?;
            entry.state = JobState::Running;
            entry.group.clone()
        };
        self.refresh_group(&group)
    }

    /// Records a progress report. Returns the effective percentage when it
    /// advances the job, `None` when it is stale or the job is not running.
    pub(crate) fn record_progress(&mut self, id: &JobId, percent: f32) -> Option<f32> {
        let entry = self.jobs.get_mut(id)?;
        if entry.state != JobState::Running {
            return None;
        }
        let percent = percent.clamp(0.0, 100.0);
        if percent > entry.percent {
            entry.percent = percent;
            Some(percent)
        } else {
            None
        }
    }

    pub(crate) fn mark_terminal(&mut self, id: &JobId, state: JobState) -> Option<GroupUpdate> {
        debug_assert!(state.is_terminal());
        let group = {
            let entry = self.jobs.get_mut(id)?;
            entry.state = state;
            entry.group.clone()
        };
        self.refresh_group(&group)
    }

    pub(crate) fn state_of(&self, id: &JobId) -> Option<JobState> {
        self.jobs.get(id).map(|e| e.state)
    }

    /// Mean progress across all registered jobs. Terminal jobs count as
    /// fully accounted for, whatever their final state.
    pub(crate) fn overall(&self) -> f32 {
        if self.jobs.is_empty() {
            return 0.0;
        }
        let sum: f32 = self
            .jobs
            .values()
            .map(|e| if e.state.is_terminal() { 100.0 } else { e.percent })
            .sum();
        sum / self.jobs.len() as f32
    }

    pub(crate) fn job_states(&self) -> HashMap<JobId, JobState> {
        self.jobs
            .iter()
            .map(|(id, e)| (id.clone(), e.state))
            .collect()
    }

    pub(crate) fn group_reports(&self) -> HashMap<GroupId, GroupReport> {
        self.groups
            .keys()
            .map(|g| {
                let (status, completed, total) = self.group_snapshot(g);
                (
                    g.clone(),
                    GroupReport {
                        status,
                        completed,
                        total,
                    },
                )
            })
            .collect()
    }

    fn group_snapshot(&self, group: &GroupId) -> (GroupStatus, usize, usize) {
        let members = &self.groups[group].members;
        let total = members.len();
        let mut done = 0;
        let mut errored = 0;
        let mut terminal = 0;
        let mut started = 0;
        for id in members {
            let state = self.jobs[id].state;
            if state == JobState::Done {
                done += 1;
            }
            if state == JobState::Error {
                errored += 1;
            }
            if state.is_terminal() {
                terminal += 1;
            }
            if state != JobState::Pending {
                started += 1;
            }
        }
        // Done requires every member to succeed; a settled group with a
        // cancelled member (and no errors) reports Cancelled.
        let status = if errored > 0 {
            GroupStatus::Error
        } else if done == total {
            GroupStatus::Done
        } else if terminal == total {
            GroupStatus::Cancelled
        } else if started > 0 {
            GroupStatus::Running
        } else {
            GroupStatus::Pending
        };
        (status, done, total)
    }

    fn refresh_group(&mut self, group: &GroupId) -> Option<GroupUpdate> {
        let (status, completed, total) = self.group_snapshot(group);
        let entry = self.groups.get_mut(group)?;
        if entry.reported == Some((status, completed)) {
            return None;
        }
        entry.reported = Some((status, completed));
        Some(GroupUpdate {
            group_id: group.clone(),
            status,
            completed,
            total,
        })
    }
}
