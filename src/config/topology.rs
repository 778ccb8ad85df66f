//! Workload topology
//!
//! A `workload` line is positional and overloads four delimiters:
//!
//! ```text
//! workload : <id> : <phase> : <remote cores> : <app groups> : <dispatch groups>
//!            groups are '|'-separated, cores ',' separated, app groups may be 'a-b'
//! ```
//!
//! Parsing happens in two steps. [`WorkloadLine::tokenize`] only splits the
//! line into named fields; [`WorkloadSpec::from_line`] gives the fields
//! meaning. The split keeps the grammar testable without the semantics.

use super::params::TunableParameters;
use crate::error::{PipeTuneError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Core identifier as written in the configuration file
pub type CoreId = u32;

/// Workload identifier
pub type WorkloadId = u32;

/// Tag that opens every multi-valued line
pub const WORKLOAD_TAG: &str = "workload";

const FIELD_SEP: char = ':';
const GROUP_SEP: char = '|';
const CORE_SEP: char = ',';
const RANGE_SEP: char = '-';

/// A `workload` line split into its named, still-unparsed fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkloadLine<'a> {
    /// Workload id field
    pub id: &'a str,
    /// Free-form phase descriptor
    pub phase: &'a str,
    /// Comma list of remote cores
    pub remote_cores: &'a str,
    /// `|`-separated application core groups
    pub app_groups: &'a str,
    /// `|`-separated dispatcher core groups
    pub dispatch_groups: &'a str,
}

impl<'a> WorkloadLine<'a> {
    /// Split a raw line into its six positional fields
    pub fn tokenize(line: &'a str) -> Result<Self> {
        let fields: Vec<&str> = line.trim().split(FIELD_SEP).map(str::trim).collect();

        if fields.first().copied() != Some(WORKLOAD_TAG) {
            return Err(PipeTuneError::config(format!(
                "multi-valued line must start with '{}'",
                WORKLOAD_TAG
            )));
        }
        if fields.len() != 6 {
            return Err(PipeTuneError::config(format!(
                "workload line needs 6 fields, found {}",
                fields.len()
            )));
        }

        Ok(Self {
            id: fields[1],
            phase: fields[2],
            remote_cores: fields[3],
            app_groups: fields[4],
            dispatch_groups: fields[5],
        })
    }
}

fn parse_int(field: &str, token: &str) -> Result<u32> {
    token.trim().parse::<u32>().map_err(|_| {
        PipeTuneError::config(format!("{}: '{}' is not a valid integer", field, token.trim()))
    })
}

/// Parse a comma list of core ids (e.g. "2,4,7" -> [2,4,7])
pub fn parse_core_list(field: &str, s: &str) -> Result<Vec<CoreId>> {
    s.split(CORE_SEP).map(|tok| parse_int(field, tok)).collect()
}

/// Parse one application core group: either a comma list or an inclusive
/// range (e.g. "2-4" -> [2,3,4])
pub fn parse_app_group(s: &str) -> Result<Vec<CoreId>> {
    match s.split_once(RANGE_SEP) {
        Some((start, end)) => {
            let start = parse_int("app core range", start)?;
            let end = parse_int("app core range", end)?;
            if start > end {
                return Err(PipeTuneError::config(format!(
                    "app core range '{}' is descending",
                    s.trim()
                )));
            }
            Ok((start..=end).collect())
        }
        None => parse_core_list("app cores", s),
    }
}

/// Parse `|`-separated application core groups, preserving group order
pub fn parse_app_groups(s: &str) -> Result<Vec<Vec<CoreId>>> {
    s.split(GROUP_SEP).map(parse_app_group).collect()
}

/// Parse `|`-separated dispatcher core groups (comma lists only)
pub fn parse_dispatch_groups(s: &str) -> Result<Vec<Vec<CoreId>>> {
    s.split(GROUP_SEP)
        .map(|group| parse_core_list("dispatch cores", group))
        .collect()
}

fn join_cores(cores: &[CoreId]) -> String {
    cores
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn join_groups(groups: &[Vec<CoreId>]) -> String {
    groups
        .iter()
        .map(|g| join_cores(g))
        .collect::<Vec<_>>()
        .join("|")
}

/// One configured data-path instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    /// Phase descriptor
    pub phase: String,
    /// Cores used on the remote host
    pub remote_cores: Vec<CoreId>,
    /// Application core groups; group `i` is served by dispatch group `i`
    pub app_groups: Vec<Vec<CoreId>>,
    /// Dispatcher core groups, one core each
    pub dispatch_groups: Vec<Vec<CoreId>>,
}

impl WorkloadSpec {
    /// Build a workload from tokenized fields, returning its id
    pub fn from_line(line: &WorkloadLine<'_>) -> Result<(WorkloadId, Self)> {
        let id = parse_int("workload id", line.id)?;
        let spec = Self {
            phase: line.phase.to_string(),
            remote_cores: parse_core_list("remote cores", line.remote_cores)?,
            app_groups: parse_app_groups(line.app_groups)?,
            dispatch_groups: parse_dispatch_groups(line.dispatch_groups)?,
        };
        Ok((id, spec))
    }

    /// Render this workload as a configuration line
    pub fn to_line(&self, id: WorkloadId) -> String {
        format!(
            "{} : {} : {} : {} : {} : {}",
            WORKLOAD_TAG,
            id,
            self.phase,
            join_cores(&self.remote_cores),
            join_groups(&self.app_groups),
            join_groups(&self.dispatch_groups),
        )
    }

    /// Check that `to_line` yields a line `insert_line` accepts back
    pub fn check_renderable(&self, id: WorkloadId) -> Result<()> {
        let phase = self.phase.as_str();
        if phase != phase.trim() || phase.contains(FIELD_SEP) || phase.contains('\n') {
            return Err(PipeTuneError::config(format!(
                "workload {}: phase '{}' must not contain ':', line breaks or surrounding spaces",
                id, phase
            )));
        }
        if self.remote_cores.is_empty() {
            return Err(PipeTuneError::config(format!("workload {}: no remote cores", id)));
        }
        for (what, groups) in [("app", &self.app_groups), ("dispatch", &self.dispatch_groups)] {
            if groups.is_empty() || groups.iter().any(Vec::is_empty) {
                return Err(PipeTuneError::config(format!(
                    "workload {}: empty {} core group",
                    id, what
                )));
            }
        }
        Ok(())
    }

    /// Number of application cores across all groups
    pub fn app_core_count(&self) -> usize {
        self.app_groups.iter().map(Vec::len).sum()
    }
}

/// All workloads keyed by id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadTopology {
    workloads: BTreeMap<WorkloadId, WorkloadSpec>,
}

impl WorkloadTopology {
    /// Create an empty topology
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a workload; ids must be unique and the workload must render to
    /// a loadable line
    pub fn insert(&mut self, id: WorkloadId, spec: WorkloadSpec) -> Result<()> {
        if self.workloads.contains_key(&id) {
            return Err(PipeTuneError::config(format!("duplicate workload id {}", id)));
        }
        spec.check_renderable(id)?;
        self.workloads.insert(id, spec);
        Ok(())
    }

    /// Parse and add a raw `workload` line
    pub fn insert_line(&mut self, line: &str) -> Result<WorkloadId> {
        let tokens = WorkloadLine::tokenize(line)?;
        let (id, spec) = WorkloadSpec::from_line(&tokens)?;
        self.insert(id, spec)?;
        Ok(id)
    }

    /// Iterate workloads in id order
    pub fn iter(&self) -> impl Iterator<Item = (&WorkloadId, &WorkloadSpec)> {
        self.workloads.iter()
    }

    /// Get one workload
    pub fn get(&self, id: WorkloadId) -> Option<&WorkloadSpec> {
        self.workloads.get(&id)
    }

    /// Number of workloads
    pub fn len(&self) -> usize {
        self.workloads.len()
    }

    /// True when no workload is configured
    pub fn is_empty(&self) -> bool {
        self.workloads.is_empty()
    }

    /// Phase descriptor of a workload
    pub fn pipe_phase(&self, id: WorkloadId) -> Option<&str> {
        self.get(id).map(|w| w.phase.as_str())
    }

    /// Remote cores of a workload
    pub fn remote_cores(&self, id: WorkloadId) -> Option<&[CoreId]> {
        self.get(id).map(|w| w.remote_cores.as_slice())
    }

    /// Application core groups of a workload
    pub fn app_core_groups(&self, id: WorkloadId) -> Option<&[Vec<CoreId>]> {
        self.get(id).map(|w| w.app_groups.as_slice())
    }

    /// Dispatcher core groups of a workload
    pub fn dispatch_core_groups(&self, id: WorkloadId) -> Option<&[Vec<CoreId>]> {
        self.get(id).map(|w| w.dispatch_groups.as_slice())
    }

    /// Total application cores across all workloads
    pub fn total_app_cores(&self) -> usize {
        self.workloads.values().map(WorkloadSpec::app_core_count).sum()
    }

    /// Total dispatcher groups across all workloads
    pub fn total_dispatch_groups(&self) -> usize {
        self.workloads.values().map(|w| w.dispatch_groups.len()).sum()
    }

    /// Check the cross-field invariants against the knob values.
    ///
    /// Does not check that cores are disjoint or exist on the host.
    pub fn validate(&self, params: &TunableParameters) -> Result<()> {
        for (id, spec) in &self.workloads {
            if spec.dispatch_groups.len() != spec.app_groups.len() {
                return Err(PipeTuneError::config(format!(
                    "workload {}: {} dispatch groups for {} app groups, need one dispatcher per app group",
                    id,
                    spec.dispatch_groups.len(),
                    spec.app_groups.len()
                )));
            }
            if let Some((idx, group)) = spec
                .dispatch_groups
                .iter()
                .enumerate()
                .find(|(_, g)| g.len() != 1)
            {
                return Err(PipeTuneError::config(format!(
                    "workload {}: dispatch group {} has {} cores, each dispatch group must have exactly one",
                    id,
                    idx,
                    group.len()
                )));
            }
        }

        let app_cores = self.total_app_cores() as u64;
        if app_cores != params.app_core_num() {
            return Err(PipeTuneError::config(format!(
                "kAppCoreNum is {} but app core groups contain {} cores",
                params.app_core_num(),
                app_cores
            )));
        }

        let dispatch_groups = self.total_dispatch_groups() as u64;
        if dispatch_groups != params.disp_queue_num() {
            return Err(PipeTuneError::config(format!(
                "kDispQueueNum is {} but {} dispatch groups are configured",
                params.disp_queue_num(),
                dispatch_groups
            )));
        }

        Ok(())
    }
}
