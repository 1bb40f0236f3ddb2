//! BOINC client state as decoded from a `get_state` reply.
//!
//! Field names follow the GUI-RPC element names so the wire decoder can
//! deserialize the host, network, time, project and application records
//! directly. Work results carry derived fields and are built by the decoder.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

// ============================================================================
// Host and Statistics Records
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostInfo {
    pub timezone: i64,
    pub domain_name: String,
    pub ip_addr: String,
    pub host_cpid: String,
    pub p_ncpus: i32,
    pub p_vendor: String,
    pub p_model: String,
    pub p_features: String,
    pub p_fpops: f64,
    pub p_iops: f64,
    pub p_membw: f64,
    pub p_calculated: f64,
    pub p_vm_extensions_disabled: i32,
    pub m_nbytes: f64,
    pub m_cache: f64,
    pub m_swap: f64,
    pub d_total: f64,
    pub d_free: f64,
    pub os_name: String,
    pub os_version: String,
    pub n_usable_coprocs: i32,
    pub wsl_available: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetStats {
    pub bwup: f64,
    pub avg_up: f64,
    pub avg_time_up: f64,
    pub bwdown: f64,
    pub avg_down: f64,
    pub avg_time_down: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeStats {
    pub on_frac: f64,
    pub connected_frac: f64,
    pub cpu_and_network_available_frac: f64,
    pub active_frac: f64,
    pub gpu_active_frac: f64,
    pub client_start_time: f64,
    pub total_start_time: f64,
    pub total_duration: f64,
    pub total_active_duration: f64,
    pub total_gpu_active_duration: f64,
    pub now: f64,
    pub previous_uptime: f64,
    pub session_active_duration: f64,
    pub session_gpu_active_duration: f64,
}

// ============================================================================
// Projects and Applications
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Project {
    pub master_url: String,
    pub project_name: String,
    pub user_name: String,
    pub team_name: String,
    pub host_venue: String,
    pub cross_project_id: String,
    pub external_cpid: String,
    pub cpid_time: f64,
    pub user_total_credit: f64,
    pub user_expavg_credit: f64,
    pub user_create_time: f64,
    pub host_total_credit: f64,
    pub host_expavg_credit: f64,
    pub njobs_success: i64,
    pub njobs_error: i64,
    pub elapsed_time: f64,
    pub sched_priority: f64,
    pub project_files_downloaded_time: f64,
    pub venue: String,
    pub project_dir: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct App {
    pub name: String,
    pub user_friendly_name: String,
    pub non_cpu_intensive: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppVersion {
    pub app_name: String,
    pub version_num: i64,
    pub platform: String,
    pub avg_ncpus: f64,
    pub flops: f64,
    pub api_version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkUnit {
    pub name: String,
    pub app_name: String,
    pub rsc_fpops_est: f64,
    pub rsc_fpops_bound: f64,
    pub rsc_memory_bound: f64,
    pub rsc_disk_bound: f64,
}

// ============================================================================
// Work Results
// ============================================================================

/// Progress of a result that is currently loaded in memory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActiveTask {
    pub active_task_state: i32,
    pub checkpoint_cpu_time: f64,
    pub elapsed_time: f64,
    pub working_set_size: f64,
    pub progress_rate: f64,
}

/// One task (result) known to a BOINC client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkResult {
    pub name: String,
    /// Name of the work unit this result belongs to
    pub wu_name: String,
    pub platform: String,
    pub version_num: String,
    pub project_url: String,
    pub final_cpu_time: f64,
    pub final_elapsed_time: f64,
    pub exit_status: i32,
    pub state: i32,
    pub report_deadline: f64,
    pub received_time: f64,
    pub estimated_remaining_secs: f64,
    pub active_task: Option<ActiveTask>,
    /// Set when the client holds a `<ready_to_report/>` marker for this
    /// result: it has finished and waits to be reported to its project.
    pub ready_to_report: bool,

    /// `estimated_remaining_secs` rendered by [`crate::format_dhms`]
    pub remaining_display: String,
    /// True iff `estimated_remaining_secs == 0`
    pub finished: bool,
}

impl WorkResult {
    /// Recomputes the derived display fields from the raw estimate.
    pub fn refresh_derived(&mut self) {
        self.remaining_display = crate::format_dhms(self.estimated_remaining_secs);
        self.finished = self.estimated_remaining_secs == 0.0;
    }
}

/// Ordering of results in a snapshot: ascending remaining time, then by
/// work-unit name.
pub fn compare_results(a: &WorkResult, b: &WorkResult) -> Ordering {
    a.estimated_remaining_secs
        .total_cmp(&b.estimated_remaining_secs)
        .then_with(|| a.wu_name.cmp(&b.wu_name))
}

/// Sorts results in place with [`compare_results`]. Stable for full ties.
pub fn sort_results(results: &mut [WorkResult]) {
    results.sort_by(compare_results);
}

// ============================================================================
// Client State
// ============================================================================

/// Full decoded state of one BOINC client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoincState {
    pub platform_name: String,
    pub core_client_major_version: u32,
    pub core_client_minor_version: u32,
    pub core_client_release: u32,
    pub host_info: HostInfo,
    pub net_stats: NetStats,
    pub time_stats: TimeStats,
    pub projects: Vec<Project>,
    pub apps: Vec<App>,
    pub app_versions: Vec<AppVersion>,
    pub workunits: Vec<WorkUnit>,
    /// Sorted by [`compare_results`]
    pub results: Vec<WorkResult>,
}

impl BoincState {
    /// `major.minor.release` of the core client, or `None` if not reported.
    pub fn client_version(&self) -> Option<String> {
        if self.core_client_major_version == 0
            && self.core_client_minor_version == 0
            && self.core_client_release == 0
        {
            return None;
        }
        Some(format!(
            "{}.{}.{}",
            self.core_client_major_version,
            self.core_client_minor_version,
            self.core_client_release
        ))
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// ============================================================================
// Work Unit Span
// ============================================================================

/// Lexicographically smallest and largest work-unit names across a fleet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkUnitSpan {
    pub min: String,
    pub max: String,
    pub count: usize,
}

/// Computes the work-unit name span over any collection of results.
///
/// Returns `None` when there are no results.
pub fn work_unit_span<'a, I>(results: I) -> Option<WorkUnitSpan>
where
    I: IntoIterator<Item = &'a WorkResult>,
{
    let mut span: Option<WorkUnitSpan> = None;
    for result in results {
        match span.as_mut() {
            None => {
                span = Some(WorkUnitSpan {
                    min: result.wu_name.clone(),
                    max: result.wu_name.clone(),
                    count: 1,
                });
            }
            Some(s) => {
                if result.wu_name < s.min {
                    s.min = result.wu_name.clone();
                }
                if result.wu_name > s.max {
                    s.max = result.wu_name.clone();
                }
                s.count += 1;
            }
        }
    }
    span
}
