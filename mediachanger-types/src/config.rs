/// Caller-supplied changer identity. Unlike the teacher's `ScsiTapeChanger`,
/// this is never read from an on-disk section-config file: spec Non-goals
/// exclude persisting inventory or configuration across process restarts,
/// so a caller constructs this directly (e.g. from its own job-control
/// layer) each run.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChangerConfig {
    /// Caller-chosen label, used only in log messages.
    pub name: String,
    /// IOKit registry path or BSD-style identifier of the changer nub.
    pub path: String,
}
