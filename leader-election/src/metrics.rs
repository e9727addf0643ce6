pub(crate) const METRIC_ELECTION_TRANSITIONS: &str = "leader_election_transitions_total";
pub(crate) const METRIC_READINESS_PATCH_ATTEMPTS: &str = "readiness_patch_attempts_total";
pub(crate) const METRIC_LEADING: &str = "leader_election_is_leader";

pub(crate) fn emit_transition(transition: &'static str) {
    metrics::counter!(METRIC_ELECTION_TRANSITIONS, "transition" => transition).increment(1);
}

pub(crate) fn emit_patch_attempt(result: &'static str) {
    metrics::counter!(METRIC_READINESS_PATCH_ATTEMPTS, "result" => result).increment(1);
}

pub(crate) fn emit_leading(leading: bool) {
    metrics::gauge!(METRIC_LEADING).set(if leading { 1.0 } else { 0.0 });
}
