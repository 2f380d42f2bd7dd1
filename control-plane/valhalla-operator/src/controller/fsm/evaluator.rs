use super::observed::ChildSnapshot;
use crate::crd::Phase;

/// Completion predicate of `phase` over observed state. `None` means the
/// phase has no exit.
fn completion(phase: Phase) -> Option<fn(&ChildSnapshot) -> bool> {
    match phase {
        Phase::Empty => Some(|_| true),
        Phase::MapBuilding => Some(ChildSnapshot::is_job_completed),
        Phase::Serving => None,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PhaseTransition {
    pub from: Phase,
    pub to: Phase,
}

impl PhaseTransition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

/// Advance `phase` by at most one step. The result is never lower than the
/// input.
pub fn advance(phase: Phase, snapshot: &ChildSnapshot) -> PhaseTransition {
    let to = match completion(phase) {
        Some(done) if done(snapshot) => phase.next(),
        _ => phase,
    };
    PhaseTransition { from: phase, to }
}
