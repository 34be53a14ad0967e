use rust_fsm::*;

state_machine! {
    lifecycle_flow(Idle)

    Idle(HydrateSubmitting) => Submitting,
    Idle(HydratePolling) => Polling,
    Idle(HydrateSettled) => Settled,

    Idle(Submit) => Submitting,
    Idle(Teardown) => Idle,

    Submitting(Accepted) => Polling,
    Submitting(Resolved) => Settled,
    Submitting(Teardown) => Idle,

    Polling(Pending) => Polling,
    Polling(Resolved) => Settled,
    Polling(Teardown) => Idle,

    Settled(Submit) => Submitting,
    Settled(Teardown) => Idle
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecyclePhase {
    Idle,
    Submitting,
    Polling,
    Settled,
}

impl LifecyclePhase {
    /// A command is in flight; further submits must wait or be forced.
    pub fn is_busy(self) -> bool {
        matches!(self, LifecyclePhase::Submitting | LifecyclePhase::Polling)
    }

    pub fn label(self) -> &'static str {
        match self {
            LifecyclePhase::Idle => "idle",
            LifecyclePhase::Submitting => "submitting",
            LifecyclePhase::Polling => "polling",
            LifecyclePhase::Settled => "settled",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Validation passed and the initiating call is about to go out.
    Submit,
    /// The backend accepted a background operation; start polling.
    Accepted,
    /// A poll tick came back "not yet complete".
    Pending,
    /// Terminal result, success or failure.
    Resolved,
    /// Unmount or explicit cancellation.
    Teardown,
}

fn hydrate(machine: &mut lifecycle_flow::StateMachine, phase: LifecyclePhase) -> Result<(), ()> {
    let input = match phase {
        LifecyclePhase::Idle => return Ok(()),
        LifecyclePhase::Submitting => lifecycle_flow::Input::HydrateSubmitting,
        LifecyclePhase::Polling => lifecycle_flow::Input::HydratePolling,
        LifecyclePhase::Settled => lifecycle_flow::Input::HydrateSettled,
    };
    machine.consume(&input).map_err(|_| ())?;
    Ok(())
}

fn expected_next_phase(current: LifecyclePhase, event: LifecycleEvent) -> Option<LifecyclePhase> {
    use LifecycleEvent as E;
    use LifecyclePhase as P;
    match (current, event) {
        (P::Idle, E::Submit) => Some(P::Submitting),
        (P::Settled, E::Submit) => Some(P::Submitting),
        (P::Submitting, E::Accepted) => Some(P::Polling),
        (P::Submitting, E::Resolved) => Some(P::Settled),
        (P::Polling, E::Pending) => Some(P::Polling),
        (P::Polling, E::Resolved) => Some(P::Settled),
        (_, E::Teardown) => Some(P::Idle),
        _ => None,
    }
}

pub fn transition(current: LifecyclePhase, event: LifecycleEvent) -> Option<LifecyclePhase> {
    let mut machine = lifecycle_flow::StateMachine::new();
    hydrate(&mut machine, current).ok()?;

    let input = match event {
        LifecycleEvent::Submit => lifecycle_flow::Input::Submit,
        LifecycleEvent::Accepted => lifecycle_flow::Input::Accepted,
        LifecycleEvent::Pending => lifecycle_flow::Input::Pending,
        LifecycleEvent::Resolved => lifecycle_flow::Input::Resolved,
        LifecycleEvent::Teardown => lifecycle_flow::Input::Teardown,
    };

    machine.consume(&input).ok()?;
    expected_next_phase(current, event)
}
