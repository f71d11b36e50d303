// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use crate::error::KernelError;
use crate::registration::{RegistrationEvent as Ev, RegistrationState as St};

#[test]
fn test_happy_path() {
    let s = St::Unregistered.transition(Ev::Submitted).unwrap();
    assert_eq!(s, St::Registering);
    let s = s.transition(Ev::Confirmed).unwrap();
    assert_eq!(s, St::Registered);
    assert!(s.is_terminal());
}

#[test]
fn test_retry_then_fail() {
    let s = St::Unregistered.transition(Ev::Submitted).unwrap();
    let s = s.transition(Ev::Rejected { retries_remain: true }).unwrap();
    assert_eq!(s, St::Registering);
    let s = s.transition(Ev::Submitted).unwrap();
    let s = s.transition(Ev::Rejected { retries_remain: false }).unwrap();
    assert_eq!(s, St::Failed);
    assert!(s.is_terminal());
}

#[test]
fn test_already_registered_on_chain() {
    assert_eq!(St::Unregistered.transition(Ev::FoundOnChain).unwrap(), St::Registered);
}

#[test]
fn test_signer_fault_is_terminal() {
    assert_eq!(St::Unregistered.transition(Ev::SignerFault).unwrap(), St::Failed);
    assert_eq!(St::Registering.transition(Ev::SignerFault).unwrap(), St::Failed);
}

#[test]
fn test_terminal_states_refuse_transitions() {
    for ev in [Ev::Submitted, Ev::Confirmed, Ev::Rejected { retries_remain: true }, Ev::SignerFault] {
        assert!(matches!(
            St::Registered.transition(ev),
            Err(KernelError::InvalidTransition { from: "registered", .. })
        ));
        assert!(St::Failed.transition(ev).is_err());
    }
    // Confirmation without a submission is a bug
    assert!(St::Unregistered.transition(Ev::Confirmed).is_err());
}
