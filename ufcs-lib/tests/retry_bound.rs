//! Resend limits of acknowledged exchanges

mod common;

use common::*;
use std::time::Duration;

fn expect_exhausted(err: UfcsError, attempts: u8) -> UfcsError {
    match err {
        UfcsError::ExchangeFailed {
            attempts: made, last, ..
        } => {
            assert_eq!(made, attempts);
            *last
        }
        other => panic!("Expected ExchangeFailed, got {:?}", other),
    }
}

#[test]
fn test_nack_sends_exactly_max_attempts() {
    let replies = vec![ctrl(0, ControlMsg::Nack); 10];
    let mut session = scripted(replies);

    let err = session.send_control(ControlMsg::Ping, true).unwrap_err();
    let last = expect_exhausted(err, 4);
    assert!(matches!(last, UfcsError::Nack));

    assert_eq!(session.transport().sent_numbers(), vec![0, 0, 0, 0]);
    assert_eq!(session.sequence().get_number(), 0);
}

#[test]
fn test_timeout_sends_exactly_max_attempts() {
    let mut session = scripted(vec![]);

    let err = session
        .send_data(DataMsg::ConfigWatchdog, &[0x13, 0x88], true)
        .unwrap_err();
    let last = expect_exhausted(err, 4);
    assert!(matches!(last, UfcsError::Timeout));

    let sent = &session.transport().sent;
    assert_eq!(sent.len(), 4);
    assert!(sent.iter().all(|s| s.body == vec![0x13, 0x88]));
}

#[test]
fn test_recovers_on_last_attempt() {
    let mut session = scripted(vec![
        Reply::Silence,
        ctrl(0, ControlMsg::Nack),
        Reply::Silence,
        ctrl(0, ControlMsg::Ack),
    ]);

    session.send_control(ControlMsg::GetSourceInfo, true).unwrap();
    assert_eq!(session.transport().sent.len(), 4);
    assert_eq!(session.sequence().get_number(), 1);
}

#[test]
fn test_configured_attempts_and_backoff() {
    let config = ProtocolConfig {
        max_send_attempts: 2,
        retry_backoff_ms: 7,
        ..Default::default()
    };
    let transport = MockTransport::new(vec![]);
    let mut session = Session::with_delay(transport, config, NoDelay::default());

    let err = session.send_control(ControlMsg::Ping, true).unwrap_err();
    expect_exhausted(err, 2);
    assert_eq!(session.transport().sent.len(), 2);
    assert_eq!(session.delay_mut().requested, vec![Duration::from_millis(7)]);
}

#[test]
fn test_unacked_send_is_never_retried() {
    let mut session = scripted(vec![]);
    session.send_control(ControlMsg::Ack, false).unwrap();
    assert_eq!(session.transport().sent.len(), 1);
    assert_eq!(session.transport().waits, 0);
}
