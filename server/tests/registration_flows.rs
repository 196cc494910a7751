mod common;

use rust_decimal::Decimal;

use alumni_portal_server::models::{PaymentStatus, RegistrationStatus, Role, TicketType};
use alumni_portal_server::payments::GatewayStatus;
use alumni_portal_server::services::RegistrationOutcome;
use alumni_portal_server::utils::error::AppError;

use common::TestApp;

#[tokio::test]
async fn test_free_event_cancel_and_convert() {
    let app = TestApp::new();
    let organizer = app.user(Role::Organizer).await;
    let alice = app.user(Role::Member).await;
    let bola = app.user(Role::Member).await;
    let event = app.event(organizer.id, 1, Decimal::ZERO).await;
    let engine = &app.state.capacity;

    let first = engine
        .register_for_event(alice.id, event.id, TicketType::Regular)
        .await
        .unwrap();
    let registration = first.registration().unwrap().clone();
    assert_eq!(registration.status, RegistrationStatus::Confirmed);
    assert!(matches!(
        first,
        RegistrationOutcome::Registered { ticket: Some(_), payment: None, .. }
    ));

    let second = engine
        .register_for_event(bola.id, event.id, TicketType::Regular)
        .await
        .unwrap();
    let entry = second.waitlist_entry().unwrap().clone();
    assert_eq!(entry.position, 1);

    let cancelled = engine.cancel_registration(registration.id).await.unwrap();
    assert_eq!(cancelled.registration.status, RegistrationStatus::Cancelled);
    assert_eq!(cancelled.next_in_line.map(|e| e.id), Some(entry.id));

    let converted = engine
        .convert_waitlist_to_registration(entry.id)
        .await
        .unwrap();
    let promoted = converted.registration().unwrap();
    assert_eq!(promoted.user_id, bola.id);
    assert_eq!(promoted.status, RegistrationStatus::Confirmed);

    assert!(engine.list_waitlist(event.id).await.unwrap().is_empty());
    let snapshot = engine.check_capacity(event.id).await.unwrap();
    assert_eq!(snapshot.current_registrations, 1);
    assert_eq!(snapshot.available, 0);

    let bola_inbox = app
        .state
        .notifications
        .list(bola.id, &Default::default())
        .await
        .unwrap();
    assert!(bola_inbox.total >= 2);
}

#[tokio::test]
async fn test_priced_registration_confirmed_by_verification() {
    let app = TestApp::new();
    let organizer = app.user(Role::Organizer).await;
    let member = app.user(Role::Member).await;
    let event = app.event(organizer.id, 50, Decimal::new(500_000, 2)).await;

    let outcome = app
        .state
        .capacity
        .register_for_event(member.id, event.id, TicketType::Regular)
        .await
        .unwrap();
    let RegistrationOutcome::Registered {
        registration,
        payment: Some(payment),
        checkout: Some(checkout),
        ticket: None,
    } = outcome
    else {
        panic!("expected a pending registration with a checkout");
    };
    assert_eq!(registration.status, RegistrationStatus::Pending);
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(checkout.reference, payment.reference);

    let initialized = app.gateway.initialized();
    assert_eq!(initialized.len(), 1);
    assert_eq!(initialized[0].amount_minor, 500_000);
    assert_eq!(initialized[0].email, member.email);

    app.gateway.settle(&payment.reference, GatewayStatus::Success);
    let confirmed = app
        .state
        .checkout
        .verify_payment(&payment.reference)
        .await
        .unwrap();
    assert!(confirmed.changed);
    assert_eq!(confirmed.payment.status, PaymentStatus::Success);
    assert_eq!(confirmed.registration.status, RegistrationStatus::Confirmed);
    let ticket = confirmed.ticket.unwrap();

    let again = app
        .state
        .checkout
        .verify_payment(&payment.reference)
        .await
        .unwrap();
    assert!(!again.changed);
    assert_eq!(again.payment.status, PaymentStatus::Success);
    assert_eq!(again.ticket.map(|t| t.ticket_number), Some(ticket.ticket_number.clone()));

    assert!(matches!(
        app.state.tickets.issue_ticket(registration.id).await,
        Err(AppError::AlreadyExists(_))
    ));

    let stats = app.state.capacity.get_event_stats(event.id).await.unwrap();
    assert_eq!(stats.confirmed, 1);
    assert_eq!(stats.revenue, Decimal::new(500_000, 2));
}

#[tokio::test]
async fn test_conversion_compacts_remaining_positions() {
    let app = TestApp::new();
    let organizer = app.user(Role::Organizer).await;
    let holder = app.user(Role::Member).await;
    let event = app.event(organizer.id, 1, Decimal::ZERO).await;
    let engine = &app.state.capacity;

    let seat = engine
        .register_for_event(holder.id, event.id, TicketType::Regular)
        .await
        .unwrap();

    let mut waiting = Vec::new();
    for _ in 0..4 {
        let member = app.user(Role::Member).await;
        let outcome = engine
            .register_for_event(member.id, event.id, TicketType::Regular)
            .await
            .unwrap();
        waiting.push(outcome.waitlist_entry().unwrap().clone());
    }
    let positions: Vec<i32> = waiting.iter().map(|e| e.position).collect();
    assert_eq!(positions, vec![1, 2, 3, 4]);

    assert!(matches!(
        engine.convert_waitlist_to_registration(waiting[1].id).await,
        Err(AppError::CapacityExceeded(_))
    ));

    engine
        .cancel_registration(seat.registration().unwrap().id)
        .await
        .unwrap();
    let before = engine.check_capacity(event.id).await.unwrap();
    engine
        .convert_waitlist_to_registration(waiting[1].id)
        .await
        .unwrap();
    let after = engine.check_capacity(event.id).await.unwrap();
    assert_eq!(after.current_registrations, before.current_registrations + 1);
    assert_eq!(after.waitlist_count, before.waitlist_count - 1);

    let remaining = engine.list_waitlist(event.id).await.unwrap();
    let order: Vec<_> = remaining.iter().map(|e| (e.id, e.position)).collect();
    assert_eq!(
        order,
        vec![(waiting[0].id, 1), (waiting[2].id, 2), (waiting[3].id, 3)]
    );
}

#[tokio::test]
async fn test_check_in_is_idempotent() {
    let app = TestApp::new();
    let organizer = app.user(Role::Organizer).await;
    let member = app.user(Role::Member).await;
    let event = app.event(organizer.id, 10, Decimal::ZERO).await;

    let outcome = app
        .state
        .capacity
        .register_for_event(member.id, event.id, TicketType::Vip)
        .await
        .unwrap();
    let RegistrationOutcome::Registered {
        ticket: Some(ticket),
        ..
    } = outcome
    else {
        panic!("free registrations are ticketed immediately");
    };

    let first = app
        .state
        .tickets
        .check_in_scan(&ticket.qr_payload, Some(event.id))
        .await
        .unwrap();
    assert!(!first.already_checked_in);

    let second = app
        .state
        .tickets
        .check_in(&ticket.ticket_number, Some(event.id))
        .await
        .unwrap();
    assert!(second.already_checked_in);
    assert_eq!(second.ticket.checked_in_at, first.ticket.checked_in_at);

    let stats = app.state.capacity.get_event_stats(event.id).await.unwrap();
    assert_eq!(stats.checked_in, 1);
}
