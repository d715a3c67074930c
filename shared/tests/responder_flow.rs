mod common;

use common::{
    inbound, mount_responder, request_json, resolve, saved_presence, update, Session, Tester,
};
use serde_json::json;
use shared::capabilities::{ChannelOutput, LocationOutput, StoreOperation, StoreOutput};
use shared::model::{PermissionState, Presence, RequestId, RequestStatus, Role};
use shared::{Event, LatLon, Model};

/// A connected responder that has just gone online and received two pending requests.
fn online_with_pending(app: &Tester, model: &mut Model) -> Session {
    let mut session = mount_responder(app, model, None);
    let mut toggled = update(app, model, Event::TogglePresence);
    session.watch = toggled.watches.pop();

    resolve(
        app,
        model,
        &mut session.channel,
        inbound(
            "pending-requests",
            json!([
                request_json("req-1", 12.95, 77.60),
                request_json("req-2", 13.02, 77.55)
            ]),
        ),
    );
    session
}

fn accept(app: &Tester, model: &mut Model, id: &str) -> common::Effects {
    update(
        app,
        model,
        Event::AcceptRequest {
            request_id: RequestId::new(id),
        },
    )
}

#[test]
fn test_going_online_announces_persists_and_streams() {
    let app = Tester::default();
    let mut model = Model::default();
    mount_responder(&app, &mut model, None);
    assert_eq!(app.view(&model).presence, Presence::Offline);
    assert!(app.view(&model).can_toggle_presence);

    let mut effects = update(&app, &mut model, Event::TogglePresence);

    assert_eq!(
        effects.emitted_events(),
        vec!["update-status", "get-pending-requests"]
    );
    let status = effects.frame("update-status").unwrap();
    assert_eq!(status.payload["vehicleId"], "AMB-1");
    assert_eq!(status.payload["status"], "online");

    let write = effects.store.pop().expect("presence persisted");
    let StoreOperation::Set { key, value } = &write.operation else {
        panic!("expected a store write");
    };
    assert_eq!(key, "settings:driverStatus");
    assert_eq!(value.as_slice(), br#""online""#);

    let mut watch = effects.watches.pop().expect("location watch started");
    let sampled = resolve(
        &app,
        &mut model,
        &mut watch,
        LocationOutput::Position(LatLon::new(12.975, 77.6)),
    );
    let forwarded = sampled.frame("location-update").expect("sample forwarded");
    assert_eq!(forwarded.payload["vehicleId"], "AMB-1");
    assert_eq!(forwarded.payload["latitude"], 12.975);
}

#[test]
fn test_pending_requests_are_listed_with_distance() {
    let app = Tester::default();
    let mut model = Model::default();
    let mut session = online_with_pending(&app, &mut model);

    let cards = app.view(&model).pending_requests;
    assert_eq!(cards.len(), 2);
    assert_eq!(cards[0].request_id, "req-1");
    assert_eq!(cards[1].request_id, "req-2");
    assert!(cards.iter().all(|card| card.can_accept));
    assert!(cards[0].distance_km.unwrap() > 0.0);

    resolve(
        &app,
        &mut model,
        &mut session.channel,
        inbound("new-emergency-request", request_json("req-3", 12.9, 77.5)),
    );
    let cards = app.view(&model).pending_requests;
    assert_eq!(cards.len(), 3);
    assert_eq!(cards[2].request_id, "req-3");

    resolve(
        &app,
        &mut model,
        &mut session.channel,
        inbound(
            "request-status-updated",
            json!({ "requestId": "req-2", "status": "cancelled" }),
        ),
    );
    let ids: Vec<String> = app
        .view(&model)
        .pending_requests
        .into_iter()
        .map(|card| card.request_id)
        .collect();
    assert_eq!(ids, vec!["req-1", "req-3"]);
}

#[test]
fn test_accept_is_optimistic_until_confirmed() {
    let app = Tester::default();
    let mut model = Model::default();
    let mut session = online_with_pending(&app, &mut model);

    let effects = accept(&app, &mut model, "req-1");
    let frame = effects.frame("accept-request").expect("accept emitted");
    assert_eq!(frame.payload["requestId"], "req-1");
    assert_eq!(frame.payload["vehicleId"], "AMB-1");

    let view = app.view(&model);
    let panel = view.active_request.expect("accepted request shown");
    assert_eq!(panel.status, RequestStatus::Accepted);
    assert_eq!(panel.assigned_vehicle_id.as_deref(), Some("AMB-1"));
    assert!(panel.is_confirming);
    assert!(view.pending_requests.iter().all(|card| !card.can_accept));

    resolve(
        &app,
        &mut model,
        &mut session.channel,
        inbound(
            "request-accepted",
            json!({ "ambulanceId": "AMB-1", "requestId": "req-1" }),
        ),
    );
    let view = app.view(&model);
    let panel = view.active_request.unwrap();
    assert!(!panel.is_confirming);
    assert_eq!(panel.status, RequestStatus::Accepted);
    let ids: Vec<&str> = view
        .pending_requests
        .iter()
        .map(|card| card.request_id.as_str())
        .collect();
    assert_eq!(ids, vec!["req-2"]);
}

#[test]
fn test_second_accept_conflicts() {
    let app = Tester::default();
    let mut model = Model::default();
    online_with_pending(&app, &mut model);

    accept(&app, &mut model, "req-1");
    let effects = accept(&app, &mut model, "req-2");

    assert!(effects.emitted.is_empty());
    assert_eq!(
        app.view(&model).error.map(|e| e.error_code),
        Some("CONFLICT".to_string())
    );
    let panel = app.view(&model).active_request.unwrap();
    assert_eq!(panel.request_id, "req-1");
}

#[test]
fn test_losing_the_race_rolls_back() {
    let app = Tester::default();
    let mut model = Model::default();
    let mut session = online_with_pending(&app, &mut model);
    accept(&app, &mut model, "req-1");

    resolve(
        &app,
        &mut model,
        &mut session.channel,
        inbound(
            "request-accepted",
            json!({ "ambulanceId": "AMB-9", "requestId": "req-1" }),
        ),
    );

    let view = app.view(&model);
    assert!(view.active_request.is_none());
    let error = view.error.expect("conflict surfaced");
    assert_eq!(error.error_code, "CONFLICT");
    assert_eq!(error.message, "This request was accepted by another ambulance.");
    assert_eq!(view.pending_requests.len(), 1);
    assert_eq!(view.pending_requests[0].request_id, "req-2");
    assert!(view.pending_requests[0].can_accept);
}

#[test]
fn test_server_rejection_rolls_back() {
    let app = Tester::default();
    let mut model = Model::default();
    let mut session = online_with_pending(&app, &mut model);
    accept(&app, &mut model, "req-1");

    resolve(
        &app,
        &mut model,
        &mut session.channel,
        inbound("request-error", json!({ "message": "Request already taken" })),
    );

    let view = app.view(&model);
    assert!(view.active_request.is_none());
    let error = view.error.unwrap();
    assert_eq!(error.error_code, "CONFLICT");
    assert_eq!(error.message, "Request already taken");
    assert!(view.pending_requests.iter().all(|card| card.can_accept));
}

#[test]
fn test_unconfirmed_accept_times_out() {
    let app = Tester::default();
    let mut model = Model::default();
    online_with_pending(&app, &mut model);
    accept(&app, &mut model, "req-1");

    let now_ms = model.now_ms + 30_001;
    update(&app, &mut model, Event::Tick { now_ms });

    let view = app.view(&model);
    assert!(view.active_request.is_none());
    assert_eq!(
        view.error.map(|e| e.error_code),
        Some("CONNECTIVITY_ERROR".to_string())
    );
    assert!(view.pending_requests.iter().all(|card| card.can_accept));
}

#[test]
fn test_completion_takes_responder_offline() {
    let app = Tester::default();
    let mut model = Model::default();
    let mut session = online_with_pending(&app, &mut model);
    let mut watch = session.watch.take().expect("watch running while online");
    accept(&app, &mut model, "req-1");

    resolve(
        &app,
        &mut model,
        &mut session.channel,
        inbound(
            "request-accepted",
            json!({ "ambulanceId": "AMB-1", "requestId": "req-1" }),
        ),
    );
    resolve(
        &app,
        &mut model,
        &mut session.channel,
        inbound("accepted-progress", json!({ "requestId": "req-1" })),
    );
    assert_eq!(
        app.view(&model).active_request.unwrap().status,
        RequestStatus::InProgress
    );

    let completed = resolve(
        &app,
        &mut model,
        &mut session.channel,
        inbound("accepted-progress-disable", json!({ "requestId": "req-1" })),
    );

    assert_eq!(completed.stop_watches, 1);
    let status = completed.frame("update-status").expect("offline announced");
    assert_eq!(status.payload["status"], "offline");
    assert_eq!(completed.store.len(), 1);

    let view = app.view(&model);
    assert_eq!(view.presence, Presence::Offline);
    assert!(model.pending.is_empty());
    let panel = view.active_request.unwrap();
    assert_eq!(panel.status, RequestStatus::Completed);
    assert!(panel.can_dismiss);

    let late = resolve(
        &app,
        &mut model,
        &mut watch,
        LocationOutput::Position(LatLon::new(12.99, 77.61)),
    );
    assert!(late.emitted.is_empty());

    resolve(
        &app,
        &mut model,
        &mut session.channel,
        inbound("new-emergency-request", request_json("req-4", 12.9, 77.5)),
    );
    assert!(model.pending.is_empty());
}

#[test]
fn test_going_offline_stops_streaming_once() {
    let app = Tester::default();
    let mut model = Model::default();
    let mut session = online_with_pending(&app, &mut model);
    let mut watch = session.watch.take().unwrap();

    let offline = update(&app, &mut model, Event::TogglePresence);
    assert_eq!(offline.stop_watches, 1);
    assert_eq!(offline.emitted_events(), vec!["update-status"]);
    assert!(model.pending.is_empty());

    let late = resolve(
        &app,
        &mut model,
        &mut watch,
        LocationOutput::Position(LatLon::new(12.99, 77.61)),
    );
    assert!(late.emitted.is_empty());
    assert_eq!(late.stop_watches, 0);
}

#[test]
fn test_offline_toggle_while_reconnecting_is_announced_on_reconnect() {
    let app = Tester::default();
    let mut model = Model::default();
    let mut session = online_with_pending(&app, &mut model);

    let mut dropped = resolve(
        &app,
        &mut model,
        &mut session.channel,
        ChannelOutput::Dropped {
            reason: "net".into(),
        },
    );
    let mut retry = dropped.opens.pop().expect("retry dialled");

    let offline = update(&app, &mut model, Event::TogglePresence);
    assert!(offline.emitted.is_empty());
    assert_eq!(offline.stop_watches, 1);
    assert_eq!(offline.store.len(), 1);
    assert!(model.pending.is_empty());
    let view = app.view(&model);
    assert_eq!(view.presence, Presence::Offline);
    assert_eq!(
        view.error.map(|e| e.error_code),
        Some("CONNECTIVITY_ERROR".to_string())
    );

    let reconnected = resolve(&app, &mut model, &mut retry, ChannelOutput::Opened);
    assert_eq!(reconnected.emitted_events(), vec!["update-status"]);
    let status = reconnected.frame("update-status").unwrap();
    assert_eq!(status.payload["vehicleId"], "AMB-1");
    assert_eq!(status.payload["status"], "offline");
    assert!(app.view(&model).error.is_none());

    // Once confirmed, an offline responder stays quiet on later reconnects.
    let mut dropped = resolve(
        &app,
        &mut model,
        &mut retry,
        ChannelOutput::Dropped {
            reason: "net".into(),
        },
    );
    let mut retry = dropped.opens.pop().expect("retry dialled");
    let reconnected = resolve(&app, &mut model, &mut retry, ChannelOutput::Opened);
    assert!(reconnected.emitted.is_empty());
}

#[test]
fn test_saved_online_presence_is_announced_on_connect() {
    let app = Tester::default();
    let mut model = Model::default();
    update(
        &app,
        &mut model,
        Event::ProfileLoaded {
            user_id: "driver-1".into(),
            user_type: "ambulance".into(),
            vehicle_id: Some("AMB-1".into()),
        },
    );
    let mut mounted = update(
        &app,
        &mut model,
        Event::Mount {
            role: Role::Responder,
        },
    );
    let mut channel = mounted.opens.pop().unwrap();
    let mut restore = mounted.store.pop().unwrap();

    let restored = resolve(
        &app,
        &mut model,
        &mut restore,
        Ok(saved_presence(Presence::Online)),
    );
    assert_eq!(restored.watches.len(), 1);
    assert!(restored.emitted.is_empty());
    assert!(restored.store.is_empty());

    let connected = resolve(&app, &mut model, &mut channel, ChannelOutput::Opened);
    assert_eq!(
        connected.emitted_events(),
        vec!["update-status", "get-pending-requests"]
    );
}

#[test]
fn test_late_restore_does_not_override_user_choice() {
    let app = Tester::default();
    let mut model = Model::default();
    update(
        &app,
        &mut model,
        Event::ProfileLoaded {
            user_id: "driver-1".into(),
            user_type: "ambulance".into(),
            vehicle_id: Some("AMB-1".into()),
        },
    );
    let mut mounted = update(
        &app,
        &mut model,
        Event::Mount {
            role: Role::Responder,
        },
    );
    let mut restore = mounted.store.pop().unwrap();

    update(&app, &mut model, Event::TogglePresence);
    let late = resolve(
        &app,
        &mut model,
        &mut restore,
        Ok(StoreOutput::Value(Some(br#""offline""#.to_vec()))),
    );

    assert_eq!(late.stop_watches, 0);
    assert_eq!(app.view(&model).presence, Presence::Online);
}

#[test]
fn test_permission_denied_stops_streaming() {
    let app = Tester::default();
    let mut model = Model::default();
    let mut session = online_with_pending(&app, &mut model);
    let mut watch = session.watch.take().unwrap();

    let denied = resolve(&app, &mut model, &mut watch, LocationOutput::PermissionDenied);

    assert_eq!(denied.stop_watches, 1);
    let view = app.view(&model);
    assert_eq!(view.location_permission, PermissionState::Denied);
    let error = view.error.unwrap();
    assert_eq!(error.error_code, "LOCATION_PERMISSION_DENIED");
    assert_eq!(error.message, "Allow location access to use this feature.");
}

#[test]
fn test_profile_role_mismatch_requests_redirect() {
    let app = Tester::default();
    let mut model = Model::default();
    update(
        &app,
        &mut model,
        Event::ProfileLoaded {
            user_id: "user-1".into(),
            user_type: "user".into(),
            vehicle_id: None,
        },
    );
    update(
        &app,
        &mut model,
        Event::Mount {
            role: Role::Responder,
        },
    );
    assert_eq!(app.view(&model).redirect_to, Some(Role::Requester));

    let expired = update(&app, &mut model, Event::SessionExpired);
    assert_eq!(expired.closes, 1);
    assert!(app.view(&model).requires_login);
}

#[test]
fn test_session_expiry_forgets_saved_presence() {
    let app = Tester::default();
    let mut model = Model::default();
    mount_responder(&app, &mut model, Some(Presence::Online));

    let mut expired = update(&app, &mut model, Event::SessionExpired);
    assert_eq!(expired.closes, 1);
    assert_eq!(expired.stop_watches, 1);
    let mut delete = expired.store.pop().expect("saved presence cleared");
    assert_eq!(
        delete.operation,
        StoreOperation::Delete {
            key: "settings:driverStatus".into()
        }
    );

    resolve(
        &app,
        &mut model,
        &mut delete,
        Ok(StoreOutput::Deleted { existed: true }),
    );
    let view = app.view(&model);
    assert!(view.requires_login);
    assert!(view.error.is_none());
    assert_eq!(view.presence, Presence::Offline);
}
