#![allow(dead_code)]

use std::collections::VecDeque;

use crux_core::capability::Operation;
use crux_core::testing::AppTester;
use crux_core::Request;
use serde_json::{json, Value};
use shared::capabilities::{
    ChannelOperation, ChannelOutput, LocationOperation, LocationOutput, StoreOperation,
    StoreOutput,
};
use shared::model::{Presence, Role};
use shared::protocol::Frame;
use shared::{App, Effect, Event, LatLon, Model};

pub type Tester = AppTester<App, Effect>;

pub const DEVICE: LatLon = LatLon::new(12.9716, 77.5946);

/// Shell-facing effects of one step, grouped by what a shell would do with them.
#[derive(Default)]
pub struct Effects {
    pub opens: Vec<Request<ChannelOperation>>,
    pub emitted: Vec<Frame>,
    pub closes: usize,
    pub watches: Vec<Request<LocationOperation>>,
    pub stop_watches: usize,
    pub fixes: Vec<Request<LocationOperation>>,
    pub store: Vec<Request<StoreOperation>>,
}

impl Effects {
    pub fn sort(effects: Vec<Effect>) -> Self {
        let mut sorted = Self::default();
        for effect in effects {
            match effect {
                Effect::Render(_) => {}
                Effect::Channel(request) => {
                    if let ChannelOperation::Emit { frame, .. } = &request.operation {
                        sorted.emitted.push(frame.clone());
                    } else if matches!(request.operation, ChannelOperation::Close { .. }) {
                        sorted.closes += 1;
                    } else {
                        sorted.opens.push(request);
                    }
                }
                Effect::Location(request) => {
                    if matches!(request.operation, LocationOperation::StopWatch { .. }) {
                        sorted.stop_watches += 1;
                    } else if matches!(request.operation, LocationOperation::Watch { .. }) {
                        sorted.watches.push(request);
                    } else {
                        sorted.fixes.push(request);
                    }
                }
                Effect::Store(request) => sorted.store.push(request),
            }
        }
        sorted
    }

    pub fn emitted_events(&self) -> Vec<&str> {
        self.emitted.iter().map(|f| f.event.as_str()).collect()
    }

    pub fn frame(&self, event: &str) -> Option<&Frame> {
        self.emitted.iter().find(|f| f.event == event)
    }
}

fn drain(app: &Tester, model: &mut Model, mut effects: Vec<Effect>, events: Vec<Event>) -> Effects {
    let mut queue: VecDeque<Event> = events.into();
    while let Some(event) = queue.pop_front() {
        let update = app.update(event, model);
        effects.extend(update.effects);
        queue.extend(update.events);
    }
    Effects::sort(effects)
}

pub fn update(app: &Tester, model: &mut Model, event: Event) -> Effects {
    let update = app.update(event, model);
    drain(app, model, update.effects, update.events)
}

/// Answers a shell request and feeds the resulting events back into the app.
pub fn resolve<Op: Operation>(
    app: &Tester,
    model: &mut Model,
    request: &mut Request<Op>,
    output: Op::Output,
) -> Effects {
    let update = app.resolve(request, output).expect("request should resolve");
    drain(app, model, update.effects, update.events)
}

pub fn inbound(event: &str, payload: Value) -> ChannelOutput {
    ChannelOutput::Frame(Frame::new(event, payload))
}

pub fn request_json(id: &str, latitude: f64, longitude: f64) -> Value {
    json!({
        "_id": id,
        "userId": "user-1",
        "location": { "latitude": latitude, "longitude": longitude },
        "emergencyDetails": "fall at home",
        "patientCount": 1,
        "criticalLevel": "high",
        "status": "pending",
        "createdAt": "2024-05-01T10:00:00Z"
    })
}

pub fn saved_presence(presence: Presence) -> StoreOutput {
    StoreOutput::Value(Some(serde_json::to_vec(&presence).expect("presence encodes")))
}

pub struct Session {
    pub channel: Request<ChannelOperation>,
    pub watch: Option<Request<LocationOperation>>,
}

pub fn mount_requester(app: &Tester, model: &mut Model) -> Session {
    update(
        app,
        model,
        Event::ProfileLoaded {
            user_id: "user-1".into(),
            user_type: "user".into(),
            vehicle_id: None,
        },
    );

    let mut mounted = update(app, model, Event::Mount { role: Role::Requester });
    assert!(mounted.store.is_empty(), "requesters have no presence to restore");
    let mut fix = mounted.fixes.pop().expect("position fix requested on mount");
    let mut channel = mounted.opens.pop().expect("channel opened on mount");

    resolve(app, model, &mut fix, LocationOutput::Position(DEVICE));
    resolve(app, model, &mut channel, ChannelOutput::Opened);

    Session {
        channel,
        watch: None,
    }
}

/// Mounts a responder whose device remembers `saved`, then connects.
pub fn mount_responder(app: &Tester, model: &mut Model, saved: Option<Presence>) -> Session {
    update(
        app,
        model,
        Event::ProfileLoaded {
            user_id: "driver-1".into(),
            user_type: "ambulance".into(),
            vehicle_id: Some("AMB-1".into()),
        },
    );

    let mut mounted = update(app, model, Event::Mount { role: Role::Responder });
    let mut fix = mounted.fixes.pop().expect("position fix requested on mount");
    let mut channel = mounted.opens.pop().expect("channel opened on mount");
    let mut restore = mounted.store.pop().expect("saved presence read on mount");

    let stored = saved.map_or(StoreOutput::Value(None), saved_presence);
    let mut restored = resolve(app, model, &mut restore, Ok(stored));
    resolve(app, model, &mut fix, LocationOutput::Position(DEVICE));
    resolve(app, model, &mut channel, ChannelOutput::Opened);

    Session {
        channel,
        watch: restored.watches.pop(),
    }
}
