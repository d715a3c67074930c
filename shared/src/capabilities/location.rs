use crux_core::capability::{CapabilityContext, Operation};
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::geo::LatLon;
use crate::location::{SamplingPolicy, WatchId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum LocationOperation {
    /// Stream positions no more often than `interval_ms`, and only after moving
    /// at least `min_distance_m`.
    Watch {
        watch: WatchId,
        interval_ms: u64,
        min_distance_m: f64,
    },
    StopWatch {
        watch: WatchId,
    },
    CurrentPosition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum LocationOutput {
    Position(LatLon),
    PermissionDenied,
    Unavailable { reason: String },
}

impl Operation for LocationOperation {
    type Output = LocationOutput;
}

#[derive(crux_core::macros::Capability)]
pub struct Location<Ev> {
    context: CapabilityContext<LocationOperation, Ev>,
}

impl<Ev> Location<Ev>
where
    Ev: 'static,
{
    pub fn new(context: CapabilityContext<LocationOperation, Ev>) -> Self {
        Self { context }
    }

    pub fn watch<F>(&self, watch: WatchId, policy: SamplingPolicy, make_event: F)
    where
        F: Fn(WatchId, LocationOutput) -> Ev + Send + 'static,
    {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            let mut samples = ctx.stream_from_shell(LocationOperation::Watch {
                watch,
                interval_ms: policy.interval_ms,
                min_distance_m: policy.min_distance_m,
            });
            while let Some(output) = samples.next().await {
                ctx.update_app(make_event(watch, output));
            }
        });
    }

    pub fn stop_watch(&self, watch: WatchId) {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            ctx.notify_shell(LocationOperation::StopWatch { watch }).await;
        });
    }

    pub fn current_position<F>(&self, make_event: F)
    where
        F: FnOnce(LocationOutput) -> Ev + Send + 'static,
    {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            let output = ctx
                .request_from_shell(LocationOperation::CurrentPosition)
                .await;
            ctx.update_app(make_event(output));
        });
    }
}
