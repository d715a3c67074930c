use crux_core::capability::{CapabilityContext, Operation};
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::connection::{DialRequest, SessionId};
use crate::model::Role;
use crate::protocol::Frame;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    WebSocket,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ChannelOperation {
    /// Dial after `delay_ms`, giving up on this attempt after `timeout_ms`.
    /// Always a fresh connection; never multiplexed with another session.
    Open {
        session: SessionId,
        role: Role,
        url: String,
        transport: Transport,
        attempt: u32,
        timeout_ms: u64,
        delay_ms: u64,
    },
    Emit {
        session: SessionId,
        frame: Frame,
    },
    Close {
        session: SessionId,
    },
}

impl From<DialRequest> for ChannelOperation {
    fn from(dial: DialRequest) -> Self {
        Self::Open {
            session: dial.session,
            role: dial.role,
            url: dial.url,
            transport: Transport::WebSocket,
            attempt: dial.attempt,
            timeout_ms: dial.timeout_ms,
            delay_ms: dial.delay_ms,
        }
    }
}

/// Lifecycle and traffic of an open channel, streamed back from the shell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ChannelOutput {
    Opened,
    Frame(Frame),
    Dropped { reason: String },
    Closed,
}

impl Operation for ChannelOperation {
    type Output = ChannelOutput;
}

#[derive(crux_core::macros::Capability)]
pub struct Channel<Ev> {
    context: CapabilityContext<ChannelOperation, Ev>,
}

impl<Ev> Channel<Ev>
where
    Ev: 'static,
{
    pub fn new(context: CapabilityContext<ChannelOperation, Ev>) -> Self {
        Self { context }
    }

    /// Dials one attempt and forwards everything the shell reports for it.
    pub fn open<F>(&self, dial: DialRequest, make_event: F)
    where
        F: Fn(SessionId, ChannelOutput) -> Ev + Send + 'static,
    {
        let ctx = self.context.clone();
        let session = dial.session;
        self.context.spawn(async move {
            let mut stream = ctx.stream_from_shell(ChannelOperation::from(dial));
            while let Some(output) = stream.next().await {
                ctx.update_app(make_event(session, output));
            }
        });
    }

    pub fn emit(&self, session: SessionId, frame: Frame) {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            ctx.notify_shell(ChannelOperation::Emit { session, frame })
                .await;
        });
    }

    pub fn close(&self, session: SessionId) {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            ctx.notify_shell(ChannelOperation::Close { session }).await;
        });
    }
}
