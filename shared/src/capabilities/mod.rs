mod channel;
mod kv;
mod location;

pub use self::channel::{Channel, ChannelOperation, ChannelOutput, Transport};
pub use self::kv::{
    KeyNamespace, KvKey, Store, StoreError, StoreOperation, StoreOutput, StoreResult, TypedStore,
};
pub use self::location::{Location, LocationOperation, LocationOutput};

pub use crux_core::render::Render;

// The Effect derive refers to the app type by name.
use crate::app::App;
use crate::event::Event;

#[derive(crux_core::macros::Effect)]
pub struct Capabilities {
    pub render: Render<Event>,
    pub channel: Channel<Event>,
    pub location: Location<Event>,
    pub store: Store<Event>,
}
