pub mod schema;
pub mod stream;
pub mod value;
pub mod world;

pub use schema::{ClassSchema, PropertyDef, PropertySlot, SchemaSet};
pub use stream::{
    decode_world, encode_world, DecodeError, DiscardUnknownProps, RawEntity, RawProp, RawWorld,
    UnknownPropSink,
};
pub use value::{Aabbox3, Placement3, PropKind, PropValue, UnknownProp};
pub use world::{Entity, EntityId, SpawnError, World};
