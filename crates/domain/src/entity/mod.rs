mod entity;
mod entity_id;

pub use entity::{
    ATTR_DEVICE_CLASS, ATTR_FRIENDLY_NAME, ATTR_UNIT_OF_MEASUREMENT, Entity, STATE_OFF, STATE_ON,
    STATE_UNAVAILABLE, STATE_UNKNOWN,
};
pub use entity_id::EntityId;
