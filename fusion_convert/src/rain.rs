//! Deferred rain state and the effect-graph rewrite.
//!
//! The classic format stored rain parameters directly on each world settings
//! controller; the current schema moved them onto a dedicated holder entity
//! that controllers point at. The fields therefore arrive through the
//! unknown-field channel during decode and are replayed here once the whole
//! world is known: one holder per controller, chained together, with every
//! controller pointing at the chain head. Triggers that fired a storm
//! controller directly are then respliced through a bridging trigger so the
//! storm and the rain holder start together.

use fusion_world::schema::{
    prop_id, trigger_event_name, trigger_target_name, ClassSchema, PropertySlot, TRIGGER_SLOTS,
};
use fusion_world::value::{Aabbox3, PropKind, PropValue, UnknownProp};
use fusion_world::{EntityId, SchemaSet, World};

use crate::registry::ConvertError;

/// Event codes a trigger slot can fire.
pub const EVENT_START: i32 = 0;
pub const EVENT_TRIGGER: i32 = 2;
/// Classic-only code; the nearest current equivalent is [`EVENT_START`].
pub const EVENT_ENVIRONMENT_START: i32 = 6;

/// Holder type enum value for rain particles.
const HOLDER_TYPE_RAIN: i32 = 2;

/// Average duration for the rain to fade in and out.
const RAIN_APPEAR_LEN: f32 = 3.0;

/// Legacy field indices on the classic world settings controller.
const LEGACY_HEIGHT_MAP_INDEX: u32 = 28;
const LEGACY_HEIGHT_MAP_BOX_INDEX: u32 = 30;

/// Rain parameters remembered for one controller, merged across sightings.
#[derive(Debug, Clone)]
struct RainRecord {
    owner: EntityId,
    height_map: Option<String>,
    bounds: Option<Aabbox3>,
}

/// Collects rain records during decode and performs the graph rewrite once
/// the world walk is complete.
#[derive(Debug, Default)]
pub struct RainTracker {
    records: Vec<RainRecord>,

    holder_height: PropertySlot,
    holder_box: PropertySlot,
    holder_type: PropertySlot,
    holder_appear: PropertySlot,
    holder_next: PropertySlot,
    controller_env: PropertySlot,
    slot_targets: [PropertySlot; TRIGGER_SLOTS],
    slot_events: [PropertySlot; TRIGGER_SLOTS],
}

impl RainTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Folds one unknown-field sighting into the owner's record. Values are
    /// copied out; the view does not outlive this call.
    pub fn remember(&mut self, owner: EntityId, prop: &UnknownProp<'_>) {
        let record = match self.records.iter_mut().find(|record| record.owner == owner) {
            Some(record) => record,
            None => {
                self.records.push(RainRecord {
                    owner,
                    height_map: None,
                    bounds: None,
                });
                self.records.last_mut().expect("just pushed")
            }
        };

        if prop.kind == PropKind::Filename && prop.field_index() == LEGACY_HEIGHT_MAP_INDEX {
            record.height_map = prop.as_filename().map(str::to_string);
        } else if prop.kind == PropKind::Box3 && prop.field_index() == LEGACY_HEIGHT_MAP_BOX_INDEX {
            record.bounds = prop.as_box3().copied();
        }
    }

    /// Synthesizes the holder chain and resplices storm triggers. Consumes
    /// the collected records.
    pub fn finalize(
        &mut self,
        world: &mut World,
        schemas: &SchemaSet,
        triggers: &[EntityId],
        storms: &[EntityId],
    ) -> Result<(), ConvertError> {
        let mut head: Option<EntityId> = None;
        let mut tail: Option<EntityId> = None;

        let records = std::mem::take(&mut self.records);
        for record in &records {
            let holder = spawn(world, schemas, "EnvironmentParticlesHolder")?;
            let schema = class_of(schemas, world, holder);

            if let Some(offset) = self.holder_height.by_name_or_id(
                schema,
                PropKind::Filename,
                "HeightMap",
                prop_id(0x2BF, 1),
            ) {
                let path = record.height_map.clone().unwrap_or_default();
                world.entity_mut(holder).put(offset, PropValue::Filename(path));
            }
            if let Some(offset) = self.holder_box.by_name_or_id(
                schema,
                PropKind::Box3,
                "HeightMapBox",
                prop_id(0x2BF, 2),
            ) {
                let bounds = record.bounds.unwrap_or_default();
                world.entity_mut(holder).put(offset, PropValue::Box3(bounds));
            }
            if let Some(offset) =
                self.holder_type
                    .by_name_or_id(schema, PropKind::EnumValue, "Type", prop_id(0x2BF, 3))
            {
                world
                    .entity_mut(holder)
                    .put(offset, PropValue::EnumValue(HOLDER_TYPE_RAIN));
            }
            if let Some(offset) = self.holder_appear.by_name_or_id(
                schema,
                PropKind::Float,
                "RainAppearLen",
                prop_id(0x2BF, 4),
            ) {
                world
                    .entity_mut(holder)
                    .put(offset, PropValue::Float(RAIN_APPEAR_LEN));
            }

            if head.is_none() {
                head = Some(holder);
            }
            if let Some(next_offset) = self.holder_next.by_name_or_id(
                schema,
                PropKind::EntityRef,
                "NextHolder",
                prop_id(0x2BF, 5),
            ) {
                if let Some(previous) = tail {
                    world
                        .entity_mut(previous)
                        .put(next_offset, PropValue::EntityRef(Some(holder)));
                }
            }
            tail = Some(holder);

            // Every controller points at the head of the one chain, not at
            // its own holder.
            let controller_schema = class_of(schemas, world, record.owner);
            if let Some(offset) = self.controller_env.by_name_or_id(
                controller_schema,
                PropKind::EntityRef,
                "EnvHolder",
                prop_id(0x25D, 40),
            ) {
                world
                    .entity_mut(record.owner)
                    .put(offset, PropValue::EntityRef(head));
            }
        }

        let Some(head) = head else {
            // No rain in this world; nothing to splice.
            return Ok(());
        };

        for &trigger_id in triggers {
            self.splice_trigger(world, schemas, trigger_id, storms, head)?;
        }

        log::info!(
            "rain rewrite: {} holder(s) chained, {} trigger(s) inspected",
            records.len(),
            triggers.len(),
        );
        Ok(())
    }

    /// Repoints any slot of `trigger_id` that targets a storm controller at
    /// a freshly synthesized bridging trigger.
    fn splice_trigger(
        &mut self,
        world: &mut World,
        schemas: &SchemaSet,
        trigger_id: EntityId,
        storms: &[EntityId],
        chain_head: EntityId,
    ) -> Result<(), ConvertError> {
        for slot in 0..TRIGGER_SLOTS {
            let schema = class_of(schemas, world, trigger_id);
            let Some(target_offset) = self.slot_targets[slot].by_name_or_id(
                schema,
                PropKind::EntityRef,
                trigger_target_name(slot),
                prop_id(0xCD, 3 + slot as u32),
            ) else {
                continue;
            };
            let Some(event_offset) = self.slot_events[slot].by_name_or_id(
                schema,
                PropKind::Index,
                trigger_event_name(slot),
                prop_id(0xCD, 13 + slot as u32),
            ) else {
                continue;
            };

            let Some(Some(target)) = world.entity(trigger_id).entity_ref_at(target_offset) else {
                continue;
            };
            if !storms.contains(&target) {
                continue;
            }
            let Some(event) = world.entity(trigger_id).index_at(event_offset) else {
                continue;
            };

            let bridge = spawn(world, schemas, "Trigger")?;
            let bridge_schema = class_of(schemas, world, bridge);

            // First slot fires the storm with the original event, second
            // starts the rain chain; the classic environment-start code has
            // no current equivalent and becomes a plain start.
            let storm_event = event;
            let rain_event = if event == EVENT_ENVIRONMENT_START {
                EVENT_START
            } else {
                event
            };

            if let Some(offset) = self.slot_targets[0].by_name_or_id(
                bridge_schema,
                PropKind::EntityRef,
                trigger_target_name(0),
                prop_id(0xCD, 3),
            ) {
                world
                    .entity_mut(bridge)
                    .put(offset, PropValue::EntityRef(Some(target)));
            }
            if let Some(offset) = self.slot_targets[1].by_name_or_id(
                bridge_schema,
                PropKind::EntityRef,
                trigger_target_name(1),
                prop_id(0xCD, 4),
            ) {
                world
                    .entity_mut(bridge)
                    .put(offset, PropValue::EntityRef(Some(chain_head)));
            }
            if let Some(offset) = self.slot_events[0].by_name_or_id(
                bridge_schema,
                PropKind::Index,
                trigger_event_name(0),
                prop_id(0xCD, 13),
            ) {
                world
                    .entity_mut(bridge)
                    .put(offset, PropValue::Index(storm_event));
            }
            if let Some(offset) = self.slot_events[1].by_name_or_id(
                bridge_schema,
                PropKind::Index,
                trigger_event_name(1),
                prop_id(0xCD, 14),
            ) {
                world
                    .entity_mut(bridge)
                    .put(offset, PropValue::Index(rain_event));
            }

            world
                .entity_mut(trigger_id)
                .put(target_offset, PropValue::EntityRef(Some(bridge)));
            world
                .entity_mut(trigger_id)
                .put(event_offset, PropValue::Index(EVENT_TRIGGER));
        }
        Ok(())
    }
}

pub(crate) fn spawn(
    world: &mut World,
    schemas: &SchemaSet,
    class: &'static str,
) -> Result<EntityId, ConvertError> {
    world
        .spawn(schemas, class)
        .map_err(|source| ConvertError::Spawn { class, source })
}

pub(crate) fn class_of<'a>(schemas: &'a SchemaSet, world: &World, id: EntityId) -> &'a ClassSchema {
    schemas
        .class(&world.entity(id).class)
        .expect("entity classes always come from the catalog")
}
