//! Converter for worlds authored in the classic sibling format.
//!
//! Everything here is one synchronous pass over an already-decoded world.
//! The converter instance owns all per-pass state; `reset()` runs before
//! each load and nothing survives between passes.

use std::collections::BTreeSet;

use fusion_world::schema::{prop_id, PropertySlot};
use fusion_world::value::{PropKind, PropValue, UnknownProp};
use fusion_world::{Entity, EntityId, SchemaSet, World};

use crate::rain::{class_of, spawn, RainTracker};
use crate::registry::{ConvertError, Converter, Outcome};
use crate::tables::{remap_key, remap_weapon_mask, GIVE_BASELINE};

/// Door type enum value for key-locked doors.
const DOOR_TYPE_LOCKED: i32 = 2;

/// Storm shade colors matching gray scale in the 64..255 brightness range.
const SHADE_START: u32 = 0xFFFF_FFFF;
const SHADE_STOP: u32 = 0x4040_40FF;

/// The key pickup sound was renumbered; component 300 is the current one.
const KEY_SOUND_COMPONENT: i32 = prop_id(0x325, 300) as i32;

/// Corrective ambient light parameters: strong ambient, whole-map reach,
/// black. Masks a shading artifact on classic brush geometry without being
/// visible itself.
const LIGHT_TYPE_STRONG_AMBIENT: i32 = 2;
const LIGHT_FALL_OFF: f32 = 10000.0;
const LIGHT_COLOR: u32 = 0;

/// States whose numbering is trusted under the current schema, per class.
/// Opaque compatibility constants tied to specific classic builds; never
/// recomputed.
const SAFE_STATES: &[(&str, &[u32])] = &[
    // No classic camera state survived the renumbering; every camera
    // restarts.
    ("Camera", &[]),
    ("Lightning", &[0x025F_0009]),
    ("MovingBrush", &[0x0065_0014]),
    ("SkyShip", &[0x0261_002E]),
    ("StormController", &[0x025E_000C]),
    ("Demon", &[0x014C_013B]),
    ("Siren", &[0x0140_001B]),
];

/// Resting state shared by every class derived from EnemyBase.
const ENEMY_BASE_SAFE_STATE: u32 = 0x0136_0070;

/// The classes `convert_entity` patches, and nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpecialClass {
    AmmoPack,
    PlayerMarker,
    KeyItem,
    DoorController,
    StormController,
}

impl SpecialClass {
    fn of(class: &str) -> Option<Self> {
        match class {
            "AmmoPack" => Some(Self::AmmoPack),
            "PlayerMarker" => Some(Self::PlayerMarker),
            "KeyItem" => Some(Self::KeyItem),
            "DoorController" => Some(Self::DoorController),
            "StormController" => Some(Self::StormController),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct ClassicConverter {
    rain: RainTracker,
    triggers: Vec<EntityId>,
    storms: Vec<EntityId>,

    ammo_fuel: PropertySlot,
    ammo_sniper: PropertySlot,
    marker_give: PropertySlot,
    marker_take: PropertySlot,
    key_type: PropertySlot,
    key_sound: PropertySlot,
    door_type: PropertySlot,
    door_key: PropertySlot,
    shade_start: PropertySlot,
    shade_stop: PropertySlot,
    light_type: PropertySlot,
    light_fall_off: PropertySlot,
    light_color: PropertySlot,
}

impl ClassicConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entities `convert_entity` left alone still get their execution state
    /// vetted: classic state numbering is only trusted where the table says
    /// so, and an entity we cannot vouch for restarts from scratch.
    fn needs_reinit(&self, world: &World, schemas: &SchemaSet, id: EntityId) -> bool {
        let entity = world.entity(id);

        // Spawners replay their whole setup on restart; always safe, never
        // trusted.
        if entity.class == "EnemySpawner" {
            return true;
        }

        let Some(schema) = schemas.class(&entity.class) else {
            return true;
        };
        if !schema.is_rational() {
            return false;
        }

        if let Some((_, safe)) = SAFE_STATES.iter().find(|(class, _)| *class == entity.class) {
            return match entity.resting_state() {
                Some(bottom) => !safe.contains(&bottom),
                None => true,
            };
        }

        if schemas.is_derived(&entity.class, "EnemyBase") {
            return match entity.resting_state() {
                Some(bottom) => bottom != ENEMY_BASE_SAFE_STATE,
                None => true,
            };
        }

        false
    }

    fn convert_ammo_pack(&mut self, world: &mut World, schemas: &SchemaSet, id: EntityId) -> Outcome {
        let schema = class_of(schemas, world, id);

        // Ammo types the classic format never had carry garbage counts.
        if let Some(offset) =
            self.ammo_fuel
                .by_name_or_id(schema, PropKind::Index, "Fuel", prop_id(0x326, 14))
        {
            world.entity_mut(id).put(offset, PropValue::Index(0));
        }
        if let Some(offset) = self.ammo_sniper.by_name_or_id(
            schema,
            PropKind::Index,
            "SniperBullets",
            prop_id(0x326, 17),
        ) {
            world.entity_mut(id).put(offset, PropValue::Index(0));
        }
        Outcome::Handled
    }

    fn convert_player_marker(
        &mut self,
        world: &mut World,
        schemas: &SchemaSet,
        id: EntityId,
    ) -> Outcome {
        let schema = class_of(schemas, world, id);

        let Some(give_offset) = self.marker_give.by_name_or_id(
            schema,
            PropKind::Index,
            "GiveWeapons",
            prop_id(0x194, 3),
        ) else {
            return Outcome::NotApplicable;
        };
        let Some(take_offset) = self.marker_take.by_name_or_id(
            schema,
            PropKind::Index,
            "TakeWeapons",
            prop_id(0x194, 4),
        ) else {
            return Outcome::NotApplicable;
        };

        let give = world.entity(id).index_at(give_offset).unwrap_or(0);
        let take = world.entity(id).index_at(take_offset).unwrap_or(0);

        let entity = world.entity_mut(id);
        entity.put(
            give_offset,
            PropValue::Index(remap_weapon_mask(give, GIVE_BASELINE)),
        );
        entity.put(take_offset, PropValue::Index(remap_weapon_mask(take, 0)));
        Outcome::Handled
    }

    fn convert_key_item(&mut self, world: &mut World, schemas: &SchemaSet, id: EntityId) -> Outcome {
        let schema = class_of(schemas, world, id);

        if let Some(offset) =
            self.key_type
                .by_name_or_id(schema, PropKind::EnumValue, "Type", prop_id(0x325, 1))
        {
            if let Some(raw) = world.entity(id).enum_at(offset) {
                world
                    .entity_mut(id)
                    .put(offset, PropValue::EnumValue(remap_key(raw) as i32));
            }
        }

        // The sound field was renumbered between revisions; reach it by its
        // legacy id or its surviving offset and repoint the component.
        if let Some(offset) =
            self.key_sound
                .by_id_or_offset(schema, PropKind::Index, prop_id(0x325, 3), 0x3B0)
        {
            world
                .entity_mut(id)
                .put(offset, PropValue::Index(KEY_SOUND_COMPONENT));
        }
        Outcome::Handled
    }

    fn convert_door(&mut self, world: &mut World, schemas: &SchemaSet, id: EntityId) -> Outcome {
        let schema = class_of(schemas, world, id);

        let Some(type_offset) =
            self.door_type
                .by_name_or_id(schema, PropKind::EnumValue, "Type", prop_id(0xDD, 8))
        else {
            return Outcome::NotApplicable;
        };

        // Only key-locked doors carry a key ordinal worth remapping.
        if world.entity(id).enum_at(type_offset) != Some(DOOR_TYPE_LOCKED) {
            return Outcome::NotApplicable;
        }

        if let Some(offset) =
            self.door_key
                .by_name_or_id(schema, PropKind::EnumValue, "Key", prop_id(0xDD, 12))
        {
            if let Some(raw) = world.entity(id).enum_at(offset) {
                world
                    .entity_mut(id)
                    .put(offset, PropValue::EnumValue(remap_key(raw) as i32));
            }
        }
        Outcome::Handled
    }

    fn convert_storm(&mut self, world: &mut World, schemas: &SchemaSet, id: EntityId) -> Outcome {
        let schema = class_of(schemas, world, id);

        if let Some(offset) = self.shade_start.by_name_or_id(
            schema,
            PropKind::Color,
            "ShadeStart",
            prop_id(0x25E, 52),
        ) {
            world.entity_mut(id).put(offset, PropValue::Color(SHADE_START));
        }
        if let Some(offset) = self.shade_stop.by_name_or_id(
            schema,
            PropKind::Color,
            "ShadeStop",
            prop_id(0x25E, 53),
        ) {
            world.entity_mut(id).put(offset, PropValue::Color(SHADE_STOP));
        }

        // The storm must restart so its rewritten shade and graph state are
        // picked up by its own startup logic.
        self.storms.push(id);
        Outcome::HandledNeedsReinit
    }

    /// One invisible, maximal-range, zero-intensity ambient light masks a
    /// known shading artifact on classic brush geometry. Independent of the
    /// rest of the pass.
    fn spawn_corrective_light(
        &mut self,
        world: &mut World,
        schemas: &SchemaSet,
    ) -> Result<(), ConvertError> {
        let light = spawn(world, schemas, "Light")?;
        let schema = class_of(schemas, world, light);

        let type_offset =
            self.light_type
                .by_name_or_id(schema, PropKind::EnumValue, "Type", prop_id(0xC8, 8));
        let fall_off_offset = self.light_fall_off.by_name_or_id(
            schema,
            PropKind::Range,
            "FallOff",
            prop_id(0xC8, 1),
        );
        let color_offset =
            self.light_color
                .by_name_or_id(schema, PropKind::Color, "Color", prop_id(0xC8, 2));

        if let (Some(type_offset), Some(fall_off_offset), Some(color_offset)) =
            (type_offset, fall_off_offset, color_offset)
        {
            let entity = world.entity_mut(light);
            entity.put(type_offset, PropValue::EnumValue(LIGHT_TYPE_STRONG_AMBIENT));
            entity.put(fall_off_offset, PropValue::Range(LIGHT_FALL_OFF));
            entity.put(color_offset, PropValue::Color(LIGHT_COLOR));
        }

        log::debug!("corrective ambient light spawned as {light}");
        Ok(())
    }
}

impl Converter for ClassicConverter {
    fn reset(&mut self) {
        self.rain.clear();
        self.triggers.clear();
        self.storms.clear();
    }

    fn on_unknown_prop(&mut self, entity: &Entity, prop: UnknownProp<'_>) {
        // Only the world settings controller ever serialized fields the
        // current schema dropped; everything else is skipped outright.
        if entity.class == "WorldSettingsController" {
            self.rain.remember(entity.id, &prop);
        }
    }

    fn convert_entity(&mut self, world: &mut World, schemas: &SchemaSet, id: EntityId) -> Outcome {
        let Some(special) = SpecialClass::of(&world.entity(id).class) else {
            return Outcome::NotApplicable;
        };
        match special {
            SpecialClass::AmmoPack => self.convert_ammo_pack(world, schemas, id),
            SpecialClass::PlayerMarker => self.convert_player_marker(world, schemas, id),
            SpecialClass::KeyItem => self.convert_key_item(world, schemas, id),
            SpecialClass::DoorController => self.convert_door(world, schemas, id),
            SpecialClass::StormController => self.convert_storm(world, schemas, id),
        }
    }

    fn convert_world(
        &mut self,
        world: &mut World,
        schemas: &SchemaSet,
    ) -> Result<(), ConvertError> {
        let mut reinit: BTreeSet<EntityId> = BTreeSet::new();

        // Snapshot the walk before any entities are synthesized.
        let existing: Vec<EntityId> = world.ids().collect();
        for id in existing {
            if world.entity(id).class == "Trigger" {
                self.triggers.push(id);
            }

            match self.convert_entity(world, schemas, id) {
                Outcome::Handled => continue,
                Outcome::HandledNeedsReinit => {
                    reinit.insert(id);
                    continue;
                }
                Outcome::NotApplicable => {}
            }

            if self.needs_reinit(world, schemas, id) {
                reinit.insert(id);
            }
        }

        // All nodes exist from here on; safe to rewire the graph.
        let Self {
            rain,
            triggers,
            storms,
            ..
        } = self;
        rain.finalize(world, schemas, triggers, storms)?;

        for id in &reinit {
            world.reinitialize(schemas, *id);
        }
        log::info!(
            "classic conversion: {} entities walked, {} reinitialized",
            world.len(),
            reinit.len()
        );

        self.spawn_corrective_light(world, schemas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::{weapon_flag, KeyItem};
    use fusion_world::value::Aabbox3;

    fn setup() -> (SchemaSet, World, ClassicConverter) {
        (SchemaSet::current(), World::new(), ClassicConverter::new())
    }

    fn offset_of(schemas: &SchemaSet, class: &str, kind: PropKind, id: u32) -> u32 {
        schemas
            .class(class)
            .unwrap()
            .find_by_kind_and_id(kind, id)
            .unwrap()
            .offset
    }

    #[test]
    fn ammo_pack_counters_are_zeroed_and_nothing_else_moves() {
        let (schemas, mut world, mut converter) = setup();
        let id = world.spawn(&schemas, "AmmoPack").unwrap();
        let fuel = offset_of(&schemas, "AmmoPack", PropKind::Index, prop_id(0x326, 14));
        let sniper = offset_of(&schemas, "AmmoPack", PropKind::Index, prop_id(0x326, 17));
        world.entity_mut(id).put(fuel, PropValue::Index(5));
        world.entity_mut(id).put(sniper, PropValue::Index(3));

        let outcome = converter.convert_entity(&mut world, &schemas, id);
        assert_eq!(outcome, Outcome::Handled);
        assert_eq!(world.entity(id).index_at(fuel), Some(0));
        assert_eq!(world.entity(id).index_at(sniper), Some(0));
    }

    #[test]
    fn player_marker_masks_are_rebuilt() {
        let (schemas, mut world, mut converter) = setup();
        let id = world.spawn(&schemas, "PlayerMarker").unwrap();
        let give = offset_of(&schemas, "PlayerMarker", PropKind::Index, prop_id(0x194, 3));
        let take = offset_of(&schemas, "PlayerMarker", PropKind::Index, prop_id(0x194, 4));

        // Weapon 1 carries through, weapon 9 carries through, classic 14 is
        // renumbered, classic 10 is dropped.
        let classic_mask =
            weapon_flag(1) | weapon_flag(9) | weapon_flag(14) | weapon_flag(10);
        world.entity_mut(id).put(give, PropValue::Index(classic_mask));
        world.entity_mut(id).put(take, PropValue::Index(weapon_flag(10)));

        let outcome = converter.convert_entity(&mut world, &schemas, id);
        assert_eq!(outcome, Outcome::Handled);
        assert_eq!(
            world.entity(id).index_at(give),
            Some(GIVE_BASELINE | weapon_flag(9) | weapon_flag(12))
        );
        // The dropped placeholder leaves the take mask empty.
        assert_eq!(world.entity(id).index_at(take), Some(0));
    }

    #[test]
    fn key_item_type_and_sound_are_fixed() {
        let (schemas, mut world, mut converter) = setup();
        let id = world.spawn(&schemas, "KeyItem").unwrap();
        let key_type = offset_of(&schemas, "KeyItem", PropKind::EnumValue, prop_id(0x325, 1));
        world.entity_mut(id).put(key_type, PropValue::EnumValue(7));

        let outcome = converter.convert_entity(&mut world, &schemas, id);
        assert_eq!(outcome, Outcome::Handled);
        assert_eq!(
            world.entity(id).enum_at(key_type),
            Some(KeyItem::CrystalSkull as i32)
        );
        assert_eq!(world.entity(id).index_at(0x3B0), Some(KEY_SOUND_COMPONENT));
    }

    #[test]
    fn only_locked_doors_are_touched() {
        let (schemas, mut world, mut converter) = setup();
        let door_type = offset_of(&schemas, "DoorController", PropKind::EnumValue, prop_id(0xDD, 8));
        let door_key = offset_of(&schemas, "DoorController", PropKind::EnumValue, prop_id(0xDD, 12));

        let locked = world.spawn(&schemas, "DoorController").unwrap();
        world
            .entity_mut(locked)
            .put(door_type, PropValue::EnumValue(DOOR_TYPE_LOCKED));
        world.entity_mut(locked).put(door_key, PropValue::EnumValue(3));
        assert_eq!(
            converter.convert_entity(&mut world, &schemas, locked),
            Outcome::Handled
        );
        assert_eq!(
            world.entity(locked).enum_at(door_key),
            Some(KeyItem::KingStatue as i32)
        );

        let unlocked = world.spawn(&schemas, "DoorController").unwrap();
        world.entity_mut(unlocked).put(door_type, PropValue::EnumValue(0));
        world.entity_mut(unlocked).put(door_key, PropValue::EnumValue(3));
        assert_eq!(
            converter.convert_entity(&mut world, &schemas, unlocked),
            Outcome::NotApplicable
        );
        assert_eq!(world.entity(unlocked).enum_at(door_key), Some(3));
    }

    #[test]
    fn storm_is_patched_registered_and_flagged_for_reinit() {
        let (schemas, mut world, mut converter) = setup();
        let id = world.spawn(&schemas, "StormController").unwrap();
        let start = offset_of(&schemas, "StormController", PropKind::Color, prop_id(0x25E, 52));
        let stop = offset_of(&schemas, "StormController", PropKind::Color, prop_id(0x25E, 53));

        let outcome = converter.convert_entity(&mut world, &schemas, id);
        assert_eq!(outcome, Outcome::HandledNeedsReinit);
        assert_eq!(world.entity(id).color_at(start), Some(SHADE_START));
        assert_eq!(world.entity(id).color_at(stop), Some(SHADE_STOP));
        assert_eq!(converter.storms, vec![id]);
    }

    #[test]
    fn unrelated_classes_are_not_applicable_and_untouched() {
        let (schemas, mut world, mut converter) = setup();
        let id = world.spawn(&schemas, "Light").unwrap();
        let before = world.entity(id).clone();

        let outcome = converter.convert_entity(&mut world, &schemas, id);
        assert_eq!(outcome, Outcome::NotApplicable);
        let after = world.entity(id);
        assert_eq!(after.class, before.class);
        assert!(before.props().eq(after.props()));
    }

    #[test]
    fn spawners_always_reinitialize() {
        let (schemas, mut world, converter) = setup();
        let id = world.spawn(&schemas, "EnemySpawner").unwrap();
        assert!(converter.needs_reinit(&world, &schemas, id));
    }

    #[test]
    fn safe_states_are_trusted_and_others_are_not() {
        let (schemas, mut world, converter) = setup();
        let id = world.spawn(&schemas, "Lightning").unwrap();

        world.entity_mut(id).state_stack = vec![0x025F_0009];
        assert!(!converter.needs_reinit(&world, &schemas, id));

        world.entity_mut(id).state_stack = vec![0x025F_0099];
        assert!(converter.needs_reinit(&world, &schemas, id));

        // An empty stack cannot be vouched for.
        world.entity_mut(id).state_stack.clear();
        assert!(converter.needs_reinit(&world, &schemas, id));
    }

    #[test]
    fn cameras_always_reinitialize() {
        let (schemas, mut world, converter) = setup();
        let id = world.spawn(&schemas, "Camera").unwrap();

        // No classic camera state is trusted, not even ones that look like
        // plausible resting states.
        for stack in [vec![0x00DC_000A], vec![0x00DC_000D], vec![0x00DC_0099], vec![]] {
            world.entity_mut(id).state_stack = stack;
            assert!(converter.needs_reinit(&world, &schemas, id));
        }
    }

    #[test]
    fn enemy_base_catch_all_checks_the_resting_state() {
        let (schemas, mut world, converter) = setup();
        let id = world.spawn(&schemas, "Charger").unwrap();

        world.entity_mut(id).state_stack = vec![ENEMY_BASE_SAFE_STATE, 0x0177_0042];
        assert!(!converter.needs_reinit(&world, &schemas, id));

        world.entity_mut(id).state_stack = vec![0x0177_0042];
        assert!(converter.needs_reinit(&world, &schemas, id));
    }

    #[test]
    fn stateless_classes_never_reinitialize() {
        let (schemas, mut world, converter) = setup();
        let id = world.spawn(&schemas, "Light").unwrap();
        assert!(!converter.needs_reinit(&world, &schemas, id));
    }

    #[test]
    fn reset_clears_per_pass_state() {
        let (schemas, mut world, mut converter) = setup();
        let storm = world.spawn(&schemas, "StormController").unwrap();
        let wsc = world.spawn(&schemas, "WorldSettingsController").unwrap();

        converter.convert_entity(&mut world, &schemas, storm);
        let value = PropValue::Box3(Aabbox3::default());
        converter.rain.remember(
            wsc,
            &UnknownProp {
                kind: PropKind::Box3,
                id: prop_id(0x25D, 30),
                value: &value,
            },
        );
        converter.triggers.push(EntityId(7));
        assert!(!converter.storms.is_empty());
        assert!(!converter.rain.is_empty());

        converter.reset();
        assert!(converter.storms.is_empty());
        assert!(converter.triggers.is_empty());
        assert!(converter.rain.is_empty());
    }
}
