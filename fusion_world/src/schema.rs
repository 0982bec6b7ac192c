use std::collections::BTreeMap;

use crate::value::PropKind;

/// One field of a class schema: where a typed, numbered property lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyDef {
    pub name: &'static str,
    pub kind: PropKind,
    pub id: u32,
    pub offset: u32,
}

/// In-memory layout of one entity class under the current runtime.
#[derive(Debug, Clone)]
pub struct ClassSchema {
    pub name: &'static str,
    pub class_id: u32,
    pub base: Option<&'static str>,
    pub base_state: Option<u32>,
    props: Vec<PropertyDef>,
    next_offset: u32,
}

const FIRST_PROP_OFFSET: u32 = 0x10;
const PROP_STRIDE: u32 = 0x8;

impl ClassSchema {
    pub fn new(name: &'static str, class_id: u32) -> Self {
        Self {
            name,
            class_id,
            base: None,
            base_state: None,
            props: Vec::new(),
            next_offset: FIRST_PROP_OFFSET,
        }
    }

    pub fn derives(mut self, base: &'static str) -> Self {
        self.base = Some(base);
        self
    }

    /// Marks the class as rational: it runs a state machine whose resting
    /// state is `base_state`.
    pub fn rational(mut self, base_state: u32) -> Self {
        self.base_state = Some(base_state);
        self
    }

    pub fn is_rational(&self) -> bool {
        self.base_state.is_some()
    }

    pub fn prop(mut self, name: &'static str, kind: PropKind, id: u32) -> Self {
        let offset = self.next_offset;
        self.next_offset += PROP_STRIDE;
        self.props.push(PropertyDef {
            name,
            kind,
            id,
            offset,
        });
        self
    }

    /// Adds a field pinned to a legacy storage offset instead of the next
    /// free slot. Used for fields that moved between schema revisions and
    /// are still addressed by offset in old content.
    pub fn prop_at(mut self, name: &'static str, kind: PropKind, id: u32, offset: u32) -> Self {
        self.props.push(PropertyDef {
            name,
            kind,
            id,
            offset,
        });
        self
    }

    pub fn props(&self) -> &[PropertyDef] {
        &self.props
    }

    pub fn find_by_kind_and_id(&self, kind: PropKind, id: u32) -> Option<&PropertyDef> {
        self.props
            .iter()
            .find(|def| def.kind == kind && def.id == id)
    }
}

/// The current runtime's catalog of entity classes.
#[derive(Debug, Clone, Default)]
pub struct SchemaSet {
    classes: BTreeMap<&'static str, ClassSchema>,
}

impl SchemaSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, schema: ClassSchema) {
        self.classes.insert(schema.name, schema);
    }

    pub fn class(&self, name: &str) -> Option<&ClassSchema> {
        self.classes.get(name)
    }

    /// Walks the base chain; a class derives from itself.
    pub fn is_derived(&self, class: &str, ancestor: &str) -> bool {
        let mut current = Some(class);
        while let Some(name) = current {
            if name == ancestor {
                return true;
            }
            current = self.class(name).and_then(|schema| schema.base);
        }
        false
    }

    /// The fixed class catalog of the current runtime.
    pub fn current() -> Self {
        let mut set = SchemaSet::new();

        set.insert(
            ClassSchema::new("Light", 0xC8)
                .prop("Type", PropKind::EnumValue, prop_id(0xC8, 8))
                .prop("FallOff", PropKind::Range, prop_id(0xC8, 1))
                .prop("Color", PropKind::Color, prop_id(0xC8, 2)),
        );

        let mut trigger = ClassSchema::new("Trigger", 0xCD).rational(0x00CD_0001);
        for slot in 0..10u32 {
            trigger = trigger.prop(TRIGGER_TARGET_NAMES[slot as usize], PropKind::EntityRef, prop_id(0xCD, 3 + slot));
        }
        for slot in 0..10u32 {
            trigger = trigger.prop(TRIGGER_EVENT_NAMES[slot as usize], PropKind::Index, prop_id(0xCD, 13 + slot));
        }
        set.insert(trigger);

        set.insert(
            ClassSchema::new("DoorController", 0xDD)
                .rational(0x00DD_0001)
                .prop("Type", PropKind::EnumValue, prop_id(0xDD, 8))
                .prop("Key", PropKind::EnumValue, prop_id(0xDD, 12)),
        );

        set.insert(
            ClassSchema::new("PlayerMarker", 0x194)
                .prop("GiveWeapons", PropKind::Index, prop_id(0x194, 3))
                .prop("TakeWeapons", PropKind::Index, prop_id(0x194, 4)),
        );

        // The sound component slot kept its 0x3B0 offset when it was
        // renumbered, so legacy content still reaches it by offset.
        set.insert(
            ClassSchema::new("KeyItem", 0x325)
                .prop("Type", PropKind::EnumValue, prop_id(0x325, 1))
                .prop_at("Sound", PropKind::Index, prop_id(0x325, 90), 0x3B0),
        );

        set.insert(
            ClassSchema::new("AmmoPack", 0x326)
                .prop("Fuel", PropKind::Index, prop_id(0x326, 14))
                .prop("SniperBullets", PropKind::Index, prop_id(0x326, 17)),
        );

        set.insert(
            ClassSchema::new("StormController", 0x25E)
                .rational(0x025E_0001)
                .prop("ShadeStart", PropKind::Color, prop_id(0x25E, 52))
                .prop("ShadeStop", PropKind::Color, prop_id(0x25E, 53)),
        );

        set.insert(
            ClassSchema::new("WorldSettingsController", 0x25D)
                .prop("EnvHolder", PropKind::EntityRef, prop_id(0x25D, 40)),
        );

        set.insert(
            ClassSchema::new("EnvironmentParticlesHolder", 0x2BF)
                .prop("HeightMap", PropKind::Filename, prop_id(0x2BF, 1))
                .prop("HeightMapBox", PropKind::Box3, prop_id(0x2BF, 2))
                .prop("Type", PropKind::EnumValue, prop_id(0x2BF, 3))
                .prop("RainAppearLen", PropKind::Float, prop_id(0x2BF, 4))
                .prop("NextHolder", PropKind::EntityRef, prop_id(0x2BF, 5)),
        );

        set.insert(ClassSchema::new("EnemySpawner", 0x130).rational(0x0130_0001));
        set.insert(ClassSchema::new("Camera", 0xDC).rational(0x00DC_0001));
        set.insert(ClassSchema::new("Lightning", 0x25F).rational(0x025F_0001));
        set.insert(ClassSchema::new("MovingBrush", 0x65).rational(0x0065_0001));
        set.insert(ClassSchema::new("SkyShip", 0x261).rational(0x0261_0001));

        set.insert(ClassSchema::new("EnemyBase", 0x136).rational(0x0136_0001));
        set.insert(
            ClassSchema::new("Demon", 0x14C)
                .derives("EnemyBase")
                .rational(0x014C_0001),
        );
        set.insert(
            ClassSchema::new("Siren", 0x140)
                .derives("EnemyBase")
                .rational(0x0140_0001),
        );
        set.insert(
            ClassSchema::new("Charger", 0x177)
                .derives("EnemyBase")
                .rational(0x0177_0001),
        );

        set
    }
}

/// Property ids pack the class tag in the high bytes and the per-class field
/// index in the low byte.
pub const fn prop_id(class_tag: u32, index: u32) -> u32 {
    (class_tag << 8) + index
}

pub const TRIGGER_SLOTS: usize = 10;

const TRIGGER_TARGET_NAMES: [&str; TRIGGER_SLOTS] = [
    "Target1", "Target2", "Target3", "Target4", "Target5", "Target6", "Target7", "Target8",
    "Target9", "Target10",
];

const TRIGGER_EVENT_NAMES: [&str; TRIGGER_SLOTS] = [
    "Event1", "Event2", "Event3", "Event4", "Event5", "Event6", "Event7", "Event8", "Event9",
    "Event10",
];

pub fn trigger_target_name(slot: usize) -> &'static str {
    TRIGGER_TARGET_NAMES[slot]
}

pub fn trigger_event_name(slot: usize) -> &'static str {
    TRIGGER_EVENT_NAMES[slot]
}

/// Per-call-site cached resolution of a field to its storage offset.
///
/// A miss is cached just like a hit; resolution reruns only when the slot is
/// asked about a different class than last time.
#[derive(Debug, Clone, Copy, Default)]
pub struct PropertySlot {
    cached: Option<CachedLookup>,
}

#[derive(Debug, Clone, Copy)]
struct CachedLookup {
    class_id: u32,
    offset: Option<u32>,
}

impl PropertySlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves by symbolic name, falling back to the numeric id carried by
    /// legacy content.
    pub fn by_name_or_id(
        &mut self,
        schema: &ClassSchema,
        kind: PropKind,
        name: &str,
        id: u32,
    ) -> Option<u32> {
        self.resolve(schema, |def| {
            def.kind == kind && (def.name == name || def.id == id)
        })
    }

    /// Resolves by the legacy numeric id, falling back to the current
    /// storage offset for fields that were renumbered in place.
    pub fn by_id_or_offset(
        &mut self,
        schema: &ClassSchema,
        kind: PropKind,
        id: u32,
        offset: u32,
    ) -> Option<u32> {
        self.resolve(schema, |def| {
            def.kind == kind && (def.id == id || def.offset == offset)
        })
    }

    fn resolve<F>(&mut self, schema: &ClassSchema, matches: F) -> Option<u32>
    where
        F: Fn(&PropertyDef) -> bool,
    {
        if let Some(cached) = self.cached {
            if cached.class_id == schema.class_id {
                return cached.offset;
            }
        }
        let offset = schema.props().iter().find(|def| matches(def)).map(|def| def.offset);
        self.cached = Some(CachedLookup {
            class_id: schema.class_id,
            offset,
        });
        offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_contains_the_conversion_classes() {
        let schemas = SchemaSet::current();
        for class in [
            "Light",
            "Trigger",
            "DoorController",
            "PlayerMarker",
            "KeyItem",
            "AmmoPack",
            "StormController",
            "WorldSettingsController",
            "EnvironmentParticlesHolder",
            "EnemySpawner",
        ] {
            assert!(schemas.class(class).is_some(), "missing class {class}");
        }
    }

    #[test]
    fn derivation_walks_the_base_chain() {
        let schemas = SchemaSet::current();
        assert!(schemas.is_derived("Demon", "EnemyBase"));
        assert!(schemas.is_derived("EnemyBase", "EnemyBase"));
        assert!(!schemas.is_derived("Camera", "EnemyBase"));
        assert!(!schemas.is_derived("NoSuchClass", "EnemyBase"));
    }

    #[test]
    fn slot_resolves_by_name_or_legacy_id() {
        let schemas = SchemaSet::current();
        let marker = schemas.class("PlayerMarker").unwrap();
        let mut slot = PropertySlot::new();

        let by_name = slot.by_name_or_id(marker, PropKind::Index, "GiveWeapons", 0);
        assert!(by_name.is_some());

        let mut slot = PropertySlot::new();
        let by_id = slot.by_name_or_id(marker, PropKind::Index, "NoSuchName", prop_id(0x194, 3));
        assert_eq!(by_id, by_name);
    }

    #[test]
    fn slot_resolves_moved_field_by_offset() {
        let schemas = SchemaSet::current();
        let key_item = schemas.class("KeyItem").unwrap();
        let mut slot = PropertySlot::new();

        // Legacy id 0x32503 is gone; the field is still at offset 0x3B0.
        let offset = slot.by_id_or_offset(key_item, PropKind::Index, prop_id(0x325, 3), 0x3B0);
        assert_eq!(offset, Some(0x3B0));
    }

    #[test]
    fn slot_caches_misses_per_class() {
        let schemas = SchemaSet::current();
        let marker = schemas.class("PlayerMarker").unwrap();
        let storm = schemas.class("StormController").unwrap();
        let mut slot = PropertySlot::new();

        assert!(slot
            .by_name_or_id(marker, PropKind::Color, "ShadeStart", prop_id(0x25E, 52))
            .is_none());
        // Same slot, different class: must re-resolve, not reuse the miss.
        assert!(slot
            .by_name_or_id(storm, PropKind::Color, "ShadeStart", prop_id(0x25E, 52))
            .is_some());
    }

    #[test]
    fn kind_mismatch_does_not_resolve() {
        let schemas = SchemaSet::current();
        let marker = schemas.class("PlayerMarker").unwrap();
        let mut slot = PropertySlot::new();
        assert!(slot
            .by_name_or_id(marker, PropKind::Color, "GiveWeapons", prop_id(0x194, 3))
            .is_none());
    }
}
