use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::SchemaSet;
use crate::value::{Aabbox3, PropValue};

/// Stable arena index of an entity within its world.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("no class named '{0}' in the current schema catalog")]
    MissingClass(String),
}

/// One game object: a class, typed properties keyed by resolved storage
/// offset, and the state stack of its execution model (empty for classes
/// without one).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub class: String,
    props: BTreeMap<u32, PropValue>,
    pub state_stack: Vec<u32>,
}

impl Entity {
    pub fn get(&self, offset: u32) -> Option<&PropValue> {
        self.props.get(&offset)
    }

    pub fn put(&mut self, offset: u32, value: PropValue) {
        self.props.insert(offset, value);
    }

    pub fn props(&self) -> impl Iterator<Item = (u32, &PropValue)> {
        self.props.iter().map(|(offset, value)| (*offset, value))
    }

    pub fn index_at(&self, offset: u32) -> Option<i32> {
        self.get(offset).and_then(PropValue::as_index)
    }

    pub fn enum_at(&self, offset: u32) -> Option<i32> {
        self.get(offset).and_then(PropValue::as_enum)
    }

    pub fn color_at(&self, offset: u32) -> Option<u32> {
        self.get(offset).and_then(PropValue::as_color)
    }

    pub fn entity_ref_at(&self, offset: u32) -> Option<Option<EntityId>> {
        self.get(offset).and_then(PropValue::as_entity_ref)
    }

    pub fn filename_at(&self, offset: u32) -> Option<&str> {
        self.get(offset).and_then(PropValue::as_filename)
    }

    pub fn box3_at(&self, offset: u32) -> Option<&Aabbox3> {
        self.get(offset).and_then(PropValue::as_box3)
    }

    /// Bottom of the state stack, the entity's resting state.
    pub fn resting_state(&self) -> Option<u32> {
        self.state_stack.first().copied()
    }
}

/// An ordered collection of entities, the subject of one conversion pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct World {
    entities: Vec<Entity>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entity ids in arena order. Snapshots the current length, so new
    /// entities appended while iterating are not visited.
    pub fn ids(&self) -> impl Iterator<Item = EntityId> {
        (0..self.entities.len() as u32).map(EntityId)
    }

    pub fn entity(&self, id: EntityId) -> &Entity {
        &self.entities[id.0 as usize]
    }

    pub fn entity_mut(&mut self, id: EntityId) -> &mut Entity {
        &mut self.entities[id.0 as usize]
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter()
    }

    /// Appends a new entity of the given class, with every schema field at
    /// its default value and a rational class resting in its base state.
    pub fn spawn(&mut self, schemas: &SchemaSet, class: &str) -> Result<EntityId, SpawnError> {
        let schema = schemas
            .class(class)
            .ok_or_else(|| SpawnError::MissingClass(class.to_string()))?;

        let id = EntityId(self.entities.len() as u32);
        let mut props = BTreeMap::new();
        for def in schema.props() {
            props.insert(def.offset, PropValue::default_for(def.kind));
        }
        let state_stack = schema.base_state.into_iter().collect();

        self.entities.push(Entity {
            id,
            class: schema.name.to_string(),
            props,
            state_stack,
        });
        Ok(id)
    }

    /// Discards an entity's execution state and restarts it from its
    /// class's base state. Entities without a state machine are left alone.
    pub fn reinitialize(&mut self, schemas: &SchemaSet, id: EntityId) {
        let entity = &mut self.entities[id.0 as usize];
        if let Some(base_state) = schemas.class(&entity.class).and_then(|s| s.base_state) {
            entity.state_stack.clear();
            entity.state_stack.push(base_state);
        }
    }
}
