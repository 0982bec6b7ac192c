use serde::{Deserialize, Serialize};
use thiserror::Error;

use fusion_world::stream::{FORMAT_CLASSIC, FORMAT_NATIVE, FORMAT_REMASTER};
use fusion_world::world::SpawnError;
use fusion_world::{Entity, EntityId, SchemaSet, UnknownProp, World};

use crate::classic::ClassicConverter;

/// Source formats a world header may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorldFormat {
    /// Already in the current format; nothing to convert.
    Native,
    /// The legacy sibling format this engine migrates at load time.
    Classic,
    /// Recognized tag with no migration support yet.
    Remaster,
}

impl WorldFormat {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            FORMAT_NATIVE => Some(Self::Native),
            FORMAT_CLASSIC => Some(Self::Classic),
            FORMAT_REMASTER => Some(Self::Remaster),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            Self::Native => FORMAT_NATIVE,
            Self::Classic => FORMAT_CLASSIC,
            Self::Remaster => FORMAT_REMASTER,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("no converter registered for world format {0:?}")]
    UnsupportedFormat(WorldFormat),
    #[error("cannot create '{class}' entity during conversion: {source}")]
    Spawn {
        class: &'static str,
        source: SpawnError,
    },
}

/// What one entity needed, as decided by [`Converter::convert_entity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Not one of the classes this converter patches.
    NotApplicable,
    /// Patched in place; its execution state can be trusted.
    Handled,
    /// Patched in place, and must restart from its base state so the patch
    /// is picked up during its own startup logic.
    HandledNeedsReinit,
}

/// Format-specific migration strategy. One instance owns all per-pass state;
/// the orchestrator drives exactly these four operations per world load.
pub trait Converter: std::fmt::Debug {
    /// Clears every piece of per-world transient state. Called before the
    /// stream decode of each load; stale state from a previous pass must
    /// never survive this.
    fn reset(&mut self);

    /// Fed from the decoder's unknown-field channel. May copy values out,
    /// must not touch decode state.
    fn on_unknown_prop(&mut self, entity: &Entity, prop: UnknownProp<'_>);

    /// One-shot classification and in-place patch of a single entity.
    fn convert_entity(&mut self, world: &mut World, schemas: &SchemaSet, id: EntityId) -> Outcome;

    /// Full-world pass: entity walk, graph rewrite, reinitialization, and
    /// the final corrective step.
    fn convert_world(&mut self, world: &mut World, schemas: &SchemaSet)
        -> Result<(), ConvertError>;
}

/// Selects the one active converter for a detected source format.
///
/// A native world needs none and gets `Ok(None)` silently; a known tag
/// without a registered converter is a configuration error and is flagged
/// loudly.
pub fn converter_for(format: WorldFormat) -> Result<Option<Box<dyn Converter>>, ConvertError> {
    match format {
        WorldFormat::Native => Ok(None),
        WorldFormat::Classic => Ok(Some(Box::new(ClassicConverter::new()))),
        WorldFormat::Remaster => {
            log::error!("no converter registered for world format {format:?}");
            Err(ConvertError::UnsupportedFormat(format))
        }
    }
}
