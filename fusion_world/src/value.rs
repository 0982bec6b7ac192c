use std::convert::TryFrom;

use serde::{Deserialize, Serialize};

use crate::world::EntityId;

/// Wire types a serialized entity property can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum PropKind {
    Bool = 1,
    Index = 2,
    Float = 3,
    Range = 4,
    Color = 5,
    EnumValue = 6,
    String = 7,
    Filename = 8,
    EntityRef = 9,
    Placement = 10,
    Box3 = 11,
}

impl TryFrom<u32> for PropKind {
    type Error = ();

    fn try_from(value: u32) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Bool),
            2 => Ok(Self::Index),
            3 => Ok(Self::Float),
            4 => Ok(Self::Range),
            5 => Ok(Self::Color),
            6 => Ok(Self::EnumValue),
            7 => Ok(Self::String),
            8 => Ok(Self::Filename),
            9 => Ok(Self::EntityRef),
            10 => Ok(Self::Placement),
            11 => Ok(Self::Box3),
            _ => Err(()),
        }
    }
}

/// Position and rotation triples, in world units and degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Placement3 {
    pub position: [f32; 3],
    pub rotation: [f32; 3],
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Aabbox3 {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

/// One decoded property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropValue {
    Bool(bool),
    Index(i32),
    Float(f32),
    Range(f32),
    Color(u32),
    EnumValue(i32),
    String(String),
    Filename(String),
    EntityRef(Option<EntityId>),
    Placement(Placement3),
    Box3(Aabbox3),
}

impl PropValue {
    pub fn kind(&self) -> PropKind {
        match self {
            PropValue::Bool(_) => PropKind::Bool,
            PropValue::Index(_) => PropKind::Index,
            PropValue::Float(_) => PropKind::Float,
            PropValue::Range(_) => PropKind::Range,
            PropValue::Color(_) => PropKind::Color,
            PropValue::EnumValue(_) => PropKind::EnumValue,
            PropValue::String(_) => PropKind::String,
            PropValue::Filename(_) => PropKind::Filename,
            PropValue::EntityRef(_) => PropKind::EntityRef,
            PropValue::Placement(_) => PropKind::Placement,
            PropValue::Box3(_) => PropKind::Box3,
        }
    }

    /// Default contents for a freshly spawned field of the given kind.
    pub fn default_for(kind: PropKind) -> PropValue {
        match kind {
            PropKind::Bool => PropValue::Bool(false),
            PropKind::Index => PropValue::Index(0),
            PropKind::Float => PropValue::Float(0.0),
            PropKind::Range => PropValue::Range(0.0),
            PropKind::Color => PropValue::Color(0),
            PropKind::EnumValue => PropValue::EnumValue(0),
            PropKind::String => PropValue::String(String::new()),
            PropKind::Filename => PropValue::Filename(String::new()),
            PropKind::EntityRef => PropValue::EntityRef(None),
            PropKind::Placement => PropValue::Placement(Placement3::default()),
            PropKind::Box3 => PropValue::Box3(Aabbox3::default()),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_index(&self) -> Option<i32> {
        match self {
            PropValue::Index(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            PropValue::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_range(&self) -> Option<f32> {
        match self {
            PropValue::Range(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_color(&self) -> Option<u32> {
        match self {
            PropValue::Color(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<i32> {
        match self {
            PropValue::EnumValue(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropValue::String(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_filename(&self) -> Option<&str> {
        match self {
            PropValue::Filename(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_entity_ref(&self) -> Option<Option<EntityId>> {
        match self {
            PropValue::EntityRef(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_placement(&self) -> Option<&Placement3> {
        match self {
            PropValue::Placement(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_box3(&self) -> Option<&Aabbox3> {
        match self {
            PropValue::Box3(value) => Some(value),
            _ => None,
        }
    }
}

/// View of a serialized property the current schema has no field for.
///
/// Valid only for the duration of the hook call that receives it; copy the
/// value out if it needs to outlive the decode step.
#[derive(Debug, Clone, Copy)]
pub struct UnknownProp<'a> {
    pub kind: PropKind,
    pub id: u32,
    pub value: &'a PropValue,
}

impl<'a> UnknownProp<'a> {
    /// Low byte of the property id, the per-class field index.
    pub fn field_index(&self) -> u32 {
        self.id & 0xFF
    }

    pub fn as_filename(&self) -> Option<&'a str> {
        match self.value {
            PropValue::Filename(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_box3(&self) -> Option<&'a Aabbox3> {
        match self.value {
            PropValue::Box3(value) => Some(value),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_u32() {
        for kind in [
            PropKind::Bool,
            PropKind::Index,
            PropKind::Float,
            PropKind::Range,
            PropKind::Color,
            PropKind::EnumValue,
            PropKind::String,
            PropKind::Filename,
            PropKind::EntityRef,
            PropKind::Placement,
            PropKind::Box3,
        ] {
            assert_eq!(PropKind::try_from(kind as u32), Ok(kind));
        }
        assert!(PropKind::try_from(0).is_err());
        assert!(PropKind::try_from(99).is_err());
    }

    #[test]
    fn accessors_reject_mismatched_kinds() {
        let value = PropValue::Index(42);
        assert_eq!(value.as_index(), Some(42));
        assert_eq!(value.as_color(), None);
        assert_eq!(value.as_filename(), None);

        let value = PropValue::Filename("Textures/HeightMap.tex".into());
        assert_eq!(value.as_filename(), Some("Textures/HeightMap.tex"));
        assert_eq!(value.as_index(), None);
    }

    #[test]
    fn default_values_match_their_kind() {
        for kind in [PropKind::Bool, PropKind::Color, PropKind::EntityRef, PropKind::Box3] {
            assert_eq!(PropValue::default_for(kind).kind(), kind);
        }
    }
}
