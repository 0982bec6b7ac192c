//! Binary world container.
//!
//! A world file is a fixed header followed by one record per entity. Each
//! property record carries its wire kind and numeric id, so a stream written
//! against an older schema still decodes field-by-field: anything the
//! current schema has a matching field for lands at its resolved offset, and
//! everything else is offered to the [`UnknownPropSink`] before being
//! skipped. An unknown field is never a decode failure.

use std::convert::TryFrom;
use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

use crate::schema::SchemaSet;
use crate::value::{Aabbox3, Placement3, PropKind, PropValue, UnknownProp};
use crate::world::{Entity, EntityId, World};

/// Bytes that prefix every world file.
pub const WORLD_MAGIC: [u8; 4] = *b"FWLD";

/// Container revision understood by this crate.
pub const WORLD_VERSION: u16 = 1;

/// Source-format tags carried in the header.
pub const FORMAT_NATIVE: u8 = 0;
pub const FORMAT_CLASSIC: u8 = 1;
pub const FORMAT_REMASTER: u8 = 2;

const ENTITY_REF_NONE: u32 = 0xFFFF_FFFF;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("world stream truncated: {0}")]
    Io(#[from] std::io::Error),
    #[error("world stream missing FWLD magic")]
    BadMagic,
    #[error("unsupported world container version {0}")]
    UnsupportedVersion(u16),
    #[error("world stream names unknown entity class '{0}'")]
    UnknownClass(String),
    #[error("world stream carries unknown property kind tag {0}")]
    UnknownPropKind(u32),
    #[error("world stream carries malformed text: {0}")]
    BadText(#[from] std::string::FromUtf8Error),
}

/// Hook invoked for every serialized property the current schema cannot
/// place. The hook may read the value but not the decode state; the value is
/// discarded as soon as the hook returns.
pub trait UnknownPropSink {
    fn unknown_prop(&mut self, entity: &Entity, prop: UnknownProp<'_>);
}

/// Sink for natively-formatted worlds: unknown fields are dropped silently.
#[derive(Debug, Default)]
pub struct DiscardUnknownProps;

impl UnknownPropSink for DiscardUnknownProps {
    fn unknown_prop(&mut self, _entity: &Entity, _prop: UnknownProp<'_>) {}
}

/// Encode-side model: one entity as it sits in a serialized stream, before
/// any schema resolution.
#[derive(Debug, Clone)]
pub struct RawEntity {
    pub class: String,
    pub state_stack: Vec<u32>,
    pub props: Vec<RawProp>,
}

#[derive(Debug, Clone)]
pub struct RawProp {
    pub id: u32,
    pub value: PropValue,
}

#[derive(Debug, Clone)]
pub struct RawWorld {
    pub format: u8,
    pub entities: Vec<RawEntity>,
}

impl RawWorld {
    pub fn new(format: u8) -> Self {
        Self {
            format,
            entities: Vec::new(),
        }
    }
}

pub fn encode_world(raw: &RawWorld) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&WORLD_MAGIC);
    out.write_u16::<LittleEndian>(WORLD_VERSION).expect("vec write");
    out.write_u8(raw.format).expect("vec write");
    out.write_u32::<LittleEndian>(raw.entities.len() as u32)
        .expect("vec write");

    for entity in &raw.entities {
        write_str(&mut out, &entity.class);
        out.write_u16::<LittleEndian>(entity.state_stack.len() as u16)
            .expect("vec write");
        for state in &entity.state_stack {
            out.write_u32::<LittleEndian>(*state).expect("vec write");
        }
        out.write_u16::<LittleEndian>(entity.props.len() as u16)
            .expect("vec write");
        for prop in &entity.props {
            out.write_u32::<LittleEndian>(prop.value.kind() as u32)
                .expect("vec write");
            out.write_u32::<LittleEndian>(prop.id).expect("vec write");
            write_value(&mut out, &prop.value);
        }
    }
    out
}

/// Reads just the header's source-format tag, so a caller can pick its
/// unknown-field hook before committing to a full decode.
pub fn peek_format_tag(bytes: &[u8]) -> Result<u8, DecodeError> {
    let mut reader = bytes;
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if magic != WORLD_MAGIC {
        return Err(DecodeError::BadMagic);
    }
    let version = reader.read_u16::<LittleEndian>()?;
    if version != WORLD_VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }
    Ok(reader.read_u8()?)
}

/// Decodes a world stream against the current schema catalog, returning the
/// header's source-format tag alongside the world.
pub fn decode_world(
    bytes: &[u8],
    schemas: &SchemaSet,
    sink: &mut dyn UnknownPropSink,
) -> Result<(u8, World), DecodeError> {
    let mut reader = bytes;

    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if magic != WORLD_MAGIC {
        return Err(DecodeError::BadMagic);
    }
    let version = reader.read_u16::<LittleEndian>()?;
    if version != WORLD_VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }
    let format = reader.read_u8()?;
    let entity_count = reader.read_u32::<LittleEndian>()?;

    let mut world = World::new();
    for _ in 0..entity_count {
        let class = read_str(&mut reader)?;
        let schema = schemas
            .class(&class)
            .ok_or_else(|| DecodeError::UnknownClass(class.clone()))?;

        let id = world
            .spawn(schemas, &class)
            .expect("class checked against catalog");

        let state_count = reader.read_u16::<LittleEndian>()?;
        let mut state_stack = Vec::with_capacity(state_count as usize);
        for _ in 0..state_count {
            state_stack.push(reader.read_u32::<LittleEndian>()?);
        }
        world.entity_mut(id).state_stack = state_stack;

        let prop_count = reader.read_u16::<LittleEndian>()?;
        for _ in 0..prop_count {
            let kind_tag = reader.read_u32::<LittleEndian>()?;
            let kind = PropKind::try_from(kind_tag)
                .map_err(|_| DecodeError::UnknownPropKind(kind_tag))?;
            let prop_id = reader.read_u32::<LittleEndian>()?;
            let value = read_value(&mut reader, kind)?;

            match schema.find_by_kind_and_id(kind, prop_id) {
                Some(def) => world.entity_mut(id).put(def.offset, value),
                None => {
                    let entity = world.entity(id);
                    sink.unknown_prop(
                        entity,
                        UnknownProp {
                            kind,
                            id: prop_id,
                            value: &value,
                        },
                    );
                    // Value dropped here; the hook had its one look.
                }
            }
        }
    }

    Ok((format, world))
}

fn write_str(out: &mut Vec<u8>, text: &str) {
    out.write_u16::<LittleEndian>(text.len() as u16).expect("vec write");
    out.extend_from_slice(text.as_bytes());
}

fn read_str(reader: &mut &[u8]) -> Result<String, DecodeError> {
    let len = reader.read_u16::<LittleEndian>()? as usize;
    let mut buffer = vec![0u8; len];
    reader.read_exact(&mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

fn write_value(out: &mut Vec<u8>, value: &PropValue) {
    match value {
        PropValue::Bool(flag) => out.write_u8(*flag as u8).expect("vec write"),
        PropValue::Index(number) | PropValue::EnumValue(number) => {
            out.write_i32::<LittleEndian>(*number).expect("vec write")
        }
        PropValue::Float(number) | PropValue::Range(number) => {
            out.write_f32::<LittleEndian>(*number).expect("vec write")
        }
        PropValue::Color(color) => out.write_u32::<LittleEndian>(*color).expect("vec write"),
        PropValue::String(text) | PropValue::Filename(text) => write_str(out, text),
        PropValue::EntityRef(target) => {
            let raw = target.map(|id| id.0).unwrap_or(ENTITY_REF_NONE);
            out.write_u32::<LittleEndian>(raw).expect("vec write");
        }
        PropValue::Placement(placement) => {
            for number in placement.position.iter().chain(placement.rotation.iter()) {
                out.write_f32::<LittleEndian>(*number).expect("vec write");
            }
        }
        PropValue::Box3(bounds) => {
            for number in bounds.min.iter().chain(bounds.max.iter()) {
                out.write_f32::<LittleEndian>(*number).expect("vec write");
            }
        }
    }
}

fn read_value(reader: &mut &[u8], kind: PropKind) -> Result<PropValue, DecodeError> {
    let value = match kind {
        PropKind::Bool => PropValue::Bool(reader.read_u8()? != 0),
        PropKind::Index => PropValue::Index(reader.read_i32::<LittleEndian>()?),
        PropKind::EnumValue => PropValue::EnumValue(reader.read_i32::<LittleEndian>()?),
        PropKind::Float => PropValue::Float(reader.read_f32::<LittleEndian>()?),
        PropKind::Range => PropValue::Range(reader.read_f32::<LittleEndian>()?),
        PropKind::Color => PropValue::Color(reader.read_u32::<LittleEndian>()?),
        PropKind::String => PropValue::String(read_str(reader)?),
        PropKind::Filename => PropValue::Filename(read_str(reader)?),
        PropKind::EntityRef => {
            let raw = reader.read_u32::<LittleEndian>()?;
            let target = (raw != ENTITY_REF_NONE).then_some(EntityId(raw));
            PropValue::EntityRef(target)
        }
        PropKind::Placement => {
            let mut numbers = [0.0f32; 6];
            for slot in numbers.iter_mut() {
                *slot = reader.read_f32::<LittleEndian>()?;
            }
            PropValue::Placement(Placement3 {
                position: [numbers[0], numbers[1], numbers[2]],
                rotation: [numbers[3], numbers[4], numbers[5]],
            })
        }
        PropKind::Box3 => {
            let mut numbers = [0.0f32; 6];
            for slot in numbers.iter_mut() {
                *slot = reader.read_f32::<LittleEndian>()?;
            }
            PropValue::Box3(Aabbox3 {
                min: [numbers[0], numbers[1], numbers[2]],
                max: [numbers[3], numbers[4], numbers[5]],
            })
        }
    };
    Ok(value)
}
