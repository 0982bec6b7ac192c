//! World-load orchestration.
//!
//! One call per load event, start to finish on the caller's thread: peek the
//! source format, select the converter, reset it, decode with the converter
//! listening on the unknown-field channel, then hand the decoded world to
//! `convert_world`. The world is not visible to anything else until this
//! returns.

use thiserror::Error;

use fusion_world::stream::{decode_world, peek_format_tag, DecodeError, DiscardUnknownProps};
use fusion_world::value::UnknownProp;
use fusion_world::world::Entity;
use fusion_world::{SchemaSet, UnknownPropSink, World};

use crate::registry::{converter_for, ConvertError, Converter, WorldFormat};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("world stream could not be decoded: {0}")]
    Decode(#[from] DecodeError),
    #[error("world header carries unknown format tag {0:#04x}")]
    UnknownFormatTag(u8),
    #[error(transparent)]
    Convert(#[from] ConvertError),
}

/// Result of one load: the world, where it came from, and whether a
/// conversion pass ran.
#[derive(Debug)]
pub struct LoadedWorld {
    pub format: WorldFormat,
    pub world: World,
    pub converted: bool,
}

/// Adapts the converter's unknown-field operation to the decoder's sink.
struct ConverterSink<'a>(&'a mut dyn Converter);

impl UnknownPropSink for ConverterSink<'_> {
    fn unknown_prop(&mut self, entity: &Entity, prop: UnknownProp<'_>) {
        self.0.on_unknown_prop(entity, prop);
    }
}

pub fn load_world(bytes: &[u8], schemas: &SchemaSet) -> Result<LoadedWorld, LoadError> {
    let tag = peek_format_tag(bytes)?;
    let format = WorldFormat::from_tag(tag).ok_or(LoadError::UnknownFormatTag(tag))?;
    let mut converter = converter_for(format)?;

    let (_, mut world) = match converter.as_deref_mut() {
        Some(active) => {
            active.reset();
            let mut sink = ConverterSink(active);
            decode_world(bytes, schemas, &mut sink)?
        }
        None => decode_world(bytes, schemas, &mut DiscardUnknownProps)?,
    };

    let converted = match converter.as_deref_mut() {
        Some(active) => {
            log::info!(
                "converting world from {format:?} format ({} entities)",
                world.len()
            );
            active.convert_world(&mut world, schemas)?;
            true
        }
        None => false,
    };

    Ok(LoadedWorld {
        format,
        world,
        converted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fusion_world::stream::{encode_world, RawWorld, FORMAT_NATIVE, FORMAT_REMASTER};

    #[test]
    fn native_worlds_load_without_conversion() {
        let schemas = SchemaSet::current();
        let raw = RawWorld::new(FORMAT_NATIVE);
        let loaded = load_world(&encode_world(&raw), &schemas).expect("load");
        assert_eq!(loaded.format, WorldFormat::Native);
        assert!(!loaded.converted);
    }

    #[test]
    fn unknown_tags_are_rejected_before_decoding() {
        let schemas = SchemaSet::current();
        let mut raw = RawWorld::new(0x7F);
        raw.entities.clear();
        let err = load_world(&encode_world(&raw), &schemas).unwrap_err();
        assert!(matches!(err, LoadError::UnknownFormatTag(0x7F)));
    }

    #[test]
    fn recognized_but_unsupported_formats_fail_loudly() {
        let schemas = SchemaSet::current();
        let raw = RawWorld::new(FORMAT_REMASTER);
        let err = load_world(&encode_world(&raw), &schemas).unwrap_err();
        assert!(matches!(
            err,
            LoadError::Convert(ConvertError::UnsupportedFormat(WorldFormat::Remaster))
        ));
    }
}
