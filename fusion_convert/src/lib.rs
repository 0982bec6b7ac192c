pub mod classic;
pub mod load;
pub mod rain;
pub mod registry;
pub mod tables;

pub use classic::ClassicConverter;
pub use load::{load_world, LoadError, LoadedWorld};
pub use registry::{converter_for, ConvertError, Converter, Outcome, WorldFormat};
