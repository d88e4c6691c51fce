pub mod aggregate;
pub mod binary;
pub mod chipinfo;
pub mod classify;
pub mod clean;
pub mod command;
pub mod decoder;
pub mod framer;
pub mod pipeline;

pub use aggregate::{Aggregator, FlushDecision};
pub use binary::{BinaryExtractor, Extract, parse_length_header};
pub use chipinfo::{ArmSource, ChipInfoCollector, ChipInfoState};
pub use classify::{LineClass, RecordKind, classify, detect_start};
pub use clean::clean_line;
pub use command::{DeviceCommand, EncodeCommand, EncodedCommand, RawCommand};
pub use decoder::{Decoded, ResponseKind, SoftParseError, decode};
pub use framer::{ByteFramer, DrainEvents, FramerEvent, FramerState};
pub use pipeline::{LinkPipeline, PipelineEvent};
