// Section parsing, encoding and merging

mod encode;
mod merge;
mod parse;

pub use encode::{encode_piggyback_block, encode_section, encode_sections};
pub use merge::{merge, merge_sections};
pub use parse::{ParsedPayload, parse_payload, split_row};
