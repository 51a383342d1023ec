pub mod regex;
pub mod line_parser;
pub mod processor;

pub use line_parser::{LineParser, parse_damage_breakdown};
pub use processor::{Correlation, EventRouter};
