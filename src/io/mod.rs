//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `venue` - Venue descriptor loading (JSON)
//! - `fix_source` - Location fixes from a JSONL file or stdin
//! - `egress_channel` - Typed channel for egress events
//! - `egress` - Event output to file (JSONL format)

pub mod egress;
pub mod egress_channel;
pub mod fix_source;
pub mod venue;

// Re-export commonly used types
pub use egress::Egress;
pub use egress_channel::{create_egress_channel, EgressMessage, EgressSender};
pub use fix_source::{parse_fix_line, run_fix_source, FixSourceStats};
pub use venue::{load_venue, parse_venue};
