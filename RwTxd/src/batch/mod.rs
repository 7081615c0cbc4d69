//! Mass conversion of directory trees
//!
//! A [`MassConverter`] walks a source tree, converts every texture dictionary
//! it finds for the configured target platform, rebuilds game archives with
//! their dictionaries converted, and copies everything else across.

mod config;
mod converter;
mod output;

pub use config::{IniDocument, MAIN_SECTION, MassConvConfig, parse_bool};
pub use converter::{
    DEBUG_DIRECTORY, FileOutcome, FileRecord, MassConvProgress, MassConvReport, MassConverter,
};
pub use output::OutputFileGuard;
