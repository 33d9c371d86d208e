//! Translation engine
//!
//! Resolves keys against a current and a default locale. Locale data is either
//! supplied in memory or read lazily from `<base_path>/<locale>.json`, and is
//! stored flattened (`menu.file.open`) next to an ordered table of regex
//! patterns. Leaves are templates with `{dotted.path}` placeholders, references
//! to named helpers, or (in memory only) callables.

pub mod entry;
pub mod helpers;
pub mod ingest;
pub mod reader;
pub mod render;
pub mod translator;

pub use entry::{Callback, CompiledPattern, Entry, LocaleTable, PatternEntry, PatternSource, RawNode};
pub use helpers::HelperFacade;
pub use reader::{FsReader, MemoryReader, ResourceReader};
pub use translator::{LocaleStats, Translator};
