mod catalog;
mod phrases;

pub use catalog::{SlotCatalog, SlotSpec, DEFAULT_SLOT};
pub use phrases::{mentions, PhraseRule};
