pub mod classification;
pub mod events;
pub mod handlers;
pub mod prompts;
pub mod references;
pub mod slots;
