//! Call attempts: event payload and the translator that publishes and rejects them.

mod event;
mod translator;

pub use event::CallEvent;
pub use translator::{CallTranslator, Disposition, TranslatorWorker};
