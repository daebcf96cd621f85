// answer/ — Turns a resolved column into an answer record and a user-facing text.

pub mod engine;
pub mod format;
pub mod intent;
pub mod record;

pub use engine::QueryAnswerer;
pub use format::format_response;
pub use record::AnswerRecord;
