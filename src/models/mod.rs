pub mod content;
pub mod loaders;
pub mod score;

pub use content::{AnswerBlock, ContentItem, Question, QuestionBank, Submission};
pub use loaders::{discover_homeworks, load_document, HomeworkDocument};
pub use score::{PersistedScore, ScoreResult};
