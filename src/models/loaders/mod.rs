pub mod document_loader;

pub use document_loader::{
    discover_homeworks, homework_id, load_document, parse_document, HomeworkDocument, ANSWER_FILE,
};
