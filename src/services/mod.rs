pub mod corpus;
pub mod ledger;
pub mod normalizer;
pub mod storage;

pub use corpus::{AnswerCorpus, CorrectedSubmission};
pub use ledger::{LedgerSnapshot, ScoreLedger};
pub use normalizer::{normalize, normalize_ledger, NormalizationBand};
pub use storage::HomeworkStorage;
