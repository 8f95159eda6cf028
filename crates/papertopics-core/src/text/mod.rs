mod dedup;
mod normalizer;
mod stopwords;

pub use dedup::{dedupe, PreprocessStats, Preprocessor};
pub use normalizer::Normalizer;
pub use stopwords::{StopwordError, StopwordResult, StopwordSet};
