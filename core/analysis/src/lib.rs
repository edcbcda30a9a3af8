pub mod api;
pub mod batch;
pub mod collector;
pub mod config;
pub mod database;
pub mod error;
pub mod generators;
pub mod period;
pub mod prompts;
pub mod questions;
pub mod scorer;
pub mod store;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod trend;

pub use api::{router, AppState};
pub use batch::{analyzed_this_week, BatchReport, BatchRunner};
pub use collector::{collect_text, concatenate};
pub use config::{BatchConfig, ServiceConfig};
pub use database::{db_timestamp, Database};
pub use error::AnalysisError;
pub use generators::{run_diagnosis, validate_sentiment, MonthlyAnalysis};
pub use period::{week_start, AnalysisPeriod};
pub use questions::{generate_questions, validate_questions, SUGGESTION_COUNT};
pub use scorer::{analyze_personality_text, parse_personality_response, score_traits};
pub use store::AnalysisStore;
pub use trend::calc_trend;
