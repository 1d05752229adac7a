pub mod app;

pub use app::{
    AnalysisConfig, AnalyzerProvider, AppConfig, FanoutConfig, HistoryConfig, PaymentConfig,
    SourceConfig, SourceKind,
};
