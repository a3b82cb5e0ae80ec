pub mod artifact;
pub mod config;
pub mod extractor;
pub mod fetcher;
pub mod ledger;
pub mod manifest;
pub mod orchestrator;
pub mod stage;
pub mod testing;
pub mod transformer;

pub use artifact::{ArtifactError, ArtifactStore};
pub use config::{
    load_config, load_config_from_str, load_config_or_default, validate_config, Config,
    ConfigError, TimeoutsConfig,
};
pub use extractor::{ExtractError, Extractor, ExtractorConfig, StructuredContent, VisionExtractor};
pub use fetcher::{FetchError, Fetcher, FetcherConfig, HttpFetcher};
pub use ledger::{
    DocumentRecord, FailureClass, LedgerError, PipelineState, StageName, StageRecord, StageStatus,
    StateLedger,
};
pub use manifest::{discover_manifest, load_manifest, DocumentDescriptor, ManifestError};
pub use orchestrator::{
    BatchOrchestrator, BatchSummary, DocumentOutcome, FinalResult, OrchestratorConfig,
    OrchestratorError,
};
pub use stage::{RetryConfig, RetryPolicy, StageRunError, StageRunner, StageTimeouts};
pub use transformer::{
    LlmTransformer, TransformError, TransformedDocument, Transformer, TransformerConfig,
};
