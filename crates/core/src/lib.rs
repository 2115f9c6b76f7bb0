pub mod annotation;
pub mod classifier;
pub mod config;
pub mod dedup;
pub mod fetch;
pub mod lifecycle;
pub mod manager;
pub mod metrics;
pub mod operator;
pub mod root_cache;
pub mod scheduler;
pub mod store;
pub mod subtask;
pub mod sync;
pub mod task;
pub mod testing;
pub mod trigger;
pub mod urls;

pub use annotation::{
    Annotation, AnnotationKind, AnnotationOrigin, AnnotationStore, AnnotationValue, MiscMetadata,
    NewAnnotation,
};
pub use classifier::{
    AgencyIdentifier, ClassifierError, DataSourceRegistrar, DuplicateChecker, HttpClassifier,
    RecordTypeClassifier, RelevanceClassifier,
};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use dedup::{DedupDecision, DedupError, Deduplicator, Registration};
pub use fetch::{HttpPageFetcher, HttpProber, PageFetcher, UrlProber};
pub use lifecycle::{LifecycleError, LifecycleManager};
pub use manager::{ManagerStatus, TaskManager};
pub use operator::{
    AgencyStage, DuplicateStage, HtmlStage, MiscMetadataStage, Operator, OperatorConfig,
    OperatorError, ProbeStage, RecordTypeStage, RelevancyStage, RunInfo, StageError,
    StageProcessor, SubmitStage, TaskOperator,
};
pub use root_cache::RootUrlCache;
pub use scheduler::Scheduler;
pub use store::{SqliteStore, StoreError};
pub use sync::{AgencySource, AgencySyncOperator};
pub use task::{TaskStatus, TaskStore, TaskType};
pub use trigger::FunctionTrigger;
pub use urls::{ArtifactStore, UrlRecord, UrlStatus, UrlStore};
