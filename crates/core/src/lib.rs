pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod lifecycle;
pub mod models;
pub mod progress;
pub mod queue;
pub mod segmentation;
pub mod storage;
pub mod stores;
pub mod worker;

pub use embeddings::{
    EmbeddingOrchestrator, EmbeddingProvider, HashEmbedder, OllamaEmbedder,
    DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{PipelineError, SearchError};
pub use extractor::{extractor_for_locator, ExtractedText, TextExtractor};
pub use lifecycle::{LifecycleTracker, MemoryMetadataStore, MetadataStore};
pub use models::{
    ChunkType, ClauseAnnotation, DocumentRecord, DocumentStatus, JobDescriptor, PipelineConfig,
    ProgressEvent, QueryFilters, SearchHit, Segment,
};
pub use progress::ProgressPublisher;
pub use queue::{JobQueue, MemoryJobQueue};
pub use segmentation::{detect_document_kind, segment, DocumentKind, SegmentationOutcome};
pub use storage::{FsObjectStorage, ObjectStorage};
pub use stores::{MemoryVectorStore, QdrantVectorStore, VectorEntry, VectorStore};
pub use worker::IngestionWorker;
