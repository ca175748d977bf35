//! PDF ingestion pipeline: structure detection, quality assessment and
//! dual-strategy chunking

pub mod content_aware;
pub mod controller;
pub mod document;
pub mod fallback;
pub mod metadata;
pub mod protected;
pub mod quality;
pub mod structure;

pub use content_aware::{ChunkerOutput, ContentAwareChunker};
pub use controller::{
    BatchReport, ChunkingController, ChunkingReport, ChunkingRequest, ChunkingStatistics,
    ProcessingStats,
};
pub use document::Document;
pub use fallback::FallbackChunker;
pub use metadata::{BaseMetadata, Chunk, ChunkMetadata, ContentType};
pub use protected::{
    merge_regions, DefinitionDetector, ExampleDetector, MathDetector, ProtectedRegion,
};
pub use quality::{ChunkingStrategy, QualityAssessment, QualityAssessor};
pub use structure::{
    DetectionResult, Hierarchy, NumberingStyle, StructureDetector, StructureElement,
    StructureType,
};
