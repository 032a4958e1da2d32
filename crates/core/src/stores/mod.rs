mod qdrant;

pub use qdrant::{QdrantGateway, QdrantSemanticCache};
