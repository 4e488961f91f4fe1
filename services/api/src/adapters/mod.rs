pub mod db;
pub mod embeddings;
pub mod pdf;

pub use db::DbAdapter;
pub use embeddings::OpenAiEmbeddingAdapter;
pub use pdf::PdfTextConverter;
