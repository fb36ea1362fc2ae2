mod client;

pub use client::EmbeddingApiClient;
