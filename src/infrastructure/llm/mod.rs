mod digital_ocean;
mod ollama;
mod registry;
mod transport;

pub use digital_ocean::DigitalOceanAgent;
pub use ollama::OllamaProvider;
pub use registry::build_registry;
