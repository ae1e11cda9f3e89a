//! Adapter implementations of the domain ports.

pub mod anthropic;
pub mod mock;
pub mod process_executor;
pub mod retry;
pub mod script_writer;

pub use anthropic::{AnthropicClient, AnthropicGenerator, AnthropicOracle};
pub use mock::{MemoryArtifactWriter, MockExecutor, MockGenerator, MockOracle};
pub use process_executor::ProcessExecutor;
pub use retry::RetryingOracle;
pub use script_writer::ScriptArtifactWriter;
