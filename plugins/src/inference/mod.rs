pub mod console;
pub mod openai;

pub use console::ConsoleInference;
pub use openai::OpenAiInference;
