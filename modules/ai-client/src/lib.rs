pub mod error;
pub mod openai;
pub mod util;

pub use error::{AiError, Result};
pub use openai::{Completion, OpenAi, OpenAiPromptBuilder, StructuredOutput, TokenUsage};
pub use util::{extract_json_payload, strip_code_blocks, truncate_to_char_boundary};
