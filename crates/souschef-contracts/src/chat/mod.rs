mod command_registry;
mod intent_parser;

pub use command_registry::{ResultAction, RESULT_HELP_COMMANDS};
pub use intent_parser::{parse_result_command, ResultCommand};
