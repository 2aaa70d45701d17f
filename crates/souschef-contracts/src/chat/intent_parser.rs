use super::command_registry::{ResultAction, COMMANDS};

/// One line typed at the result prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultCommand {
    pub action: ResultAction,
    pub raw: String,
    pub path: Option<String>,
}

/// Splits a path argument the way a shell would, so quoted paths with
/// spaces survive. Unbalanced quotes fall back to whitespace splitting.
fn path_argument(arg: &str) -> Option<String> {
    let parts = shell_words::split(arg)
        .unwrap_or_else(|_| arg.split_whitespace().map(str::to_string).collect());
    let joined = parts
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    (!joined.is_empty()).then_some(joined)
}

/// Parses `another`, `download [path]`, `save [dir]`, `show`, `help`, `quit`.
/// A leading `/` is accepted; an empty line is [`ResultAction::Noop`].
pub fn parse_result_command(text: &str) -> ResultCommand {
    let mut parsed = ResultCommand {
        action: ResultAction::Unknown,
        raw: text.to_string(),
        path: None,
    };
    let line = text.trim();
    if line.is_empty() {
        parsed.action = ResultAction::Noop;
        return parsed;
    }

    let line = line.strip_prefix('/').unwrap_or(line);
    let (word, arg) = match line.split_once(char::is_whitespace) {
        Some((word, arg)) => (word, arg.trim()),
        None => (line, ""),
    };
    let word = word.to_ascii_lowercase();
    let Some(spec) = COMMANDS.iter().find(|spec| spec.words.contains(&word.as_str())) else {
        return parsed;
    };

    if spec.takes_path {
        parsed.path = path_argument(arg);
    } else if !arg.is_empty() {
        return parsed;
    }
    parsed.action = spec.action;
    parsed
}
