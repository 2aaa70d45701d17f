/// What a line at the result prompt asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultAction {
    Another,
    Download,
    SaveMedia,
    Show,
    Help,
    Quit,
    Noop,
    Unknown,
}

pub(crate) struct CommandSpec {
    pub words: &'static [&'static str],
    pub action: ResultAction,
    pub takes_path: bool,
}

pub(crate) const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        words: &["another", "again", "next"],
        action: ResultAction::Another,
        takes_path: false,
    },
    CommandSpec {
        words: &["download", "list"],
        action: ResultAction::Download,
        takes_path: true,
    },
    CommandSpec {
        words: &["save"],
        action: ResultAction::SaveMedia,
        takes_path: true,
    },
    CommandSpec {
        words: &["show"],
        action: ResultAction::Show,
        takes_path: false,
    },
    CommandSpec {
        words: &["help", "?"],
        action: ResultAction::Help,
        takes_path: false,
    },
    CommandSpec {
        words: &["quit", "exit", "q"],
        action: ResultAction::Quit,
        takes_path: false,
    },
];

pub const RESULT_HELP_COMMANDS: &[&str] = &[
    "another            generate a new result with the same preferences",
    "download [PATH]    write the shopping list (default shopping-list.txt)",
    "save [DIR]         write images and audio from the result",
    "show               print the result again",
    "quit               leave",
];
