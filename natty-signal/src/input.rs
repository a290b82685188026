/// Line that ends the session when read from input.
pub const EXIT_COMMAND: &str = "exit";

/// What a single line read from the signaling input asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputLine {
    Exit,
    Empty,
    Message(String),
}

impl InputLine {
    pub fn classify(line: &str) -> Self {
        let line = line.trim_end_matches(['\r', '\n']);
        if line == EXIT_COMMAND {
            InputLine::Exit
        } else if line.trim().is_empty() {
            InputLine::Empty
        } else {
            InputLine::Message(line.to_owned())
        }
    }
}
