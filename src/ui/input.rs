/// A line typed into the shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Send(String),
    Older,
    Rooms,
    Open(i64),
    Join(i64),
    Performance(i64),
    Edit(i64, String),
    Delete(i64),
    Read,
    Reconnect,
    Status,
    Help,
    Quit,
    Empty,
    Invalid(String),
}

pub const HELP_LINES: [&str; 13] = [
    "text            send a message to the open room",
    "//text          send text that starts with '/'",
    "/older          load the previous page of history",
    "/rooms          list your rooms",
    "/open ID        switch to room ID",
    "/join ID        join room ID",
    "/show ID        find the room of performance ID",
    "/edit ID TEXT   edit one of your messages",
    "/delete ID      delete one of your messages",
    "/read           mark the open room read",
    "/reconnect      re-open the live session",
    "/status         show connection status and unread total",
    "/quit           leave",
];

pub fn parse_input(line: &str) -> ShellCommand {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return ShellCommand::Empty;
    }

    if let Some(escaped) = line.strip_prefix("//") {
        return ShellCommand::Send(format!("/{escaped}"));
    }
    let Some(command) = line.strip_prefix('/') else {
        return ShellCommand::Send(line.to_owned());
    };

    let (name, rest) = match command.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (command, ""),
    };

    match name.to_ascii_lowercase().as_str() {
        "older" | "more" => ShellCommand::Older,
        "rooms" => ShellCommand::Rooms,
        "open" => id_argument(rest).map_or_else(ShellCommand::Invalid, ShellCommand::Open),
        "join" => id_argument(rest).map_or_else(ShellCommand::Invalid, ShellCommand::Join),
        "show" => id_argument(rest).map_or_else(ShellCommand::Invalid, ShellCommand::Performance),
        "edit" => {
            let (id, text) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            match id_argument(id) {
                Ok(_) if text.trim().is_empty() => {
                    ShellCommand::Invalid("usage: /edit ID TEXT".to_owned())
                }
                Ok(id) => ShellCommand::Edit(id, text.trim().to_owned()),
                Err(reason) => ShellCommand::Invalid(reason),
            }
        }
        "delete" | "del" => id_argument(rest).map_or_else(ShellCommand::Invalid, ShellCommand::Delete),
        "read" => ShellCommand::Read,
        "reconnect" => ShellCommand::Reconnect,
        "status" => ShellCommand::Status,
        "help" | "?" => ShellCommand::Help,
        "quit" | "exit" | "q" => ShellCommand::Quit,
        other => ShellCommand::Invalid(format!("unknown command /{other}, try /help")),
    }
}

fn id_argument(raw: &str) -> Result<i64, String> {
    let raw = raw.trim().trim_start_matches('#');
    match raw.parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ if raw.is_empty() => Err("missing id".to_owned()),
        _ => Err(format!("'{raw}' is not a valid id")),
    }
}
