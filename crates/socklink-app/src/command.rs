//! Line commands read from stdin.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `connect [url]`; no url means the configured endpoint.
    Connect(Option<String>),
    Disconnect,
    /// Connect when disconnected, disconnect otherwise.
    Toggle,
    Send(String),
    Ping,
    State,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  connect [url]   open a session (default: configured endpoint)
  disconnect      close the session
  toggle          connect or disconnect, depending on the current state
  send <text>     send a text frame
  ping            probe the peer
  state           print the connection state
  help            this text
  quit            disconnect and exit";

impl Command {
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        match word.to_ascii_lowercase().as_str() {
            "connect" | "c" => Ok(Self::Connect((!rest.is_empty()).then(|| rest.to_owned()))),
            "disconnect" | "d" => Ok(Self::Disconnect),
            "toggle" | "t" => Ok(Self::Toggle),
            "send" | "s" => {
                if rest.is_empty() {
                    Err("usage: send <text>".into())
                } else {
                    Ok(Self::Send(rest.to_owned()))
                }
            }
            "ping" | "p" => Ok(Self::Ping),
            "state" => Ok(Self::State),
            "help" | "?" => Ok(Self::Help),
            "quit" | "exit" | "q" => Ok(Self::Quit),
            "" => Err(String::new()),
            other => Err(format!("unknown command '{}' (try 'help')", other)),
        }
    }
}
