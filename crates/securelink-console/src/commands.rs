//! Command parsing for the operator console.
//!
//! This module parses input lines into structured [`Command`] values. One
//! command per line; the first word names the command.

use securelink_core::AddressFamily;

/// Console commands with their one-line descriptions, in `help` order.
pub const COMMANDS: &[(&str, &str)] = &[
    ("connect_tls", "connect to a server securely: connect_tls <host>:<port>"),
    ("disconnect_tls", "disconnect from the current server"),
    ("send_msg", "send a message to the server: send_msg <text>"),
    ("stats", "byte counts and connection timings"),
    ("ipmode", "change address family: ipmode <any|4|6>"),
    ("unixtime", "wall-clock time and uptime"),
    ("reset", "reinitialize the connection state machine"),
    ("help", "list commands"),
    ("quit", "close any connection and exit"),
];

/// Parsed command from user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Connect to a target.
    ConnectTls {
        /// `host:port` as typed.
        target: String,
    },

    /// Close the current connection.
    DisconnectTls,

    /// Send a message on the current connection.
    SendMessage {
        /// Message text, quotes stripped.
        message: String,
    },

    /// Print byte counts and milestone intervals.
    Stats,

    /// Select the address family for the next connect.
    IpMode {
        /// Requested family.
        family: AddressFamily,
    },

    /// Print wall-clock time and uptime.
    UnixTime,

    /// Reinitialize the state machine.
    Reset,

    /// List commands.
    Help,

    /// Close any connection and exit.
    Quit,

    /// Blank line.
    Empty,

    /// Unknown command.
    Unknown {
        /// Input as typed.
        input: String,
    },

    /// Command with missing or invalid arguments.
    InvalidArgs {
        /// Command name.
        command: String,
        /// Usage text.
        error: String,
    },
}

/// Parse a user input line into a command.
pub fn parse(input: &str) -> Command {
    let input = input.trim();

    if input.is_empty() {
        return Command::Empty;
    }

    let (command, rest) = match input.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (input, ""),
    };
    let args: Vec<&str> = rest.split_whitespace().collect();

    match command {
        "connect_tls" => match args.as_slice() {
            [target] => Command::ConnectTls { target: (*target).to_string() },
            _ => Command::InvalidArgs {
                command: "connect_tls".into(),
                error: "Usage: connect_tls <ipv4|[ipv6]>:<port> (ex: connect_tls 192.168.0.1:11111)"
                    .into(),
            },
        },

        "disconnect_tls" => Command::DisconnectTls,

        "send_msg" => match unquote(rest) {
            "" => Command::InvalidArgs {
                command: "send_msg".into(),
                error: "Usage: send_msg <text> (ex: send_msg \"Hello, World\")".into(),
            },
            message => Command::SendMessage { message: message.to_string() },
        },

        "stats" => Command::Stats,

        "ipmode" => match args.as_slice() {
            [family] => match family.parse() {
                Ok(family) => Command::IpMode { family },
                Err(error) => Command::InvalidArgs { command: "ipmode".into(), error },
            },
            _ => Command::InvalidArgs {
                command: "ipmode".into(),
                error: "Usage: ipmode <any|4|6>".into(),
            },
        },

        "unixtime" => Command::UnixTime,

        "reset" => Command::Reset,

        "help" | "?" => Command::Help,

        "quit" | "exit" | "q" => Command::Quit,

        _ => Command::Unknown { input: input.to_string() },
    }
}

/// Strip one pair of enclosing double quotes.
fn unquote(text: &str) -> &str {
    text.strip_prefix('"').and_then(|t| t.strip_suffix('"')).unwrap_or(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_connect() {
        assert_eq!(
            parse("connect_tls 192.168.0.1:11111"),
            Command::ConnectTls { target: "192.168.0.1:11111".into() }
        );
    }

    #[test]
    fn parse_connect_missing_target() {
        assert!(matches!(
            parse("connect_tls"),
            Command::InvalidArgs { command, .. } if command == "connect_tls"
        ));
        assert!(matches!(parse("connect_tls a:1 b:2"), Command::InvalidArgs { .. }));
    }

    #[test]
    fn parse_send_keeps_spaces() {
        assert_eq!(
            parse("send_msg Hello, World"),
            Command::SendMessage { message: "Hello, World".into() }
        );
    }

    #[test]
    fn parse_send_strips_quotes() {
        assert_eq!(
            parse("send_msg \"Hello, World\""),
            Command::SendMessage { message: "Hello, World".into() }
        );
        assert_eq!(parse("send_msg \"half"), Command::SendMessage { message: "\"half".into() });
    }

    #[test]
    fn parse_send_empty() {
        assert!(matches!(parse("send_msg"), Command::InvalidArgs { .. }));
        assert!(matches!(parse("send_msg \"\""), Command::InvalidArgs { .. }));
    }

    #[test]
    fn parse_ipmode() {
        assert_eq!(parse("ipmode 6"), Command::IpMode { family: AddressFamily::V6 });
        assert_eq!(parse("ipmode any"), Command::IpMode { family: AddressFamily::Any });
        assert!(matches!(parse("ipmode 5"), Command::InvalidArgs { .. }));
        assert!(matches!(parse("ipmode"), Command::InvalidArgs { .. }));
    }

    #[test]
    fn parse_simple_commands() {
        assert_eq!(parse("disconnect_tls"), Command::DisconnectTls);
        assert_eq!(parse("stats"), Command::Stats);
        assert_eq!(parse("unixtime"), Command::UnixTime);
        assert_eq!(parse("reset"), Command::Reset);
        assert_eq!(parse("help"), Command::Help);
        assert_eq!(parse("quit"), Command::Quit);
        assert_eq!(parse("q"), Command::Quit);
    }

    #[test]
    fn parse_unknown_command() {
        assert_eq!(parse("wolfsslLog"), Command::Unknown { input: "wolfsslLog".into() });
    }

    #[test]
    fn parse_empty() {
        assert_eq!(parse(""), Command::Empty);
        assert_eq!(parse("   "), Command::Empty);
    }

    #[test]
    fn help_lists_every_command() {
        for (name, _) in COMMANDS {
            assert!(!matches!(parse(name), Command::Unknown { .. }), "{name} should parse");
        }
    }
}
