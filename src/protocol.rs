//! Menu protocol: input sanitation, command table, and wire literals.
//!
//! The wire format is plain newline-delimited text. A command is one line,
//! sanitized (trimmed, lowercased) before lookup; the reply is one line. The
//! table is exact-match; anything unrecognized, including the empty string,
//! falls through to the unknown-command warning rather than an error.

use crate::identity::ServerIdentity;

/// Menu sent once on connect and again for the `menu` command.
pub const MENU: &str = "Available Commands:\n\
hello - displays a greeting\n\
1 - displays server name\n\
2 - displays server address\n\
3 - displays server owner\n\
4 - displays server owners favorite programming languages\n\
5 - displays server owners location\n\
passwd - currently unavailable\n\
exit - closes connection to server\n\
menu - displays this menu of available commands\n";

/// Prompt sent before every read.
pub const PROMPT: &str = "\nEnter a command: \n";

/// Liveness line pushed by the heartbeat loop.
pub const HEARTBEAT: &str = "HEARTBEAT\n";

/// Strip leading/trailing ASCII whitespace and lowercase ASCII letters.
///
/// Pure and idempotent; never fails.
pub fn sanitize(raw: &str) -> String {
    raw.trim_matches(|c: char| c.is_ascii_whitespace())
        .to_ascii_lowercase()
}

/// A sanitized command, parsed against the fixed table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `hello` - greeting
    Hello,
    /// `1` - server name
    ServerName,
    /// `2` - bound server address
    ServerAddress,
    /// `3` - server owner
    ServerOwner,
    /// `4` - favorite programming languages
    Languages,
    /// `5` - owner location
    Location,
    /// `passwd` - unimplemented feature stub
    Passwd,
    /// `menu` - resend the menu
    Menu,
    /// `exit` - end the session
    Exit,
    /// Anything else, echoed back in the warning reply
    Unknown(String),
}

impl Command {
    /// Exact-match lookup over already-sanitized input.
    pub fn parse(sanitized: &str) -> Command {
        match sanitized {
            "hello" => Command::Hello,
            "1" => Command::ServerName,
            "2" => Command::ServerAddress,
            "3" => Command::ServerOwner,
            "4" => Command::Languages,
            "5" => Command::Location,
            "passwd" => Command::Passwd,
            "menu" => Command::Menu,
            "exit" => Command::Exit,
            other => Command::Unknown(other.to_string()),
        }
    }

    /// Produce the reply line (without trailing newline).
    ///
    /// Returns `None` only for `Exit`: the session ends instead of replying.
    /// Read-only over the identity; no failure mode.
    pub fn respond(&self, identity: &ServerIdentity) -> Option<String> {
        match self {
            Command::Hello => Some("hello client!".to_string()),
            Command::ServerName => Some(identity.name.clone()),
            Command::ServerAddress => Some(identity.address.clone()),
            Command::ServerOwner => Some(identity.owner.clone()),
            Command::Languages => Some(identity.languages.clone()),
            Command::Location => Some(identity.location.clone()),
            Command::Passwd => Some("Currently unavailable feature".to_string()),
            Command::Menu => Some(MENU.to_string()),
            Command::Exit => None,
            Command::Unknown(cmd) => Some(format!("Warning: unknown command: {}", cmd)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IdentityConfig;
    use std::net::{IpAddr, Ipv4Addr};

    fn test_identity() -> ServerIdentity {
        ServerIdentity::new(
            &IdentityConfig::default(),
            IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
        )
    }

    #[test]
    fn test_sanitize_trims_and_lowercases() {
        assert_eq!(sanitize("  Hello "), "hello");
        assert_eq!(sanitize("\tEXIT\r\n"), "exit");
        assert_eq!(sanitize("menu"), "menu");
        assert_eq!(sanitize("   "), "");
        assert_eq!(sanitize(""), "");
    }

    #[test]
    fn test_sanitize_idempotent() {
        for s in ["  Hello ", "EXIT\n", "foo BAR baz", "", " \t\r\n "] {
            assert_eq!(sanitize(&sanitize(s)), sanitize(s));
        }
    }

    #[test]
    fn test_sanitize_keeps_interior_whitespace() {
        assert_eq!(sanitize(" two words "), "two words");
    }

    #[test]
    fn test_parse_table() {
        assert_eq!(Command::parse("hello"), Command::Hello);
        assert_eq!(Command::parse("1"), Command::ServerName);
        assert_eq!(Command::parse("2"), Command::ServerAddress);
        assert_eq!(Command::parse("3"), Command::ServerOwner);
        assert_eq!(Command::parse("4"), Command::Languages);
        assert_eq!(Command::parse("5"), Command::Location);
        assert_eq!(Command::parse("passwd"), Command::Passwd);
        assert_eq!(Command::parse("menu"), Command::Menu);
        assert_eq!(Command::parse("exit"), Command::Exit);
    }

    #[test]
    fn test_parse_is_exact_match() {
        // Already-lowercased input only; no partial or prefix matching
        assert_eq!(
            Command::parse("HELLO"),
            Command::Unknown("HELLO".to_string())
        );
        assert_eq!(
            Command::parse("hello there"),
            Command::Unknown("hello there".to_string())
        );
        assert_eq!(Command::parse("12"), Command::Unknown("12".to_string()));
        assert_eq!(Command::parse(""), Command::Unknown(String::new()));
    }

    #[test]
    fn test_respond_identity_fields() {
        let identity = test_identity();
        assert_eq!(
            Command::ServerName.respond(&identity),
            Some("maitred server".to_string())
        );
        assert_eq!(
            Command::ServerAddress.respond(&identity),
            Some("127.0.0.1".to_string())
        );
        assert_eq!(
            Command::ServerOwner.respond(&identity),
            Some("maitred authors".to_string())
        );
        assert_eq!(
            Command::Languages.respond(&identity),
            Some("Java and Python".to_string())
        );
        assert_eq!(
            Command::Location.respond(&identity),
            Some("Bellbrook, Ohio, USA".to_string())
        );
    }

    #[test]
    fn test_respond_literals() {
        let identity = test_identity();
        assert_eq!(
            Command::Hello.respond(&identity),
            Some("hello client!".to_string())
        );
        assert_eq!(
            Command::Passwd.respond(&identity),
            Some("Currently unavailable feature".to_string())
        );
        assert_eq!(Command::Menu.respond(&identity), Some(MENU.to_string()));
    }

    #[test]
    fn test_exit_is_sentinel() {
        assert_eq!(Command::Exit.respond(&test_identity()), None);
    }

    #[test]
    fn test_unknown_command_warning() {
        let identity = test_identity();
        for cmd in ["foo", "6", "help", ""] {
            assert_eq!(
                Command::parse(cmd).respond(&identity),
                Some(format!("Warning: unknown command: {}", cmd))
            );
        }
    }

    #[test]
    fn test_respond_deterministic() {
        let identity = test_identity();
        let first = Command::ServerName.respond(&identity);
        for _ in 0..3 {
            assert_eq!(Command::ServerName.respond(&identity), first);
        }
    }

    #[test]
    fn test_menu_lines_newline_terminated() {
        assert!(MENU.ends_with('\n'));
        assert_eq!(MENU.lines().count(), 9);
        assert!(MENU.starts_with("Available Commands:\n"));
    }
}
